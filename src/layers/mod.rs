//! Network layers with explicit forward and backward passes.

pub mod conv;
pub mod dense;

pub use self::conv::{ConvCache, ConvGrads, ConvLayer};
pub use self::dense::{DenseGrads, DenseLayer};
