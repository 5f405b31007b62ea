//! Crate-wide error type.

use std::error;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// An input image exceeds the canonical size and cannot be reached by
    /// zero-padding alone.
    UnsupportedImageDimensions {
        rows: usize,
        cols: usize,
        max: usize,
    },
    /// Two grids that must share a shape do not.
    ShapeMismatch {
        expected: (usize, usize),
        actual: (usize, usize),
    },
    /// A settings struct failed validation.
    InvalidSettings(String),
    /// Neither SVD factor matches the requested weight shape.
    NoOrthogonalFactor { rows: usize, cols: usize },
    /// The training masks contain no usable sample coordinates at all.
    EmptySampleSet,
    /// The loss became non-finite at the given training step.
    NonFiniteLoss { step: usize },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            &Error::UnsupportedImageDimensions { rows, cols, max } => {
                write!(f,
                       "unsupported image dimensions {}x{}: larger than the \
                        canonical {}x{} frame",
                       rows,
                       cols,
                       max,
                       max)
            }
            &Error::ShapeMismatch { expected, actual } => {
                write!(f,
                       "shape mismatch: expected {}x{}, got {}x{}",
                       expected.0,
                       expected.1,
                       actual.0,
                       actual.1)
            }
            &Error::InvalidSettings(ref what) => {
                write!(f, "invalid settings: {}", what)
            }
            &Error::NoOrthogonalFactor { rows, cols } => {
                write!(f,
                       "no orthogonal factor of shape {}x{} available from \
                        the decomposition",
                       rows,
                       cols)
            }
            &Error::EmptySampleSet => {
                write!(f, "no positive or negative sample coordinates found")
            }
            &Error::NonFiniteLoss { step } => {
                write!(f, "training loss became non-finite at step {}", step)
            }
        }
    }
}

impl error::Error for Error {}

pub type Result<T> = ::std::result::Result<T, Error>;
