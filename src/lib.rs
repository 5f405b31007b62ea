//! Detects cell bodies in summary images of calcium imaging recordings.
//!
//! A small convolutional network classifies every pixel of a standardized
//! image by sliding a 40x40 window across it and predicting the 20x20 patch
//! at the window's center. Overlapping predictions are averaged, thresholded,
//! and labeled into connected regions, which serialize to the neurofinder
//! submission format.

extern crate itertools;
extern crate nalgebra;
extern crate rand;
extern crate rblas;
#[macro_use]
extern crate serde_derive;
extern crate serde_json;

pub mod activator;
pub mod adam;
pub mod dataset;
pub mod error;
pub mod init;
pub mod label;
pub mod layers;
pub mod matrix;
pub mod network;
pub mod output;
pub mod sampler;
pub mod sweep;
pub mod tensor;
pub mod trainer;

mod utils;
