//! In-memory image grids and dataset preparation.
//!
//! Loading from disk is a collaborator's job; the crate receives plain
//! numeric grids. Preparation pads every grid to the canonical frame,
//! standardizes each pixel position over the combined train and test stack,
//! and finally adds the window margin that lets edge pixels be classified.

use error::{Error, Result};

/// A row-major 2D grid of `f64` values.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Grid {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Grid {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Grid {
            rows: rows,
            cols: cols,
            data: vec![0.0; rows * cols],
        }
    }

    pub fn from_fn<F>(rows: usize, cols: usize, mut f: F) -> Self
        where F: FnMut(usize, usize) -> f64
    {
        let mut data = Vec::with_capacity(rows * cols);
        for r in 0..rows {
            for c in 0..cols {
                data.push(f(r, c));
            }
        }
        Grid {
            rows: rows,
            cols: cols,
            data: data,
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn get(&self, r: usize, c: usize) -> f64 {
        debug_assert!(r < self.rows && c < self.cols);
        self.data[r * self.cols + c]
    }

    pub fn set(&mut self, r: usize, c: usize, value: f64) {
        debug_assert!(r < self.rows && c < self.cols);
        self.data[r * self.cols + c] = value;
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.data
    }

    /// Copies this grid into the top-left corner of a larger zero grid.
    /// Grids larger than the requested shape are unsupported input.
    pub fn pad_to(&self, rows: usize, cols: usize) -> Result<Grid> {
        if self.rows > rows || self.cols > cols {
            return Err(Error::UnsupportedImageDimensions {
                rows: self.rows,
                cols: self.cols,
                max: rows,
            });
        }
        let mut padded = Grid::zeros(rows, cols);
        for r in 0..self.rows {
            for c in 0..self.cols {
                padded.set(r, c, self.get(r, c));
            }
        }
        Ok(padded)
    }

    /// Surrounds the grid with a zero border of `margin` pixels.
    pub fn pad_margin(&self, margin: usize) -> Grid {
        let mut padded = Grid::zeros(self.rows + 2 * margin,
                                     self.cols + 2 * margin);
        for r in 0..self.rows {
            for c in 0..self.cols {
                padded.set(r + margin, c + margin, self.get(r, c));
            }
        }
        padded
    }
}

/// Canonical frame geometry.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DatasetSettings {
    /// Side of the square frame every image is padded to.
    pub canonical: usize,
    /// Extra zero border so edge pixels have full classification windows;
    /// half of the network's input window.
    pub margin: usize,
}

impl DatasetSettings {
    pub fn neurofinder() -> Self {
        DatasetSettings {
            canonical: 512,
            margin: 20,
        }
    }

    /// Side of a fully padded grid.
    pub fn padded(&self) -> usize {
        self.canonical + 2 * self.margin
    }
}

/// Prepared, fully padded grids ready for sampling and sweeping.
#[derive(Clone, Debug)]
pub struct Dataset {
    pub train_images: Vec<Grid>,
    pub train_masks: Vec<Grid>,
    pub test_images: Vec<Grid>,
}

/// Pads, standardizes, and margins the raw dataset. See the module docs for
/// the exact order of operations.
pub fn prepare(train_images: Vec<Grid>,
               train_masks: Vec<Grid>,
               test_images: Vec<Grid>,
               settings: &DatasetSettings)
               -> Result<Dataset> {
    if train_images.len() != train_masks.len() {
        return Err(Error::InvalidSettings("one mask per training image"
            .into()));
    }
    for (image, mask) in train_images.iter().zip(&train_masks) {
        if (image.rows(), image.cols()) != (mask.rows(), mask.cols()) {
            return Err(Error::ShapeMismatch {
                expected: (image.rows(), image.cols()),
                actual: (mask.rows(), mask.cols()),
            });
        }
    }

    let side = settings.canonical;
    let mut images: Vec<Grid> = Vec::new();
    for image in train_images.iter().chain(&test_images) {
        images.push(image.pad_to(side, side)?);
    }
    standardize(&mut images);

    let masks: Result<Vec<Grid>> = train_masks.iter()
        .map(|m| m.pad_to(side, side).map(|p| p.pad_margin(settings.margin)))
        .collect();
    let test_start = train_images.len();
    let margined: Vec<Grid> =
        images.iter().map(|i| i.pad_margin(settings.margin)).collect();

    Ok(Dataset {
        train_images: margined[..test_start].to_vec(),
        train_masks: masks?,
        test_images: margined[test_start..].to_vec(),
    })
}

/// Standardizes each pixel position to zero mean and unit variance over the
/// image stack. Positions with zero variance keep scale one, so constant
/// pixels map to zero.
fn standardize(images: &mut [Grid]) {
    if images.is_empty() {
        return;
    }
    let n = images.len() as f64;
    let pixels = images[0].as_slice().len();
    for i in 0..pixels {
        let mean = images.iter().map(|g| g.as_slice()[i]).sum::<f64>() / n;
        let var = images.iter()
            .map(|g| {
                let d = g.as_slice()[i] - mean;
                d * d
            })
            .sum::<f64>() / n;
        let scale = if var > 0.0 { var.sqrt() } else { 1.0 };
        for g in images.iter_mut() {
            g.as_mut_slice()[i] = (g.as_slice()[i] - mean) / scale;
        }
    }
}
