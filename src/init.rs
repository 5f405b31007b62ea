//! Orthogonal weight initialization.
//!
//! Weights start as a random matrix whose thin singular-value decomposition
//! supplies a semi-orthogonal factor of the requested shape. With no batch
//! normalization in the stack, unit singular values keep activations from
//! vanishing or exploding through the six convolutional layers.

use error::{Error, Result};
use matrix::Mat;

use nalgebra::DMatrix;
use rand::distributions::{Normal, Range};

/// Initial weights for a convolution with `out_maps` filters of shape
/// `(in_maps, kh, kw)`, as an `(out_maps, in_maps * kh * kw)` matrix whose
/// rows are the flattened filters.
pub fn conv_orthogonal(out_maps: usize,
                       in_maps: usize,
                       kh: usize,
                       kw: usize)
                       -> Result<Mat> {
    let seed = Mat::random(Range::new(0.0, 1.0), out_maps, in_maps * kh * kw);
    orthogonalize(&seed)
}

/// Initial weights for a fully connected layer, as a
/// `(fan_in, fan_out)` matrix.
pub fn dense_orthogonal(fan_in: usize, fan_out: usize) -> Result<Mat> {
    let bound = (2.0 / (fan_in + fan_out) as f64).sqrt();
    let mut seed = Mat::random(Normal::new(0.0, 1.0), fan_in, fan_out);
    for x in seed.as_mut_slice() {
        *x *= bound;
    }
    orthogonalize(&seed)
}

/// Replaces `seed` with the thin-SVD factor that has the same shape.
///
/// For an `m x n` seed the thin decomposition yields `U` of shape
/// `(m, min(m, n))` and `V^T` of shape `(min(m, n), n)`; exactly one of them
/// (both, when square) matches the seed's shape and is returned. Requesting a
/// shape neither factor can provide is an error rather than a silent reshape.
fn orthogonalize(seed: &Mat) -> Result<Mat> {
    let (rows, cols) = (seed.rows(), seed.cols());
    let dm = DMatrix::from_fn(rows, cols, |r, c| seed[(r, c)]);
    let svd = dm.svd(true, true);
    let mismatch = Error::NoOrthogonalFactor {
        rows: rows,
        cols: cols,
    };
    let v_t = svd.v_t.ok_or(mismatch.clone())?;
    if v_t.nrows() == rows && v_t.ncols() == cols {
        return Ok(Mat::from_fn(rows, cols, |r, c| v_t[(r, c)]));
    }
    let u = svd.u.ok_or(mismatch.clone())?;
    if u.nrows() == rows && u.ncols() == cols {
        return Ok(Mat::from_fn(rows, cols, |r, c| u[(r, c)]));
    }
    Err(mismatch)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Gram matrix over the shorter dimension; semi-orthogonality means it is
    /// the identity.
    fn gram_deviation(w: &Mat) -> f64 {
        let (rows, cols) = (w.rows(), w.cols());
        let k = if rows <= cols { rows } else { cols };
        let mut worst = 0.0f64;
        for i in 0..k {
            for j in 0..k {
                let mut dot = 0.0;
                if rows <= cols {
                    for c in 0..cols {
                        dot += w[(i, c)] * w[(j, c)];
                    }
                } else {
                    for r in 0..rows {
                        dot += w[(r, i)] * w[(r, j)];
                    }
                }
                let expected = if i == j { 1.0 } else { 0.0 };
                worst = worst.max((dot - expected).abs());
            }
        }
        worst
    }

    #[test]
    fn conv_weights_have_requested_shape() {
        let w = conv_orthogonal(8, 3, 3, 3).unwrap();
        assert_eq!((w.rows(), w.cols()), (8, 27));
    }

    #[test]
    fn conv_weights_are_semi_orthogonal() {
        let w = conv_orthogonal(8, 3, 3, 3).unwrap();
        assert!(gram_deviation(&w) < 1e-9);
    }

    #[test]
    fn dense_weights_are_semi_orthogonal_both_orientations() {
        let wide = dense_orthogonal(10, 40).unwrap();
        assert_eq!((wide.rows(), wide.cols()), (10, 40));
        assert!(gram_deviation(&wide) < 1e-9);

        let tall = dense_orthogonal(40, 10).unwrap();
        assert_eq!((tall.rows(), tall.cols()), (40, 10));
        assert!(gram_deviation(&tall) < 1e-9);

        let square = dense_orthogonal(12, 12).unwrap();
        assert!(gram_deviation(&square) < 1e-9);
    }
}
