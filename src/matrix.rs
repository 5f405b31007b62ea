use utils::ZeroOut;

use rand;
use rand::distributions::IndependentSample;
use rblas::attribute::{Order, Transpose};
use rblas::matrix::ops::Gemm;
use rblas::Matrix;
use std::ops::{Index, IndexMut};
use std::os::raw::c_int;

/// A dense, column-major matrix of `f64` backed by BLAS.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Mat {
    rows: usize,
    cols: usize,
    data: Vec<f64>, // column-major array
}

impl Mat {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Mat {
            rows: rows,
            cols: cols,
            data: vec![0.0; rows * cols],
        }
    }

    /// Fills a new matrix with independent draws from `distribution`.
    pub fn random<D>(distribution: D, rows: usize, cols: usize) -> Self
        where D: IndependentSample<f64>
    {
        let mut rng = rand::thread_rng();
        let mut data = Vec::with_capacity(rows * cols);
        for _ in 0..(rows * cols) {
            data.push(distribution.ind_sample(&mut rng));
        }
        Mat {
            rows: rows,
            cols: cols,
            data: data,
        }
    }

    pub fn from_fn<F>(rows: usize, cols: usize, mut f: F) -> Self
        where F: FnMut(usize, usize) -> f64
    {
        let mut data = Vec::with_capacity(rows * cols);
        for c in 0..cols {
            for r in 0..rows {
                data.push(f(r, c));
            }
        }
        Mat {
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

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.data
    }

    /// Computes `c = alpha * op(a) * op(b) + beta * c` with BLAS.
    pub fn gemm(alpha: f64,
                a: &Mat,
                at: Transpose,
                b: &Mat,
                bt: Transpose,
                beta: f64,
                c: &mut Mat) {
        let (am, ak) = match at {
            Transpose::NoTrans => (a.rows, a.cols),
            _ => (a.cols, a.rows),
        };
        let (bk, bn) = match bt {
            Transpose::NoTrans => (b.rows, b.cols),
            _ => (b.cols, b.rows),
        };
        assert_eq!(ak, bk);
        assert_eq!((c.rows, c.cols), (am, bn));
        f64::gemm(&alpha, at, a, bt, b, &beta, c);
    }
}

impl Index<(usize, usize)> for Mat {
    type Output = f64;

    fn index(&self, (r, c): (usize, usize)) -> &f64 {
        debug_assert!(r < self.rows && c < self.cols);
        &self.data[c * self.rows + r]
    }
}

impl IndexMut<(usize, usize)> for Mat {
    fn index_mut(&mut self, (r, c): (usize, usize)) -> &mut f64 {
        debug_assert!(r < self.rows && c < self.cols);
        &mut self.data[c * self.rows + r]
    }
}

impl Matrix<f64> for Mat {
    fn rows(&self) -> c_int {
        self.rows as c_int
    }

    fn cols(&self) -> c_int {
        self.cols as c_int
    }

    fn as_ptr(&self) -> *const f64 {
        self.data.as_ptr()
    }

    fn as_mut_ptr(&mut self) -> *mut f64 {
        self.data.as_mut_ptr()
    }

    fn order(&self) -> Order {
        Order::ColMajor
    }
}

impl ZeroOut for Mat {
    fn zero_out(&mut self) {
        self.data.zero_out();
    }
}
