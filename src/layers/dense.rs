//! Fully connected layer.
//!
//! The pre-activation is negated: `y = sigmoid(-(x*W) - b)`. Trained weights
//! are only meaningful under this sign convention, and the gradient terms in
//! `backward` carry the matching negations.

use activator::Activator;
use error::Result;
use init;
use matrix::Mat;
use utils::ZeroOut;

use itertools::multizip;
use rblas::attribute::Transpose;

#[derive(Debug, Serialize, Deserialize)]
pub struct DenseLayer {
    /// `(features, nodes)`, one output unit per column.
    weights: Mat,
    bias: Vec<f64>,
    activator: Activator,
}

/// Gradient accumulators matching a `DenseLayer`'s parameters.
#[derive(Debug)]
pub struct DenseGrads {
    pub weights: Mat,
    pub bias: Vec<f64>,
}

impl ZeroOut for DenseGrads {
    fn zero_out(&mut self) {
        self.weights.zero_out();
        self.bias.zero_out();
    }
}

impl DenseLayer {
    pub fn new(features: usize, nodes: usize) -> Result<Self> {
        Ok(DenseLayer {
            weights: init::dense_orthogonal(features, nodes)?,
            bias: vec![0.0; nodes],
            activator: Activator::Sigmoid,
        })
    }

    pub fn features(&self) -> usize {
        self.weights.rows()
    }

    pub fn nodes(&self) -> usize {
        self.weights.cols()
    }

    pub fn new_grads(&self) -> DenseGrads {
        DenseGrads {
            weights: Mat::zeros(self.weights.rows(), self.weights.cols()),
            bias: vec![0.0; self.nodes()],
        }
    }

    pub fn parameters(&mut self) -> (&mut Mat, &mut Vec<f64>) {
        (&mut self.weights, &mut self.bias)
    }

    /// Maps a `(batch, features)` input to `(batch, nodes)` activations.
    pub fn forward(&self, input: &Mat) -> Mat {
        assert_eq!(input.cols(), self.features());
        let batch = input.rows();
        let mut output = Mat::zeros(batch, self.nodes());
        Mat::gemm(-1.0,
                  input,
                  Transpose::NoTrans,
                  &self.weights,
                  Transpose::NoTrans,
                  0.0,
                  &mut output);
        for j in 0..self.nodes() {
            let bias = self.bias[j];
            for r in 0..batch {
                let z = output[(r, j)] - bias;
                output[(r, j)] = self.activator.f(z);
            }
        }
        output
    }

    /// Propagates `grad_out` back through the layer, accumulating parameter
    /// gradients into `grads` and returning the gradient w.r.t. the input.
    pub fn backward(&self,
                    input: &Mat,
                    output: &Mat,
                    grad_out: &Mat,
                    grads: &mut DenseGrads)
                    -> Mat {
        assert_eq!(input.rows(), grad_out.rows());
        assert_eq!(grad_out.cols(), self.nodes());
        let batch = input.rows();

        let mut dz = Mat::zeros(batch, self.nodes());
        for (d, y, e) in multizip((dz.as_mut_slice().iter_mut(),
                                  output.as_slice().iter(),
                                  grad_out.as_slice().iter())) {
            *d = e * self.activator.fprime(*y);
        }

        // z = -(x*W) - b, so every parameter gradient picks up a minus sign.
        Mat::gemm(-1.0,
                  input,
                  Transpose::Trans,
                  &dz,
                  Transpose::NoTrans,
                  1.0,
                  &mut grads.weights);
        for j in 0..self.nodes() {
            for r in 0..batch {
                grads.bias[j] -= dz[(r, j)];
            }
        }
        let mut grad_input = Mat::zeros(batch, self.features());
        Mat::gemm(-1.0,
                  &dz,
                  Transpose::NoTrans,
                  &self.weights,
                  Transpose::Trans,
                  0.0,
                  &mut grad_input);
        grad_input
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng, StdRng};

    #[test]
    fn output_stays_in_open_unit_interval() {
        let layer = DenseLayer::new(6, 4).unwrap();
        let input = Mat::from_fn(3, 6, |r, c| (r * 6 + c) as f64 * 100.0);
        let output = layer.forward(&input);
        assert_eq!((output.rows(), output.cols()), (3, 4));
        for &y in output.as_slice() {
            assert!(y > 0.0 && y < 1.0);
        }
    }

    #[test]
    fn negated_preactivation_is_reproduced() {
        let mut layer = DenseLayer::new(1, 1).unwrap();
        {
            let (weights, bias) = layer.parameters();
            weights.as_mut_slice()[0] = 2.0;
            bias[0] = 0.5;
        }
        let input = Mat::from_fn(1, 1, |_, _| 3.0);
        let output = layer.forward(&input);
        // sigmoid(-(3*2) - 0.5)
        let expected = 1.0 / (1.0 + 6.5f64.exp());
        assert!((output[(0, 0)] - expected).abs() < 1e-12);
    }

    #[test]
    fn gradients_match_finite_differences() {
        let mut rng = StdRng::from_seed(&[3usize]);
        let mut layer = DenseLayer::new(5, 3).unwrap();
        let mut input = Mat::from_fn(2, 5, |_, _| rng.gen::<f64>() * 2.0 - 1.0);

        // Loss: sum(y^2) / 2, so dL/dy = y.
        let output = layer.forward(&input);
        let mut grads = layer.new_grads();
        let grad_in = layer.backward(&input, &output, &output, &mut grads);

        let h = 1e-6;
        let loss = |layer: &DenseLayer, input: &Mat| -> f64 {
            layer.forward(input)
                .as_slice()
                .iter()
                .map(|y| y * y)
                .sum::<f64>() / 2.0
        };
        for i in 0..layer.weights.as_slice().len() {
            let orig = layer.weights.as_slice()[i];
            layer.weights.as_mut_slice()[i] = orig + h;
            let up = loss(&layer, &input);
            layer.weights.as_mut_slice()[i] = orig - h;
            let down = loss(&layer, &input);
            layer.weights.as_mut_slice()[i] = orig;
            let numeric = (up - down) / (2.0 * h);
            assert!((grads.weights.as_slice()[i] - numeric).abs() < 1e-6);
        }
        for j in 0..layer.bias.len() {
            let orig = layer.bias[j];
            layer.bias[j] = orig + h;
            let up = loss(&layer, &input);
            layer.bias[j] = orig - h;
            let down = loss(&layer, &input);
            layer.bias[j] = orig;
            let numeric = (up - down) / (2.0 * h);
            assert!((grads.bias[j] - numeric).abs() < 1e-6);
        }
        for i in 0..input.as_slice().len() {
            let orig = input.as_slice()[i];
            input.as_mut_slice()[i] = orig + h;
            let up = loss(&layer, &input);
            input.as_mut_slice()[i] = orig - h;
            let down = loss(&layer, &input);
            input.as_mut_slice()[i] = orig;
            let numeric = (up - down) / (2.0 * h);
            assert!((grad_in.as_slice()[i] - numeric).abs() < 1e-6);
        }
    }
}
