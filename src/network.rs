//! The sliding-window classifier network.
//!
//! A fixed pipeline of convolutional layers, a flatten, and fully connected
//! layers, trained with elementwise binary cross-entropy and Adam. The
//! topology is static, so the forward and backward passes are composed
//! explicitly instead of going through a graph abstraction.

use adam::Adam;
use error::{Error, Result};
use layers::{ConvCache, ConvGrads, ConvLayer, DenseGrads, DenseLayer};
use matrix::Mat;
use tensor::Tensor4;
use utils::ZeroOut;

/// Predicted probabilities are clamped into `(EPSILON, 1 - EPSILON)` before
/// any logarithm so the loss stays finite.
const PROBABILITY_EPSILON: f64 = 1e-7;

/// Topology of the classifier.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NetworkSettings {
    /// Feature map counts, input first: `[1, 50, 50, ...]`.
    pub conv_maps: Vec<usize>,
    /// Filter `(height, width)` per convolutional layer.
    pub filter_shapes: Vec<(usize, usize)>,
    /// Index of the single convolutional layer that max-pools, if any.
    pub pool_layer: Option<usize>,
    /// Fully connected layer sizes between the flatten and the output.
    pub hidden_nodes: Vec<usize>,
    /// Side length of the square input window.
    pub input_window: usize,
    /// Side length of the concentric target window; the output layer has one
    /// unit per target pixel.
    pub target_window: usize,
    /// Base Adam learning rate.
    pub learning_rate: f64,
}

impl NetworkSettings {
    /// The configuration used for the neurofinder dataset: six 3x3
    /// convolutional layers `[1,50,50,50,100,100,100]` with one 2x2 pool
    /// after the fourth, a 2000-node hidden layer, and 40x40 input windows
    /// predicting 20x20 targets.
    pub fn neurofinder() -> Self {
        NetworkSettings {
            conv_maps: vec![1, 50, 50, 50, 100, 100, 100],
            filter_shapes: vec![(3, 3); 6],
            pool_layer: Some(3),
            hidden_nodes: vec![2000],
            input_window: 40,
            target_window: 20,
            learning_rate: 0.0002,
        }
    }

    /// Output units: one per pixel of the target window.
    pub fn classes(&self) -> usize {
        self.target_window * self.target_window
    }

    fn validate(&self) -> Result<()> {
        let invalid = |what: &str| Err(Error::InvalidSettings(what.into()));
        if self.conv_maps.len() < 2 {
            return invalid("at least one convolutional layer is required");
        }
        if self.filter_shapes.len() != self.conv_maps.len() - 1 {
            return invalid("one filter shape per convolutional layer");
        }
        if self.hidden_nodes.is_empty() {
            return invalid("at least one hidden layer is required");
        }
        if self.conv_maps.iter().any(|&m| m == 0) ||
           self.hidden_nodes.iter().any(|&n| n == 0) {
            return invalid("empty layers are not allowed");
        }
        if let Some(pool) = self.pool_layer {
            if pool >= self.filter_shapes.len() {
                return invalid("pool layer index out of range");
            }
        }
        if self.input_window == 0 || self.target_window == 0 {
            return invalid("window sizes must be positive");
        }
        if self.target_window > self.input_window {
            return invalid("target window larger than input window");
        }
        if (self.input_window - self.target_window) % 2 != 0 {
            return invalid("windows must be concentric");
        }
        if !(self.learning_rate > 0.0) {
            return invalid("learning rate must be positive");
        }
        Ok(())
    }
}

/// A trained or in-training classifier.
#[derive(Debug)]
pub struct Network {
    conv: Vec<ConvLayer>,
    dense: Vec<DenseLayer>,
    conv_grads: Vec<ConvGrads>,
    dense_grads: Vec<DenseGrads>,
    adam: Adam,
    settings: NetworkSettings,
}

impl Network {
    pub fn new(settings: NetworkSettings) -> Result<Self> {
        settings.validate()?;

        let mut conv = Vec::new();
        let (mut h, mut w) = (settings.input_window, settings.input_window);
        for i in 0..settings.filter_shapes.len() {
            let (kh, kw) = settings.filter_shapes[i];
            let layer = ConvLayer::new(settings.conv_maps[i],
                                       settings.conv_maps[i + 1],
                                       kh,
                                       kw,
                                       settings.pool_layer == Some(i))?;
            let (nh, nw) = layer.output_spatial(h, w);
            if nh == 0 || nw == 0 {
                return Err(Error::InvalidSettings("window pooled away to \
                                                   nothing"
                    .into()));
            }
            h = nh;
            w = nw;
            conv.push(layer);
        }

        let flattened = settings.conv_maps[settings.conv_maps.len() - 1] * h *
                        w;
        let mut dense = Vec::new();
        let mut features = flattened;
        for &nodes in &settings.hidden_nodes {
            dense.push(DenseLayer::new(features, nodes)?);
            features = nodes;
        }
        dense.push(DenseLayer::new(features, settings.classes())?);

        let conv_grads: Vec<_> = conv.iter().map(|l| l.new_grads()).collect();
        let dense_grads: Vec<_> =
            dense.iter().map(|l| l.new_grads()).collect();

        let mut adam = Adam::with_learning_rate(settings.learning_rate);
        for grads in &conv_grads {
            adam.register(grads.weights.as_slice().len());
            adam.register(grads.bias.len());
        }
        for grads in &dense_grads {
            adam.register(grads.weights.as_slice().len());
            adam.register(grads.bias.len());
        }

        Ok(Network {
            conv: conv,
            dense: dense,
            conv_grads: conv_grads,
            dense_grads: dense_grads,
            adam: adam,
            settings: settings,
        })
    }

    pub fn settings(&self) -> &NetworkSettings {
        &self.settings
    }

    /// Completed training steps.
    pub fn steps_taken(&self) -> usize {
        self.adam.step_count()
    }

    /// Runs one training step: forward, elementwise binary cross-entropy,
    /// backward, and a single Adam update over all parameters. Returns the
    /// batch loss. A non-finite loss aborts before any parameter changes.
    pub fn train(&mut self, input: &Tensor4, target: &Mat) -> Result<f64> {
        self.check_input(input)?;
        if target.rows() != input.batch() ||
           target.cols() != self.settings.classes() {
            return Err(Error::ShapeMismatch {
                expected: (input.batch(), self.settings.classes()),
                actual: (target.rows(), target.cols()),
            });
        }

        let (conv_caches, dense_values) = self.forward(input.clone());
        let output = &dense_values[dense_values.len() - 1];

        let n = (output.rows() * output.cols()) as f64;
        let mut loss = 0.0;
        let mut grad = Mat::zeros(output.rows(), output.cols());
        {
            let o_slice = output.as_slice();
            let t_slice = target.as_slice();
            let g_slice = grad.as_mut_slice();
            for i in 0..o_slice.len() {
                let o = clamp_probability(o_slice[i]);
                let t = t_slice[i];
                loss += -t * o.ln() - (1.0 - t) * (1.0 - o).ln();
                g_slice[i] = (-t / o + (1.0 - t) / (1.0 - o)) / n;
            }
        }
        loss /= n;
        if !loss.is_finite() {
            return Err(Error::NonFiniteLoss { step: self.steps_taken() + 1 });
        }

        for grads in &mut self.conv_grads {
            grads.zero_out();
        }
        for grads in &mut self.dense_grads {
            grads.zero_out();
        }

        let mut grad_mat = grad;
        for i in (0..self.dense.len()).rev() {
            grad_mat = self.dense[i].backward(&dense_values[i],
                                              &dense_values[i + 1],
                                              &grad_mat,
                                              &mut self.dense_grads[i]);
        }

        let last = conv_caches.len() - 1;
        let mut grad_tensor = unflatten(&grad_mat, &conv_caches[last].output);
        for i in (0..self.conv.len()).rev() {
            grad_tensor = self.conv[i].backward(&conv_caches[i],
                                                &grad_tensor,
                                                &mut self.conv_grads[i]);
        }

        let mut pairs: Vec<(&mut [f64], &[f64])> = Vec::new();
        for (layer, grads) in self.conv.iter_mut().zip(&self.conv_grads) {
            let (weights, bias) = layer.parameters();
            pairs.push((weights.as_mut_slice(), grads.weights.as_slice()));
            pairs.push((&mut bias[..], &grads.bias[..]));
        }
        for (layer, grads) in self.dense.iter_mut().zip(&self.dense_grads) {
            let (weights, bias) = layer.parameters();
            pairs.push((weights.as_mut_slice(), grads.weights.as_slice()));
            pairs.push((&mut bias[..], &grads.bias[..]));
        }
        self.adam.step(&mut pairs);

        Ok(loss)
    }

    /// Forward pass only; parameters and optimizer state are untouched.
    pub fn predict(&self, input: &Tensor4) -> Result<Mat> {
        self.check_input(input)?;
        let (_, mut dense_values) = self.forward(input.clone());
        Ok(dense_values.pop().expect("pipeline always produces an output"))
    }

    fn check_input(&self, input: &Tensor4) -> Result<()> {
        let window = self.settings.input_window;
        if input.maps() != self.settings.conv_maps[0] ||
           input.rows() != window || input.cols() != window {
            return Err(Error::ShapeMismatch {
                expected: (window, window),
                actual: (input.rows(), input.cols()),
            });
        }
        Ok(())
    }

    /// Feeds `input` through every layer, returning the conv caches and the
    /// dense activations (`dense_values[0]` is the flattened conv output,
    /// `dense_values[i + 1]` the output of dense layer `i`).
    fn forward(&self, input: Tensor4) -> (Vec<ConvCache>, Vec<Mat>) {
        let mut conv_caches = Vec::with_capacity(self.conv.len());
        let mut current = input;
        for layer in &self.conv {
            let cache = layer.forward(current);
            current = cache.output.clone();
            conv_caches.push(cache);
        }

        let mut dense_values = Vec::with_capacity(self.dense.len() + 1);
        dense_values.push(flatten(&current));
        for layer in &self.dense {
            let next = layer.forward(&dense_values[dense_values.len() - 1]);
            dense_values.push(next);
        }
        (conv_caches, dense_values)
    }
}

fn clamp_probability(p: f64) -> f64 {
    p.max(PROBABILITY_EPSILON).min(1.0 - PROBABILITY_EPSILON)
}

/// Flattens `(batch, maps, rows, cols)` into `(batch, maps * rows * cols)`
/// with each item kept in C order: maps outermost, then rows, then columns.
fn flatten(tensor: &Tensor4) -> Mat {
    let features = tensor.maps() * tensor.rows() * tensor.cols();
    Mat::from_fn(tensor.batch(), features, |b, f| tensor.item(b)[f])
}

/// Reshapes a flattened gradient back to the shape of `like`.
fn unflatten(mat: &Mat, like: &Tensor4) -> Tensor4 {
    let mut tensor = Tensor4::zeros(like.batch(),
                                    like.maps(),
                                    like.rows(),
                                    like.cols());
    for b in 0..mat.rows() {
        let item = tensor.item_mut(b);
        for f in 0..mat.cols() {
            item[f] = mat[(b, f)];
        }
    }
    tensor
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng, StdRng};

    fn tiny_settings() -> NetworkSettings {
        NetworkSettings {
            conv_maps: vec![1, 3, 3],
            filter_shapes: vec![(3, 3); 2],
            pool_layer: Some(1),
            hidden_nodes: vec![8],
            input_window: 8,
            target_window: 4,
            learning_rate: 0.02,
        }
    }

    fn random_batch(settings: &NetworkSettings,
                    batch: usize,
                    rng: &mut StdRng)
                    -> (Tensor4, Mat) {
        let window = settings.input_window;
        let mut input = Tensor4::zeros(batch, 1, window, window);
        for x in input.as_mut_slice() {
            *x = rng.gen::<f64>() * 2.0 - 1.0;
        }
        let target = Mat::from_fn(batch, settings.classes(), |_, _| {
            if rng.gen::<f64>() < 0.5 { 1.0 } else { 0.0 }
        });
        (input, target)
    }

    #[test]
    fn rejects_inconsistent_settings() {
        let mut s = tiny_settings();
        s.filter_shapes.pop();
        assert!(Network::new(s).is_err());

        let mut s = tiny_settings();
        s.pool_layer = Some(9);
        assert!(Network::new(s).is_err());

        let mut s = tiny_settings();
        s.target_window = 5;
        assert!(Network::new(s).is_err());
    }

    #[test]
    fn rejects_mismatched_batches() {
        let mut network = Network::new(tiny_settings()).unwrap();
        let input = Tensor4::zeros(2, 1, 8, 8);
        let target = Mat::zeros(2, 9);
        assert!(network.train(&input, &target).is_err());
        let wrong_window = Tensor4::zeros(2, 1, 6, 6);
        assert!(network.predict(&wrong_window).is_err());
    }

    #[test]
    fn predictions_are_probabilities() {
        let network = Network::new(tiny_settings()).unwrap();
        let input = Tensor4::zeros(3, 1, 8, 8);
        let output = network.predict(&input).unwrap();
        assert_eq!((output.rows(), output.cols()), (3, 16));
        for &p in output.as_slice() {
            assert!(p > 0.0 && p < 1.0);
        }
    }

    #[test]
    fn predict_does_not_change_predictions() {
        let network = Network::new(tiny_settings()).unwrap();
        let mut rng = StdRng::from_seed(&[5usize]);
        let (input, _) = random_batch(network.settings(), 2, &mut rng);
        let first = network.predict(&input).unwrap();
        let second = network.predict(&input).unwrap();
        assert_eq!(first.as_slice(), second.as_slice());
    }

    #[test]
    fn training_reduces_loss_on_a_fixed_batch() {
        let mut network = Network::new(tiny_settings()).unwrap();
        let mut rng = StdRng::from_seed(&[17usize]);
        let (input, target) = random_batch(network.settings(), 4, &mut rng);
        let first = network.train(&input, &target).unwrap();
        let mut last = first;
        for _ in 0..60 {
            last = network.train(&input, &target).unwrap();
        }
        assert_eq!(network.steps_taken(), 61);
        assert!(last < first,
                "loss did not improve: {} -> {}",
                first,
                last);
    }

    #[test]
    fn loss_is_finite_for_extreme_targets() {
        let mut network = Network::new(tiny_settings()).unwrap();
        let input = Tensor4::zeros(1, 1, 8, 8);
        let ones = Mat::from_fn(1, 16, |_, _| 1.0);
        let zeros = Mat::zeros(1, 16);
        assert!(network.train(&input, &ones).unwrap().is_finite());
        assert!(network.train(&input, &zeros).unwrap().is_finite());
    }
}
