//! Balanced training-window sampling with flip augmentation.

use dataset::Grid;
use error::{Error, Result};
use matrix::Mat;
use tensor::Tensor4;

use rand::Rng;

/// Window geometry and class-coordinate policy for the sampler.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SamplerSettings {
    pub input_window: usize,
    pub target_window: usize,
    /// Negative coordinates are restricted to the interior at least this far
    /// from every border. Positive coordinates are not restricted: masks are
    /// margin-padded with zeros, so positives already sit a full margin
    /// inside.
    pub negative_margin: usize,
}

impl SamplerSettings {
    /// 40x40 inputs, 20x20 targets, negatives kept one window margin inside.
    pub fn neurofinder() -> Self {
        SamplerSettings {
            input_window: 40,
            target_window: 20,
            negative_margin: 20,
        }
    }
}

/// One labelled training example.
#[derive(Clone, Debug)]
pub struct Sample {
    /// Flattened `input_window x input_window` pixels.
    pub input: Vec<f64>,
    /// Flattened `target_window x target_window` labels.
    pub target: Vec<f64>,
    /// Whether the center coordinate was drawn from the positive class.
    pub positive: bool,
}

/// Draws balanced, augmented window pairs from a labelled dataset.
///
/// Coordinates of every positive (mask = 1) and negative (mask = 0) pixel are
/// precomputed once; each draw picks a class with probability one half, a
/// coordinate uniformly within the class, and then flips the window pair
/// horizontally and vertically with independent probability one half each.
#[derive(Debug)]
pub struct TrainingSampler<R: Rng> {
    images: Vec<Grid>,
    masks: Vec<Grid>,
    positives: Vec<(usize, usize, usize)>,
    negatives: Vec<(usize, usize, usize)>,
    settings: SamplerSettings,
    rng: R,
}

impl<R: Rng> TrainingSampler<R> {
    pub fn new(images: Vec<Grid>,
               masks: Vec<Grid>,
               settings: SamplerSettings,
               rng: R)
               -> Result<Self> {
        if images.len() != masks.len() {
            return Err(Error::InvalidSettings("one mask per training image"
                .into()));
        }
        let half = settings.input_window / 2;
        let margin = settings.negative_margin;
        let mut positives = Vec::new();
        let mut negatives = Vec::new();
        for (i, (image, mask)) in images.iter().zip(&masks).enumerate() {
            if (image.rows(), image.cols()) != (mask.rows(), mask.cols()) {
                return Err(Error::ShapeMismatch {
                    expected: (image.rows(), image.cols()),
                    actual: (mask.rows(), mask.cols()),
                });
            }
            for r in 0..mask.rows() {
                for c in 0..mask.cols() {
                    // Coordinates too close to the border for a full input
                    // window cannot be trained on at all.
                    if r < half || r + half > mask.rows() || c < half ||
                       c + half > mask.cols() {
                        continue;
                    }
                    if mask.get(r, c) != 0.0 {
                        positives.push((i, r, c));
                    } else if r >= margin && r + margin < mask.rows() &&
                              c >= margin &&
                              c + margin < mask.cols() {
                        negatives.push((i, r, c));
                    }
                }
            }
        }
        if positives.is_empty() && negatives.is_empty() {
            return Err(Error::EmptySampleSet);
        }
        Ok(TrainingSampler {
            images: images,
            masks: masks,
            positives: positives,
            negatives: negatives,
            settings: settings,
            rng: rng,
        })
    }

    pub fn positive_count(&self) -> usize {
        self.positives.len()
    }

    pub fn negative_count(&self) -> usize {
        self.negatives.len()
    }

    /// Draws one augmented window pair. If one class has no coordinates the
    /// draw falls back to the other, so all-background (or all-foreground)
    /// masks still yield samples.
    pub fn draw(&mut self) -> Sample {
        let positive = if self.positives.is_empty() {
            false
        } else if self.negatives.is_empty() {
            true
        } else {
            self.rng.gen::<f64>() < 0.5
        };
        let &(i, r, c) = if positive {
            let k = self.rng.gen_range(0, self.positives.len());
            &self.positives[k]
        } else {
            let k = self.rng.gen_range(0, self.negatives.len());
            &self.negatives[k]
        };

        let half_in = self.settings.input_window / 2;
        let half_t = self.settings.target_window / 2;
        let mut input = extract_window(&self.images[i], r, c, half_in);
        let mut target = extract_window(&self.masks[i], r, c, half_t);

        if self.rng.gen::<f64>() < 0.5 {
            flip_rows(&mut input, self.settings.input_window);
            flip_rows(&mut target, self.settings.target_window);
        }
        if self.rng.gen::<f64>() < 0.5 {
            flip_cols(&mut input, self.settings.input_window);
            flip_cols(&mut target, self.settings.target_window);
        }

        Sample {
            input: input,
            target: target,
            positive: positive,
        }
    }

    /// Assembles `size` draws into a `(size, 1, w, w)` input tensor and a
    /// `(size, t*t)` target matrix.
    pub fn batch(&mut self, size: usize) -> (Tensor4, Mat) {
        let w = self.settings.input_window;
        let t = self.settings.target_window;
        let mut input = Tensor4::zeros(size, 1, w, w);
        let mut target = Mat::zeros(size, t * t);
        for b in 0..size {
            let sample = self.draw();
            input.item_mut(b).copy_from_slice(&sample.input);
            for j in 0..t * t {
                target[(b, j)] = sample.target[j];
            }
        }
        (input, target)
    }
}

/// A square window of side `2 * half` centered on `(r, c)`, flattened
/// row-major. The center pixel itself sits at `(half, half)`.
fn extract_window(grid: &Grid, r: usize, c: usize, half: usize) -> Vec<f64> {
    let side = 2 * half;
    let mut window = Vec::with_capacity(side * side);
    for dr in 0..side {
        for dc in 0..side {
            window.push(grid.get(r - half + dr, c - half + dc));
        }
    }
    window
}

/// Reverses the row order of a flattened square window.
fn flip_rows(window: &mut [f64], side: usize) {
    for r in 0..side / 2 {
        for c in 0..side {
            window.swap(r * side + c, (side - 1 - r) * side + c);
        }
    }
}

/// Reverses the column order of a flattened square window.
fn flip_cols(window: &mut [f64], side: usize) {
    for r in 0..side {
        for c in 0..side / 2 {
            window.swap(r * side + c, r * side + (side - 1 - c));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dataset::Grid;
    use rand::{SeedableRng, StdRng};

    fn small_settings() -> SamplerSettings {
        SamplerSettings {
            input_window: 6,
            target_window: 2,
            negative_margin: 3,
        }
    }

    /// A 16x16 image with a positive block in the middle of the mask.
    fn block_dataset() -> (Vec<Grid>, Vec<Grid>) {
        let image = Grid::from_fn(16, 16, |r, c| (r * 16 + c) as f64);
        let mut mask = Grid::zeros(16, 16);
        for r in 6..10 {
            for c in 6..10 {
                mask.set(r, c, 1.0);
            }
        }
        (vec![image], vec![mask])
    }

    fn sampler() -> TrainingSampler<StdRng> {
        let (images, masks) = block_dataset();
        TrainingSampler::new(images,
                             masks,
                             small_settings(),
                             StdRng::from_seed(&[42usize]))
            .unwrap()
    }

    #[test]
    fn window_shapes_are_fixed() {
        let mut sampler = sampler();
        for _ in 0..50 {
            let sample = sampler.draw();
            assert_eq!(sample.input.len(), 36);
            assert_eq!(sample.target.len(), 4);
        }
    }

    #[test]
    fn classes_are_balanced() {
        let mut sampler = sampler();
        let draws = 2000;
        let positives = (0..draws)
            .filter(|_| sampler.draw().positive)
            .count();
        let fraction = positives as f64 / draws as f64;
        assert!((fraction - 0.5).abs() < 0.05,
                "positive fraction {}",
                fraction);
    }

    #[test]
    fn flips_are_involutions() {
        let mut window: Vec<f64> = (0..36).map(|x| x as f64).collect();
        let original = window.clone();
        flip_rows(&mut window, 6);
        assert_ne!(window, original);
        flip_rows(&mut window, 6);
        assert_eq!(window, original);
        flip_cols(&mut window, 6);
        flip_cols(&mut window, 6);
        assert_eq!(window, original);
    }

    #[test]
    fn negatives_keep_the_full_margin_from_every_border() {
        let images = vec![Grid::zeros(8, 8)];
        let masks = vec![Grid::zeros(8, 8)];
        let settings = SamplerSettings {
            input_window: 4,
            target_window: 2,
            negative_margin: 2,
        };
        let sampler = TrainingSampler::new(images,
                                           masks,
                                           settings,
                                           StdRng::from_seed(&[4usize]))
            .unwrap();
        // Rows and columns 2 through 5 are at least two pixels from every
        // border; row 6 is only one from the far border and must be excluded.
        assert_eq!(sampler.negative_count(), 16);
    }

    #[test]
    fn empty_positive_class_falls_back_to_negatives() {
        let images = vec![Grid::zeros(16, 16)];
        let masks = vec![Grid::zeros(16, 16)];
        let mut sampler = TrainingSampler::new(images,
                                               masks,
                                               small_settings(),
                                               StdRng::from_seed(&[1usize]))
            .unwrap();
        assert_eq!(sampler.positive_count(), 0);
        for _ in 0..10 {
            assert!(!sampler.draw().positive);
        }
    }

    #[test]
    fn mismatched_mask_shape_is_rejected() {
        let images = vec![Grid::zeros(16, 16)];
        let masks = vec![Grid::zeros(8, 8)];
        let result = TrainingSampler::new(images,
                                          masks,
                                          small_settings(),
                                          StdRng::from_seed(&[1usize]));
        assert!(result.is_err());
    }

    #[test]
    fn seeded_draws_are_reproducible() {
        let (images, masks) = block_dataset();
        let mut a = TrainingSampler::new(images.clone(),
                                         masks.clone(),
                                         small_settings(),
                                         StdRng::from_seed(&[9usize]))
            .unwrap();
        let mut b = TrainingSampler::new(images,
                                         masks,
                                         small_settings(),
                                         StdRng::from_seed(&[9usize]))
            .unwrap();
        for _ in 0..20 {
            let (sa, sb) = (a.draw(), b.draw());
            assert_eq!(sa.input, sb.input);
            assert_eq!(sa.target, sb.target);
            assert_eq!(sa.positive, sb.positive);
        }
    }

    #[test]
    fn batches_pack_draws() {
        let mut sampler = sampler();
        let (input, target) = sampler.batch(7);
        assert_eq!((input.batch(), input.maps()), (7, 1));
        assert_eq!((input.rows(), input.cols()), (6, 6));
        assert_eq!((target.rows(), target.cols()), (7, 4));
    }
}
