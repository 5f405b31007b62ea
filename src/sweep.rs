//! Dense sliding-window inference.
//!
//! Every pixel whose input window fits in the padded image gets classified,
//! and because target windows overlap, each canonical pixel collects one
//! probability estimate per window whose target covers it. The per-pixel
//! mean of those estimates is the final probability map.

use dataset::Grid;
use error::{Error, Result};
use label::{self, Region};
use network::Network;
use tensor::Tensor4;
use trainer::Logging;

/// Batch size and reporting for a sweep.
#[derive(Clone, Debug)]
pub struct SweepSettings {
    /// Windows evaluated per network call.
    pub batch_size: usize,
    pub logging: Logging,
}

impl SweepSettings {
    pub fn new() -> Self {
        SweepSettings {
            batch_size: 256,
            logging: Logging::Completion,
        }
    }
}

/// Running per-pixel sums and counts of window predictions.
#[derive(Clone, Debug)]
pub struct ProbabilityAccumulator {
    sums: Grid,
    counts: Grid,
}

impl ProbabilityAccumulator {
    pub fn new(rows: usize, cols: usize) -> Self {
        ProbabilityAccumulator {
            sums: Grid::zeros(rows, cols),
            counts: Grid::zeros(rows, cols),
        }
    }

    pub fn add(&mut self, r: usize, c: usize, probability: f64) {
        self.sums.set(r, c, self.sums.get(r, c) + probability);
        self.counts.set(r, c, self.counts.get(r, c) + 1.0);
    }

    /// Per-pixel mean probability. Pixels no window predicted stay zero.
    pub fn mean(&self) -> Grid {
        Grid::from_fn(self.sums.rows(), self.sums.cols(), |r, c| {
            let count = self.counts.get(r, c);
            if count > 0.0 {
                self.sums.get(r, c) / count
            } else {
                0.0
            }
        })
    }
}

/// Sweeps the trained network over one margin-padded test image and returns
/// the per-pixel mean probability grid at the unpadded canonical size.
pub fn probability_grid(network: &Network,
                        image: &Grid,
                        settings: &SweepSettings)
                        -> Result<Grid> {
    let window = network.settings().input_window;
    let pad = window / 2;
    let padded = image.rows();
    if image.cols() != padded {
        return Err(Error::ShapeMismatch {
            expected: (padded, padded),
            actual: (image.rows(), image.cols()),
        });
    }
    if padded <= window {
        return Err(Error::InvalidSettings("image is not larger than the \
                                           classification window"
            .into()));
    }
    if settings.batch_size == 0 {
        return Err(Error::InvalidSettings("sweep batch size must be positive"
            .into()));
    }

    let canonical = padded - 2 * pad;
    let mut acc = ProbabilityAccumulator::new(canonical, canonical);
    // Every center whose window fits: rows cy - pad .. cy + pad need
    // cy <= padded - pad inclusive.
    let span = padded - 2 * pad + 1;
    let total = span * span;
    let mut done = 0;

    let mut centers = Vec::with_capacity(settings.batch_size);
    for cy in pad..padded - pad + 1 {
        for cx in pad..padded - pad + 1 {
            centers.push((cy, cx));
            if centers.len() == settings.batch_size {
                predict_batch(network, image, &centers, &mut acc)?;
                done += centers.len();
                settings.logging.sweep_progress(done, total);
                centers.clear();
            }
        }
    }
    if !centers.is_empty() {
        predict_batch(network, image, &centers, &mut acc)?;
        done += centers.len();
        settings.logging.sweep_progress(done, total);
    }

    Ok(acc.mean())
}

/// Evaluates one batch of windows and scatters the target predictions into
/// the accumulator, clipping cells that fall outside the canonical area.
fn predict_batch(network: &Network,
                 image: &Grid,
                 centers: &[(usize, usize)],
                 acc: &mut ProbabilityAccumulator)
                 -> Result<()> {
    let window = network.settings().input_window;
    let target = network.settings().target_window;
    let pad = window / 2;
    let half_t = target / 2;
    let canonical = acc.sums.rows();

    let mut input = Tensor4::zeros(centers.len(), 1, window, window);
    for (k, &(cy, cx)) in centers.iter().enumerate() {
        let item = input.item_mut(k);
        for wy in 0..window {
            for wx in 0..window {
                item[wy * window + wx] =
                    image.get(cy - pad + wy, cx - pad + wx);
            }
        }
    }
    let probs = network.predict(&input)?;

    let offset = (pad + half_t) as isize;
    for (k, &(cy, cx)) in centers.iter().enumerate() {
        for ty in 0..target {
            let row = cy as isize + ty as isize - offset;
            if row < 0 || row >= canonical as isize {
                continue;
            }
            for tx in 0..target {
                let col = cx as isize + tx as isize - offset;
                if col < 0 || col >= canonical as isize {
                    continue;
                }
                acc.add(row as usize,
                        col as usize,
                        probs[(k, ty * target + tx)]);
            }
        }
    }
    Ok(())
}

/// Thresholds the probability grid at one half and labels the resulting
/// binary mask into connected regions.
pub fn detect(network: &Network,
              image: &Grid,
              settings: &SweepSettings)
              -> Result<Vec<Region>> {
    let probs = probability_grid(network, image, settings)?;
    let mask = Grid::from_fn(probs.rows(), probs.cols(), |r, c| {
        if probs.get(r, c) >= 0.5 { 1.0 } else { 0.0 }
    });
    Ok(label::connected_components(&mask))
}
