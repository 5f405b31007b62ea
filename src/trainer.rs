//! Fixed-budget training driver.

use error::{Error, Result};
use network::Network;
use sampler::TrainingSampler;

use rand::Rng;

/// Logging frequency to use during training and sweeping.
#[derive(Copy, Clone, Debug)]
pub enum Logging {
    /// No logs will be printed
    Silent,
    /// A summary will be printed at completion
    Completion,
    /// A progress line will be printed after every `n` units of work
    Iterations(usize),
}

impl Logging {
    /// Performs logging at the current training `step`.
    pub fn step(&self, step: usize, loss: f64) {
        if let &Logging::Iterations(freq) = self {
            if freq > 0 && step % freq == 0 {
                println!("step {} loss: {}", step, loss);
            }
        }
    }

    /// Performs logging at the end of training.
    pub fn completion(&self, steps: usize, loss: f64) {
        if let &Logging::Silent = self {
            return;
        }
        println!("Training completed after {} steps.", steps);
        println!("Final loss: {}", loss);
    }

    /// Announces the start of one test-image sweep.
    pub fn sweep_image(&self, index: usize, total: usize) {
        if let &Logging::Silent = self {
            return;
        }
        println!("predicting test image {} of {}", index + 1, total);
    }

    /// Performs logging partway through a sweep.
    pub fn sweep_progress(&self, windows: usize, total: usize) {
        if let &Logging::Iterations(freq) = self {
            if freq > 0 && windows % freq == 0 {
                println!("analyzed {} of {} windows", windows, total);
            }
        }
    }
}

/// Runs the fixed training loop: a balanced batch per step, one network
/// update per batch, no convergence check. The step count is a budget, not
/// an adaptive criterion.
#[derive(Debug)]
pub struct Trainer {
    steps: usize,
    batch_size: usize,
    logging: Logging,
}

impl Trainer {
    /// Creates a new Trainer instance.
    ///
    /// The trainer defaults to 10,000 steps of 100-example batches, logging
    /// on completion.
    pub fn new() -> Self {
        Trainer {
            steps: 10_000,
            batch_size: 100,
            logging: Logging::Completion,
        }
    }

    /// Sets the number of training steps.
    pub fn steps(mut self, steps: usize) -> Self {
        self.steps = steps;
        self
    }

    /// Sets the number of window pairs per batch.
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Sets the type of logging to be emitted during training.
    pub fn logging(mut self, logging: Logging) -> Self {
        self.logging = logging;
        self
    }

    /// Trains `network` on batches drawn from `sampler`, returning the final
    /// batch loss.
    pub fn run<R: Rng>(&self,
                       network: &mut Network,
                       sampler: &mut TrainingSampler<R>)
                       -> Result<f64> {
        if self.steps == 0 || self.batch_size == 0 {
            return Err(Error::InvalidSettings("steps and batch size must be \
                                               positive"
                .into()));
        }
        let mut loss = 0.0;
        for step in 1..self.steps + 1 {
            let (input, target) = sampler.batch(self.batch_size);
            loss = network.train(&input, &target)?;
            self.logging.step(step, loss);
        }
        self.logging.completion(self.steps, loss);
        Ok(loss)
    }
}
