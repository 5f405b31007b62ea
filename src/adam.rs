//! Adam gradient updates.
//!
//! In the moment recurrences here, `b1` and `b2` weight the *new* gradient,
//! so the old moments decay by `1 - b1` and `1 - b2`. This is the transpose
//! of the textbook parameterization, and the default values (`b1 = 0.1`,
//! `b2 = 0.01`) are chosen for it.

use utils::ZeroOut;

const DEFAULT_LEARNING_RATE: f64 = 0.0002;
const DEFAULT_B1: f64 = 0.1;
const DEFAULT_B2: f64 = 0.01;
const DEFAULT_EPSILON: f64 = 1e-8;

/// Per-parameter first and second moment estimates.
#[derive(Debug)]
struct Moments {
    m: Vec<f64>,
    v: Vec<f64>,
}

/// Adam optimizer over a fixed set of registered parameter tensors.
#[derive(Debug)]
pub struct Adam {
    learning_rate: f64,
    b1: f64,
    b2: f64,
    epsilon: f64,
    step: usize,
    slots: Vec<Moments>,
}

impl Adam {
    pub fn new() -> Self {
        Adam::with_learning_rate(DEFAULT_LEARNING_RATE)
    }

    /// The default moment decays with a custom learning rate.
    pub fn with_learning_rate(learning_rate: f64) -> Self {
        Adam::with_hyperparameters(learning_rate,
                                   DEFAULT_B1,
                                   DEFAULT_B2,
                                   DEFAULT_EPSILON)
    }

    pub fn with_hyperparameters(learning_rate: f64,
                                b1: f64,
                                b2: f64,
                                epsilon: f64)
                                -> Self {
        Adam {
            learning_rate: learning_rate,
            b1: b1,
            b2: b2,
            epsilon: epsilon,
            step: 0,
            slots: Vec::new(),
        }
    }

    /// Registers a parameter tensor of `len` elements, returning its slot
    /// index. Moments start at zero.
    pub fn register(&mut self, len: usize) -> usize {
        self.slots.push(Moments {
            m: vec![0.0; len],
            v: vec![0.0; len],
        });
        self.slots.len() - 1
    }

    /// The number of completed optimization steps.
    pub fn step_count(&self) -> usize {
        self.step
    }

    /// Applies one optimization step to every registered parameter.
    ///
    /// `params` pairs each parameter slice with its gradient, in slot order;
    /// all slots must be presented so the shared step counter advances once
    /// for the whole network.
    pub fn step(&mut self, params: &mut [(&mut [f64], &[f64])]) {
        assert_eq!(params.len(), self.slots.len());
        self.step += 1;
        let t = self.step as f64;
        let fix1 = 1.0 - (1.0 - self.b1).powf(t);
        let fix2 = 1.0 - (1.0 - self.b2).powf(t);
        let lr_t = self.learning_rate * (fix2.sqrt() / fix1);
        for (slot, &mut (ref mut p, g)) in
            self.slots.iter_mut().zip(params.iter_mut()) {
            assert_eq!(p.len(), slot.m.len());
            assert_eq!(g.len(), slot.m.len());
            for i in 0..p.len() {
                let m_t = self.b1 * g[i] + (1.0 - self.b1) * slot.m[i];
                let v_t = self.b2 * g[i] * g[i] + (1.0 - self.b2) * slot.v[i];
                let g_t = m_t / (v_t.sqrt() + self.epsilon);
                slot.m[i] = m_t;
                slot.v[i] = v_t;
                p[i] -= lr_t * g_t;
            }
        }
    }

    /// Resets the step counter and all moment buffers.
    pub fn reset(&mut self) {
        self.step = 0;
        for slot in &mut self.slots {
            slot.m.zero_out();
            slot.v.zero_out();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_gradients_leave_parameters_unchanged() {
        let mut adam = Adam::new();
        adam.register(3);
        let mut p = vec![1.0, -2.0, 0.5];
        let g = vec![0.0; 3];
        {
            let mut pairs = [(&mut p[..], &g[..])];
            adam.step(&mut pairs);
        }
        assert_eq!(p, vec![1.0, -2.0, 0.5]);
        assert_eq!(adam.step_count(), 1);
    }

    #[test]
    fn first_step_matches_hand_computation() {
        let mut adam = Adam::new();
        adam.register(1);
        let mut p = vec![1.0];
        let g = vec![1.0];
        {
            let mut pairs = [(&mut p[..], &g[..])];
            adam.step(&mut pairs);
        }
        // fix1 = b1, fix2 = b2, so lr_t = lr * sqrt(b2)/b1 = lr, and
        // m/(sqrt(v) + eps) is within eps of 1.
        let expected = 1.0 - 0.0002 * (0.1 / (0.01f64.sqrt() + 1e-8));
        assert!((p[0] - expected).abs() < 1e-12);
    }

    #[test]
    fn shared_counter_advances_once_per_step() {
        let mut adam = Adam::new();
        adam.register(1);
        adam.register(2);
        let mut a = vec![0.0];
        let mut b = vec![0.0, 0.0];
        let ga = vec![1.0];
        let gb = vec![1.0, 1.0];
        for _ in 0..3 {
            let mut pairs = [(&mut a[..], &ga[..]), (&mut b[..], &gb[..])];
            adam.step(&mut pairs);
        }
        assert_eq!(adam.step_count(), 3);
        adam.reset();
        assert_eq!(adam.step_count(), 0);
    }
}
