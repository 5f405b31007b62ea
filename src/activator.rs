//! Activation function types.

/// [Activation function](https://en.wikipedia.org/wiki/Activation_function)
/// types.
#[derive(Copy, Clone, Debug, Serialize, Deserialize)]
pub enum Activator {
    /// Exponential Linear Unit
    Elu,
    /// Sigmoid function
    Sigmoid,
}

impl Activator {
    /// Evaluates `f(x)` for the selected the activation function.
    pub fn f(&self, x: f64) -> f64 {
        match self {
            &Activator::Elu => if x > 0.0 { x } else { x.exp() - 1.0 },
            &Activator::Sigmoid => 1.0 / (1.0 + (-x).exp()),
        }
    }

    /// Evaluates the derivative `f'(x)`, where `x = f^{-1}(y)`.
    ///
    /// Note that this function takes in the *output* of the activation
    /// function, rather than the input. This is an optimization that means we
    /// don't have to store the intermediate results before activation.
    pub fn fprime(&self, y: f64) -> f64 {
        match self {
            &Activator::Elu => if y > 0.0 { 1.0 } else { y + 1.0 },
            &Activator::Sigmoid => y * (1.0 - y),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numeric_derivative(a: Activator, x: f64) -> f64 {
        let h = 1e-6;
        (a.f(x + h) - a.f(x - h)) / (2.0 * h)
    }

    #[test]
    fn elu_values() {
        assert_eq!(Activator::Elu.f(2.0), 2.0);
        assert!((Activator::Elu.f(-1.0) - ((-1.0f64).exp() - 1.0)).abs() <
                1e-12);
    }

    #[test]
    fn sigmoid_stays_in_unit_interval() {
        for &x in &[-50.0, -1.0, 0.0, 1.0, 50.0] {
            let y = Activator::Sigmoid.f(x);
            assert!(y > 0.0 && y < 1.0);
        }
        assert!((Activator::Sigmoid.f(0.0) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn fprime_matches_numeric_derivative() {
        for &a in &[Activator::Elu, Activator::Sigmoid] {
            for &x in &[-1.5, -0.3, 0.4, 2.0] {
                let y = a.f(x);
                let expected = numeric_derivative(a, x);
                assert!((a.fprime(y) - expected).abs() < 1e-5,
                        "bad derivative at {}",
                        x);
            }
        }
    }
}
