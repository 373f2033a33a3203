//! The log-likelihood seam between caller models and the samplers.

/// Caller-supplied log-likelihood.
///
/// `log_likelihood` returns the log-density up to an additive constant.
/// Returning `-inf` marks a zero-likelihood point; a NaN is treated by every
/// acceptance test as an always-losing fitness. A panic inside the
/// implementation propagates to the caller uncaught.
///
/// The trait has a blanket implementation for closures, so a plain
/// `|theta: &[f64]| ...` can be handed to any sampler.
pub trait LogLikelihood: Send + Sync {
    fn log_likelihood(&self, theta: &[f64]) -> f64;

    /// Analytic gradient of the log-likelihood, if the model has one.
    /// Hamiltonian sampling falls back to [`numerical_gradient`] when this
    /// returns `None`.
    fn gradient(&self, theta: &[f64]) -> Option<Vec<f64>> {
        let _ = theta;
        None
    }
}

impl<F> LogLikelihood for F
where
    F: Fn(&[f64]) -> f64 + Send + Sync,
{
    fn log_likelihood(&self, theta: &[f64]) -> f64 {
        self(theta)
    }
}

/// Central-difference gradient of the log-likelihood at `x`.
///
/// Step per coordinate: `cbrt(eps) * max(1, |x_j|)`.
pub fn numerical_gradient(f: &dyn LogLikelihood, x: &[f64]) -> Vec<f64> {
    let scale = f64::EPSILON.cbrt();
    let mut grad = vec![0.0; x.len()];
    let mut probe = x.to_vec();
    for j in 0..x.len() {
        let h = scale * x[j].abs().max(1.0);
        let orig = probe[j];
        probe[j] = orig + h;
        let fp = f.log_likelihood(&probe);
        probe[j] = orig - h;
        let fm = f.log_likelihood(&probe);
        probe[j] = orig;
        grad[j] = (fp - fm) / (2.0 * h);
    }
    grad
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closure_implements_trait() {
        let model = |theta: &[f64]| -theta.iter().map(|x| x * x).sum::<f64>();
        assert_eq!(model.log_likelihood(&[0.0, 0.0]), 0.0);
        assert!(model.gradient(&[1.0, 1.0]).is_none());
    }

    #[test]
    fn numerical_gradient_matches_analytic() {
        // logL = -0.5 * sum((x - 3)^2), gradient = -(x - 3)
        let model = |theta: &[f64]| -0.5 * theta.iter().map(|x| (x - 3.0).powi(2)).sum::<f64>();
        let x = [1.0, 3.0, 5.5];
        let grad = numerical_gradient(&model, &x);
        let expected = [2.0, 0.0, -2.5];
        for (g, e) in grad.iter().zip(expected.iter()) {
            assert!((g - e).abs() < 1e-6, "got {g}, expected {e}");
        }
    }
}
