//! MAP-guided seeding support: the external optimizer capability and the
//! Laplace approximation built at its optimum.

use nalgebra::DMatrix;

use crate::model::LogLikelihood;
use crate::priors::Prior;

/// Result of a global optimization run.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimResult {
    /// Best parameter vector found.
    pub argmax: Vec<f64>,
    /// Whether the optimizer converged.
    pub success: bool,
}

/// External global-optimization capability.
///
/// Only used to seed chains near the posterior mode; the sampler falls back
/// to naive seeding whenever `success` is false or the Laplace covariance
/// cannot be formed.
pub trait GlobalOptimizer {
    fn maximize(&self, likelihood: &dyn LogLikelihood, priors: &[Box<dyn Prior>]) -> OptimResult;
}

/// Covariance of the Laplace approximation at `x`: the scaled inverse of the
/// negative numerical Hessian of the log-likelihood. `None` when the Hessian
/// is singular.
pub(crate) fn laplace_covariance(
    likelihood: &dyn LogLikelihood,
    x: &[f64],
    scale: f64,
) -> Option<DMatrix<f64>> {
    let hessian = numerical_hessian(likelihood, x);
    (-hessian).try_inverse().map(|inv| inv * scale)
}

/// Central-difference Hessian, O(D^2) likelihood evaluations.
fn numerical_hessian(f: &dyn LogLikelihood, x: &[f64]) -> DMatrix<f64> {
    let dim = x.len();
    let scale = f64::EPSILON.powf(0.25);
    let steps: Vec<f64> = x.iter().map(|v| scale * v.abs().max(1.0)).collect();
    let f0 = f.log_likelihood(x);
    let mut probe = x.to_vec();
    let mut hessian = DMatrix::<f64>::zeros(dim, dim);

    for i in 0..dim {
        let hi = steps[i];
        probe[i] = x[i] + hi;
        let fp = f.log_likelihood(&probe);
        probe[i] = x[i] - hi;
        let fm = f.log_likelihood(&probe);
        probe[i] = x[i];
        hessian[(i, i)] = (fp - 2.0 * f0 + fm) / (hi * hi);
    }

    for i in 0..dim {
        for j in (i + 1)..dim {
            let (hi, hj) = (steps[i], steps[j]);
            probe[i] = x[i] + hi;
            probe[j] = x[j] + hj;
            let fpp = f.log_likelihood(&probe);
            probe[j] = x[j] - hj;
            let fpm = f.log_likelihood(&probe);
            probe[i] = x[i] - hi;
            let fmm = f.log_likelihood(&probe);
            probe[j] = x[j] + hj;
            let fmp = f.log_likelihood(&probe);
            probe[i] = x[i];
            probe[j] = x[j];
            let value = (fpp - fpm - fmp + fmm) / (4.0 * hi * hj);
            hessian[(i, j)] = value;
            hessian[(j, i)] = value;
        }
    }
    hessian
}
