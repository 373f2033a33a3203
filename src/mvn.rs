//! Multivariate normal sampling and density evaluation.

use nalgebra::{Cholesky, DMatrix, DVector};
use rand::Rng;
use rand_distr::StandardNormal;

/// A multivariate normal held as its mean and lower Cholesky factor.
///
/// Used both as the Laplace approximation for MAP-guided chain seeding and
/// as an importance distribution for self-normalized importance sampling.
#[derive(Debug, Clone, PartialEq)]
pub struct MultivariateNormal {
    mean: DVector<f64>,
    lower: DMatrix<f64>,
    log_norm: f64,
}

impl MultivariateNormal {
    /// Builds the distribution from a mean and covariance. Returns `None`
    /// when the dimensions mismatch or the covariance is not positive
    /// definite.
    pub fn from_mean_cov(mean: DVector<f64>, cov: DMatrix<f64>) -> Option<Self> {
        if mean.len() != cov.nrows() || cov.nrows() != cov.ncols() {
            return None;
        }
        let chol = Cholesky::new(cov)?;
        let lower = chol.l();
        let d = mean.len() as f64;
        let log_det = 2.0 * lower.diagonal().iter().map(|v| v.ln()).sum::<f64>();
        let log_norm = -0.5 * (d * (2.0 * std::f64::consts::PI).ln() + log_det);
        Some(Self {
            mean,
            lower,
            log_norm,
        })
    }

    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    pub fn mean(&self) -> &DVector<f64> {
        &self.mean
    }

    /// Draws `mean + L z` with `z` standard normal.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> Vec<f64> {
        let z = DVector::from_iterator(
            self.dim(),
            (0..self.dim()).map(|_| rng.sample::<f64, _>(StandardNormal)),
        );
        let x = &self.mean + &self.lower * z;
        x.iter().copied().collect()
    }

    /// Normalized log-density at `x`.
    pub fn log_pdf(&self, x: &[f64]) -> f64 {
        let diff = DVector::from_column_slice(x) - &self.mean;
        // Quadratic form via a forward solve against the Cholesky factor.
        match self.lower.solve_lower_triangular(&diff) {
            Some(y) => self.log_norm - 0.5 * y.norm_squared(),
            None => f64::NEG_INFINITY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    #[test]
    fn rejects_non_positive_definite() {
        let cov = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 1.0]);
        assert!(MultivariateNormal::from_mean_cov(DVector::zeros(2), cov).is_none());
    }

    #[test]
    fn log_pdf_matches_univariate_formula() {
        let cov = DMatrix::from_row_slice(1, 1, &[4.0]);
        let mvn = MultivariateNormal::from_mean_cov(DVector::from_vec(vec![1.0]), cov).unwrap();
        // N(1, 4) at x = 3: -0.5*ln(2 pi * 4) - (3-1)^2 / (2*4)
        let expected = -0.5 * (2.0 * std::f64::consts::PI * 4.0).ln() - 0.5;
        assert!((mvn.log_pdf(&[3.0]) - expected).abs() < 1e-12);
    }

    #[test]
    fn samples_track_mean_and_spread() {
        let cov = DMatrix::from_row_slice(2, 2, &[2.0, 0.5, 0.5, 1.0]);
        let mvn =
            MultivariateNormal::from_mean_cov(DVector::from_vec(vec![-3.0, 7.0]), cov).unwrap();
        let mut rng = SmallRng::seed_from_u64(3);
        let n = 20_000;
        let mut sums = [0.0f64; 2];
        for _ in 0..n {
            let x = mvn.sample(&mut rng);
            sums[0] += x[0];
            sums[1] += x[1];
        }
        assert!((sums[0] / n as f64 + 3.0).abs() < 0.05);
        assert!((sums[1] / n as f64 - 7.0).abs() < 0.05);
    }
}
