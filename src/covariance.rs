//! Streaming covariance estimation for adaptive proposals.

use nalgebra::{DMatrix, DVector};

/// Online covariance accumulator.
///
/// Keeps a running mean and scatter matrix (sum of outer products of
/// deviations) and updates both with a single numerically stable
/// Welford-style pass per pushed vector, O(D^2) each. The sample covariance
/// is `scatter / (n - 1)`. The accumulator is never reset within a run.
///
/// # Examples
///
/// ```rust
/// use bayesim::covariance::RunningCovarianceMatrix;
///
/// let mut cov = RunningCovarianceMatrix::new(2);
/// cov.push(&[1.0, 2.0]);
/// cov.push(&[3.0, 4.0]);
/// let c = cov.covariance().unwrap();
/// assert!((c[(0, 0)] - 2.0).abs() < 1e-12);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RunningCovarianceMatrix {
    n: u64,
    mean: DVector<f64>,
    scatter: DMatrix<f64>,
}

impl RunningCovarianceMatrix {
    pub fn new(dim: usize) -> Self {
        Self {
            n: 0,
            mean: DVector::zeros(dim),
            scatter: DMatrix::zeros(dim, dim),
        }
    }

    /// Dimensionality of the accumulated vectors.
    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    /// Number of vectors pushed so far.
    pub fn len(&self) -> u64 {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    /// Folds `x` into the running mean and scatter matrix.
    pub fn push(&mut self, x: &[f64]) {
        assert_eq!(
            x.len(),
            self.mean.len(),
            "pushed vector has wrong dimension"
        );
        self.n += 1;
        let n = self.n as f64;
        let x = DVector::from_column_slice(x);
        let delta = &x - &self.mean;
        self.mean += &delta / n;
        let delta_post = &x - &self.mean;
        // Rank-1 update: scatter += (x - mean_old) (x - mean_new)^T.
        self.scatter += &delta * delta_post.transpose();
    }

    /// Current running mean.
    pub fn mean(&self) -> &DVector<f64> {
        &self.mean
    }

    /// Sample covariance `scatter / (n - 1)`; `None` until two vectors have
    /// been pushed.
    pub fn covariance(&self) -> Option<DMatrix<f64>> {
        if self.n < 2 {
            return None;
        }
        Some(&self.scatter / (self.n as f64 - 1.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::seq::SliceRandom;
    use rand::{Rng, SeedableRng};

    /// Direct two-pass sample covariance, for comparison.
    fn batch_covariance(data: &[Vec<f64>]) -> DMatrix<f64> {
        let n = data.len() as f64;
        let dim = data[0].len();
        let mut mean = DVector::<f64>::zeros(dim);
        for x in data {
            mean += DVector::from_column_slice(x);
        }
        mean /= n;
        let mut scatter = DMatrix::<f64>::zeros(dim, dim);
        for x in data {
            let d = DVector::from_column_slice(x) - &mean;
            scatter += &d * d.transpose();
        }
        scatter / (n - 1.0)
    }

    #[test]
    fn matches_batch_covariance() {
        let mut rng = SmallRng::seed_from_u64(7);
        let data: Vec<Vec<f64>> = (0..500)
            .map(|_| (0..3).map(|_| rng.gen_range(-2.0..2.0)).collect())
            .collect();

        let mut running = RunningCovarianceMatrix::new(3);
        for x in &data {
            running.push(x);
        }
        let streamed = running.covariance().unwrap();
        let batch = batch_covariance(&data);
        for i in 0..3 {
            for j in 0..3 {
                assert!(
                    (streamed[(i, j)] - batch[(i, j)]).abs() < 1e-10,
                    "entry ({i},{j}) differs: {} vs {}",
                    streamed[(i, j)],
                    batch[(i, j)]
                );
            }
        }
    }

    #[test]
    fn push_order_invariance() {
        let mut rng = SmallRng::seed_from_u64(11);
        let data: Vec<Vec<f64>> = (0..200)
            .map(|_| (0..4).map(|_| rng.gen_range(-5.0..5.0)).collect())
            .collect();
        let mut shuffled = data.clone();
        shuffled.shuffle(&mut rng);

        let mut a = RunningCovarianceMatrix::new(4);
        let mut b = RunningCovarianceMatrix::new(4);
        data.iter().for_each(|x| a.push(x));
        shuffled.iter().for_each(|x| b.push(x));

        let ca = a.covariance().unwrap();
        let cb = b.covariance().unwrap();
        for i in 0..4 {
            for j in 0..4 {
                assert!(
                    (ca[(i, j)] - cb[(i, j)]).abs() < 1e-9,
                    "order-dependent covariance at ({i},{j})"
                );
            }
        }
    }

    #[test]
    fn needs_two_samples() {
        let mut cov = RunningCovarianceMatrix::new(2);
        assert!(cov.covariance().is_none());
        cov.push(&[1.0, 1.0]);
        assert!(cov.covariance().is_none());
        cov.push(&[2.0, 0.0]);
        assert!(cov.covariance().is_some());
        assert_eq!(cov.len(), 2);
    }
}
