//! Random-walk Metropolis–Hastings with fixed or adaptive proposal
//! covariance.
//!
//! The fixed variant takes one proposal covariance for the whole run. The
//! adaptive variant blends, per chain, a small fixed identity-scaled kernel
//! (used early and, with probability `beta`, forever after), the chain's own
//! streaming covariance under the `2.38^2 / D` optimal scaling, and — with a
//! configurable crossover probability — another chain's scaled covariance.
//! Proposals are symmetric, so no Hastings correction enters the test.

use nalgebra::{Cholesky, DMatrix, DVector};
use rand::Rng;
use rand_distr::StandardNormal;

use crate::config::SamplerConfig;
use crate::error::ConfigViolation;
use crate::parameters::ParameterSet;
use crate::sampler::{
    metropolis_accept, optimal_proposal_scale, ChainAlgorithm, ChainState, StepContext,
};

/// Samples pushed per dimension before a chain trusts its own covariance.
const ADAPTATION_THRESHOLD_PER_DIM: u64 = 100;

/// Standard deviation of the fixed anti-degeneracy kernel; the per-coordinate
/// variance is `0.1^2 / D`.
fn fixed_kernel_sigma(dim: usize) -> f64 {
    0.1 / (dim as f64).sqrt()
}

/// `current + L z` with `z` standard normal.
fn correlated_step<R: Rng>(current: &[f64], lower: &DMatrix<f64>, rng: &mut R) -> Vec<f64> {
    let z = DVector::from_iterator(
        current.len(),
        (0..current.len()).map(|_| rng.sample::<f64, _>(StandardNormal)),
    );
    let step = lower * z;
    current
        .iter()
        .zip(step.iter())
        .map(|(x, s)| x + s)
        .collect()
}

fn isotropic_step<R: Rng>(current: &[f64], sigma: f64, rng: &mut R) -> Vec<f64> {
    current
        .iter()
        .map(|x| x + sigma * rng.sample::<f64, _>(StandardNormal))
        .collect()
}

/// Shared accept/reject tail of both variants: feasibility first (an
/// out-of-support coordinate rejects without touching the likelihood), then
/// the log-space Metropolis test.
fn accept_or_reject(chain: &mut ChainState, ctx: &StepContext<'_>, proposal: Vec<f64>) {
    if !ctx.in_support(&proposal) {
        return;
    }
    let fitness = ctx.likelihood.log_likelihood(&proposal);
    if metropolis_accept(&mut chain.rng, fitness - chain.current.fitness) {
        chain.current = ParameterSet::new(proposal, fitness);
        chain.accept_count += 1;
    }
}

/// Fixed-covariance Gaussian random walk.
pub struct RandomWalkMetropolis {
    covariance: DMatrix<f64>,
    lower: Option<DMatrix<f64>>,
}

impl RandomWalkMetropolis {
    pub fn new(covariance: DMatrix<f64>) -> Self {
        let lower = Cholesky::new(covariance.clone()).map(|chol| chol.l());
        Self { covariance, lower }
    }

    /// Isotropic kernel with standard deviation `sigma` per coordinate.
    pub fn isotropic(dim: usize, sigma: f64) -> Self {
        Self::new(DMatrix::identity(dim, dim) * (sigma * sigma))
    }
}

impl ChainAlgorithm for RandomWalkMetropolis {
    fn chain_iteration(&self, chain: &mut ChainState, ctx: &StepContext<'_>) {
        chain.sample_count += 1;
        let lower = match &self.lower {
            Some(lower) => lower,
            None => return,
        };
        let proposal = correlated_step(&chain.current.values, lower, &mut chain.rng);
        accept_or_reject(chain, ctx, proposal);
    }

    fn validate(&self, dim: usize, _config: &SamplerConfig) -> Vec<ConfigViolation> {
        let mut violations = Vec::new();
        if self.covariance.nrows() != dim || self.covariance.ncols() != dim {
            violations.push(ConfigViolation::ProposalDimension {
                expected: dim,
                rows: self.covariance.nrows(),
                cols: self.covariance.ncols(),
            });
        } else if self.lower.is_none() {
            violations.push(ConfigViolation::ProposalNotPositiveDefinite);
        }
        violations
    }
}

/// Adaptive random-walk Metropolis.
#[derive(Debug, Clone, PartialEq)]
pub struct AdaptiveMetropolis {
    /// Probability of borrowing another chain's scaled covariance for one
    /// proposal.
    pub crossover_probability: f64,
    /// Probability of falling back to the fixed kernel after adaptation has
    /// started.
    pub beta: f64,
}

impl Default for AdaptiveMetropolis {
    fn default() -> Self {
        Self {
            crossover_probability: 0.1,
            beta: 0.05,
        }
    }
}

impl AdaptiveMetropolis {
    pub fn new(crossover_probability: f64) -> Self {
        Self {
            crossover_probability,
            ..Self::default()
        }
    }

    /// Picks this iteration's proposal covariance source and draws from it.
    fn propose(&self, chain: &mut ChainState, ctx: &StepContext<'_>) -> Vec<f64> {
        let dim = ctx.dim();
        let threshold = ADAPTATION_THRESHOLD_PER_DIM * dim as u64;
        if chain.covariance.len() < threshold || chain.rng.gen::<f64>() < self.beta {
            return isotropic_step(
                &chain.current.values,
                fixed_kernel_sigma(dim),
                &mut chain.rng,
            );
        }

        let borrowed = if ctx.peers.len() > 1
            && chain.rng.gen::<f64>() < self.crossover_probability
        {
            let mut peer = chain.rng.gen_range(0..ctx.peers.len() - 1);
            if peer >= chain.index {
                peer += 1;
            }
            ctx.peers[peer].covariance.clone()
        } else {
            None
        };
        let covariance = borrowed.or_else(|| chain.covariance.covariance());
        let scaled = covariance.map(|c| c * optimal_proposal_scale(dim));
        match scaled.and_then(Cholesky::new) {
            Some(chol) => correlated_step(&chain.current.values, &chol.l(), &mut chain.rng),
            // Degenerate estimate: fall back to the fixed kernel.
            None => isotropic_step(
                &chain.current.values,
                fixed_kernel_sigma(dim),
                &mut chain.rng,
            ),
        }
    }
}

impl ChainAlgorithm for AdaptiveMetropolis {
    fn chain_iteration(&self, chain: &mut ChainState, ctx: &StepContext<'_>) {
        chain.sample_count += 1;
        let proposal = self.propose(chain, ctx);
        accept_or_reject(chain, ctx, proposal);
        // The streaming covariance sees the post-decision state; on any
        // rejection that is the unchanged current state.
        if ctx.adapt {
            chain.covariance.push(&chain.current.values);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SamplerConfig;
    use crate::priors::{Prior, UniformPrior};
    use crate::sampler::Sampler;

    fn standard_priors(dim: usize) -> Vec<Box<dyn Prior>> {
        (0..dim)
            .map(|_| Box::new(UniformPrior::new(-10.0, 10.0)) as Box<dyn Prior>)
            .collect()
    }

    #[test]
    fn fixed_variant_reports_dimension_mismatch() {
        let algorithm = RandomWalkMetropolis::isotropic(2, 0.5);
        let violations = algorithm.validate(3, &SamplerConfig::default());
        assert_eq!(
            violations,
            vec![ConfigViolation::ProposalDimension {
                expected: 3,
                rows: 2,
                cols: 2,
            }]
        );
    }

    #[test]
    fn fixed_variant_reports_indefinite_covariance() {
        let cov = DMatrix::from_row_slice(2, 2, &[1.0, 3.0, 3.0, 1.0]);
        let algorithm = RandomWalkMetropolis::new(cov);
        let violations = algorithm.validate(2, &SamplerConfig::default());
        assert_eq!(violations, vec![ConfigViolation::ProposalNotPositiveDefinite]);
    }

    #[test]
    fn infeasible_proposals_reject_without_likelihood_calls() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        // The chain starts at the support edge with a huge kernel, so most
        // proposals land outside and must not reach the likelihood.
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let likelihood = move |_theta: &[f64]| {
            counter.fetch_add(1, Ordering::Relaxed);
            0.0
        };
        let config = SamplerConfig {
            number_of_chains: 1,
            iterations: 100,
            warmup_iterations: 50,
            initial_population_length: 1,
            output_length: 100,
            ..SamplerConfig::default()
        };
        let priors: Vec<Box<dyn Prior>> =
            vec![Box::new(UniformPrior::new(0.0, 1e-6)) as Box<dyn Prior>];
        let mut sampler = Sampler::new(
            config,
            priors,
            likelihood,
            RandomWalkMetropolis::isotropic(1, 1e3),
        );
        sampler.sample(false, false).unwrap();
        let chain = &sampler.chains()[0];
        // Initialization evaluates the pool; almost every proposal after
        // that is infeasible, so likelihood calls stay far below the
        // proposal count.
        assert!(chain.sample_count == 200);
        assert!(calls.load(Ordering::Relaxed) < 50);
        assert_eq!(chain.accept_count, 0);
    }

    #[test]
    fn adaptive_covariance_grows_during_warmup_only_until_output() {
        let config = SamplerConfig {
            number_of_chains: 2,
            iterations: 150,
            warmup_iterations: 50,
            initial_population_length: 10,
            output_length: 100,
            ..SamplerConfig::default()
        };
        let priors = standard_priors(2);
        let likelihood = |theta: &[f64]| -0.5 * theta.iter().map(|x| x * x).sum::<f64>();
        let mut sampler = Sampler::new(config, priors, likelihood, AdaptiveMetropolis::default());
        sampler.sample(false, false).unwrap();
        // Pushed once per inner iteration through warming + sampling, then
        // frozen for the 50 output steps.
        assert_eq!(sampler.chains()[0].covariance.len(), 150);
    }
}
