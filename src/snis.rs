//! Self-normalized importance sampling.
//!
//! Not a Markov chain: every draw is independent, so the whole batch fans
//! out over the rayon pool with one derived random stream per draw slot.
//! Draws come either straight from the priors (naive Monte Carlo) or from a
//! caller-supplied multivariate-normal importance distribution; weights are
//! normalized with log-sum-exp and the posterior output is resampled,
//! unweighted, from the weighted empirical CDF.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use crate::config::SamplerConfig;
use crate::error::{ConfigViolation, Result, SamplerError};
use crate::model::LogLikelihood;
use crate::mvn::MultivariateNormal;
use crate::parameters::ParameterSet;
use crate::priors::Prior;

/// Normalizes unnormalized log-weights via log-sum-exp.
///
/// `-inf` and NaN entries get weight zero. Returns `None` when no entry is
/// finite.
pub fn normalize_log_weights(log_weights: &[f64]) -> Option<Vec<f64>> {
    let max = log_weights
        .iter()
        .copied()
        .filter(|w| w.is_finite())
        .fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return None;
    }
    let unnormalized: Vec<f64> = log_weights
        .iter()
        .map(|&w| if w.is_finite() { (w - max).exp() } else { 0.0 })
        .collect();
    let total: f64 = unnormalized.iter().sum();
    Some(unnormalized.into_iter().map(|w| w / total).collect())
}

/// Self-normalized importance sampler.
///
/// With no importance distribution the sampler draws from the priors via
/// their quantile functions and weights by the log-likelihood alone; with
/// one, the unnormalized log-weight of a draw is
/// `log_likelihood - log_importance_pdf`.
pub struct ImportanceSampler {
    config: SamplerConfig,
    priors: Vec<Box<dyn Prior>>,
    likelihood: Box<dyn LogLikelihood>,
    importance: Option<MultivariateNormal>,
    draws: Vec<ParameterSet>,
    output: Vec<ParameterSet>,
    map: Option<ParameterSet>,
}

impl ImportanceSampler {
    pub fn new(
        config: SamplerConfig,
        priors: Vec<Box<dyn Prior>>,
        likelihood: impl LogLikelihood + 'static,
    ) -> Self {
        assert!(!priors.is_empty(), "at least one prior is required");
        Self {
            config,
            priors,
            likelihood: Box::new(likelihood),
            importance: None,
            draws: Vec::new(),
            output: Vec::new(),
            map: None,
        }
    }

    /// Installs an importance distribution (e.g. a Laplace approximation at
    /// the MAP). Without one the sampler falls back to naive Monte Carlo
    /// from the priors.
    pub fn with_importance(mut self, distribution: MultivariateNormal) -> Self {
        self.importance = Some(distribution);
        self
    }

    /// Draws `iterations * number_of_chains` independent samples, normalizes
    /// their weights and resamples `output_length` unweighted posterior
    /// draws.
    ///
    /// Fails with [`SamplerError::Config`] before any likelihood evaluation
    /// on an invalid configuration, and with
    /// [`SamplerError::VanishingWeights`] when every weight is `-inf`.
    pub fn sample(&mut self) -> Result<()> {
        self.validate()?;
        let n = self.config.iterations * self.config.number_of_chains;
        let mut master = SmallRng::seed_from_u64(self.config.seed);
        let seeds: Vec<u64> = (0..n).map(|_| master.gen()).collect();

        // Independent draws; disjoint slots, no shared mutable state.
        self.draws = seeds
            .into_par_iter()
            .map(|seed| self.draw_one(SmallRng::seed_from_u64(seed)))
            .collect();

        let log_weights: Vec<f64> = self.draws.iter().map(|d| d.weight).collect();
        let weights =
            normalize_log_weights(&log_weights).ok_or(SamplerError::VanishingWeights)?;

        let mut cumulative = Vec::with_capacity(weights.len());
        let mut total = 0.0;
        for w in &weights {
            total += w;
            cumulative.push(total);
        }

        self.output = (0..self.config.output_length)
            .map(|_| {
                let u = master.gen::<f64>() * total;
                let mut index = cumulative.partition_point(|&c| c <= u);
                index = index.min(cumulative.len() - 1);
                // Never land on a zero-weight slot, even at float edges.
                while index > 0 && cumulative[index] == cumulative[index - 1] {
                    index -= 1;
                }
                ParameterSet::new(self.draws[index].values.clone(), self.draws[index].fitness)
            })
            .collect();

        self.map = self
            .draws
            .iter()
            .filter(|d| d.fitness.is_finite())
            .max_by(|a, b| a.compare_fitness(b))
            .cloned();
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        let mut violations = self.config.violations();
        if let Some(importance) = &self.importance {
            if importance.dim() != self.priors.len() {
                violations.push(ConfigViolation::ProposalDimension {
                    expected: self.priors.len(),
                    rows: importance.dim(),
                    cols: importance.dim(),
                });
            }
        }
        if violations.is_empty() {
            Ok(())
        } else {
            Err(SamplerError::Config(violations))
        }
    }

    fn draw_one(&self, mut rng: SmallRng) -> ParameterSet {
        match &self.importance {
            None => {
                let theta: Vec<f64> = self
                    .priors
                    .iter()
                    .map(|prior| prior.inverse_cdf(rng.gen::<f64>()))
                    .collect();
                let fitness = self.likelihood.log_likelihood(&theta);
                ParameterSet::new(theta, fitness)
            }
            Some(importance) => {
                let theta = importance.sample(&mut rng);
                let feasible = theta
                    .iter()
                    .zip(self.priors.iter())
                    .all(|(&x, prior)| prior.contains(x));
                if !feasible {
                    return ParameterSet::with_weight(
                        theta,
                        f64::NEG_INFINITY,
                        f64::NEG_INFINITY,
                    );
                }
                let fitness = self.likelihood.log_likelihood(&theta);
                let weight = fitness - importance.log_pdf(&theta);
                ParameterSet::with_weight(theta, fitness, weight)
            }
        }
    }

    /// Raw weighted draws from the last run.
    pub fn draws(&self) -> &[ParameterSet] {
        &self.draws
    }

    /// Unweighted posterior draws resampled from the weighted empirical CDF.
    pub fn output(&self) -> &[ParameterSet] {
        &self.output
    }

    /// Best-fitness draw of the last run.
    pub fn map(&self) -> Option<&ParameterSet> {
        self.map.as_ref()
    }
}
