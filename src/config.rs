//! Run-shape configuration shared by every sampling algorithm.

use crate::error::{ConfigViolation, Result, SamplerError};

/// Configuration of a sampling run.
///
/// Every constraint is checked up front by [`SamplerConfig::validate`];
/// violations are collected, never clamped or silently defaulted.
///
/// # Examples
///
/// ```rust
/// use bayesim::config::SamplerConfig;
///
/// let config = SamplerConfig {
///     number_of_chains: 4,
///     iterations: 2000,
///     warmup_iterations: 1000,
///     ..SamplerConfig::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct SamplerConfig {
    /// Number of parallel chains, at least 1.
    pub number_of_chains: usize,
    /// Outer sampling steps (warm-up included), at least 100.
    pub iterations: usize,
    /// Warm-up steps, in `1..=iterations / 2`.
    pub warmup_iterations: usize,
    /// Inner chain iterations per recorded outer step, at least 1.
    pub thinning_interval: usize,
    /// Size of the initial candidate pool, at least `number_of_chains`.
    pub initial_population_length: usize,
    /// Posterior draws to collect after the sampling phase, at least 100.
    pub output_length: usize,
    /// Master seed every chain stream is derived from.
    pub seed: u64,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            number_of_chains: 4,
            iterations: 1000,
            warmup_iterations: 500,
            thinning_interval: 1,
            initial_population_length: 100,
            output_length: 1000,
            seed: 42,
        }
    }
}

impl SamplerConfig {
    /// Checks every constraint, returning one violation per failure.
    pub fn validate(&self) -> Result<()> {
        let violations = self.violations();
        if violations.is_empty() {
            Ok(())
        } else {
            Err(SamplerError::Config(violations))
        }
    }

    pub(crate) fn violations(&self) -> Vec<ConfigViolation> {
        let mut violations = Vec::new();
        if self.number_of_chains < 1 {
            violations.push(ConfigViolation::ChainCount {
                got: self.number_of_chains,
            });
        }
        if self.iterations < 100 {
            violations.push(ConfigViolation::Iterations {
                got: self.iterations,
            });
        }
        let warmup_max = self.iterations / 2;
        if self.warmup_iterations < 1 || self.warmup_iterations > warmup_max {
            violations.push(ConfigViolation::WarmupIterations {
                got: self.warmup_iterations,
                max: warmup_max,
            });
        }
        if self.thinning_interval < 1 {
            violations.push(ConfigViolation::ThinningInterval {
                got: self.thinning_interval,
            });
        }
        if self.initial_population_length < self.number_of_chains {
            violations.push(ConfigViolation::PopulationLength {
                got: self.initial_population_length,
                min: self.number_of_chains,
            });
        }
        if self.output_length < 100 {
            violations.push(ConfigViolation::OutputLength {
                got: self.output_length,
            });
        }
        violations
    }

    /// Outer steps in a full run: the sampling iterations plus however many
    /// barrier steps all chains together need to fill the output.
    pub(crate) fn total_steps(&self) -> usize {
        self.iterations + self.output_length.div_ceil(self.number_of_chains.max(1))
    }
}
