/*!
# bayesim

Bayesian posterior sampling via Markov Chain Monte Carlo and importance
sampling. The crate provides several interacting chain-update algorithms —
random-walk Metropolis (fixed and adaptive), differential-evolution MC with
snooker updates, Hamiltonian Monte Carlo — behind one orchestrator that runs
chains in parallel under a per-step barrier, plus a self-normalized
importance sampler for independent draws.

## Overview

- Configure priors (anything implementing [`priors::Prior`]), a
  log-likelihood ([`model::LogLikelihood`], closures work out of the box)
  and an algorithm.
- The [`sampler::Sampler`] seeds chains from the priors (or from a Laplace
  approximation at a MAP estimate), runs warm-up, sampling and output
  phases, and exposes chain histories, posterior draws, acceptance rates
  and the MAP.
- Runs are bit-reproducible for a given seed, in parallel or sequentially.

## Example

```rust
use bayesim::config::SamplerConfig;
use bayesim::priors::{Prior, UniformPrior};
use bayesim::rwm::AdaptiveMetropolis;
use bayesim::sampler::Sampler;

// Gaussian log-likelihood centered at 2 on a Uniform(-10, 10) prior.
let priors: Vec<Box<dyn Prior>> = vec![Box::new(UniformPrior::new(-10.0, 10.0))];
let likelihood = |theta: &[f64]| -0.5 * (theta[0] - 2.0).powi(2);

let config = SamplerConfig {
    number_of_chains: 2,
    iterations: 400,
    warmup_iterations: 200,
    initial_population_length: 50,
    output_length: 400,
    ..SamplerConfig::default()
};
let mut sampler = Sampler::new(config, priors, likelihood, AdaptiveMetropolis::default());
sampler.sample(true, false).unwrap();

let draws = sampler.output();
assert!(draws.len() >= 400);
```
*/

pub mod config;
pub mod covariance;
pub mod demc;
pub mod error;
pub mod hmc;
pub mod map;
pub mod model;
pub mod mvn;
pub mod parameters;
pub mod priors;
pub mod rwm;
pub mod sampler;
pub mod snis;
