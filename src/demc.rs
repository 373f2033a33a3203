//! Differential-evolution MCMC with snooker updates (DEMCzs).
//!
//! The parallel-direction move perturbs the current state along the
//! difference of two archive members; the snooker move projects a peer
//! difference onto the line through the current state and a third peer's
//! state. The snooker move is not volume preserving, so its acceptance
//! ratio carries a `(D - 1) * log-norm` Jacobian term.

use rand::Rng;

use crate::config::SamplerConfig;
use crate::error::ConfigViolation;
use crate::parameters::ParameterSet;
use crate::sampler::{metropolis_accept, ChainAlgorithm, ChainState, StepContext};

/// Tuned parallel-direction scale, `2.38 / sqrt(2 D)`.
fn tuned_gamma(dim: usize) -> f64 {
    2.38 / (2.0 * dim as f64).sqrt()
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

fn norm(a: &[f64]) -> f64 {
    dot(a, a).sqrt()
}

/// Snooker proposal: project `z1 - z2` onto the line through `current` and
/// `anchor`, then step `gamma` times that projection from `current`.
/// `None` when `current` coincides with `anchor`.
pub(crate) fn snooker_proposal(
    current: &[f64],
    anchor: &[f64],
    z1: &[f64],
    z2: &[f64],
    gamma: f64,
) -> Option<Vec<f64>> {
    let line: Vec<f64> = current
        .iter()
        .zip(anchor.iter())
        .map(|(x, z)| x - z)
        .collect();
    let line_sq = dot(&line, &line);
    if line_sq <= f64::EPSILON {
        return None;
    }
    let diff: Vec<f64> = z1.iter().zip(z2.iter()).map(|(a, b)| a - b).collect();
    let coefficient = gamma * dot(&diff, &line) / line_sq;
    Some(
        current
            .iter()
            .zip(line.iter())
            .map(|(x, e)| x + coefficient * e)
            .collect(),
    )
}

/// DEMCzs chain-update rule.
#[derive(Debug, Clone, PartialEq)]
pub struct DifferentialEvolution {
    /// Probability of attempting a snooker move instead of a
    /// parallel-direction move.
    pub snooker_probability: f64,
    /// Probability of forcing `gamma = 1` (mode jump) in a
    /// parallel-direction move.
    pub jump_probability: f64,
    /// Half-width of the per-coordinate uniform noise added to
    /// parallel-direction proposals.
    pub noise: f64,
}

impl Default for DifferentialEvolution {
    fn default() -> Self {
        Self {
            snooker_probability: 0.1,
            jump_probability: 0.1,
            noise: 1e-4,
        }
    }
}

impl DifferentialEvolution {
    pub fn new(snooker_probability: f64, jump_probability: f64, noise: f64) -> Self {
        Self {
            snooker_probability,
            jump_probability,
            noise,
        }
    }

    fn parallel_direction_move(&self, chain: &mut ChainState, ctx: &StepContext<'_>) {
        let archive = ctx.population;
        if archive.len() < 2 {
            return;
        }
        let r1 = chain.rng.gen_range(0..archive.len());
        let r2 = loop {
            let candidate = chain.rng.gen_range(0..archive.len());
            if candidate != r1 {
                break candidate;
            }
        };
        let gamma = if chain.rng.gen::<f64>() < self.jump_probability {
            1.0
        } else {
            tuned_gamma(ctx.dim())
        };
        let proposal: Vec<f64> = chain
            .current
            .values
            .iter()
            .enumerate()
            .map(|(j, &x)| {
                let jitter = chain.rng.gen_range(-self.noise..=self.noise);
                x + gamma * (archive[r1].values[j] - archive[r2].values[j]) + jitter
            })
            .collect();
        if !ctx.in_support(&proposal) {
            return;
        }
        let fitness = ctx.likelihood.log_likelihood(&proposal);
        if metropolis_accept(&mut chain.rng, fitness - chain.current.fitness) {
            chain.current = ParameterSet::new(proposal, fitness);
            chain.accept_count += 1;
        }
    }

    fn snooker_move(&self, chain: &mut ChainState, ctx: &StepContext<'_>) {
        let peer_count = ctx.peers.len();
        if peer_count < 4 {
            return;
        }
        // Three distinct peers, none of them this chain.
        let mut picks = [0usize; 3];
        let mut found = 0;
        while found < 3 {
            let candidate = chain.rng.gen_range(0..peer_count);
            if candidate != chain.index && !picks[..found].contains(&candidate) {
                picks[found] = candidate;
                found += 1;
            }
        }
        let z1 = &ctx.peers[picks[0]].state.values;
        let z2 = &ctx.peers[picks[1]].state.values;
        let anchor = &ctx.peers[picks[2]].state.values;
        let gamma = chain.rng.gen_range(1.2..2.2);

        let Some(proposal) = snooker_proposal(&chain.current.values, anchor, z1, z2, gamma)
        else {
            // Degenerate line: the chain sits on the anchor.
            self.parallel_direction_move(chain, ctx);
            return;
        };
        if !ctx.in_support(&proposal) {
            return;
        }
        let fitness = ctx.likelihood.log_likelihood(&proposal);
        let dim = ctx.dim() as f64;
        let to_anchor_proposed: Vec<f64> = proposal
            .iter()
            .zip(anchor.iter())
            .map(|(a, b)| a - b)
            .collect();
        let to_anchor_current: Vec<f64> = chain
            .current
            .values
            .iter()
            .zip(anchor.iter())
            .map(|(a, b)| a - b)
            .collect();
        // The move is not volume preserving; the norm ratio enters the test.
        let jacobian =
            (dim - 1.0) * (norm(&to_anchor_proposed).ln() - norm(&to_anchor_current).ln());
        let log_ratio = fitness - chain.current.fitness + jacobian;
        if metropolis_accept(&mut chain.rng, log_ratio) {
            chain.current = ParameterSet::new(proposal, fitness);
            chain.accept_count += 1;
        }
    }
}

impl ChainAlgorithm for DifferentialEvolution {
    fn chain_iteration(&self, chain: &mut ChainState, ctx: &StepContext<'_>) {
        chain.sample_count += 1;
        if chain.rng.gen::<f64>() < self.snooker_probability {
            self.snooker_move(chain, ctx);
        } else {
            self.parallel_direction_move(chain, ctx);
        }
    }

    fn validate(&self, _dim: usize, config: &SamplerConfig) -> Vec<ConfigViolation> {
        if config.number_of_chains < 4 {
            vec![ConfigViolation::TooFewChains {
                algorithm: "differential evolution",
                required: 4,
                got: config.number_of_chains,
            }]
        } else {
            Vec::new()
        }
    }

    fn wants_population(&self) -> bool {
        true
    }
}
