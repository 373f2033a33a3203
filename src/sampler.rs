//! The sampling orchestrator: chain lifecycle, parallel execution, warm-up
//! and output bookkeeping, progress notification and cancellation.
//!
//! ## Overview
//!
//! - The [`Sampler`] owns the configuration, one slot per chain, the shared
//!   population archive and all run statistics.
//! - Per-step proposal/acceptance logic lives behind [`ChainAlgorithm`];
//!   the orchestrator is algorithm-agnostic.
//! - One task advances one chain per outer step; the end of the parallel
//!   iterator is the barrier. Strategies only read end-of-previous-step
//!   snapshots of their peers, so no further locking exists.
//! - Every chain draws from a private `SmallRng` derived from the seeded
//!   master generator at setup, making runs bit-reproducible regardless of
//!   thread count.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use nalgebra::{DMatrix, DVector};
use ndarray::Array2;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use crate::config::SamplerConfig;
use crate::covariance::RunningCovarianceMatrix;
use crate::error::{ConfigViolation, Result, SamplerError};
use crate::map::{laplace_covariance, GlobalOptimizer};
use crate::model::LogLikelihood;
use crate::mvn::MultivariateNormal;
use crate::parameters::ParameterSet;
use crate::priors::Prior;

/// Roberts & Rosenthal's optimal proposal scaling, `2.38^2 / D`.
pub(crate) fn optimal_proposal_scale(dim: usize) -> f64 {
    2.38 * 2.38 / dim as f64
}

/// Log-space Metropolis test: accept iff `ln(U) < log_ratio`.
///
/// A NaN ratio (e.g. `-inf - -inf`) compares false and rejects, and a
/// `-inf` ratio loses even against a zero uniform draw, so a NaN or `-inf`
/// candidate fitness deterministically loses.
pub(crate) fn metropolis_accept<R: Rng>(rng: &mut R, log_ratio: f64) -> bool {
    rng.gen::<f64>().ln() < log_ratio
}

/// Lifecycle phase of a chain, a pure function of the outer-step counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Warming,
    Sampling,
    Outputting,
}

impl Phase {
    pub(crate) fn of(step: usize, config: &SamplerConfig) -> Self {
        if step <= config.warmup_iterations {
            Phase::Warming
        } else if step <= config.iterations {
            Phase::Sampling
        } else {
            Phase::Outputting
        }
    }

    fn label(self) -> &'static str {
        match self {
            Phase::Warming => "warm-up",
            Phase::Sampling => "sampling",
            Phase::Outputting => "output",
        }
    }
}

/// Cooperative cancellation handle.
///
/// Cloneable; `cancel()` makes a running sampler return normally after the
/// current outer step with barrier-consistent partial results.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Re-arms the token so a cancelled run can be resumed.
    pub fn reset(&self) {
        self.0.store(false, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Per-chain slot. Exactly one task writes to a slot during an outer step;
/// peers only see the previous step's snapshot.
#[derive(Debug, Clone)]
pub struct ChainState {
    /// Chain id, `0..number_of_chains`.
    pub index: usize,
    /// State after the last completed iteration.
    pub current: ParameterSet,
    /// Chain-private random stream derived from the master generator.
    pub rng: SmallRng,
    /// One entry per outer step of the warming and sampling phases.
    pub history: Vec<ParameterSet>,
    /// Posterior draws recorded in the output phase.
    pub output: Vec<ParameterSet>,
    pub accept_count: u64,
    pub sample_count: u64,
    /// Streaming proposal covariance, owned by this chain alone.
    pub covariance: RunningCovarianceMatrix,
}

impl ChainState {
    /// Accepted proposals over attempted proposals.
    pub fn acceptance_rate(&self) -> f64 {
        if self.sample_count == 0 {
            0.0
        } else {
            self.accept_count as f64 / self.sample_count as f64
        }
    }
}

/// Read-only view of a peer chain at the last barrier.
#[derive(Debug, Clone)]
pub struct PeerSnapshot {
    pub state: ParameterSet,
    /// The peer's streaming covariance estimate, if it has one yet.
    pub covariance: Option<DMatrix<f64>>,
}

/// Everything a strategy may read during one chain iteration.
pub struct StepContext<'a> {
    pub priors: &'a [Box<dyn Prior>],
    pub likelihood: &'a dyn LogLikelihood,
    /// End-of-previous-step snapshots of every chain, indexed by chain id.
    pub peers: &'a [PeerSnapshot],
    /// Shared population archive; never mutated during a step.
    pub population: &'a [ParameterSet],
    /// Whether adaptive statistics may still be updated in this phase.
    pub adapt: bool,
}

impl StepContext<'_> {
    pub fn dim(&self) -> usize {
        self.priors.len()
    }

    /// Feasibility: every coordinate inside its prior's support.
    pub fn in_support(&self, theta: &[f64]) -> bool {
        theta
            .iter()
            .zip(self.priors.iter())
            .all(|(&x, prior)| prior.contains(x))
    }
}

/// A pluggable per-chain update rule.
///
/// Implementations write only to their own slot, draw randomness only from
/// `chain.rng`, and keep no chain-spanning mutable state of their own.
pub trait ChainAlgorithm: Send + Sync {
    /// Advances `chain` by one iteration.
    fn chain_iteration(&self, chain: &mut ChainState, ctx: &StepContext<'_>);

    /// Algorithm-specific configuration checks, run at `sample()` entry.
    fn validate(&self, dim: usize, config: &SamplerConfig) -> Vec<ConfigViolation> {
        let _ = (dim, config);
        Vec::new()
    }

    /// Whether chain states should be archived in the population matrix.
    fn wants_population(&self) -> bool {
        false
    }
}

type ProgressFn = Box<dyn Fn(f64, &str) + Send + Sync>;

struct ProgressHook {
    every: usize,
    callback: ProgressFn,
}

/// Markov-chain sampling orchestrator.
///
/// # Examples
///
/// ```rust
/// use bayesim::config::SamplerConfig;
/// use bayesim::priors::{Prior, UniformPrior};
/// use bayesim::rwm::AdaptiveMetropolis;
/// use bayesim::sampler::Sampler;
///
/// let priors: Vec<Box<dyn Prior>> = vec![Box::new(UniformPrior::new(-5.0, 5.0))];
/// let likelihood = |theta: &[f64]| -0.5 * theta[0] * theta[0];
/// let config = SamplerConfig {
///     number_of_chains: 2,
///     iterations: 200,
///     warmup_iterations: 100,
///     initial_population_length: 20,
///     output_length: 100,
///     ..SamplerConfig::default()
/// };
/// let mut sampler = Sampler::new(config, priors, likelihood, AdaptiveMetropolis::default());
/// sampler.sample(false, false).unwrap();
/// assert_eq!(sampler.chains()[0].history.len(), 200);
/// assert!(sampler.output().len() >= 100);
/// ```
pub struct Sampler<A: ChainAlgorithm> {
    config: SamplerConfig,
    priors: Vec<Box<dyn Prior>>,
    likelihood: Box<dyn LogLikelihood>,
    algorithm: A,
    chains: Vec<ChainState>,
    population: Vec<ParameterSet>,
    map: Option<ParameterSet>,
    log_likelihood_sum: f64,
    log_likelihood_steps: u64,
    completed_steps: usize,
    cancel: CancellationToken,
    progress: Option<ProgressHook>,
    initialized: bool,
}

impl<A: ChainAlgorithm> Sampler<A> {
    const UPDATE_INTERVAL: Duration = Duration::from_millis(500);

    pub fn new(
        config: SamplerConfig,
        priors: Vec<Box<dyn Prior>>,
        likelihood: impl LogLikelihood + 'static,
        algorithm: A,
    ) -> Self {
        assert!(!priors.is_empty(), "at least one prior is required");
        Self {
            config,
            priors,
            likelihood: Box::new(likelihood),
            algorithm,
            chains: Vec::new(),
            population: Vec::new(),
            map: None,
            log_likelihood_sum: 0.0,
            log_likelihood_steps: 0,
            completed_steps: 0,
            cancel: CancellationToken::new(),
            progress: None,
            initialized: false,
        }
    }

    /// Handle for cooperative cancellation; checked once per outer step.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Registers a progress callback `(fraction_complete, text)` invoked
    /// every `every` completed outer steps.
    pub fn on_progress(
        &mut self,
        every: usize,
        callback: impl Fn(f64, &str) + Send + Sync + 'static,
    ) {
        self.progress = Some(ProgressHook {
            every: every.max(1),
            callback: Box::new(callback),
        });
    }

    /// Runs the full simulation.
    ///
    /// `parallel` fans chains out over the rayon pool; the sequential path
    /// produces bit-identical results. `resume = true` continues an already
    /// initialized run from its last completed step instead of
    /// reinitializing.
    ///
    /// Fails with [`SamplerError::Config`] before any likelihood evaluation
    /// if the configuration or the algorithm's requirements are violated.
    pub fn sample(&mut self, parallel: bool, resume: bool) -> Result<()> {
        self.run(parallel, resume, None)
    }

    /// Like [`Sampler::sample`], with an indicatif progress bar.
    pub fn sample_with_progress(&mut self, parallel: bool, resume: bool) -> Result<()> {
        let pb = ProgressBar::new(self.config.total_steps() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{prefix} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
                .unwrap()
                .progress_chars("##-"),
        );
        pb.set_prefix(format!("{} chains", self.config.number_of_chains));
        let outcome = self.run(parallel, resume, Some(&pb));
        pb.finish_with_message("Done!");
        outcome
    }

    /// MAP-guided initialization.
    ///
    /// Maximizes the log-likelihood with the supplied optimizer, builds a
    /// Laplace approximation from the negative Hessian at the optimum and
    /// seeds chains from the resulting multivariate normal. Falls back
    /// silently to naive seeding when the optimizer reports failure or the
    /// approximation cannot be formed.
    pub fn seed_with_map(&mut self, optimizer: &dyn GlobalOptimizer) -> Result<()> {
        self.validate_run()?;
        let dim = self.priors.len();
        let result = optimizer.maximize(self.likelihood.as_ref(), &self.priors);
        if !result.success || result.argmax.len() != dim {
            self.initialize_chains();
            return Ok(());
        }
        let approx = laplace_covariance(
            self.likelihood.as_ref(),
            &result.argmax,
            optimal_proposal_scale(dim),
        )
        .and_then(|cov| {
            MultivariateNormal::from_mean_cov(DVector::from_column_slice(&result.argmax), cov)
        });
        let Some(mvn) = approx else {
            self.initialize_chains();
            return Ok(());
        };

        let mut master = SmallRng::seed_from_u64(self.config.seed);
        let mut candidates = Vec::with_capacity(self.config.initial_population_length);
        for _ in 0..self.config.initial_population_length {
            let mut theta = mvn.sample(&mut master);
            for (value, prior) in theta.iter_mut().zip(self.priors.iter()) {
                *value = value.clamp(prior.minimum(), prior.maximum());
            }
            candidates.push(theta);
        }
        let pool = self.evaluate_pool(candidates);
        let starts = pool
            .iter()
            .take(self.config.number_of_chains)
            .cloned()
            .collect();
        let map_fitness = self.likelihood.log_likelihood(&result.argmax);
        self.install_chains(starts, pool, &mut master);
        self.map = Some(ParameterSet::new(result.argmax, map_fitness));
        Ok(())
    }

    fn run(&mut self, parallel: bool, resume: bool, bar: Option<&ProgressBar>) -> Result<()> {
        self.validate_run()?;
        if !resume || !self.initialized {
            self.initialize_chains();
        }
        let total = self.config.total_steps();
        if let Some(pb) = bar {
            pb.set_length(total as u64);
            pb.set_position(self.completed_steps as u64);
        }
        let mut last_update = Instant::now();

        while self.completed_steps < total {
            // Cancellation is cooperative and coarse: once per outer step.
            if self.cancel.is_cancelled() {
                break;
            }
            let step = self.completed_steps + 1;
            let phase = Phase::of(step, &self.config);
            self.advance_step(parallel, phase);
            self.completed_steps = step;
            self.record_step(phase);

            if let Some(hook) = &self.progress {
                if step % hook.every == 0 || step == total {
                    let fraction = step as f64 / total as f64;
                    let text = format!(
                        "step {step}/{total} ({}) mean(logL)={:.3}",
                        phase.label(),
                        self.mean_log_likelihood()
                    );
                    (hook.callback)(fraction, &text);
                }
            }
            if let Some(pb) = bar {
                if last_update.elapsed() >= Self::UPDATE_INTERVAL || step == total {
                    pb.set_position(step as u64);
                    pb.set_message(format!(
                        "{} AcceptRate={:.3}",
                        phase.label(),
                        self.overall_acceptance_rate()
                    ));
                    last_update = Instant::now();
                }
            }
        }
        Ok(())
    }

    fn validate_run(&self) -> Result<()> {
        let mut violations = self.config.violations();
        violations.extend(self.algorithm.validate(self.priors.len(), &self.config));
        if violations.is_empty() {
            Ok(())
        } else {
            Err(SamplerError::Config(violations))
        }
    }

    /// Naive initialization: the prior means plus inverse-CDF draws, ranked
    /// by fitness; the best `number_of_chains` candidates become the chain
    /// starting states and the whole pool seeds the population archive.
    fn initialize_chains(&mut self) {
        let mut master = SmallRng::seed_from_u64(self.config.seed);
        let mut candidates = Vec::with_capacity(self.config.initial_population_length);
        candidates.push(self.priors.iter().map(|p| p.mean()).collect::<Vec<f64>>());
        for _ in 1..self.config.initial_population_length {
            candidates.push(
                self.priors
                    .iter()
                    .map(|p| p.inverse_cdf(master.gen::<f64>()))
                    .collect(),
            );
        }
        let pool = self.evaluate_pool(candidates);
        let starts = pool
            .iter()
            .take(self.config.number_of_chains)
            .cloned()
            .collect();
        self.install_chains(starts, pool, &mut master);
    }

    /// Evaluates candidate fitness in parallel and ranks descending.
    fn evaluate_pool(&self, candidates: Vec<Vec<f64>>) -> Vec<ParameterSet> {
        let likelihood = self.likelihood.as_ref();
        let mut pool: Vec<ParameterSet> = candidates
            .into_par_iter()
            .map(|theta| {
                let fitness = likelihood.log_likelihood(&theta);
                ParameterSet::new(theta, fitness)
            })
            .collect();
        pool.sort_by(|a, b| b.compare_fitness(a));
        pool
    }

    fn install_chains(
        &mut self,
        starts: Vec<ParameterSet>,
        pool: Vec<ParameterSet>,
        master: &mut SmallRng,
    ) {
        let dim = self.priors.len();
        self.chains = starts
            .into_iter()
            .enumerate()
            .map(|(index, current)| ChainState {
                index,
                current,
                rng: SmallRng::seed_from_u64(master.gen::<u64>()),
                history: Vec::new(),
                output: Vec::new(),
                accept_count: 0,
                sample_count: 0,
                covariance: RunningCovarianceMatrix::new(dim),
            })
            .collect();
        self.population = if self.algorithm.wants_population() {
            pool
        } else {
            Vec::new()
        };
        self.map = None;
        self.log_likelihood_sum = 0.0;
        self.log_likelihood_steps = 0;
        self.completed_steps = 0;
        self.initialized = true;
    }

    /// One outer step: every chain advances by `thinning_interval` inner
    /// iterations; returning from the iterator is the barrier.
    fn advance_step(&mut self, parallel: bool, phase: Phase) {
        let peers: Vec<PeerSnapshot> = self
            .chains
            .iter()
            .map(|chain| PeerSnapshot {
                state: chain.current.clone(),
                covariance: chain.covariance.covariance(),
            })
            .collect();
        let ctx = StepContext {
            priors: &self.priors,
            likelihood: self.likelihood.as_ref(),
            peers: &peers,
            population: &self.population,
            adapt: phase != Phase::Outputting,
        };
        let algorithm = &self.algorithm;
        let thinning = self.config.thinning_interval;
        if parallel {
            self.chains.par_iter_mut().for_each(|chain| {
                for _ in 0..thinning {
                    algorithm.chain_iteration(chain, &ctx);
                }
            });
        } else {
            self.chains.iter_mut().for_each(|chain| {
                for _ in 0..thinning {
                    algorithm.chain_iteration(chain, &ctx);
                }
            });
        }
    }

    /// Post-barrier bookkeeping for one completed outer step.
    fn record_step(&mut self, phase: Phase) {
        match phase {
            Phase::Warming => {
                for chain in &mut self.chains {
                    chain.history.push(chain.current.clone());
                }
            }
            Phase::Sampling => {
                let mut sum = 0.0;
                for chain in &mut self.chains {
                    chain.history.push(chain.current.clone());
                    sum += chain.current.fitness;
                }
                self.log_likelihood_sum += sum / self.chains.len() as f64;
                self.log_likelihood_steps += 1;
            }
            Phase::Outputting => {
                for chain in &mut self.chains {
                    chain.output.push(chain.current.clone());
                }
                for i in 0..self.chains.len() {
                    let candidate = &self.chains[i].current;
                    let better = self
                        .map
                        .as_ref()
                        .map_or(true, |map| candidate.fitness > map.fitness);
                    if better {
                        self.map = Some(candidate.clone());
                    }
                }
            }
        }
        if self.algorithm.wants_population() {
            let states: Vec<ParameterSet> =
                self.chains.iter().map(|c| c.current.clone()).collect();
            self.population.extend(states);
        }
    }

    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    /// Chain slots, indexed by chain id.
    pub fn chains(&self) -> &[ChainState] {
        &self.chains
    }

    /// Recorded history of one chain.
    pub fn markov_chain(&self, chain: usize) -> &[ParameterSet] {
        &self.chains[chain].history
    }

    /// Posterior draws of all chains, concatenated.
    pub fn output(&self) -> Vec<&ParameterSet> {
        self.chains
            .iter()
            .flat_map(|chain| chain.output.iter())
            .collect()
    }

    /// Posterior draws as a `[draws, parameters]` array.
    pub fn output_array(&self) -> Array2<f64> {
        let draws = self.output();
        let dim = self.priors.len();
        let mut array = Array2::zeros((draws.len(), dim));
        for (i, draw) in draws.iter().enumerate() {
            for (j, &value) in draw.values.iter().enumerate() {
                array[(i, j)] = value;
            }
        }
        array
    }

    /// Per-chain acceptance rates.
    pub fn acceptance_rates(&self) -> Vec<f64> {
        self.chains.iter().map(ChainState::acceptance_rate).collect()
    }

    fn overall_acceptance_rate(&self) -> f64 {
        let samples: u64 = self.chains.iter().map(|c| c.sample_count).sum();
        if samples == 0 {
            return 0.0;
        }
        let accepts: u64 = self.chains.iter().map(|c| c.accept_count).sum();
        accepts as f64 / samples as f64
    }

    /// The shared population archive (empty unless the algorithm opts in).
    pub fn population(&self) -> &[ParameterSet] {
        &self.population
    }

    /// Best-fitness parameter set seen in the output phase (or set by
    /// MAP-guided seeding).
    pub fn map(&self) -> Option<&ParameterSet> {
        self.map.as_ref()
    }

    /// Mean over sampling-phase steps of the per-step mean chain
    /// log-likelihood; NaN before the sampling phase has produced a step.
    pub fn mean_log_likelihood(&self) -> f64 {
        if self.log_likelihood_steps == 0 {
            f64::NAN
        } else {
            self.log_likelihood_sum / self.log_likelihood_steps as f64
        }
    }

    /// Outer steps completed so far (resets on reinitialization).
    pub fn completed_steps(&self) -> usize {
        self.completed_steps
    }
}
