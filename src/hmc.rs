//! Hamiltonian Monte Carlo.
//!
//! Each update samples a mass-scaled momentum, jitters the nominal step size
//! and leapfrog count to break periodic resonance, integrates Hamiltonian
//! dynamics with the leapfrog scheme, negates the final momentum and applies
//! a Metropolis test on the total-energy change.
//!
//! Coordinates that leave a finite prior bound during integration are
//! clamped to an epsilon-inset of the boundary instead of aborting the
//! trajectory. This deviates from exact-HMC theory; the trade is robustness
//! on bounded supports.

use rand::Rng;
use rand_distr::StandardNormal;

use crate::config::SamplerConfig;
use crate::error::ConfigViolation;
use crate::model::{numerical_gradient, LogLikelihood};
use crate::parameters::ParameterSet;
use crate::sampler::{metropolis_accept, ChainAlgorithm, ChainState, StepContext};

/// Relative jitter applied to the step size and leapfrog count.
const JITTER: f64 = 0.2;

/// Boundary inset as a fraction of the bound width.
const BOUNDARY_INSET: f64 = 1e-9;

/// Leapfrog integration of `steps` full steps starting from `position` and
/// `momentum`, with the final momentum negated for reversibility.
///
/// `bounds` holds `(minimum, maximum)` per coordinate; finite bounds clamp
/// wandering coordinates to an epsilon-inset of the edge.
pub fn leapfrog<G>(
    gradient: G,
    bounds: &[(f64, f64)],
    position: &[f64],
    momentum: &[f64],
    step_size: f64,
    steps: usize,
    mass: &[f64],
) -> (Vec<f64>, Vec<f64>)
where
    G: Fn(&[f64]) -> Vec<f64>,
{
    let mut q = position.to_vec();
    let mut p = momentum.to_vec();
    let mut grad = gradient(&q);

    for j in 0..p.len() {
        p[j] += 0.5 * step_size * grad[j];
    }
    for step in 0..steps {
        for j in 0..q.len() {
            q[j] += step_size * p[j] / mass[j];
        }
        clamp_to_bounds(&mut q, bounds);
        grad = gradient(&q);
        let factor = if step + 1 == steps { 0.5 } else { 1.0 };
        for j in 0..p.len() {
            p[j] += factor * step_size * grad[j];
        }
    }
    for value in &mut p {
        *value = -*value;
    }
    (q, p)
}

fn clamp_to_bounds(q: &mut [f64], bounds: &[(f64, f64)]) {
    for (value, &(min, max)) in q.iter_mut().zip(bounds.iter()) {
        if !min.is_finite() || !max.is_finite() {
            continue;
        }
        let inset = BOUNDARY_INSET * (max - min);
        if *value < min {
            *value = min + inset;
        } else if *value > max {
            *value = max - inset;
        }
    }
}

fn kinetic_energy(momentum: &[f64], mass: &[f64]) -> f64 {
    momentum
        .iter()
        .zip(mass.iter())
        .map(|(p, m)| p * p / (2.0 * m))
        .sum()
}

/// Hamiltonian chain-update rule.
pub struct HamiltonianMc {
    /// Nominal leapfrog step size.
    pub step_size: f64,
    /// Nominal number of leapfrog steps per update.
    pub leapfrog_steps: usize,
    /// Per-coordinate mass; momenta are drawn from `N(0, sqrt(mass))`.
    pub mass: Vec<f64>,
}

impl HamiltonianMc {
    pub fn new(step_size: f64, leapfrog_steps: usize, mass: Vec<f64>) -> Self {
        assert!(step_size > 0.0, "step size must be positive");
        assert!(leapfrog_steps >= 1, "at least one leapfrog step is required");
        Self {
            step_size,
            leapfrog_steps,
            mass,
        }
    }

    /// Unit mass for every coordinate.
    pub fn with_unit_mass(step_size: f64, leapfrog_steps: usize, dim: usize) -> Self {
        Self::new(step_size, leapfrog_steps, vec![1.0; dim])
    }
}

impl ChainAlgorithm for HamiltonianMc {
    fn chain_iteration(&self, chain: &mut ChainState, ctx: &StepContext<'_>) {
        chain.sample_count += 1;

        let momentum: Vec<f64> = self
            .mass
            .iter()
            .map(|&m| m.sqrt() * chain.rng.sample::<f64, _>(StandardNormal))
            .collect();
        let step_size = self.step_size * chain.rng.gen_range(1.0 - JITTER..=1.0 + JITTER);
        let lo = (((1.0 - JITTER) * self.leapfrog_steps as f64).ceil() as usize).max(1);
        let hi = (((1.0 + JITTER) * self.leapfrog_steps as f64).ceil() as usize).max(lo);
        let steps = chain.rng.gen_range(lo..=hi);

        let bounds: Vec<(f64, f64)> = ctx
            .priors
            .iter()
            .map(|prior| (prior.minimum(), prior.maximum()))
            .collect();
        let likelihood = ctx.likelihood;
        let gradient = |theta: &[f64]| {
            likelihood
                .gradient(theta)
                .unwrap_or_else(|| numerical_gradient(likelihood, theta))
        };
        let (proposal, final_momentum) = leapfrog(
            gradient,
            &bounds,
            &chain.current.values,
            &momentum,
            step_size,
            steps,
            &self.mass,
        );

        let hamiltonian_current = -chain.current.fitness + kinetic_energy(&momentum, &self.mass);
        let fitness = likelihood.log_likelihood(&proposal);
        let hamiltonian_proposed = -fitness + kinetic_energy(&final_momentum, &self.mass);
        if metropolis_accept(&mut chain.rng, hamiltonian_current - hamiltonian_proposed) {
            chain.current = ParameterSet::new(proposal, fitness);
            chain.accept_count += 1;
        }
    }

    fn validate(&self, dim: usize, _config: &SamplerConfig) -> Vec<ConfigViolation> {
        if self.mass.len() != dim {
            vec![ConfigViolation::MassVectorLength {
                expected: dim,
                got: self.mass.len(),
            }]
        } else {
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gaussian_gradient(theta: &[f64]) -> Vec<f64> {
        // logL = -0.5 * sum(x^2), gradient = -x
        theta.iter().map(|x| -x).collect()
    }

    const UNBOUNDED: [(f64, f64); 2] = [
        (f64::NEG_INFINITY, f64::INFINITY),
        (f64::NEG_INFINITY, f64::INFINITY),
    ];

    /// L forward steps, then L steps with the (already negated) momentum,
    /// must return to the start when no clamping triggers.
    #[test]
    fn leapfrog_is_reversible() {
        let position = [0.7, -1.3];
        let momentum = [0.4, 1.1];
        let mass = [1.0, 2.0];
        let (q1, p1) = leapfrog(
            gaussian_gradient,
            &UNBOUNDED,
            &position,
            &momentum,
            0.05,
            25,
            &mass,
        );
        let (q2, p2) = leapfrog(gaussian_gradient, &UNBOUNDED, &q1, &p1, 0.05, 25, &mass);
        for j in 0..2 {
            assert!(
                (q2[j] - position[j]).abs() < 1e-9,
                "position {j} did not return: {} vs {}",
                q2[j],
                position[j]
            );
            // Double negation restores the original momentum.
            assert!(
                (p2[j] - momentum[j]).abs() < 1e-9,
                "momentum {j} did not return: {} vs {}",
                p2[j],
                momentum[j]
            );
        }
    }

    #[test]
    fn leapfrog_conserves_energy_approximately() {
        let position = [1.0, 0.5];
        let momentum = [-0.3, 0.8];
        let mass = [1.0, 1.0];
        let logp = |q: &[f64]| -0.5 * q.iter().map(|x| x * x).sum::<f64>();
        let h0 = -logp(&position) + kinetic_energy(&momentum, &mass);
        let (q, p) = leapfrog(
            gaussian_gradient,
            &UNBOUNDED,
            &position,
            &momentum,
            0.01,
            100,
            &mass,
        );
        let h1 = -logp(&q) + kinetic_energy(&p, &mass);
        assert!((h0 - h1).abs() < 1e-3, "energy drifted: {h0} vs {h1}");
    }

    #[test]
    fn clamping_keeps_coordinates_inside_finite_bounds() {
        let bounds = [(0.0, 1.0), (f64::NEG_INFINITY, f64::INFINITY)];
        // A strong constant drift pushes the first coordinate out.
        let drift = |_q: &[f64]| vec![50.0, 0.0];
        let (q, _p) = leapfrog(drift, &bounds, &[0.5, 0.0], &[1.0, 0.0], 0.5, 10, &[1.0, 1.0]);
        assert!(q[0] > 0.0 && q[0] < 1.0, "coordinate escaped: {}", q[0]);
    }

    #[test]
    fn mass_vector_length_is_validated() {
        let algorithm = HamiltonianMc::with_unit_mass(0.1, 10, 2);
        let violations = algorithm.validate(3, &SamplerConfig::default());
        assert_eq!(
            violations,
            vec![ConfigViolation::MassVectorLength {
                expected: 3,
                got: 2,
            }]
        );
        assert!(algorithm.validate(2, &SamplerConfig::default()).is_empty());
    }
}
