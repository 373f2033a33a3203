//! Error surface for configuration and sampling failures.

use std::error::Error;
use std::fmt;

/// A single violated configuration constraint.
///
/// Configuration checks collect every violation instead of stopping at the
/// first one, so a caller sees the full list in one round trip.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigViolation {
    /// `number_of_chains` must be at least 1.
    ChainCount { got: usize },
    /// `iterations` must be at least 100.
    Iterations { got: usize },
    /// `warmup_iterations` must be in `1..=iterations / 2`.
    WarmupIterations { got: usize, max: usize },
    /// `thinning_interval` must be at least 1.
    ThinningInterval { got: usize },
    /// `initial_population_length` must cover every chain.
    PopulationLength { got: usize, min: usize },
    /// `output_length` must be at least 100.
    OutputLength { got: usize },
    /// A proposal covariance matrix does not match the parameter count.
    ProposalDimension { expected: usize, rows: usize, cols: usize },
    /// A proposal covariance matrix is not positive definite.
    ProposalNotPositiveDefinite,
    /// The HMC mass vector does not match the parameter count.
    MassVectorLength { expected: usize, got: usize },
    /// The chosen algorithm needs more chains than configured.
    TooFewChains {
        algorithm: &'static str,
        required: usize,
        got: usize,
    },
}

impl fmt::Display for ConfigViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigViolation::ChainCount { got } => {
                write!(f, "number_of_chains must be >= 1, got {got}")
            }
            ConfigViolation::Iterations { got } => {
                write!(f, "iterations must be >= 100, got {got}")
            }
            ConfigViolation::WarmupIterations { got, max } => {
                write!(f, "warmup_iterations must be in 1..={max}, got {got}")
            }
            ConfigViolation::ThinningInterval { got } => {
                write!(f, "thinning_interval must be >= 1, got {got}")
            }
            ConfigViolation::PopulationLength { got, min } => {
                write!(f, "initial_population_length must be >= {min}, got {got}")
            }
            ConfigViolation::OutputLength { got } => {
                write!(f, "output_length must be >= 100, got {got}")
            }
            ConfigViolation::ProposalDimension {
                expected,
                rows,
                cols,
            } => write!(
                f,
                "proposal covariance must be {expected}x{expected}, got {rows}x{cols}"
            ),
            ConfigViolation::ProposalNotPositiveDefinite => {
                write!(f, "proposal covariance is not positive definite")
            }
            ConfigViolation::MassVectorLength { expected, got } => {
                write!(f, "mass vector must have length {expected}, got {got}")
            }
            ConfigViolation::TooFewChains {
                algorithm,
                required,
                got,
            } => write!(
                f,
                "{algorithm} requires at least {required} chains, got {got}"
            ),
        }
    }
}

/// Errors reported by the samplers.
#[derive(Debug, Clone, PartialEq)]
pub enum SamplerError {
    /// One entry per violated configuration constraint. Raised at `sample()`
    /// entry, before any likelihood evaluation.
    Config(Vec<ConfigViolation>),
    /// Every importance weight vanished (all log-weights were `-inf` or NaN).
    VanishingWeights,
}

impl fmt::Display for SamplerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SamplerError::Config(violations) => {
                write!(f, "invalid sampler configuration: ")?;
                for (i, v) in violations.iter().enumerate() {
                    if i > 0 {
                        write!(f, "; ")?;
                    }
                    write!(f, "{v}")?;
                }
                Ok(())
            }
            SamplerError::VanishingWeights => {
                write!(f, "all importance weights vanished (every log-weight was -inf)")
            }
        }
    }
}

impl Error for SamplerError {}

pub type Result<T> = std::result::Result<T, SamplerError>;
