//! Prior capabilities consumed by the samplers.
//!
//! The samplers only ever see the narrow contract below: support bounds for
//! feasibility checks, a mean for naive seeding, and the quantile function
//! for inverse-CDF draws. Any richer distribution library can plug in by
//! implementing [`Prior`].

/// The per-parameter prior contract.
pub trait Prior: Send + Sync {
    /// Lower edge of the support (may be `-inf`).
    fn minimum(&self) -> f64;

    /// Upper edge of the support (may be `+inf`).
    fn maximum(&self) -> f64;

    /// Prior mean, used to seed the first candidate of a naive
    /// initialization.
    fn mean(&self) -> f64;

    /// Quantile function evaluated at `u` in `[0, 1]`.
    fn inverse_cdf(&self, u: f64) -> f64;

    /// Whether `x` lies inside the support. NaN is never inside.
    fn contains(&self, x: f64) -> bool {
        x >= self.minimum() && x <= self.maximum()
    }
}

/// Continuous uniform prior on `[min, max]`.
///
/// # Examples
///
/// ```rust
/// use bayesim::priors::{Prior, UniformPrior};
///
/// let p = UniformPrior::new(0.0, 10.0);
/// assert_eq!(p.mean(), 5.0);
/// assert_eq!(p.inverse_cdf(0.25), 2.5);
/// assert!(!p.contains(-1.0));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct UniformPrior {
    min: f64,
    max: f64,
}

impl UniformPrior {
    pub fn new(min: f64, max: f64) -> Self {
        assert!(
            min.is_finite() && max.is_finite() && min < max,
            "UniformPrior requires finite min < max, got [{min}, {max}]"
        );
        Self { min, max }
    }
}

impl Prior for UniformPrior {
    fn minimum(&self) -> f64 {
        self.min
    }

    fn maximum(&self) -> f64 {
        self.max
    }

    fn mean(&self) -> f64 {
        0.5 * (self.min + self.max)
    }

    fn inverse_cdf(&self, u: f64) -> f64 {
        self.min + u * (self.max - self.min)
    }
}

/// Normal prior with unbounded support.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalPrior {
    mean: f64,
    std: f64,
}

impl NormalPrior {
    pub fn new(mean: f64, std: f64) -> Self {
        assert!(
            mean.is_finite() && std.is_finite() && std > 0.0,
            "NormalPrior requires finite mean and std > 0, got N({mean}, {std})"
        );
        Self { mean, std }
    }
}

impl Prior for NormalPrior {
    fn minimum(&self) -> f64 {
        f64::NEG_INFINITY
    }

    fn maximum(&self) -> f64 {
        f64::INFINITY
    }

    fn mean(&self) -> f64 {
        self.mean
    }

    fn inverse_cdf(&self, u: f64) -> f64 {
        self.mean + self.std * standard_normal_quantile(u)
    }
}

/// Standard normal quantile via the Abramowitz & Stegun 26.2.23 rational
/// approximation. Absolute error below 4.5e-4.
fn standard_normal_quantile(p: f64) -> f64 {
    if p.is_nan() || !(0.0..=1.0).contains(&p) {
        return f64::NAN;
    }
    if p == 0.0 {
        return f64::NEG_INFINITY;
    }
    if p == 1.0 {
        return f64::INFINITY;
    }

    let (q, sign) = if p > 0.5 { (1.0 - p, 1.0) } else { (p, -1.0) };
    let t = (-2.0 * q.ln()).sqrt();

    const C0: f64 = 2.515517;
    const C1: f64 = 0.802853;
    const C2: f64 = 0.010328;
    const D1: f64 = 1.432788;
    const D2: f64 = 0.189269;
    const D3: f64 = 0.001308;

    let z = t - (C0 + C1 * t + C2 * t * t) / (1.0 + D1 * t + D2 * t * t + D3 * t * t * t);
    sign * z
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantile_known_values() {
        assert!(standard_normal_quantile(0.5).abs() < 1e-3);
        assert!((standard_normal_quantile(0.975) - 1.96).abs() < 0.01);
        assert!((standard_normal_quantile(0.025) + 1.96).abs() < 0.01);
        assert_eq!(standard_normal_quantile(0.0), f64::NEG_INFINITY);
        assert_eq!(standard_normal_quantile(1.0), f64::INFINITY);
    }

    #[test]
    fn quantile_symmetry() {
        for &p in &[0.1, 0.2, 0.3, 0.4] {
            let lo = standard_normal_quantile(p);
            let hi = standard_normal_quantile(1.0 - p);
            assert!((lo + hi).abs() < 1e-9, "asymmetric at p={p}");
        }
    }

    #[test]
    fn uniform_support() {
        let p = UniformPrior::new(-2.0, 4.0);
        assert!(p.contains(-2.0));
        assert!(p.contains(4.0));
        assert!(!p.contains(4.0001));
        assert!(!p.contains(f64::NAN));
        assert_eq!(p.inverse_cdf(0.0), -2.0);
        assert_eq!(p.inverse_cdf(1.0), 4.0);
    }

    #[test]
    fn normal_prior_quantiles() {
        let p = NormalPrior::new(10.0, 2.0);
        assert!((p.inverse_cdf(0.5) - 10.0).abs() < 1e-2);
        assert!((p.inverse_cdf(0.975) - 13.92).abs() < 0.05);
        assert!(p.contains(-1e300));
    }
}
