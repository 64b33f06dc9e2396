use rand::{distributions::Open01, rngs::SmallRng, Rng};

use crate::{
    error::{FleetError, FleetResult},
    helper::{random_seed, seeded_rng},
};

/// Source of per-part failure times.
///
/// Parts draw one value at creation and one more at every repair completion.
pub trait FailureSampler {
    /// Draws a failure time (hours) for a Weibull `shape`/`scale` pair.
    fn draw(&mut self, shape: f64, scale: f64) -> FleetResult<f64>;
}

/// Inverse-CDF Weibull sampler backed by a seeded `SmallRng`.
#[derive(Debug, Clone)]
pub struct WeibullSampler {
    rng: SmallRng,
}

impl WeibullSampler {
    /// Creates a reproducible sampler.
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: seeded_rng(seed),
        }
    }
}

impl Default for WeibullSampler {
    fn default() -> Self {
        Self::seeded(random_seed())
    }
}

impl FailureSampler for WeibullSampler {
    fn draw(&mut self, shape: f64, scale: f64) -> FleetResult<f64> {
        let u: f64 = self.rng.sample(Open01);
        weibull_inverse_cdf(shape, scale, u)
    }
}

/// `scale · (−ln(1−u))^(1/shape)` for `u` in (0, 1).
///
/// An infinite scale yields infinity: the part never fails from random wear.
pub fn weibull_inverse_cdf(shape: f64, scale: f64, u: f64) -> FleetResult<f64> {
    ensure_shape(shape)?;
    if scale.is_infinite() {
        return Ok(f64::INFINITY);
    }
    Ok(scale * (-(1.0 - u).ln()).powf(1.0 / shape))
}

/// Stirling's approximation `sqrt(2π/x)·(x/e)^x`.
pub fn gamma_approx(x: f64) -> FleetResult<f64> {
    if x <= 0.0 || x.is_nan() {
        return Err(FleetError::InvalidParameter(format!(
            "gamma is undefined for non-positive argument {x}"
        )));
    }
    Ok((2.0 * std::f64::consts::PI / x).sqrt() * (x / std::f64::consts::E).powf(x))
}

/// Weibull mean `scale · Γ(1 + 1/shape)`, used as the MTBF estimate.
pub fn weibull_mean(shape: f64, scale: f64) -> FleetResult<f64> {
    ensure_shape(shape)?;
    Ok(scale * gamma_approx(1.0 + 1.0 / shape)?)
}

fn ensure_shape(shape: f64) -> FleetResult<()> {
    if shape > 0.0 {
        Ok(())
    } else {
        Err(FleetError::InvalidParameter(format!(
            "weibull shape must be positive, got {shape}"
        )))
    }
}
