//! Laplace Mechanism for (ε, 0)-Differential Privacy
//!
//! For a numeric query f with L1 sensitivity Δf (the maximum change in f
//! when one record is added or removed), the mechanism releases
//!
//! ```text
//! M(D) = f(D) + Lap(0, Δf/ε)
//! ```
//!
//! which satisfies pure ε-DP: for neighboring datasets D, D' and any
//! output set S, P[M(D) ∈ S] ≤ e^ε · P[M(D') ∈ S].
//!
//! # Inverse CDF sampling
//!
//! For U ~ Uniform(-0.5, 0.5):
//!
//! ```text
//! X = -scale · sign(U) · ln(1 - 2|U|)  ~  Lap(0, scale)
//! ```

use super::rng::NoiseRng;
use super::validation::{validate_epsilon, validate_sensitivity, DpValidationError};

/// Laplace mechanism for (ε, 0)-differential privacy
pub struct LaplaceMechanism;

impl LaplaceMechanism {
    /// Sample from Lap(0, scale) via the inverse CDF.
    pub fn sample(rng: &mut NoiseRng, scale: f64) -> Result<f64, DpValidationError> {
        if !(scale > 0.0 && scale.is_finite()) {
            return Err(DpValidationError::InvalidSensitivity {
                value: scale,
                reason: "scale must be positive and finite".to_string(),
            });
        }
        let u = rng.centered();
        Ok(-scale * u.signum() * (1.0 - 2.0 * u.abs()).ln())
    }

    /// Release `value + Lap(0, sensitivity/epsilon)`.
    ///
    /// No clamping is applied: the raw noisy value is returned even when
    /// it falls outside the plausible range of the true statistic, since
    /// post-hoc clamping would bias repeated releases.
    pub fn add_noise(
        rng: &mut NoiseRng,
        value: f64,
        sensitivity: f64,
        epsilon: f64,
    ) -> Result<f64, DpValidationError> {
        let scale = Self::scale(sensitivity, epsilon)?;
        let noise = Self::sample(rng, scale)?;
        Ok(value + noise)
    }

    /// scale = Δf / ε
    pub fn scale(sensitivity: f64, epsilon: f64) -> Result<f64, DpValidationError> {
        validate_sensitivity(sensitivity)?;
        validate_epsilon(epsilon)?;
        Ok(sensitivity / epsilon)
    }

    /// Var(Lap(0, b)) = 2b² = 2(Δf/ε)²
    pub fn variance(sensitivity: f64, epsilon: f64) -> Result<f64, DpValidationError> {
        let scale = Self::scale(sensitivity, epsilon)?;
        Ok(2.0 * scale * scale)
    }

    /// SD = √2 · Δf/ε
    pub fn std_dev(sensitivity: f64, epsilon: f64) -> Result<f64, DpValidationError> {
        Ok(Self::variance(sensitivity, epsilon)?.sqrt())
    }
}
