//! Gaussian Mechanism for (ε, δ)-Differential Privacy
//!
//! For a numeric query f with L2 sensitivity Δ₂f, the mechanism releases
//!
//! ```text
//! M(D) = f(D) + N(0, σ²),   σ = Δ₂f · √(2 ln(1.25/δ)) / ε
//! ```
//!
//! which satisfies (ε, δ)-DP: P[M(D) ∈ S] ≤ e^ε · P[M(D') ∈ S] + δ. The
//! δ term is a small probability of privacy failure and must be > 0; use
//! the Laplace mechanism for pure ε-DP.
//!
//! # Box-Muller transform
//!
//! Standard normal samples come from the Box-Muller transform:
//!
//! ```text
//! Given U₁, U₂ ~ Uniform(0, 1):
//! Z = √(-2 ln U₁) · cos(2π U₂)  ~  N(0, 1)
//! ```

use super::rng::NoiseRng;
use super::validation::{
    validate_delta_positive, validate_epsilon, validate_sensitivity, DpValidationError,
};

/// Gaussian mechanism for (ε, δ)-differential privacy
pub struct GaussianMechanism;

impl GaussianMechanism {
    /// Sample from the standard normal N(0, 1).
    pub fn sample_standard_normal(rng: &mut NoiseRng) -> f64 {
        let (u1, u2) = rng.uniform_pair();
        (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
    }

    /// Sample from N(0, σ²).
    pub fn sample(rng: &mut NoiseRng, sigma: f64) -> Result<f64, DpValidationError> {
        if !(sigma > 0.0 && sigma.is_finite()) {
            return Err(DpValidationError::InvalidSensitivity {
                value: sigma,
                reason: "sigma must be positive and finite".to_string(),
            });
        }
        Ok(Self::sample_standard_normal(rng) * sigma)
    }

    /// σ = Δ₂f · √(2 ln(1.25/δ)) / ε
    pub fn sigma(sensitivity: f64, epsilon: f64, delta: f64) -> Result<f64, DpValidationError> {
        validate_sensitivity(sensitivity)?;
        validate_epsilon(epsilon)?;
        validate_delta_positive(delta)?;
        Ok(sensitivity * (2.0 * (1.25 / delta).ln()).sqrt() / epsilon)
    }

    /// Release `value + N(0, σ²)` with σ calibrated for (ε, δ)-DP.
    ///
    /// As with the Laplace mechanism, the raw noisy value is returned
    /// without clamping.
    pub fn add_noise(
        rng: &mut NoiseRng,
        value: f64,
        sensitivity: f64,
        epsilon: f64,
        delta: f64,
    ) -> Result<f64, DpValidationError> {
        let sigma = Self::sigma(sensitivity, epsilon, delta)?;
        let noise = Self::sample(rng, sigma)?;
        Ok(value + noise)
    }

    /// Var = σ²
    pub fn variance(sensitivity: f64, epsilon: f64, delta: f64) -> Result<f64, DpValidationError> {
        let sigma = Self::sigma(sensitivity, epsilon, delta)?;
        Ok(sigma * sigma)
    }
}
