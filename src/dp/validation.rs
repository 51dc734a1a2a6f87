//! Validation of Differential Privacy Parameters
//!
//! # Parameter Constraints
//!
//! ## Epsilon (ε)
//! - Must be positive and finite
//! - Smaller = more private, but more noise
//! - Typical values: 0.01 (very private) to 1.0 (less private)
//!
//! ## Delta (δ)
//! - Must be in [0, 1), should be cryptographically small (< 1/n)
//! - δ = 0 gives pure ε-DP (Laplace mechanism)
//! - The Gaussian mechanism requires δ > 0
//!
//! ## Sensitivity (Δf)
//! - Must be positive and finite
//! - Count query: Δf = 1; bounded sum: Δf = upper - lower;
//!   histogram: Δf = 1 per bucket

use serde::{Deserialize, Serialize};

/// Error type for DP parameter validation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum DpValidationError {
    /// Epsilon is invalid
    InvalidEpsilon { value: f64, reason: String },
    /// Delta is invalid
    InvalidDelta { value: f64, reason: String },
    /// Sensitivity is invalid
    InvalidSensitivity { value: f64, reason: String },
}

impl std::fmt::Display for DpValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DpValidationError::InvalidEpsilon { value, reason } => {
                write!(f, "Invalid epsilon {}: {}", value, reason)
            }
            DpValidationError::InvalidDelta { value, reason } => {
                write!(f, "Invalid delta {}: {}", value, reason)
            }
            DpValidationError::InvalidSensitivity { value, reason } => {
                write!(f, "Invalid sensitivity {}: {}", value, reason)
            }
        }
    }
}

impl std::error::Error for DpValidationError {}

/// Minimum allowed epsilon (below this the noise scale overflows any
/// useful range)
pub const MIN_EPSILON: f64 = 1e-10;

/// Maximum allowed delta
pub const MAX_DELTA: f64 = 0.01;

/// Minimum allowed sensitivity
pub const MIN_SENSITIVITY: f64 = 1e-15;

/// Validate the epsilon privacy parameter: positive, finite, >= MIN_EPSILON.
pub fn validate_epsilon(epsilon: f64) -> Result<(), DpValidationError> {
    if !epsilon.is_finite() {
        return Err(DpValidationError::InvalidEpsilon {
            value: epsilon,
            reason: "epsilon must be a finite number".to_string(),
        });
    }
    if epsilon <= 0.0 {
        return Err(DpValidationError::InvalidEpsilon {
            value: epsilon,
            reason: "epsilon must be positive".to_string(),
        });
    }
    if epsilon < MIN_EPSILON {
        return Err(DpValidationError::InvalidEpsilon {
            value: epsilon,
            reason: format!("epsilon too small (< {}): would add unbounded noise", MIN_EPSILON),
        });
    }
    Ok(())
}

/// Validate the delta failure probability: finite, in [0, MAX_DELTA].
pub fn validate_delta(delta: f64) -> Result<(), DpValidationError> {
    if !delta.is_finite() {
        return Err(DpValidationError::InvalidDelta {
            value: delta,
            reason: "delta must be a finite number".to_string(),
        });
    }
    if delta < 0.0 {
        return Err(DpValidationError::InvalidDelta {
            value: delta,
            reason: "delta must be non-negative".to_string(),
        });
    }
    if delta >= 1.0 {
        return Err(DpValidationError::InvalidDelta {
            value: delta,
            reason: "delta must be less than 1".to_string(),
        });
    }
    if delta > MAX_DELTA {
        return Err(DpValidationError::InvalidDelta {
            value: delta,
            reason: format!("delta too large (> {}): privacy guarantee too weak", MAX_DELTA),
        });
    }
    Ok(())
}

/// Validate delta for the Gaussian mechanism, which cannot run with δ = 0.
pub fn validate_delta_positive(delta: f64) -> Result<(), DpValidationError> {
    validate_delta(delta)?;
    if delta == 0.0 {
        return Err(DpValidationError::InvalidDelta {
            value: delta,
            reason: "Gaussian mechanism requires delta > 0".to_string(),
        });
    }
    Ok(())
}

/// Validate query sensitivity: positive, finite, >= MIN_SENSITIVITY.
pub fn validate_sensitivity(sensitivity: f64) -> Result<(), DpValidationError> {
    if !sensitivity.is_finite() {
        return Err(DpValidationError::InvalidSensitivity {
            value: sensitivity,
            reason: "sensitivity must be a finite number".to_string(),
        });
    }
    if sensitivity <= 0.0 {
        return Err(DpValidationError::InvalidSensitivity {
            value: sensitivity,
            reason: "sensitivity must be positive".to_string(),
        });
    }
    if sensitivity < MIN_SENSITIVITY {
        return Err(DpValidationError::InvalidSensitivity {
            value: sensitivity,
            reason: "sensitivity too small: likely a computation error".to_string(),
        });
    }
    Ok(())
}
