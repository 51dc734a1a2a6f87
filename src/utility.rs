//! Utility / Error Reporting
//!
//! Quantifies how much usefulness an anonymization pass sacrificed:
//! per-field error metrics (MAE, MSE, RMSE, mean relative error) between
//! original and transformed numeric series, a coarse privacy-level label
//! derived from epsilon or k, and a `data_utility` fraction in `[0, 1]`.
//!
//! The relative-error denominator is floored at a small fixed constant to
//! avoid division by zero; this floor is unrelated to the privacy budget.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Denominator floor for relative error (not a privacy parameter).
pub const RELATIVE_ERROR_FLOOR: f64 = 1e-9;

/// Errors from utility computation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum UtilityError {
    /// Original and transformed series have different lengths
    LengthMismatch { original: usize, transformed: usize },
}

impl std::fmt::Display for UtilityError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UtilityError::LengthMismatch { original, transformed } => write!(
                f,
                "Series length mismatch: {} original vs {} transformed",
                original, transformed
            ),
        }
    }
}

impl std::error::Error for UtilityError {}

/// Coarse privacy classification of a release
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrivacyLevel {
    Low,
    Medium,
    High,
}

impl PrivacyLevel {
    /// Classification from a differential privacy budget:
    /// eps <= 0.5 high, 0.5 < eps <= 1.5 medium, eps > 1.5 low.
    pub fn from_epsilon(epsilon: f64) -> Self {
        if epsilon <= 0.5 {
            PrivacyLevel::High
        } else if epsilon <= 1.5 {
            PrivacyLevel::Medium
        } else {
            PrivacyLevel::Low
        }
    }

    /// Classification from a k-anonymity parameter:
    /// k >= 10 high, 5 <= k < 10 medium, k < 5 low.
    pub fn from_k(k: usize) -> Self {
        if k >= 10 {
            PrivacyLevel::High
        } else if k >= 5 {
            PrivacyLevel::Medium
        } else {
            PrivacyLevel::Low
        }
    }
}

impl std::fmt::Display for PrivacyLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PrivacyLevel::Low => write!(f, "low"),
            PrivacyLevel::Medium => write!(f, "medium"),
            PrivacyLevel::High => write!(f, "high"),
        }
    }
}

/// Error metrics for one field's paired (original, transformed) series
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FieldError {
    pub mae: f64,
    pub mse: f64,
    pub rmse: f64,
    /// Mean of |orig - transformed| / max(|orig|, floor)
    pub relative_error: f64,
}

impl FieldError {
    /// Compute metrics over equal-length paired series.
    pub fn between(original: &[f64], transformed: &[f64]) -> Result<Self, UtilityError> {
        if original.len() != transformed.len() {
            return Err(UtilityError::LengthMismatch {
                original: original.len(),
                transformed: transformed.len(),
            });
        }
        if original.is_empty() {
            return Ok(FieldError {
                mae: 0.0,
                mse: 0.0,
                rmse: 0.0,
                relative_error: 0.0,
            });
        }

        let n = original.len() as f64;
        let mut abs_sum = 0.0;
        let mut sq_sum = 0.0;
        let mut rel_sum = 0.0;
        for (&orig, &trans) in original.iter().zip(transformed.iter()) {
            let diff = (orig - trans).abs();
            abs_sum += diff;
            sq_sum += diff * diff;
            rel_sum += diff / orig.abs().max(RELATIVE_ERROR_FLOOR);
        }

        let mse = sq_sum / n;
        Ok(FieldError {
            mae: abs_sum / n,
            mse,
            rmse: mse.sqrt(),
            relative_error: rel_sum / n,
        })
    }
}

/// Privacy/utility summary for one anonymization or privatization run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UtilityReport {
    /// Per-field error metrics for numeric fields that were transformed
    pub field_errors: BTreeMap<String, FieldError>,
    /// Coarse privacy classification (from epsilon or k)
    pub privacy_level: PrivacyLevel,
    /// Retained usefulness in `[0, 1]`
    pub data_utility: f64,
}

impl UtilityReport {
    /// Report for a differential privacy release: utility is
    /// `1 - mean relative error` across fields, clamped to `[0, 1]`.
    pub fn for_dp(epsilon: f64, field_errors: BTreeMap<String, FieldError>) -> Self {
        let data_utility = if field_errors.is_empty() {
            1.0
        } else {
            let mean_rel: f64 = field_errors.values().map(|e| e.relative_error).sum::<f64>()
                / field_errors.len() as f64;
            (1.0 - mean_rel).clamp(0.0, 1.0)
        };
        UtilityReport {
            field_errors,
            privacy_level: PrivacyLevel::from_epsilon(epsilon),
            data_utility,
        }
    }

    /// Report for a k-anonymity run: utility is `1 - information_loss`,
    /// clamped to `[0, 1]`.
    pub fn for_k_anonymity(
        k: usize,
        information_loss: f64,
        field_errors: BTreeMap<String, FieldError>,
    ) -> Self {
        UtilityReport {
            field_errors,
            privacy_level: PrivacyLevel::from_k(k),
            data_utility: (1.0 - information_loss).clamp(0.0, 1.0),
        }
    }
}
