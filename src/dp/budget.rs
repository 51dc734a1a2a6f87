//! Privacy Budget Ledger
//!
//! Each differentially private release consumes (ε, δ) budget. Without
//! accounting, an adversary can issue many queries and average the noise
//! away, so the ledger records every charge and refuses releases once the
//! allocation is spent.
//!
//! Composition is basic (additive): k releases at ε_i cost Σε_i total,
//! and likewise for δ. The bound is loose for many small queries but
//! never wrong, and it keeps the spent amount a plain sum the caller can
//! audit entry by entry.

use super::validation::{validate_delta, validate_epsilon, DpValidationError};
use serde::{Deserialize, Serialize};

/// Error type for budget operations
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum BudgetError {
    /// Insufficient budget remaining
    Exhausted { required: f64, remaining: f64 },
    /// Invalid budget parameters
    InvalidParameter(String),
}

impl std::fmt::Display for BudgetError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BudgetError::Exhausted { required, remaining } => {
                write!(
                    f,
                    "Privacy budget exhausted: need ε={:.4}, have ε={:.4}",
                    required, remaining
                )
            }
            BudgetError::InvalidParameter(msg) => write!(f, "Invalid parameter: {}", msg),
        }
    }
}

impl std::error::Error for BudgetError {}

impl From<DpValidationError> for BudgetError {
    fn from(e: DpValidationError) -> Self {
        BudgetError::InvalidParameter(e.to_string())
    }
}

/// One recorded charge against the budget
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetEntry {
    /// Caller-supplied label, e.g. the query description
    pub label: String,
    pub epsilon: f64,
    pub delta: f64,
}

/// Append-only ledger of privacy budget consumption
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetLedger {
    total_epsilon: f64,
    total_delta: f64,
    entries: Vec<BudgetEntry>,
}

impl BudgetLedger {
    /// Ledger for pure ε-DP releases (δ allocation of 0).
    pub fn new(total_epsilon: f64) -> Self {
        Self::with_delta(total_epsilon, 0.0)
    }

    /// Ledger with both ε and δ allocations.
    pub fn with_delta(total_epsilon: f64, total_delta: f64) -> Self {
        BudgetLedger {
            total_epsilon,
            total_delta,
            entries: Vec::new(),
        }
    }

    pub fn total_epsilon(&self) -> f64 {
        self.total_epsilon
    }

    pub fn total_delta(&self) -> f64 {
        self.total_delta
    }

    /// Sum of ε over all recorded charges.
    pub fn spent_epsilon(&self) -> f64 {
        self.entries.iter().map(|e| e.epsilon).sum()
    }

    /// Sum of δ over all recorded charges.
    pub fn spent_delta(&self) -> f64 {
        self.entries.iter().map(|e| e.delta).sum()
    }

    pub fn remaining_epsilon(&self) -> f64 {
        (self.total_epsilon - self.spent_epsilon()).max(0.0)
    }

    pub fn remaining_delta(&self) -> f64 {
        (self.total_delta - self.spent_delta()).max(0.0)
    }

    /// Number of charges recorded.
    pub fn query_count(&self) -> usize {
        self.entries.len()
    }

    /// The recorded charges, oldest first.
    pub fn entries(&self) -> &[BudgetEntry] {
        &self.entries
    }

    /// Whether a further (ε, δ) charge would fit.
    pub fn has_budget(&self, epsilon: f64, delta: f64) -> bool {
        self.spent_epsilon() + epsilon <= self.total_epsilon
            && self.spent_delta() + delta <= self.total_delta
    }

    /// Record a charge, failing without mutation if it would overdraw
    /// either allocation.
    pub fn charge(&mut self, label: &str, epsilon: f64, delta: f64) -> Result<(), BudgetError> {
        validate_epsilon(epsilon)?;
        validate_delta(delta)?;

        if self.spent_delta() + delta > self.total_delta {
            return Err(BudgetError::Exhausted {
                required: delta,
                remaining: self.remaining_delta(),
            });
        }
        if self.spent_epsilon() + epsilon > self.total_epsilon {
            return Err(BudgetError::Exhausted {
                required: epsilon,
                remaining: self.remaining_epsilon(),
            });
        }

        self.entries.push(BudgetEntry {
            label: label.to_string(),
            epsilon,
            delta,
        });
        Ok(())
    }

    /// Clear all charges, e.g. for a new accounting period.
    pub fn reset(&mut self) {
        self.entries.clear();
    }

    /// Effective ε of the recorded charges under advanced composition
    /// (Dwork et al. 2010) with failure probability δ'. Tighter than the
    /// additive `spent_epsilon` for many small charges; heterogeneous
    /// charges use their RMS ε.
    pub fn advanced_epsilon(&self, delta_prime: f64) -> f64 {
        if self.entries.is_empty() {
            return 0.0;
        }
        let k = self.entries.len() as f64;
        let sum_sq: f64 = self.entries.iter().map(|e| e.epsilon * e.epsilon).sum();
        let rms = (sum_sq / k).sqrt();
        advanced_composition(rms, self.entries.len(), delta_prime)
    }
}

/// Total ε of k mechanisms under basic composition: Σε_i.
pub fn basic_composition(epsilons: &[f64]) -> f64 {
    epsilons.iter().sum()
}

/// Total ε of k ε-DP mechanisms under advanced composition:
///
/// ```text
/// ε' = √(2k ln(1/δ')) · ε + k · ε · (e^ε - 1)
/// ```
pub fn advanced_composition(epsilon: f64, k: usize, delta_prime: f64) -> f64 {
    let k = k as f64;
    let term1 = (2.0 * k * (1.0 / delta_prime).ln()).sqrt() * epsilon;
    let term2 = k * epsilon * (epsilon.exp() - 1.0);
    term1 + term2
}
