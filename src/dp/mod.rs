//! Differential Privacy Engine
//!
//! Mathematically rigorous differential privacy primitives:
//! - Seedable cryptographic noise generation (ChaCha20)
//! - Laplace mechanism for (ε, 0)-DP
//! - Gaussian mechanism for (ε, δ)-DP
//! - Privacy budget ledger with additive composition
//! - Parameter validation
//!
//! Differential privacy ensures that for any two neighboring datasets D
//! and D' (differing in one record) and any output set S:
//!
//! ```text
//! P[M(D) ∈ S] ≤ e^ε · P[M(D') ∈ S] + δ
//! ```
//!
//! # Example
//!
//! ```rust
//! use anon_core::dp::{BudgetLedger, LaplaceMechanism, NoiseRng};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut rng = NoiseRng::from_entropy();
//! let mut ledger = BudgetLedger::new(1.0);
//!
//! // A count query has sensitivity 1.
//! ledger.charge("count:patients", 0.1, 0.0)?;
//! let noisy_count = LaplaceMechanism::add_noise(&mut rng, 42.0, 1.0, 0.1)?;
//! assert!(noisy_count.is_finite());
//! # Ok(())
//! # }
//! ```

pub mod budget;
pub mod gaussian;
pub mod laplace;
pub mod rng;
pub mod validation;

pub use budget::{BudgetEntry, BudgetError, BudgetLedger};
pub use gaussian::GaussianMechanism;
pub use laplace::LaplaceMechanism;
pub use rng::NoiseRng;
pub use validation::{validate_delta, validate_epsilon, validate_sensitivity, DpValidationError};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Noise mechanism selector.
///
/// Laplace gives pure ε-DP; Gaussian gives (ε, δ)-DP and requires a
/// δ > 0 alongside ε (see `query::NoiseParams`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mechanism {
    Laplace,
    Gaussian,
}

impl Mechanism {
    /// Parse a mechanism name as used on the wire and in the CLI.
    pub fn from_name(name: &str) -> Option<Mechanism> {
        match name {
            "laplace" => Some(Mechanism::Laplace),
            "gaussian" => Some(Mechanism::Gaussian),
            _ => None,
        }
    }
}

impl fmt::Display for Mechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mechanism::Laplace => write!(f, "laplace"),
            Mechanism::Gaussian => write!(f, "gaussian"),
        }
    }
}
