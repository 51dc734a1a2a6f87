//! Anon Core - Tabular Record Anonymization Library
//!
//! Pure Rust implementation of two independent anonymization engines for
//! structured tabular records:
//!
//! - **K-anonymity** via generalization (KACA clustering): records are
//!   partitioned into equivalence classes of size >= k by coarsening their
//!   quasi-identifier values through caller-configured hierarchies.
//! - **Differential privacy**: calibrated Laplace/Gaussian noise on raw
//!   numeric fields or on aggregate releases (count, sum, avg, histogram,
//!   percentile) under an (epsilon, mechanism) budget.
//!
//! Both paths report quantitative utility metrics (information loss,
//! MAE/MSE/RMSE, relative error) so callers can trade privacy against
//! usability.
//!
//! The core is stateless: every operation is a pure, synchronous function
//! of its inputs, treats the input records as read-only and returns freshly
//! allocated output. Storage, transport and audit logging belong to the
//! caller.
//!
//! # Example
//!
//! ```rust
//! use anon_core::{Record, Value, validate_k_anonymity};
//!
//! let mut row = Record::new();
//! row.insert("region".to_string(), Value::Text("Beijing".to_string()));
//! row.insert("age".to_string(), Value::Number(25.0));
//!
//! let records = vec![row.clone(), row.clone(), row];
//! let quasi = vec!["region".to_string(), "age".to_string()];
//!
//! let check = validate_k_anonymity(&records, &quasi, 3);
//! assert!(check.is_k_anonymous);
//! assert_eq!(check.min_class_size, 3);
//! ```

pub mod dp;
pub mod generalize;
pub mod kanon;
pub mod query;
pub mod utility;

// Re-export commonly used types for convenience
pub use dp::{
    BudgetError, BudgetLedger, DpValidationError, GaussianMechanism, LaplaceMechanism, Mechanism,
    NoiseRng,
};
pub use generalize::{GeneralizationRule, GeneralizationRules, GeneralizeError, SUPPRESSED};
pub use kanon::{
    assess_disclosure_risk, k_anonymize, validate_k_anonymity, AnonymizationResult,
    ClassStatistics, DisclosureRisk, KAnonError, KAnonymityCheck, RiskLevel,
};
pub use query::{
    dp_query, privatize_records, AggregateQuery, Bounds, NoiseParams, NoisyResult,
    PrivatizedTable, QueryError, QueryRelease, SensitivityBound,
};
pub use utility::{FieldError, PrivacyLevel, UtilityError, UtilityReport};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// An ordered field-name -> value mapping. Input records are never mutated;
/// every transformation returns new records.
pub type Record = IndexMap<String, Value>;

/// A scalar cell value.
///
/// `Interval` is produced by numeric generalization and represents the
/// half-open range `[lower, upper)`. Serde is untagged so plain JSON rows
/// (`{"age": 25, "region": "Beijing", "note": null}`) deserialize directly.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Absent / unknown value
    Null,
    /// Numeric value
    Number(f64),
    /// String value
    Text(String),
    /// Half-open numeric range `[lower, upper)` from generalization
    Interval { lower: f64, upper: f64 },
}

impl Value {
    /// The numeric content of the cell, if any: a number itself, or the
    /// midpoint of a generalized interval.
    pub fn numeric_center(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Interval { lower, upper } => Some((lower + upper) / 2.0),
            Value::Text(_) | Value::Null => None,
        }
    }

    /// The raw number, without interpreting intervals.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Type-discriminated key for exact grouping. Distinguishes
    /// `Text("5")` from `Number(5.0)` so equivalence classes never
    /// conflate cells of different types.
    pub(crate) fn cell_key(&self) -> String {
        match self {
            Value::Null => "\u{2205}".to_string(),
            Value::Number(n) => format!("n:{}", n),
            Value::Text(s) => format!("t:{}", s),
            Value::Interval { lower, upper } => format!("i:{}:{}", lower, upper),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Number(n) => write!(f, "{}", n),
            Value::Text(s) => write!(f, "{}", s),
            Value::Interval { lower, upper } => write!(f, "[{}, {})", lower, upper),
        }
    }
}
