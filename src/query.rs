//! Differential Privacy Query Engine
//!
//! Privatizes either a whole table (per-cell noise on declared numeric
//! fields) or a single aggregate release: count, sum, average, histogram
//! or percentile. Every release carries its ε, δ, mechanism and
//! sensitivity so a caller-side [`BudgetLedger`](crate::dp::BudgetLedger)
//! can account for it.
//!
//! Sensitivity is never inferred from the data (the true min/max of a
//! column is itself private); callers declare per-field bounds and the
//! engine derives Δ = upper − lower from them. A count has Δ = 1.
//!
//! # Averages
//!
//! An average release divides a noisy sum by a noisy count, each drawn
//! at the full ε. The two draws do not compose to ε overall; this
//! follows the classic noisy-sum/noisy-count construction and is the
//! caller's ledger concern. The noisy denominator is floored at 1.0 so
//! the division cannot blow up.
//!
//! # Histograms
//!
//! One bucket per distinct value with independent Δ = 1 noise per
//! bucket. Buckets partition the records, so the release costs a single
//! ε under parallel composition. Bucket sums are not reconciled with a
//! total: summing noisy buckets gives a different (and noisier) figure
//! than a direct count release.

use crate::dp::{
    BudgetError, DpValidationError, GaussianMechanism, LaplaceMechanism, Mechanism, NoiseRng,
};
use crate::utility::{FieldError, UtilityReport};
use crate::{Record, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Errors from privatization and aggregate queries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QueryError {
    /// Query-type string did not name a known aggregate
    UnknownQueryType(String),
    /// A field needs declared bounds and has none
    MissingBounds(String),
    /// No record carries a numeric value for the queried field
    MissingField(String),
    /// Declared bounds are not a proper interval
    InvalidBounds { field: String, lower: f64, upper: f64 },
    /// Percentile outside [0, 100]
    InvalidPercentile(f64),
    /// Noise parameters failed validation
    Validation(DpValidationError),
    /// Budget accounting refused the release
    Budget(BudgetError),
}

impl std::fmt::Display for QueryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueryError::UnknownQueryType(name) => write!(f, "Unknown query type '{}'", name),
            QueryError::MissingBounds(field) => {
                write!(f, "No bounds declared for field '{}'", field)
            }
            QueryError::MissingField(field) => {
                write!(f, "No numeric values for field '{}'", field)
            }
            QueryError::InvalidBounds { field, lower, upper } => {
                write!(f, "Invalid bounds [{}, {}] for field '{}'", lower, upper, field)
            }
            QueryError::InvalidPercentile(p) => {
                write!(f, "Percentile {} outside [0, 100]", p)
            }
            QueryError::Validation(e) => write!(f, "Validation error: {}", e),
            QueryError::Budget(e) => write!(f, "Budget error: {}", e),
        }
    }
}

impl std::error::Error for QueryError {}

impl From<DpValidationError> for QueryError {
    fn from(e: DpValidationError) -> Self {
        QueryError::Validation(e)
    }
}

impl From<BudgetError> for QueryError {
    fn from(e: BudgetError) -> Self {
        QueryError::Budget(e)
    }
}

/// Declared value range of a numeric field.
///
/// The width `upper - lower` is the L1 sensitivity of a sum over the
/// field (one record can move the sum by at most the width).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensitivityBound {
    pub lower: f64,
    pub upper: f64,
}

impl SensitivityBound {
    pub fn new(lower: f64, upper: f64) -> Result<Self, QueryError> {
        let bound = SensitivityBound { lower, upper };
        bound.validate("")?;
        Ok(bound)
    }

    fn validate(&self, field: &str) -> Result<(), QueryError> {
        if !self.lower.is_finite() || !self.upper.is_finite() || self.upper <= self.lower {
            return Err(QueryError::InvalidBounds {
                field: field.to_string(),
                lower: self.lower,
                upper: self.upper,
            });
        }
        Ok(())
    }

    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }
}

/// Per-field declared bounds
pub type Bounds = BTreeMap<String, SensitivityBound>;

fn bound_for<'a>(bounds: &'a Bounds, field: &str) -> Result<&'a SensitivityBound, QueryError> {
    let bound = bounds
        .get(field)
        .ok_or_else(|| QueryError::MissingBounds(field.to_string()))?;
    bound.validate(field)?;
    Ok(bound)
}

/// Noise configuration for a release: ε, optional δ, mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoiseParams {
    pub epsilon: f64,
    /// Required (and > 0) for Gaussian, ignored for Laplace
    pub delta: Option<f64>,
    pub mechanism: Mechanism,
}

impl NoiseParams {
    pub fn laplace(epsilon: f64) -> Self {
        NoiseParams {
            epsilon,
            delta: None,
            mechanism: Mechanism::Laplace,
        }
    }

    pub fn gaussian(epsilon: f64, delta: f64) -> Self {
        NoiseParams {
            epsilon,
            delta: Some(delta),
            mechanism: Mechanism::Gaussian,
        }
    }

    /// The δ a release with these parameters consumes (0 for Laplace).
    pub fn delta_spent(&self) -> f64 {
        match self.mechanism {
            Mechanism::Laplace => 0.0,
            Mechanism::Gaussian => self.delta.unwrap_or(0.0),
        }
    }

    /// Validate the parameters before any noise is drawn.
    pub fn validate(&self) -> Result<(), QueryError> {
        crate::dp::validate_epsilon(self.epsilon)?;
        if self.mechanism == Mechanism::Gaussian {
            let delta = self.delta.ok_or(DpValidationError::InvalidDelta {
                value: 0.0,
                reason: "Gaussian mechanism requires delta".to_string(),
            })?;
            crate::dp::validation::validate_delta_positive(delta)?;
        }
        Ok(())
    }

    fn add_noise(
        &self,
        rng: &mut NoiseRng,
        value: f64,
        sensitivity: f64,
    ) -> Result<f64, QueryError> {
        let noisy = match self.mechanism {
            Mechanism::Laplace => {
                LaplaceMechanism::add_noise(rng, value, sensitivity, self.epsilon)?
            }
            Mechanism::Gaussian => {
                let delta = self.delta.unwrap_or(0.0);
                GaussianMechanism::add_noise(rng, value, sensitivity, self.epsilon, delta)?
            }
        };
        Ok(noisy)
    }
}

/// An aggregate release over one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AggregateQuery {
    /// Number of records; Δ = 1
    Count,
    /// Sum of a bounded numeric field; Δ = bound width
    Sum { field: String },
    /// Noisy sum / noisy count, two independent draws
    Average { field: String },
    /// Per-distinct-value counts; Δ = 1 per bucket
    Histogram { field: String },
    /// Noisy order statistic; Δ = bound width
    Percentile { field: String, percentile: f64 },
}

impl AggregateQuery {
    /// Parse an untyped query description, as the CLI receives it.
    pub fn parse(
        kind: &str,
        field: Option<&str>,
        percentile: Option<f64>,
    ) -> Result<Self, QueryError> {
        let field_for = |kind: &str| {
            field
                .map(str::to_string)
                .ok_or_else(|| QueryError::MissingField(format!("{} requires a field", kind)))
        };
        match kind {
            "count" => Ok(AggregateQuery::Count),
            "sum" => Ok(AggregateQuery::Sum { field: field_for("sum")? }),
            "avg" | "average" => Ok(AggregateQuery::Average { field: field_for("avg")? }),
            "histogram" => Ok(AggregateQuery::Histogram { field: field_for("histogram")? }),
            "percentile" => Ok(AggregateQuery::Percentile {
                field: field_for("percentile")?,
                percentile: percentile.unwrap_or(50.0),
            }),
            other => Err(QueryError::UnknownQueryType(other.to_string())),
        }
    }
}

/// The noisy payload of a release.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NoisyResult {
    /// A single noisy value, unrounded and unclamped
    Scalar(f64),
    /// Noisy count per bucket, keyed by the bucket's display value
    Histogram(BTreeMap<String, f64>),
}

/// One aggregate release with its full privacy-accounting record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRelease {
    pub query: AggregateQuery,
    pub result: NoisyResult,
    pub epsilon: f64,
    pub delta: f64,
    pub mechanism: Mechanism,
    pub sensitivity: f64,
}

/// A whole-table privatization release.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrivatizedTable {
    pub records: Vec<Record>,
    pub utility: UtilityReport,
    pub epsilon: f64,
    pub delta: f64,
    pub mechanism: Mechanism,
}

/// Numeric values of `field` across the table, skipping null, missing
/// and non-numeric cells.
fn numeric_column(records: &[Record], field: &str) -> Vec<f64> {
    records
        .iter()
        .filter_map(|r| r.get(field).and_then(Value::as_number))
        .collect()
}

/// Add calibrated noise to every numeric cell of the declared fields.
///
/// Each declared field must have bounds; its per-cell sensitivity is the
/// bound width. Null, missing and non-numeric cells pass through
/// untouched. Input records are never mutated.
pub fn privatize_records(
    records: &[Record],
    numeric_fields: &[String],
    bounds: &Bounds,
    params: &NoiseParams,
    rng: &mut NoiseRng,
) -> Result<PrivatizedTable, QueryError> {
    params.validate()?;
    for field in numeric_fields {
        bound_for(bounds, field)?;
    }

    let mut output: Vec<Record> = records.to_vec();
    let mut originals: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    let mut noisies: BTreeMap<&str, Vec<f64>> = BTreeMap::new();

    for field in numeric_fields {
        let sensitivity = bound_for(bounds, field)?.width();
        for record in output.iter_mut() {
            let original = match record.get(field).and_then(Value::as_number) {
                Some(v) => v,
                None => continue,
            };
            let noisy = params.add_noise(rng, original, sensitivity)?;
            record.insert(field.clone(), Value::Number(noisy));
            originals.entry(field).or_default().push(original);
            noisies.entry(field).or_default().push(noisy);
        }
    }

    let mut field_errors = BTreeMap::new();
    for (field, original) in &originals {
        // Lengths are equal by construction
        if let Ok(err) = FieldError::between(original, &noisies[field]) {
            field_errors.insert(field.to_string(), err);
        }
    }

    Ok(PrivatizedTable {
        records: output,
        utility: UtilityReport::for_dp(params.epsilon, field_errors),
        epsilon: params.epsilon,
        delta: params.delta_spent(),
        mechanism: params.mechanism,
    })
}

/// Answer one aggregate query with calibrated noise.
///
/// Count succeeds on an empty table (`0 + noise`); the other aggregates
/// need at least one numeric value for their field and fail with
/// `MissingField` otherwise.
pub fn dp_query(
    records: &[Record],
    query: &AggregateQuery,
    params: &NoiseParams,
    bounds: &Bounds,
    rng: &mut NoiseRng,
) -> Result<QueryRelease, QueryError> {
    params.validate()?;

    let (result, sensitivity) = match query {
        AggregateQuery::Count => {
            let noisy = params.add_noise(rng, records.len() as f64, 1.0)?;
            (NoisyResult::Scalar(noisy), 1.0)
        }
        AggregateQuery::Sum { field } => {
            let sensitivity = bound_for(bounds, field)?.width();
            let values = numeric_column(records, field);
            if values.is_empty() {
                return Err(QueryError::MissingField(field.clone()));
            }
            let noisy = params.add_noise(rng, values.iter().sum(), sensitivity)?;
            (NoisyResult::Scalar(noisy), sensitivity)
        }
        AggregateQuery::Average { field } => {
            let sensitivity = bound_for(bounds, field)?.width();
            let values = numeric_column(records, field);
            if values.is_empty() {
                return Err(QueryError::MissingField(field.clone()));
            }
            let noisy_sum = params.add_noise(rng, values.iter().sum(), sensitivity)?;
            let noisy_count = params.add_noise(rng, values.len() as f64, 1.0)?.max(1.0);
            (NoisyResult::Scalar(noisy_sum / noisy_count), sensitivity)
        }
        AggregateQuery::Histogram { field } => {
            let mut buckets: BTreeMap<String, f64> = BTreeMap::new();
            for record in records {
                match record.get(field) {
                    None | Some(Value::Null) => continue,
                    Some(value) => *buckets.entry(value.to_string()).or_insert(0.0) += 1.0,
                }
            }
            if buckets.is_empty() {
                return Err(QueryError::MissingField(field.clone()));
            }
            let mut noisy = BTreeMap::new();
            for (bucket, count) in buckets {
                noisy.insert(bucket, params.add_noise(rng, count, 1.0)?);
            }
            (NoisyResult::Histogram(noisy), 1.0)
        }
        AggregateQuery::Percentile { field, percentile } => {
            if !(0.0..=100.0).contains(percentile) {
                return Err(QueryError::InvalidPercentile(*percentile));
            }
            let sensitivity = bound_for(bounds, field)?.width();
            let mut values = numeric_column(records, field);
            if values.is_empty() {
                return Err(QueryError::MissingField(field.clone()));
            }
            values.sort_by(|a, b| a.total_cmp(b));
            let idx = ((values.len() as f64 * percentile / 100.0) as usize).min(values.len() - 1);
            let noisy = params.add_noise(rng, values[idx], sensitivity)?;
            (NoisyResult::Scalar(noisy), sensitivity)
        }
    };

    Ok(QueryRelease {
        query: query.clone(),
        result,
        epsilon: params.epsilon,
        delta: params.delta_spent(),
        mechanism: params.mechanism,
        sensitivity,
    })
}
