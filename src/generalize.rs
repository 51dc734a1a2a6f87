//! Generalization Hierarchies
//!
//! Per-attribute rules that map a raw value to a coarser value at a given
//! generalization level. Level 0 is always the identity; each higher level
//! must be a strict coarsening of the previous one (fewer distinct outputs),
//! which is validated once when a rule is registered.
//!
//! Two strategies exist, as a closed enum resolved at configuration time:
//!
//! - `Categorical`: a caller-supplied taxonomy. `levels[i]` maps a level-i
//!   value to its level-(i+1) ancestor (e.g. city -> province -> region).
//!   Values outside the taxonomy generalize to the suppression marker `"*"`.
//! - `NumericRange`: bucketing into half-open ranges `[lower, upper)` whose
//!   width grows per level (doubling by default, or explicitly configured).
//!
//! No canonical default hierarchy is built in: depth and content are
//! entirely caller configuration.

use crate::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Marker for values that cannot be placed in a configured taxonomy.
pub const SUPPRESSED: &str = "*";

/// Errors from generalization configuration or application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GeneralizeError {
    /// No rule registered for the field
    UnsupportedField(String),
    /// Requested level exceeds the field's configured maximum
    InvalidLevel { field: String, level: usize, max: usize },
    /// A level does not strictly coarsen the previous one
    NonMonotonic { field: String, level: usize },
    /// A bucket width is not a positive finite number
    InvalidWidth { field: String, width: f64 },
}

impl std::fmt::Display for GeneralizeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GeneralizeError::UnsupportedField(field) => {
                write!(f, "No generalization rule registered for field '{}'", field)
            }
            GeneralizeError::InvalidLevel { field, level, max } => {
                write!(
                    f,
                    "Level {} exceeds maximum {} for field '{}'",
                    level, max, field
                )
            }
            GeneralizeError::NonMonotonic { field, level } => {
                write!(
                    f,
                    "Level {} of field '{}' does not strictly reduce distinct values",
                    level, field
                )
            }
            GeneralizeError::InvalidWidth { field, width } => {
                write!(f, "Invalid bucket width {} for field '{}'", width, field)
            }
        }
    }
}

impl std::error::Error for GeneralizeError {}

/// A per-field generalization strategy
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeneralizationRule {
    /// Caller-supplied taxonomy: `levels[i]` maps level-i values to their
    /// level-(i+1) ancestor.
    Categorical { levels: Vec<BTreeMap<String, String>> },
    /// Range bucketing anchored at `origin`: `widths[i]` is the bucket
    /// width at level i+1. Widths must be strictly increasing.
    NumericRange { origin: f64, widths: Vec<f64> },
}

impl GeneralizationRule {
    /// Categorical taxonomy from explicit per-level maps.
    pub fn categorical(levels: Vec<BTreeMap<String, String>>) -> Self {
        GeneralizationRule::Categorical { levels }
    }

    /// Numeric bucketing with explicit widths.
    pub fn numeric(origin: f64, widths: Vec<f64>) -> Self {
        GeneralizationRule::NumericRange { origin, widths }
    }

    /// Numeric bucketing whose width doubles per level:
    /// `[base, 2*base, 4*base, ...]` for `level_count` levels.
    pub fn numeric_doubling(origin: f64, base_width: f64, level_count: usize) -> Self {
        let widths = (0..level_count)
            .map(|i| base_width * (1u64 << i) as f64)
            .collect();
        GeneralizationRule::NumericRange { origin, widths }
    }

    /// Highest level this rule supports (level 0 is always the identity).
    pub fn max_level(&self) -> usize {
        match self {
            GeneralizationRule::Categorical { levels } => levels.len(),
            GeneralizationRule::NumericRange { widths, .. } => widths.len(),
        }
    }

    /// Check the strict-coarsening invariant.
    ///
    /// Categorical: each level's distinct outputs must be fewer than its
    /// distinct inputs. Numeric: widths must be positive, finite and
    /// strictly increasing.
    fn validate(&self, field: &str) -> Result<(), GeneralizeError> {
        match self {
            GeneralizationRule::Categorical { levels } => {
                for (i, map) in levels.iter().enumerate() {
                    let inputs = map.len();
                    let outputs: std::collections::BTreeSet<&String> = map.values().collect();
                    if inputs == 0 || outputs.len() >= inputs {
                        return Err(GeneralizeError::NonMonotonic {
                            field: field.to_string(),
                            level: i + 1,
                        });
                    }
                }
                Ok(())
            }
            GeneralizationRule::NumericRange { widths, .. } => {
                let mut prev = 0.0_f64;
                for (i, &w) in widths.iter().enumerate() {
                    if !w.is_finite() || w <= 0.0 {
                        return Err(GeneralizeError::InvalidWidth {
                            field: field.to_string(),
                            width: w,
                        });
                    }
                    if w <= prev {
                        return Err(GeneralizeError::NonMonotonic {
                            field: field.to_string(),
                            level: i + 1,
                        });
                    }
                    prev = w;
                }
                Ok(())
            }
        }
    }

    fn apply(&self, field: &str, value: &Value, level: usize) -> Result<Value, GeneralizeError> {
        if level == 0 {
            return Ok(value.clone());
        }
        let max = self.max_level();
        if level > max {
            return Err(GeneralizeError::InvalidLevel {
                field: field.to_string(),
                level,
                max,
            });
        }
        if matches!(value, Value::Null) {
            return Ok(Value::Null);
        }
        match self {
            GeneralizationRule::Categorical { levels } => {
                let mut current = value.to_string();
                for map in levels.iter().take(level) {
                    match map.get(&current) {
                        Some(parent) => current = parent.clone(),
                        None => return Ok(Value::Text(SUPPRESSED.to_string())),
                    }
                }
                Ok(Value::Text(current))
            }
            GeneralizationRule::NumericRange { origin, widths } => {
                // Intervals re-enter as their midpoint; generalization always
                // works from the ungeneralized record otherwise.
                let n = match value.numeric_center() {
                    Some(n) => n,
                    None => return Ok(Value::Null),
                };
                let width = widths[level - 1];
                let lower = ((n - origin) / width).floor() * width + origin;
                Ok(Value::Interval {
                    lower,
                    upper: lower + width,
                })
            }
        }
    }

    /// Generalization steps from two level-`level` categorical values up to
    /// a common ancestor. `0` for equal values; `max_level - level + 1` when
    /// no common ancestor exists within the taxonomy.
    fn ancestor_distance(&self, a: &str, b: &str, level: usize) -> usize {
        let no_ancestor = self.max_level().saturating_sub(level) + 1;
        if a == b {
            return 0;
        }
        if let GeneralizationRule::Categorical { levels } = self {
            let mut ca = a.to_string();
            let mut cb = b.to_string();
            for (steps, map) in levels.iter().enumerate().skip(level) {
                match (map.get(&ca), map.get(&cb)) {
                    (Some(pa), Some(pb)) => {
                        ca = pa.clone();
                        cb = pb.clone();
                        if ca == cb {
                            return steps - level + 1;
                        }
                    }
                    _ => return no_ancestor,
                }
            }
        }
        no_ancestor
    }
}

/// Per-field rule registry, validated once at configuration time.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GeneralizationRules {
    rules: BTreeMap<String, GeneralizationRule>,
}

impl GeneralizationRules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a rule for a field, rejecting non-monotonic hierarchies.
    pub fn register(
        &mut self,
        field: impl Into<String>,
        rule: GeneralizationRule,
    ) -> Result<(), GeneralizeError> {
        let field = field.into();
        rule.validate(&field)?;
        self.rules.insert(field, rule);
        Ok(())
    }

    /// Re-validate all rules (for registries deserialized from config).
    pub fn validate(&self) -> Result<(), GeneralizeError> {
        for (field, rule) in &self.rules {
            rule.validate(field)?;
        }
        Ok(())
    }

    pub fn rule(&self, field: &str) -> Option<&GeneralizationRule> {
        self.rules.get(field)
    }

    /// The field's level ceiling, or `UnsupportedField`.
    pub fn max_level(&self, field: &str) -> Result<usize, GeneralizeError> {
        self.rules
            .get(field)
            .map(GeneralizationRule::max_level)
            .ok_or_else(|| GeneralizeError::UnsupportedField(field.to_string()))
    }

    /// Generalize one value of `field` to the given level. Pure; fails with
    /// `UnsupportedField` or `InvalidLevel`, never mutates.
    pub fn generalize(
        &self,
        field: &str,
        value: &Value,
        level: usize,
    ) -> Result<Value, GeneralizeError> {
        let rule = self
            .rules
            .get(field)
            .ok_or_else(|| GeneralizeError::UnsupportedField(field.to_string()))?;
        rule.apply(field, value, level)
    }

    /// Distance between two generalized cell values of the same field, used
    /// for nearest-class merging. Numeric cells compare range midpoints;
    /// categorical cells count generalization steps to a common ancestor.
    pub fn value_distance(&self, field: &str, a: &Value, b: &Value, level: usize) -> f64 {
        if a.cell_key() == b.cell_key() {
            return 0.0;
        }
        if let (Some(ca), Some(cb)) = (a.numeric_center(), b.numeric_center()) {
            return (ca - cb).abs();
        }
        match (self.rules.get(field), a, b) {
            (Some(rule @ GeneralizationRule::Categorical { .. }), Value::Text(ta), Value::Text(tb)) => {
                rule.ancestor_distance(ta, tb, level) as f64
            }
            // Mixed or unknown types: maximal penalty for this field
            (Some(rule), _, _) => (rule.max_level() + 1) as f64,
            (None, _, _) => 1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn city_rule() -> GeneralizationRule {
        let mut to_province = BTreeMap::new();
        to_province.insert("Beijing".to_string(), "Hebei Region".to_string());
        to_province.insert("Tianjin".to_string(), "Hebei Region".to_string());
        to_province.insert("Shanghai".to_string(), "Yangtze Region".to_string());
        to_province.insert("Suzhou".to_string(), "Yangtze Region".to_string());
        let mut to_country = BTreeMap::new();
        to_country.insert("Hebei Region".to_string(), "China".to_string());
        to_country.insert("Yangtze Region".to_string(), "China".to_string());
        GeneralizationRule::categorical(vec![to_province, to_country])
    }

    #[test]
    fn test_level_zero_is_identity() {
        let mut rules = GeneralizationRules::new();
        rules.register("city", city_rule()).unwrap();
        let v = Value::Text("Beijing".to_string());
        assert_eq!(rules.generalize("city", &v, 0).unwrap(), v);
    }

    #[test]
    fn test_categorical_chain() {
        let mut rules = GeneralizationRules::new();
        rules.register("city", city_rule()).unwrap();
        let v = Value::Text("Beijing".to_string());
        assert_eq!(
            rules.generalize("city", &v, 1).unwrap(),
            Value::Text("Hebei Region".to_string())
        );
        assert_eq!(
            rules.generalize("city", &v, 2).unwrap(),
            Value::Text("China".to_string())
        );
    }

    #[test]
    fn test_unknown_value_suppressed() {
        let mut rules = GeneralizationRules::new();
        rules.register("city", city_rule()).unwrap();
        let v = Value::Text("Atlantis".to_string());
        assert_eq!(
            rules.generalize("city", &v, 1).unwrap(),
            Value::Text(SUPPRESSED.to_string())
        );
    }

    #[test]
    fn test_invalid_level() {
        let mut rules = GeneralizationRules::new();
        rules.register("city", city_rule()).unwrap();
        let v = Value::Text("Beijing".to_string());
        let err = rules.generalize("city", &v, 3).unwrap_err();
        assert!(matches!(err, GeneralizeError::InvalidLevel { level: 3, max: 2, .. }));
    }

    #[test]
    fn test_unsupported_field() {
        let rules = GeneralizationRules::new();
        let err = rules.generalize("job", &Value::Null, 1).unwrap_err();
        assert_eq!(err, GeneralizeError::UnsupportedField("job".to_string()));
    }

    #[test]
    fn test_numeric_doubling_buckets() {
        let mut rules = GeneralizationRules::new();
        rules
            .register("age", GeneralizationRule::numeric_doubling(0.0, 10.0, 3))
            .unwrap();
        assert_eq!(
            rules.generalize("age", &Value::Number(25.0), 1).unwrap(),
            Value::Interval { lower: 20.0, upper: 30.0 }
        );
        assert_eq!(
            rules.generalize("age", &Value::Number(25.0), 2).unwrap(),
            Value::Interval { lower: 20.0, upper: 40.0 }
        );
        assert_eq!(
            rules.generalize("age", &Value::Number(25.0), 3).unwrap(),
            Value::Interval { lower: 0.0, upper: 40.0 }
        );
    }

    #[test]
    fn test_null_stays_null() {
        let mut rules = GeneralizationRules::new();
        rules
            .register("age", GeneralizationRule::numeric_doubling(0.0, 10.0, 2))
            .unwrap();
        assert_eq!(rules.generalize("age", &Value::Null, 2).unwrap(), Value::Null);
    }

    #[test]
    fn test_text_under_numeric_rule_is_unknown() {
        let mut rules = GeneralizationRules::new();
        rules
            .register("age", GeneralizationRule::numeric_doubling(0.0, 10.0, 2))
            .unwrap();
        let v = Value::Text("n/a".to_string());
        assert_eq!(rules.generalize("age", &v, 1).unwrap(), Value::Null);
    }

    #[test]
    fn test_non_monotonic_categorical_rejected() {
        // Identity-like map: 2 inputs, 2 distinct outputs - no coarsening.
        let mut level = BTreeMap::new();
        level.insert("a".to_string(), "x".to_string());
        level.insert("b".to_string(), "y".to_string());
        let mut rules = GeneralizationRules::new();
        let err = rules
            .register("f", GeneralizationRule::categorical(vec![level]))
            .unwrap_err();
        assert!(matches!(err, GeneralizeError::NonMonotonic { level: 1, .. }));
    }

    #[test]
    fn test_non_monotonic_widths_rejected() {
        let mut rules = GeneralizationRules::new();
        let err = rules
            .register("age", GeneralizationRule::numeric(0.0, vec![10.0, 10.0]))
            .unwrap_err();
        assert!(matches!(err, GeneralizeError::NonMonotonic { level: 2, .. }));

        let err = rules
            .register("age", GeneralizationRule::numeric(0.0, vec![-5.0]))
            .unwrap_err();
        assert!(matches!(err, GeneralizeError::InvalidWidth { .. }));
    }

    #[test]
    fn test_ancestor_distance() {
        let rule = city_rule();
        assert_eq!(rule.ancestor_distance("Beijing", "Beijing", 0), 0);
        // Beijing and Tianjin share a province: one step up.
        assert_eq!(rule.ancestor_distance("Beijing", "Tianjin", 0), 1);
        // Beijing and Shanghai only meet at country level: two steps.
        assert_eq!(rule.ancestor_distance("Beijing", "Shanghai", 0), 2);
        // Unknown value never joins: penalty max_level - level + 1.
        assert_eq!(rule.ancestor_distance("Beijing", "Atlantis", 0), 3);
    }

    #[test]
    fn test_value_distance_numeric_midpoints() {
        let mut rules = GeneralizationRules::new();
        rules
            .register("age", GeneralizationRule::numeric_doubling(0.0, 10.0, 2))
            .unwrap();
        let a = Value::Interval { lower: 20.0, upper: 30.0 };
        let b = Value::Interval { lower: 30.0, upper: 40.0 };
        assert_eq!(rules.value_distance("age", &a, &b, 1), 10.0);
    }

    #[test]
    fn test_rules_json_roundtrip() {
        let mut rules = GeneralizationRules::new();
        rules.register("city", city_rule()).unwrap();
        rules
            .register("age", GeneralizationRule::numeric_doubling(0.0, 10.0, 3))
            .unwrap();
        let json = serde_json::to_string(&rules).unwrap();
        let back: GeneralizationRules = serde_json::from_str(&json).unwrap();
        assert_eq!(back, rules);
        back.validate().unwrap();
    }
}
