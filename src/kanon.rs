//! K-Anonymity Engine (KACA)
//!
//! Clustering-based k-anonymization: records are grouped into equivalence
//! classes sharing an identical generalized quasi-identifier tuple, and
//! generalization levels are raised greedily until every class reaches
//! size >= k or every field hits its level ceiling. Classes still below k
//! afterwards are merged into their nearest neighbour by representative
//! distance.
//!
//! # Determinism
//!
//! For identical input order, field order and k, the output partition and
//! information loss are reproducible bit-for-bit. Ties in the greedy field
//! selection go to the field appearing first in the quasi-identifier
//! ordering; this tie-break is part of the public contract. No randomness
//! is involved anywhere in this module.
//!
//! # Information loss
//!
//! The fraction of quasi-identifier cells whose value changed, over all
//! records and fields; a value in `[0, 1]` that is 0 exactly when k was
//! already satisfied at level 0.

use crate::generalize::{GeneralizationRules, GeneralizeError};
use crate::utility::{FieldError, UtilityReport};
use crate::{Record, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const NULL_VALUE: Value = Value::Null;

/// Errors from the k-anonymity engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum KAnonError {
    /// k cannot be reached: fewer records than k even after merging
    /// everything into a single class (includes the empty-input case)
    Unachievable { records: usize, k: usize },
    /// k must be at least 1
    InvalidK(usize),
    /// A quasi-identifier field is absent from at least one record
    QuasiIdentifierMissing { field: String },
    /// Generalization rule configuration error
    Generalize(GeneralizeError),
}

impl std::fmt::Display for KAnonError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KAnonError::Unachievable { records, k } => {
                write!(f, "K-anonymity unachievable: {} records, k={}", records, k)
            }
            KAnonError::InvalidK(k) => write!(f, "Invalid k: {} (must be >= 1)", k),
            KAnonError::QuasiIdentifierMissing { field } => {
                write!(f, "Quasi-identifier '{}' missing from at least one record", field)
            }
            KAnonError::Generalize(e) => write!(f, "Generalization error: {}", e),
        }
    }
}

impl std::error::Error for KAnonError {}

impl From<GeneralizeError> for KAnonError {
    fn from(e: GeneralizeError) -> Self {
        KAnonError::Generalize(e)
    }
}

/// Result of a pure k-anonymity check (no generalization applied)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KAnonymityCheck {
    pub is_k_anonymous: bool,
    pub min_class_size: usize,
    pub class_count: usize,
}

/// Per-run equivalence class statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassStatistics {
    pub k: usize,
    pub equivalence_classes: usize,
    pub min_class_size: usize,
    pub max_class_size: usize,
    pub avg_class_size: f64,
    pub is_k_anonymous: bool,
    /// Final generalization level per quasi-identifier field
    pub levels_used: BTreeMap<String, usize>,
    /// Undersized classes absorbed during the merge phase
    pub merged_classes: usize,
}

/// Attribute-disclosure risk for one sensitive attribute
///
/// A class where every member shares the same sensitive value leaks that
/// value to anyone who can place a subject in the class (homogeneity
/// attack), regardless of k.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisclosureRisk {
    pub attribute: String,
    pub classes: usize,
    /// Classes with a single distinct sensitive value
    pub homogeneous_classes: usize,
    pub min_diversity: usize,
    pub avg_diversity: f64,
    pub risk: RiskLevel,
}

/// Coarse disclosure-risk classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// Output of one k-anonymization run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnonymizationResult {
    /// New records with quasi-identifier cells replaced by their class
    /// representative values
    pub records: Vec<Record>,
    pub statistics: ClassStatistics,
    /// Changed quasi-identifier cells / total quasi-identifier cells
    pub information_loss: f64,
    pub utility: UtilityReport,
    /// One entry per declared sensitive attribute
    pub disclosure: Vec<DisclosureRisk>,
}

/// An equivalence class over record indices
#[derive(Debug, Clone)]
struct Class {
    members: Vec<usize>,
    representative: Vec<Value>,
}

/// Check whether a dataset already satisfies k-anonymity over the exact
/// quasi-identifier tuples. No generalization is applied; callers wanting
/// generalized grouping must pre-generalize.
///
/// An empty dataset is vacuously k-anonymous with `min_class_size = 0`;
/// treat that as "no data to assess".
pub fn validate_k_anonymity(records: &[Record], quasi_identifiers: &[String], k: usize) -> KAnonymityCheck {
    let mut sizes: BTreeMap<Vec<String>, usize> = BTreeMap::new();
    for record in records {
        let key: Vec<String> = quasi_identifiers
            .iter()
            .map(|field| record.get(field).unwrap_or(&NULL_VALUE).cell_key())
            .collect();
        *sizes.entry(key).or_insert(0) += 1;
    }
    if sizes.is_empty() {
        return KAnonymityCheck {
            is_k_anonymous: true,
            min_class_size: 0,
            class_count: 0,
        };
    }
    let min_class_size = sizes.values().copied().min().unwrap_or(0);
    KAnonymityCheck {
        is_k_anonymous: min_class_size >= k,
        min_class_size,
        class_count: sizes.len(),
    }
}

/// Assess attribute-disclosure risk of a dataset grouped by its exact
/// quasi-identifier tuples.
pub fn assess_disclosure_risk(
    records: &[Record],
    quasi_identifiers: &[String],
    sensitive_attribute: &str,
) -> DisclosureRisk {
    let mut classes: BTreeMap<Vec<String>, Vec<usize>> = BTreeMap::new();
    for (idx, record) in records.iter().enumerate() {
        let key: Vec<String> = quasi_identifiers
            .iter()
            .map(|field| record.get(field).unwrap_or(&NULL_VALUE).cell_key())
            .collect();
        classes.entry(key).or_default().push(idx);
    }
    let member_sets: Vec<Vec<usize>> = classes.into_values().collect();
    disclosure_for_members(records, &member_sets, sensitive_attribute)
}

fn disclosure_for_members(
    records: &[Record],
    classes: &[Vec<usize>],
    sensitive_attribute: &str,
) -> DisclosureRisk {
    let mut diversities = Vec::with_capacity(classes.len());
    for members in classes {
        let distinct: std::collections::BTreeSet<String> = members
            .iter()
            .filter_map(|&i| records[i].get(sensitive_attribute))
            .filter(|v| !matches!(v, Value::Null))
            .map(Value::cell_key)
            .collect();
        diversities.push(distinct.len());
    }

    let homogeneous = diversities.iter().filter(|&&d| d == 1).count();
    let min_diversity = diversities.iter().copied().min().unwrap_or(0);
    let avg_diversity = if diversities.is_empty() {
        0.0
    } else {
        diversities.iter().sum::<usize>() as f64 / diversities.len() as f64
    };

    let risk = if homogeneous == 0 {
        RiskLevel::Low
    } else if (homogeneous as f64) < classes.len() as f64 * 0.3 {
        RiskLevel::Medium
    } else {
        RiskLevel::High
    };

    DisclosureRisk {
        attribute: sensitive_attribute.to_string(),
        classes: classes.len(),
        homogeneous_classes: homogeneous,
        min_diversity,
        avg_diversity,
        risk,
    }
}

/// Per-field generalized column cache. Generalization always starts from
/// the original record values, never from a previous level's output.
struct ColumnCache<'a> {
    rules: &'a GeneralizationRules,
    records: &'a [Record],
    quasi: &'a [String],
    columns: Vec<BTreeMap<usize, Vec<Value>>>,
}

impl<'a> ColumnCache<'a> {
    fn new(rules: &'a GeneralizationRules, records: &'a [Record], quasi: &'a [String]) -> Self {
        ColumnCache {
            rules,
            records,
            quasi,
            columns: vec![BTreeMap::new(); quasi.len()],
        }
    }

    fn ensure(&mut self, field_idx: usize, level: usize) -> Result<(), GeneralizeError> {
        if self.columns[field_idx].contains_key(&level) {
            return Ok(());
        }
        let field = &self.quasi[field_idx];
        let column = self
            .records
            .iter()
            .map(|r| {
                let value = r.get(field).unwrap_or(&NULL_VALUE);
                self.rules.generalize(field, value, level)
            })
            .collect::<Result<Vec<Value>, GeneralizeError>>()?;
        self.columns[field_idx].insert(level, column);
        Ok(())
    }

    fn column(&self, field_idx: usize, level: usize) -> &[Value] {
        &self.columns[field_idx][&level]
    }

    /// Number of classes below k when grouping at the given levels.
    fn undersized_count(&mut self, levels: &[usize], k: usize) -> Result<usize, GeneralizeError> {
        for (fi, &level) in levels.iter().enumerate() {
            self.ensure(fi, level)?;
        }
        let mut sizes: BTreeMap<Vec<String>, usize> = BTreeMap::new();
        for idx in 0..self.records.len() {
            let key: Vec<String> = levels
                .iter()
                .enumerate()
                .map(|(fi, &level)| self.column(fi, level)[idx].cell_key())
                .collect();
            *sizes.entry(key).or_insert(0) += 1;
        }
        Ok(sizes.values().filter(|&&s| s < k).count())
    }

    /// Build the partition at the given levels, ordered by first member
    /// index for deterministic downstream tie-breaks.
    fn build_classes(&mut self, levels: &[usize]) -> Result<Vec<Class>, GeneralizeError> {
        for (fi, &level) in levels.iter().enumerate() {
            self.ensure(fi, level)?;
        }
        let mut groups: BTreeMap<Vec<String>, Vec<usize>> = BTreeMap::new();
        for idx in 0..self.records.len() {
            let key: Vec<String> = levels
                .iter()
                .enumerate()
                .map(|(fi, &level)| self.column(fi, level)[idx].cell_key())
                .collect();
            groups.entry(key).or_default().push(idx);
        }
        let mut classes: Vec<Class> = groups
            .into_values()
            .map(|members| {
                let first = members[0];
                let representative = levels
                    .iter()
                    .enumerate()
                    .map(|(fi, &level)| self.column(fi, level)[first].clone())
                    .collect();
                Class { members, representative }
            })
            .collect();
        classes.sort_by_key(|c| c.members[0]);
        Ok(classes)
    }
}

/// Anonymize records to k-anonymity via KACA.
///
/// `max_levels` caps the level search per field (missing entries default
/// to the rule's own maximum). Every quasi-identifier must have a
/// registered generalization rule and be present in every record.
///
/// Fails with `Unachievable` when even a single merged class cannot reach
/// k — i.e. fewer than k records were supplied.
pub fn k_anonymize(
    records: &[Record],
    quasi_identifiers: &[String],
    sensitive_attributes: &[String],
    k: usize,
    max_levels: &BTreeMap<String, usize>,
    rules: &GeneralizationRules,
) -> Result<AnonymizationResult, KAnonError> {
    if k == 0 {
        return Err(KAnonError::InvalidK(0));
    }
    if records.len() < k {
        return Err(KAnonError::Unachievable { records: records.len(), k });
    }

    // Resolve per-field ceilings and check the quasi-identifier set is a
    // subset of every record's fields.
    let mut ceilings = Vec::with_capacity(quasi_identifiers.len());
    for field in quasi_identifiers {
        let rule_max = rules.max_level(field)?;
        let ceiling = max_levels.get(field).copied().unwrap_or(rule_max).min(rule_max);
        ceilings.push(ceiling);
        if records.iter().any(|r| !r.contains_key(field)) {
            return Err(KAnonError::QuasiIdentifierMissing { field: field.clone() });
        }
    }

    let mut cache = ColumnCache::new(rules, records, quasi_identifiers);
    let mut levels = vec![0usize; quasi_identifiers.len()];

    // Greedy level raising: pick the field whose next level leaves the
    // fewest undersized classes; ties go to quasi-identifier order.
    loop {
        let undersized = cache.undersized_count(&levels, k)?;
        if undersized == 0 {
            break;
        }
        let mut best: Option<(usize, usize)> = None;
        for fi in 0..quasi_identifiers.len() {
            if levels[fi] >= ceilings[fi] {
                continue;
            }
            let mut candidate = levels.clone();
            candidate[fi] += 1;
            let after = cache.undersized_count(&candidate, k)?;
            if best.map_or(true, |(_, best_after)| after < best_after) {
                best = Some((fi, after));
            }
        }
        match best {
            Some((fi, _)) => levels[fi] += 1,
            None => break, // no headroom left anywhere
        }
    }

    let mut classes = cache.build_classes(&levels)?;

    // Merge phase: absorb each undersized class into its nearest neighbour
    // by representative-tuple distance.
    let mut merged_classes = 0usize;
    while classes.len() > 1 {
        let victim_idx = classes
            .iter()
            .enumerate()
            .filter(|(_, c)| c.members.len() < k)
            .min_by_key(|(_, c)| (c.members.len(), c.members[0]))
            .map(|(i, _)| i);
        let victim_idx = match victim_idx {
            Some(i) => i,
            None => break,
        };

        let mut nearest: Option<(usize, f64)> = None;
        for (other_idx, other) in classes.iter().enumerate() {
            if other_idx == victim_idx {
                continue;
            }
            let distance: f64 = quasi_identifiers
                .iter()
                .enumerate()
                .map(|(fi, field)| {
                    rules.value_distance(
                        field,
                        &classes[victim_idx].representative[fi],
                        &other.representative[fi],
                        levels[fi],
                    )
                })
                .sum();
            if nearest.map_or(true, |(_, best)| distance < best) {
                nearest = Some((other_idx, distance));
            }
        }

        // classes.len() > 1, so a nearest neighbour always exists
        if let Some((target_idx, _)) = nearest {
            let victim = classes.remove(victim_idx);
            let target_idx = if target_idx > victim_idx { target_idx - 1 } else { target_idx };
            classes[target_idx].members.extend(victim.members);
            classes[target_idx].members.sort_unstable();
            merged_classes += 1;
            classes.sort_by_key(|c| c.members[0]);
        }
    }

    if classes.len() == 1 && classes[0].members.len() < k {
        return Err(KAnonError::Unachievable { records: records.len(), k });
    }

    // Rewrite quasi-identifier cells with class representatives.
    let mut output: Vec<Record> = records.to_vec();
    for class in &classes {
        for &idx in &class.members {
            for (fi, field) in quasi_identifiers.iter().enumerate() {
                output[idx].insert(field.clone(), class.representative[fi].clone());
            }
        }
    }

    // Information loss: changed quasi-identifier cells over total cells.
    let total_cells = records.len() * quasi_identifiers.len();
    let information_loss = if total_cells == 0 {
        0.0
    } else {
        let mut changed = 0usize;
        for (original, anonymized) in records.iter().zip(output.iter()) {
            for field in quasi_identifiers {
                let before = original.get(field).unwrap_or(&NULL_VALUE);
                let after = anonymized.get(field).unwrap_or(&NULL_VALUE);
                if before.cell_key() != after.cell_key() {
                    changed += 1;
                }
            }
        }
        changed as f64 / total_cells as f64
    };

    let sizes: Vec<usize> = classes.iter().map(|c| c.members.len()).collect();
    let min_class_size = sizes.iter().copied().min().unwrap_or(0);
    let max_class_size = sizes.iter().copied().max().unwrap_or(0);
    let avg_class_size = if sizes.is_empty() {
        0.0
    } else {
        sizes.iter().sum::<usize>() as f64 / sizes.len() as f64
    };

    let statistics = ClassStatistics {
        k,
        equivalence_classes: classes.len(),
        min_class_size,
        max_class_size,
        avg_class_size,
        is_k_anonymous: min_class_size >= k,
        levels_used: quasi_identifiers
            .iter()
            .cloned()
            .zip(levels.iter().copied())
            .collect(),
        merged_classes,
    };

    // Numeric quasi-identifiers: compare originals against the midpoints
    // of their generalized ranges for the utility report.
    let mut field_errors = BTreeMap::new();
    for field in quasi_identifiers {
        let mut original_series = Vec::new();
        let mut transformed_series = Vec::new();
        for (original, anonymized) in records.iter().zip(output.iter()) {
            let before = original.get(field).and_then(Value::as_number);
            let after = anonymized.get(field).and_then(|v| v.numeric_center());
            if let (Some(b), Some(a)) = (before, after) {
                original_series.push(b);
                transformed_series.push(a);
            }
        }
        if !original_series.is_empty() {
            // Equal lengths by construction
            if let Ok(err) = FieldError::between(&original_series, &transformed_series) {
                field_errors.insert(field.clone(), err);
            }
        }
    }
    let utility = UtilityReport::for_k_anonymity(k, information_loss, field_errors);

    let member_sets: Vec<Vec<usize>> = classes.iter().map(|c| c.members.clone()).collect();
    let disclosure = sensitive_attributes
        .iter()
        .map(|attr| disclosure_for_members(records, &member_sets, attr))
        .collect();

    Ok(AnonymizationResult {
        records: output,
        statistics,
        information_loss,
        utility,
        disclosure,
    })
}


#[cfg(test)]
mod proptest_tests {
    use super::*;
    use crate::generalize::GeneralizationRule;
    use proptest::prelude::*;

    fn arb_records() -> impl Strategy<Value = Vec<Record>> {
        proptest::collection::vec((0u8..80, 0u8..4), 1..40).prop_map(|rows| {
            rows.into_iter()
                .map(|(age, region)| {
                    let mut r = Record::new();
                    r.insert("age".to_string(), crate::Value::Number(age as f64));
                    r.insert(
                        "region".to_string(),
                        crate::Value::Text(format!("region-{}", region)),
                    );
                    r
                })
                .collect()
        })
    }

    proptest! {
        /// Whenever anonymization succeeds, every class satisfies k and the
        /// information loss stays in [0, 1].
        #[test]
        fn anonymized_output_satisfies_k(records in arb_records(), k in 1usize..6) {
            let quasi = vec!["age".to_string(), "region".to_string()];
            let mut rules = GeneralizationRules::new();
            rules.register("age", GeneralizationRule::numeric_doubling(0.0, 10.0, 4)).unwrap();
            rules.register("region", GeneralizationRule::categorical(vec![])).unwrap();

            if let Ok(result) = k_anonymize(&records, &quasi, &[], k, &std::collections::BTreeMap::new(), &rules) {
                let check = validate_k_anonymity(&result.records, &quasi, k);
                prop_assert!(check.is_k_anonymous, "reval failed: min {}", check.min_class_size);
                prop_assert!(result.information_loss >= 0.0 && result.information_loss <= 1.0);
                prop_assert_eq!(result.records.len(), records.len());
            }
        }
    }
}
