//! End-to-end tests over the public API: k-anonymization runs on realistic
//! tables, differentially private releases, and the statistical behavior
//! of the noise under seeded RNGs.

use anon_core::{
    assess_disclosure_risk, dp_query, k_anonymize, privatize_records, validate_k_anonymity,
    AggregateQuery, Bounds, GeneralizationRule, GeneralizationRules, KAnonError, Mechanism,
    NoiseParams, NoiseRng, NoisyResult, PrivacyLevel, Record, RiskLevel, SensitivityBound, Value,
};
use anon_core::dp::{BudgetLedger, LaplaceMechanism};
use std::collections::BTreeMap;

fn record(age: f64, region: &str, diagnosis: &str) -> Record {
    let mut r = Record::new();
    r.insert("age".to_string(), Value::Number(age));
    r.insert("region".to_string(), Value::Text(region.to_string()));
    r.insert("diagnosis".to_string(), Value::Text(diagnosis.to_string()));
    r
}

fn region_rules() -> GeneralizationRules {
    let mut level1 = BTreeMap::new();
    for city in ["Beijing", "Tianjin"] {
        level1.insert(city.to_string(), "North".to_string());
    }
    for city in ["Shanghai", "Suzhou", "Hangzhou"] {
        level1.insert(city.to_string(), "East".to_string());
    }
    let mut level2 = BTreeMap::new();
    level2.insert("North".to_string(), "China".to_string());
    level2.insert("East".to_string(), "China".to_string());

    let mut rules = GeneralizationRules::new();
    rules
        .register("age", GeneralizationRule::numeric_doubling(0.0, 10.0, 3))
        .unwrap();
    rules
        .register("region", GeneralizationRule::categorical(vec![level1, level2]))
        .unwrap();
    rules
}

fn quasi() -> Vec<String> {
    vec!["age".to_string(), "region".to_string()]
}

fn patient_table() -> Vec<Record> {
    let mut records = Vec::new();
    let cities = ["Beijing", "Tianjin", "Shanghai", "Suzhou", "Hangzhou"];
    let diagnoses = ["flu", "cold", "asthma"];
    for i in 0..60 {
        records.push(record(
            20.0 + (i % 37) as f64,
            cities[i % cities.len()],
            diagnoses[i % diagnoses.len()],
        ));
    }
    records
}

#[test]
fn anonymized_table_satisfies_k_and_revalidates() {
    let records = patient_table();
    let sensitive = vec!["diagnosis".to_string()];
    let result =
        k_anonymize(&records, &quasi(), &sensitive, 5, &BTreeMap::new(), &region_rules()).unwrap();

    assert!(result.statistics.is_k_anonymous);
    assert!(result.statistics.min_class_size >= 5);
    assert_eq!(result.records.len(), records.len());

    // The output itself passes an exact-tuple re-check.
    let check = validate_k_anonymity(&result.records, &quasi(), 5);
    assert!(check.is_k_anonymous);
    assert_eq!(check.class_count, result.statistics.equivalence_classes);

    // Sensitive column is untouched by generalization.
    for (original, anonymized) in records.iter().zip(result.records.iter()) {
        assert_eq!(original["diagnosis"], anonymized["diagnosis"]);
    }

    assert!(result.information_loss >= 0.0 && result.information_loss <= 1.0);
    assert_eq!(result.disclosure.len(), 1);
    assert_eq!(result.disclosure[0].attribute, "diagnosis");
}

#[test]
fn anonymization_is_deterministic() {
    let records = patient_table();
    let a = k_anonymize(&records, &quasi(), &[], 4, &BTreeMap::new(), &region_rules()).unwrap();
    let b = k_anonymize(&records, &quasi(), &[], 4, &BTreeMap::new(), &region_rules()).unwrap();
    assert_eq!(a.records, b.records);
    assert_eq!(a.statistics, b.statistics);
    assert_eq!(a.information_loss.to_bits(), b.information_loss.to_bits());
}

#[test]
fn merge_phase_absorbs_undersized_outlier_class() {
    // Three Beijing 25-year-olds and two Shanghai 31-year-olds, k = 3,
    // with age capped at decade buckets and no region taxonomy: the
    // Shanghai pair cannot reach k by generalization and merges into the
    // Beijing class, leaving one class of five.
    let mut records = vec![record(25.0, "Beijing", "flu"); 3];
    records.extend(vec![record(31.0, "Shanghai", "cold"); 2]);

    let mut rules = GeneralizationRules::new();
    rules
        .register("age", GeneralizationRule::numeric_doubling(0.0, 10.0, 3))
        .unwrap();
    rules
        .register("region", GeneralizationRule::categorical(vec![]))
        .unwrap();

    let mut max_levels = BTreeMap::new();
    max_levels.insert("age".to_string(), 1);

    let result = k_anonymize(&records, &quasi(), &[], 3, &max_levels, &rules).unwrap();
    assert_eq!(result.statistics.equivalence_classes, 1);
    assert_eq!(result.statistics.min_class_size, 5);
    assert_eq!(result.statistics.merged_classes, 1);
}

#[test]
fn unachievable_k_is_an_error_not_a_panic() {
    let records = vec![record(25.0, "Beijing", "flu"); 3];
    let err = k_anonymize(&records, &quasi(), &[], 10, &BTreeMap::new(), &region_rules())
        .unwrap_err();
    assert_eq!(err, KAnonError::Unachievable { records: 3, k: 10 });
}

#[test]
fn k_path_utility_report_tracks_information_loss() {
    let records = patient_table();
    let result = k_anonymize(&records, &quasi(), &[], 8, &BTreeMap::new(), &region_rules()).unwrap();

    let utility = &result.utility;
    assert!((utility.data_utility - (1.0 - result.information_loss)).abs() < 1e-12);
    assert!(utility.data_utility >= 0.0 && utility.data_utility <= 1.0);
    assert_eq!(utility.privacy_level, PrivacyLevel::Medium); // k = 8
    // Age is numeric, so it gets a field-error entry.
    assert!(utility.field_errors.contains_key("age"));
}

#[test]
fn homogeneous_sensitive_column_is_flagged_high_risk() {
    let records: Vec<Record> = (0..10).map(|i| record(25.0 + (i % 2) as f64, "Beijing", "flu")).collect();
    let risk = assess_disclosure_risk(&records, &quasi(), "diagnosis");
    assert_eq!(risk.risk, RiskLevel::High);
    assert_eq!(risk.homogeneous_classes, risk.classes);
    assert_eq!(risk.min_diversity, 1);
}

#[test]
fn count_succeeds_on_empty_table() {
    let mut rng = NoiseRng::seeded(100);
    let release = dp_query(
        &[],
        &AggregateQuery::Count,
        &NoiseParams::laplace(1.0),
        &Bounds::new(),
        &mut rng,
    )
    .unwrap();
    match release.result {
        NoisyResult::Scalar(v) => assert!(v.is_finite()),
        NoisyResult::Histogram(_) => panic!("count must be scalar"),
    }
}

#[test]
fn laplace_noise_mean_converges_to_zero() {
    // ε = 1, Δ = 1 -> scale 1. Mean of n draws has SE = sqrt(2/n).
    let mut rng = NoiseRng::seeded(101);
    let n = 20000;
    let sum: f64 = (0..n)
        .map(|_| LaplaceMechanism::add_noise(&mut rng, 0.0, 1.0, 1.0).unwrap())
        .sum();
    let mean = sum / n as f64;
    let se = (2.0f64 / n as f64).sqrt();
    assert!(mean.abs() < 3.0 * se, "Mean {} too far from 0", mean);
}

#[test]
fn laplace_noise_variance_matches_calibration() {
    // ε = 0.5, Δ = 2 -> scale 4, variance 2·16 = 32.
    let mut rng = NoiseRng::seeded(102);
    let n = 20000;
    let samples: Vec<f64> = (0..n)
        .map(|_| LaplaceMechanism::add_noise(&mut rng, 0.0, 2.0, 0.5).unwrap())
        .collect();
    let mean: f64 = samples.iter().sum::<f64>() / n as f64;
    let variance: f64 = samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1) as f64;

    let expected = LaplaceMechanism::variance(2.0, 0.5).unwrap();
    assert!(
        (variance - expected).abs() / expected < 0.15,
        "Variance {} too far from expected {}",
        variance,
        expected
    );
}

#[test]
fn privatized_noise_std_dev_in_expected_band() {
    // Salary bounds [0, 100000] at ε = 100 give scale 1000 and noise
    // SD = sqrt(2)·1000 ≈ 1414. Collect the per-cell differences across
    // many privatization passes and check the empirical SD.
    let mut bounds = Bounds::new();
    bounds.insert(
        "salary".to_string(),
        SensitivityBound { lower: 0.0, upper: 100_000.0 },
    );
    let fields = vec!["salary".to_string()];
    let params = NoiseParams::laplace(100.0);

    let mut base = Record::new();
    base.insert("salary".to_string(), Value::Number(50_000.0));
    let records = vec![base; 200];

    let mut rng = NoiseRng::seeded(103);
    let mut diffs = Vec::new();
    for _ in 0..25 {
        let out = privatize_records(&records, &fields, &bounds, &params, &mut rng).unwrap();
        for r in &out.records {
            if let Some(v) = r["salary"].as_number() {
                diffs.push(v - 50_000.0);
            }
        }
    }

    let n = diffs.len() as f64;
    let mean: f64 = diffs.iter().sum::<f64>() / n;
    let std: f64 = (diffs.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt();
    let expected = LaplaceMechanism::std_dev(100_000.0, 100.0).unwrap(); // ≈ 1414
    assert!(
        (std - expected).abs() / expected < 0.15,
        "Empirical std {} too far from expected {}",
        std,
        expected
    );
}

#[test]
fn histogram_buckets_do_not_reconcile_with_count() {
    let records = patient_table();
    let params = NoiseParams::laplace(1.0);

    let mut rng = NoiseRng::seeded(104);
    let histogram = dp_query(
        &records,
        &AggregateQuery::Histogram { field: "region".to_string() },
        &params,
        &Bounds::new(),
        &mut rng,
    )
    .unwrap();
    let count = dp_query(&records, &AggregateQuery::Count, &params, &Bounds::new(), &mut rng)
        .unwrap();

    let bucket_sum = match histogram.result {
        NoisyResult::Histogram(buckets) => buckets.values().sum::<f64>(),
        NoisyResult::Scalar(_) => panic!("histogram must have buckets"),
    };
    let noisy_count = match count.result {
        NoisyResult::Scalar(v) => v,
        NoisyResult::Histogram(_) => panic!("count must be scalar"),
    };

    // Independent draws: agreement to the bit is a measure-zero event.
    assert_ne!(bucket_sum.to_bits(), noisy_count.to_bits());
}

#[test]
fn gaussian_release_carries_its_delta() {
    let mut rng = NoiseRng::seeded(105);
    let params = NoiseParams::gaussian(1.0, 1e-6);
    let release = dp_query(
        &patient_table(),
        &AggregateQuery::Count,
        &params,
        &Bounds::new(),
        &mut rng,
    )
    .unwrap();
    assert_eq!(release.mechanism, Mechanism::Gaussian);
    assert_eq!(release.delta, 1e-6);
}

#[test]
fn ledger_accounts_for_a_query_session() {
    let records = patient_table();
    let mut bounds = Bounds::new();
    bounds.insert("age".to_string(), SensitivityBound { lower: 0.0, upper: 120.0 });

    let mut rng = NoiseRng::seeded(106);
    let mut ledger = BudgetLedger::new(1.0);
    let params = NoiseParams::laplace(0.4);

    for query in [
        AggregateQuery::Count,
        AggregateQuery::Sum { field: "age".to_string() },
    ] {
        ledger.charge(&format!("{:?}", query), params.epsilon, 0.0).unwrap();
        dp_query(&records, &query, &params, &bounds, &mut rng).unwrap();
    }

    // Third release would overdraw the ε = 1.0 allocation.
    assert!(ledger.charge("count", params.epsilon, 0.0).is_err());
    assert_eq!(ledger.query_count(), 2);
    assert!((ledger.spent_epsilon() - 0.8).abs() < 1e-12);
}

#[test]
fn dp_utility_report_reflects_epsilon() {
    let mut bounds = Bounds::new();
    bounds.insert("age".to_string(), SensitivityBound { lower: 0.0, upper: 120.0 });
    let fields = vec!["age".to_string()];

    let mut rng = NoiseRng::seeded(107);
    let tight = privatize_records(
        &patient_table(),
        &fields,
        &bounds,
        &NoiseParams::laplace(0.3),
        &mut rng,
    )
    .unwrap();
    assert_eq!(tight.utility.privacy_level, PrivacyLevel::High);

    let loose = privatize_records(
        &patient_table(),
        &fields,
        &bounds,
        &NoiseParams::laplace(3.0),
        &mut rng,
    )
    .unwrap();
    assert_eq!(loose.utility.privacy_level, PrivacyLevel::Low);

    for report in [&tight.utility, &loose.utility] {
        assert!(report.data_utility >= 0.0 && report.data_utility <= 1.0);
        let age = &report.field_errors["age"];
        assert!(age.mae >= 0.0);
        assert!(age.rmse >= age.mae);
    }
}

#[test]
fn release_serializes_for_transport() {
    let mut rng = NoiseRng::seeded(108);
    let release = dp_query(
        &patient_table(),
        &AggregateQuery::Count,
        &NoiseParams::laplace(1.0),
        &Bounds::new(),
        &mut rng,
    )
    .unwrap();

    let json = serde_json::to_string(&release).unwrap();
    assert!(json.contains("\"epsilon\":1.0"));
    assert!(json.contains("\"mechanism\":\"laplace\""));

    let result = k_anonymize(
        &patient_table(),
        &quasi(),
        &[],
        5,
        &BTreeMap::new(),
        &region_rules(),
    )
    .unwrap();
    let json = serde_json::to_string(&result).unwrap();
    assert!(json.contains("\"information_loss\""));
}
