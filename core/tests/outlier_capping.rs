use custscore_core::{
    config::CappingConfig,
    customer::Customer,
    outlier::{cap_outliers, cap_values, outlier_thresholds, CappedColumn},
    population::{generate, PopulationConfig},
};

// ── Helpers ──────────────────────────────────────────────────────────────────

fn cap_twice(values: &[f64]) -> (Vec<f64>, Vec<f64>) {
    let config = CappingConfig::default();
    let mut customers: Vec<Customer> = generate(&PopulationConfig {
        customers: values.len(),
        ..Default::default()
    })
    .unwrap();
    for (c, &v) in customers.iter_mut().zip(values) {
        c.monetary_online = v;
    }
    cap_outliers(&mut customers, &config);
    let once: Vec<f64> = customers.iter().map(|c| c.monetary_online).collect();
    cap_outliers(&mut customers, &config);
    let twice: Vec<f64> = customers.iter().map(|c| c.monetary_online).collect();
    (once, twice)
}

// ── Tests ────────────────────────────────────────────────────────────────────

/// Bounds are round(Q1 - 1.5·IQR) and round(Q3 + 1.5·IQR) on the 1st/99th
/// percentiles with linear interpolation.
#[test]
fn thresholds_follow_widened_percentile_range() {
    let values: Vec<f64> = (1..=100).map(f64::from).collect();
    let t = outlier_thresholds(&values, &CappingConfig::default()).unwrap();
    assert_eq!(t.low, -144.0);
    assert_eq!(t.high, 245.0);
}

/// A sample with no usable values has no bounds and is left alone.
#[test]
fn empty_sample_has_no_thresholds() {
    assert!(outlier_thresholds(&[], &CappingConfig::default()).is_none());
    assert!(outlier_thresholds(&[f64::NAN], &CappingConfig::default()).is_none());
}

/// Values inside the bounds are untouched; values outside land on the bound.
#[test]
fn cap_values_clamps_only_out_of_range_values() {
    let mut values = vec![-10.0, 0.0, 5.0, 10.0, 99.0];
    let t = custscore_core::outlier::Thresholds { low: 0.0, high: 10.0 };
    let (low, high) = cap_values(&mut values, t);
    assert_eq!(values, vec![0.0, 0.0, 5.0, 10.0, 10.0]);
    assert_eq!((low, high), (1, 1));
}

/// Capping a capped batch changes nothing, on ordinary data.
#[test]
fn capping_is_idempotent_on_generated_batch() {
    let config = CappingConfig::default();
    let mut customers = generate(&PopulationConfig { customers: 400, ..Default::default() }).unwrap();
    cap_outliers(&mut customers, &config);
    let once = customers.clone();
    let reports = cap_outliers(&mut customers, &config);
    assert_eq!(customers, once);
    assert!(reports.iter().all(|r| r.capped_low == 0 && r.capped_high == 0));
}

/// Capping a capped batch changes nothing, even when an extreme value sits
/// inside the percentile interpolation window.
#[test]
fn capping_is_idempotent_with_heavy_outlier() {
    let mut values: Vec<f64> = (1..=99).map(f64::from).collect();
    values.push(10_000.0);
    let (once, twice) = cap_twice(&values);
    assert_eq!(once, twice);
    assert!(once[99] < 10_000.0, "extreme value must be capped");
    assert_eq!(&once[..99], &values[..99], "in-range values are untouched");
}

/// Order counts stay whole numbers after capping.
#[test]
fn capped_order_counts_stay_integral() {
    let mut customers = generate(&PopulationConfig { customers: 300, ..Default::default() }).unwrap();
    customers[0].order_count_online = 5_000;
    let reports = cap_outliers(&mut customers, &CappingConfig::default());
    assert!(customers[0].order_count_online < 5_000);
    let online = reports
        .iter()
        .find(|r| r.column == CappedColumn::OrderCountOnline)
        .unwrap();
    assert!(online.capped_high >= 1);
}

/// All four columns are reported, each independently.
#[test]
fn every_column_is_reported() {
    let mut customers = generate(&PopulationConfig { customers: 50, ..Default::default() }).unwrap();
    let reports = cap_outliers(&mut customers, &CappingConfig::default());
    let columns: Vec<CappedColumn> = reports.iter().map(|r| r.column).collect();
    assert_eq!(columns, CappedColumn::ALL.to_vec());
}
