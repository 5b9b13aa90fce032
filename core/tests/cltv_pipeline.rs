use chrono::{Duration, NaiveDate};
use custscore_core::{
    bgnbd::{BetaGeoModel, BetaGeoParams},
    cltv::{compose, CltvSegment},
    config::{IndependenceConfig, IndependencePolicy, OptimizerConfig, PipelineConfig},
    customer::Customer,
    engine::ScoringEngine,
    error::ScoreError,
    gamma_gamma::{GammaGammaModel, GammaGammaParams},
    metrics::{analysis_date, build_metrics, CustomerMetrics},
    population::{generate, PopulationConfig},
};
use std::collections::HashSet;

// ── Helpers ──────────────────────────────────────────────────────────────────

fn analysis_day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2021, 6, 1).unwrap()
}

/// A customer whose first and last orders are `first_days_ago` and
/// `last_days_ago` days before the analysis date.
fn customer(id: &str, first_days_ago: i64, last_days_ago: i64, orders: u32, value: f64) -> Customer {
    let first = analysis_day() - Duration::days(first_days_ago);
    let last = analysis_day() - Duration::days(last_days_ago);
    Customer {
        customer_id: id.to_string(),
        order_channel: Some("Ios App".into()),
        last_order_channel: Some("Ios App".into()),
        first_order_date: first,
        last_order_date: last,
        last_order_date_online: Some(last),
        last_order_date_offline: None,
        order_count_online: orders,
        order_count_offline: 0,
        monetary_online: value,
        monetary_offline: 0.0,
        category_interest: Some("[KADIN]".into()),
    }
}

fn fixed_models() -> (BetaGeoModel, GammaGammaModel) {
    (
        BetaGeoModel::from_params(BetaGeoParams { r: 2.0, alpha: 20.0, a: 0.5, b: 5.0 }).unwrap(),
        GammaGammaModel::from_params(GammaGammaParams { p: 6.25, q: 3.74, v: 15.44 }).unwrap(),
    )
}

fn population(n: usize) -> Vec<Customer> {
    generate(&PopulationConfig { customers: n, ..Default::default() }).unwrap()
}

fn engine(run_id: &str) -> ScoringEngine {
    let _ = env_logger::builder().is_test(true).try_init();
    ScoringEngine::new(run_id.into(), PipelineConfig::default_test()).unwrap()
}

// ── Tests ────────────────────────────────────────────────────────────────────

/// Three customers: a single-order one is dropped, the other two are scored
/// with positive expected sales and value, and the frequent big spender is
/// worth at least as much as the brand-new small one.
#[test]
fn end_to_end_example_with_fixed_parameters() {
    let customers = vec![
        customer("single", 30, 30, 1, 40.0),
        customer("loyal", 140, 70, 5, 500.0),
        customer("fresh", 14, 7, 2, 100.0),
    ];
    let metrics = build_metrics(&customers, analysis_day()).unwrap();
    assert_eq!(metrics.len(), 2);

    let loyal = metrics.iter().find(|m| m.customer_id == "loyal").unwrap();
    assert_eq!((loyal.frequency, loyal.recency_weeks, loyal.tenure_weeks), (5, 10.0, 20.0));
    assert!((loyal.monetary_avg - 100.0).abs() < 1e-9);
    let fresh = metrics.iter().find(|m| m.customer_id == "fresh").unwrap();
    assert_eq!((fresh.frequency, fresh.recency_weeks, fresh.tenure_weeks), (2, 1.0, 2.0));
    assert!((fresh.monetary_avg - 50.0).abs() < 1e-9);

    let (frequency_model, value_model) = fixed_models();
    let records = compose(&metrics, &frequency_model, &value_model, &PipelineConfig::default_test()).unwrap();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.customer_id != "single"));

    for r in &records {
        assert!(r.exp_sales_6_months > 0.0, "{r:?}");
        assert!(r.exp_sales_6_months > r.exp_sales_3_months, "{r:?}");
        assert!(r.exp_average_value > 0.0, "{r:?}");
        assert!(r.clv.unwrap() > 0.0, "{r:?}");
    }
    let clv_of = |id: &str| records.iter().find(|r| r.customer_id == id).and_then(|r| r.clv).unwrap();
    assert!(clv_of("loyal") >= clv_of("fresh"));
}

/// The analysis date defaults to the latest order plus two days and can be
/// overridden.
#[test]
fn analysis_date_defaults_to_latest_order_plus_buffer() {
    let customers = vec![customer("a", 100, 10, 3, 90.0), customer("b", 50, 4, 2, 40.0)];
    let config = PipelineConfig::default_test();
    assert_eq!(
        analysis_date(&customers, &config).unwrap(),
        analysis_day() - Duration::days(4) + Duration::days(2)
    );

    let override_day = NaiveDate::from_ymd_opt(2022, 1, 1).unwrap();
    let config = PipelineConfig { analysis_date: Some(override_day), ..config };
    assert_eq!(analysis_date(&customers, &config).unwrap(), override_day);
}

/// Orders after the analysis date break the data contract.
#[test]
fn orders_after_analysis_date_are_rejected() {
    let customers = vec![customer("late", 20, -3, 2, 40.0)];
    match build_metrics(&customers, analysis_day()) {
        Err(ScoreError::DataContract { column, customer_ids, .. }) => {
            assert_eq!(column, "last_order_date");
            assert_eq!(customer_ids, vec!["late".to_string()]);
        }
        other => panic!("expected data contract error, got {other:?}"),
    }
}

/// Recency never exceeds tenure for any derived row.
#[test]
fn recency_never_exceeds_tenure() {
    let customers = population(300);
    let date = analysis_date(&customers, &PipelineConfig::default_test()).unwrap();
    let metrics = build_metrics(&customers, date).unwrap();
    assert!(!metrics.is_empty());
    for m in &metrics {
        assert!(m.recency_weeks <= m.tenure_weeks, "{m:?}");
        assert!(m.frequency > 1, "{m:?}");
    }
}

/// Single-order customers are absent from CLTV output and present in RFM.
#[test]
fn single_order_customers_skip_cltv_but_get_rfm() {
    let customers = population(300);
    let singles: HashSet<&str> = customers
        .iter()
        .filter(|c| c.total_orders() <= 1)
        .map(|c| c.customer_id.as_str())
        .collect();
    assert!(!singles.is_empty(), "population should contain single-order customers");

    let report = engine("singles").run(&customers).unwrap();
    assert!(report.cltv.records.iter().all(|r| !singles.contains(r.customer_id.as_str())));
    let rfm_ids: HashSet<&str> = report.rfm.iter().map(|r| r.customer_id.as_str()).collect();
    assert!(singles.iter().all(|id| rfm_ids.contains(id)));
    assert_eq!(report.rfm.len(), customers.len());
    assert_eq!(report.cltv.excluded + report.cltv.records.len(), customers.len());
}

/// Fitted models have positive parameters and every modelled customer gets
/// finite predictions.
#[test]
fn fitted_models_produce_finite_predictions() {
    let report = engine("fit").run(&population(400)).unwrap();
    let f = report.cltv.frequency_model.params();
    assert!(f.r > 0.0 && f.alpha > 0.0 && f.a > 0.0 && f.b > 0.0, "{f:?}");
    let v = report.cltv.value_model.params();
    assert!(v.p > 0.0 && v.q > 0.0 && v.v > 0.0, "{v:?}");
    for r in &report.cltv.records {
        assert!(r.exp_sales_3_months.is_finite() && r.exp_sales_3_months >= 0.0, "{r:?}");
        assert!(r.exp_average_value.is_finite(), "{r:?}");
    }
}

/// The A/B/C/D segments each hold ⌊N/4⌋ or ⌈N/4⌉ customers.
#[test]
fn cltv_segments_are_balanced() {
    let report = engine("balance").run(&population(400)).unwrap();
    let segmented: Vec<CltvSegment> = report.cltv.records.iter().filter_map(|r| r.segment).collect();
    let n = segmented.len();
    assert!(n > 0);
    for segment in CltvSegment::ASCENDING {
        let count = segmented.iter().filter(|s| **s == segment).count();
        assert!(count == n / 4 || count == n.div_ceil(4), "{segment:?}: {count} of {n}");
    }
}

/// A higher segment never holds a lower clv than a lower segment.
#[test]
fn cltv_segments_are_ordered_by_value() {
    let report = engine("order").run(&population(300)).unwrap();
    let records = &report.cltv.records;
    for a in records {
        for b in records {
            if let (Some(sa), Some(sb), Some(ca), Some(cb)) = (a.segment, b.segment, a.clv, b.clv) {
                if sa > sb {
                    assert!(ca >= cb, "{a:?} vs {b:?}");
                }
            }
        }
    }
}

/// A zero-spend repeat customer is a data-contract violation raised from
/// the monetary fit, not a silently dropped row.
#[test]
fn zero_spend_repeat_customer_fails_monetary_fit() {
    let mut customers = population(200);
    let victim = customers.iter().position(|c| c.total_orders() > 1).unwrap();
    customers[victim].monetary_online = 0.0;
    customers[victim].monetary_offline = 0.0;
    let victim_id = customers[victim].customer_id.clone();

    let err = engine("zero-spend").run(&customers).unwrap_err();
    assert_eq!(err.stage(), Some("monetary_fit"));
    match err.root() {
        ScoreError::DataContract { column, customer_ids, .. } => {
            assert_eq!(column, "monetary_avg");
            assert!(customer_ids.contains(&victim_id));
        }
        other => panic!("expected data contract error, got {other:?}"),
    }
}

/// A batch without repeat customers cannot fit the frequency model.
#[test]
fn no_repeat_customers_fails_frequency_fit() {
    let customers: Vec<Customer> = (0..10)
        .map(|i| customer(&format!("c{i}"), 40 + i, 40 + i, 1, 25.0))
        .collect();
    let err = engine("no-repeat").run(&customers).unwrap_err();
    assert_eq!(err.stage(), Some("frequency_fit"));
    assert!(matches!(err.root(), ScoreError::Fit { .. }));
}

/// Spend that tracks frequency trips the independence check under the
/// fail policy and only warns under the default policy.
#[test]
fn correlated_spend_respects_independence_policy() {
    let metrics: Vec<CustomerMetrics> = (0..40)
        .map(|i| CustomerMetrics {
            customer_id: format!("c{i}"),
            recency_weeks: 10.0,
            tenure_weeks: 30.0,
            frequency: 2 + (i % 8),
            monetary_avg: 20.0 * f64::from(2 + (i % 8)),
        })
        .collect();
    let fail = IndependenceConfig { max_abs_correlation: 0.3, policy: IndependencePolicy::Fail };
    let err = GammaGammaModel::fit(&metrics, 0.01, &fail, &OptimizerConfig::default()).unwrap_err();
    assert!(matches!(err, ScoreError::Fit { .. }));

    let warn = IndependenceConfig { policy: IndependencePolicy::Warn, ..fail };
    let model = GammaGammaModel::fit(&metrics, 0.01, &warn, &OptimizerConfig::default()).unwrap();
    assert!(model.correlation().unwrap() > 0.9);
}

/// Model parameters do not change when predictions are made, so repeated
/// composition gives identical output.
#[test]
fn composition_is_repeatable_with_fixed_models() {
    let customers = population(150);
    let date = analysis_date(&customers, &PipelineConfig::default_test()).unwrap();
    let metrics = build_metrics(&customers, date).unwrap();
    let (frequency_model, value_model) = fixed_models();
    let config = PipelineConfig::default_test();
    let a = compose(&metrics, &frequency_model, &value_model, &config).unwrap();
    let b = compose(&metrics, &frequency_model, &value_model, &config).unwrap();
    assert_eq!(a, b);
}
