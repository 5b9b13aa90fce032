//! CLTV composition: discounted expected spend over a month horizon,
//! then four equal-population value segments.
//!
//! RULE: both models are fitted before composition and only read here.

use crate::{
    bgnbd::BetaGeoModel,
    config::PipelineConfig,
    error::ScoreResult,
    gamma_gamma::GammaGammaModel,
    metrics::CustomerMetrics,
    stats::{qcut, rank_first},
    types::{CustomerId, Weeks},
};
use serde::{Deserialize, Serialize};

/// Value segment, D lowest through A highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CltvSegment {
    D,
    C,
    B,
    A,
}

impl CltvSegment {
    pub const ASCENDING: [CltvSegment; 4] = [Self::D, Self::C, Self::B, Self::A];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::D => "D",
            Self::C => "C",
            Self::B => "B",
            Self::A => "A",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ASCENDING.into_iter().find(|seg| seg.as_str() == s)
    }
}

/// One row of the CLTV export. Serialized field names are the export
/// column names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CltvRecord {
    pub customer_id:         CustomerId,
    pub recency_cltv_weekly: Weeks,
    #[serde(rename = "T_weekly")]
    pub tenure_weekly:       Weeks,
    pub frequency:           u32,
    pub monetary_cltv_avg:   f64,
    pub exp_sales_3_months:  f64,
    pub exp_sales_6_months:  f64,
    pub exp_average_value:   f64,
    pub clv:                 Option<f64>,
    pub segment:             Option<CltvSegment>,
}

/// Discounted expected spend of one customer over `months` months.
///
/// Month `i` contributes the expected transactions in weeks
/// `((i-1)·f, i·f]` times the expected average value, discounted by
/// `(1 + discount_rate)^i`.
pub fn customer_lifetime_value(
    frequency_model: &BetaGeoModel,
    expected_value: f64,
    metrics: &CustomerMetrics,
    months: u32,
    weeks_per_month: f64,
    discount_rate: f64,
) -> f64 {
    let mut previous = 0.0;
    (1..=months)
        .map(|i| {
            let cumulative = frequency_model.expected_transactions_for(f64::from(i) * weeks_per_month, metrics);
            let in_month = cumulative - previous;
            previous = cumulative;
            in_month * expected_value / (1.0 + discount_rate).powi(i as i32)
        })
        .sum()
}

/// Build the CLTV table for every modelled customer.
///
/// A customer whose value comes out non-finite keeps its row with `clv`
/// and `segment` empty; segments are assigned over the remaining rows.
pub fn compose(
    metrics: &[CustomerMetrics],
    frequency_model: &BetaGeoModel,
    value_model: &GammaGammaModel,
    config: &PipelineConfig,
) -> ScoreResult<Vec<CltvRecord>> {
    let [short_horizon, long_horizon] = config.prediction_horizons_weeks;

    let mut records: Vec<CltvRecord> = metrics
        .iter()
        .map(|m| {
            let exp_average_value = value_model.conditional_expected_average_value_for(m);
            let clv = customer_lifetime_value(
                frequency_model,
                exp_average_value,
                m,
                config.month,
                config.weeks_per_month,
                config.discount_rate,
            );
            CltvRecord {
                customer_id:         m.customer_id.clone(),
                recency_cltv_weekly: m.recency_weeks,
                tenure_weekly:       m.tenure_weeks,
                frequency:           m.frequency,
                monetary_cltv_avg:   m.monetary_avg,
                exp_sales_3_months:  frequency_model.expected_transactions_for(short_horizon, m),
                exp_sales_6_months:  frequency_model.expected_transactions_for(long_horizon, m),
                exp_average_value,
                clv:                 clv.is_finite().then_some(clv),
                segment:             None,
            }
        })
        .collect();

    let scored: Vec<usize> = records
        .iter()
        .enumerate()
        .filter_map(|(i, r)| r.clv.map(|_| i))
        .collect();
    if scored.len() < records.len() {
        log::warn!(
            "cltv: {} customer(s) have no computable clv and stay unsegmented",
            records.len() - scored.len(),
        );
    }

    let values: Vec<f64> = scored.iter().filter_map(|&i| records[i].clv).collect();
    for (&i, segment) in scored.iter().zip(segment_by_clv(&values)) {
        records[i].segment = Some(segment);
    }

    log::debug!("cltv: composed {} records over {} month(s)", records.len(), config.month);
    Ok(records)
}

/// Four equal-population segments on ascending clv. Ties are split by
/// input order so every segment holds ⌊N/4⌋ or ⌈N/4⌉ customers.
pub fn segment_by_clv(clvs: &[f64]) -> Vec<CltvSegment> {
    if clvs.is_empty() {
        return Vec::new();
    }
    qcut(&rank_first(clvs), CltvSegment::ASCENDING.len())
        .into_iter()
        .map(|bin| CltvSegment::ASCENDING[bin])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bgnbd::BetaGeoParams;

    fn frequency_model() -> BetaGeoModel {
        BetaGeoModel::from_params(BetaGeoParams { r: 2.0, alpha: 20.0, a: 0.5, b: 5.0 }).unwrap()
    }

    fn metrics(frequency: u32, recency: f64, tenure: f64, monetary: f64) -> CustomerMetrics {
        CustomerMetrics {
            customer_id:   "c".into(),
            recency_weeks: recency,
            tenure_weeks:  tenure,
            frequency,
            monetary_avg:  monetary,
        }
    }

    #[test]
    fn segments_are_balanced() {
        for n in 1..=23 {
            let clvs: Vec<f64> = (0..n).map(|i| ((i * 7) % 5) as f64).collect();
            let segments = segment_by_clv(&clvs);
            for seg in CltvSegment::ASCENDING {
                let count = segments.iter().filter(|s| **s == seg).count();
                assert!(count == n / 4 || count == n.div_ceil(4), "n={n} {seg:?}={count}");
            }
        }
    }

    #[test]
    fn highest_value_lands_in_a() {
        let segments = segment_by_clv(&[5.0, 50.0, 1.0, 20.0]);
        assert_eq!(segments, vec![CltvSegment::C, CltvSegment::A, CltvSegment::D, CltvSegment::B]);
    }

    #[test]
    fn discounting_lowers_value() {
        let model = frequency_model();
        let m = metrics(5, 10.0, 20.0, 100.0);
        let undiscounted = customer_lifetime_value(&model, 100.0, &m, 6, 4.345, 0.0);
        let discounted = customer_lifetime_value(&model, 100.0, &m, 6, 4.345, 0.01);
        assert!(discounted > 0.0);
        assert!(discounted < undiscounted);
    }

    #[test]
    fn undiscounted_value_matches_horizon_expectation() {
        let model = frequency_model();
        let m = metrics(5, 10.0, 20.0, 100.0);
        let clv = customer_lifetime_value(&model, 100.0, &m, 6, 4.345, 0.0);
        let expected = model.expected_transactions_for(6.0 * 4.345, &m) * 100.0;
        assert!((clv - expected).abs() < 1e-9);
    }
}
