//! Outlier capping for order-count and monetary columns.
//!
//! Bounds come from a widened inter-quantile range:
//!   Q1 = lower quantile, Q3 = upper quantile, IQR = Q3 - Q1
//!   low = round(Q1 - k·IQR), high = round(Q3 + k·IQR)
//! Values outside [low, high] are pulled onto the nearer bound.
//!
//! RULE: capping runs on every column before any metric is derived.

use crate::{
    config::CappingConfig,
    customer::Customer,
    stats::quantile,
};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CappedColumn {
    OrderCountOnline,
    OrderCountOffline,
    MonetaryOnline,
    MonetaryOffline,
}

impl CappedColumn {
    pub const ALL: [CappedColumn; 4] = [
        Self::OrderCountOnline,
        Self::OrderCountOffline,
        Self::MonetaryOnline,
        Self::MonetaryOffline,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::OrderCountOnline  => "order_count_online",
            Self::OrderCountOffline => "order_count_offline",
            Self::MonetaryOnline    => "monetary_online",
            Self::MonetaryOffline   => "monetary_offline",
        }
    }

    pub fn get(&self, c: &Customer) -> f64 {
        match self {
            Self::OrderCountOnline  => f64::from(c.order_count_online),
            Self::OrderCountOffline => f64::from(c.order_count_offline),
            Self::MonetaryOnline    => c.monetary_online,
            Self::MonetaryOffline   => c.monetary_offline,
        }
    }

    fn set(&self, c: &mut Customer, value: f64) {
        // Bounds are rounded, so counts stay integral.
        match self {
            Self::OrderCountOnline  => c.order_count_online = value.max(0.0) as u32,
            Self::OrderCountOffline => c.order_count_offline = value.max(0.0) as u32,
            Self::MonetaryOnline    => c.monetary_online = value,
            Self::MonetaryOffline   => c.monetary_offline = value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Thresholds {
    pub low:  f64,
    pub high: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CapReport {
    pub column:       CappedColumn,
    pub thresholds:   Option<Thresholds>,
    pub capped_low:   usize,
    pub capped_high:  usize,
}

/// Capping bounds for a numeric sample. `None` when the sample has no
/// non-NaN value.
pub fn outlier_thresholds(values: &[f64], config: &CappingConfig) -> Option<Thresholds> {
    let q1 = quantile(values, config.lower_quantile);
    let q3 = quantile(values, config.upper_quantile);
    if q1.is_nan() || q3.is_nan() {
        return None;
    }
    let iqr = q3 - q1;
    Some(Thresholds {
        low:  (q1 - config.iqr_multiplier * iqr).round(),
        high: (q3 + config.iqr_multiplier * iqr).round(),
    })
}

/// Cap a raw sample in place. Returns (capped low, capped high).
pub fn cap_values(values: &mut [f64], thresholds: Thresholds) -> (usize, usize) {
    let (mut low, mut high) = (0, 0);
    for v in values.iter_mut() {
        if *v < thresholds.low {
            *v = thresholds.low;
            low += 1;
        } else if *v > thresholds.high {
            *v = thresholds.high;
            high += 1;
        }
    }
    (low, high)
}

/// Passes before capping gives up on reaching a fixed point.
const MAX_CAPPING_PASSES: usize = 32;

/// Cap one column across the batch.
///
/// Bounds are recomputed on the capped sample until a pass changes
/// nothing, so capping an already capped batch is a no-op. Ordinary data
/// settles after the first pass; repeats only happen when capped values
/// sit inside the quantile interpolation window.
pub fn cap_column(
    customers: &mut [Customer],
    column: CappedColumn,
    config: &CappingConfig,
) -> CapReport {
    let original: Vec<f64> = customers.iter().map(|c| column.get(c)).collect();
    let mut values = original.clone();
    let mut thresholds = None;

    for pass in 1..=MAX_CAPPING_PASSES {
        let Some(t) = outlier_thresholds(&values, config) else {
            break;
        };
        thresholds = Some(t);
        let (low, high) = cap_values(&mut values, t);
        if low + high == 0 {
            break;
        }
        if pass == MAX_CAPPING_PASSES {
            log::warn!("capping: {} still moving after {pass} passes", column.name());
        }
    }

    let mut capped_low = 0;
    let mut capped_high = 0;
    for ((c, &before), &after) in customers.iter_mut().zip(&original).zip(&values) {
        if after > before {
            capped_low += 1;
        } else if after < before {
            capped_high += 1;
        } else {
            continue;
        }
        column.set(c, after);
    }

    if let Some(t) = thresholds {
        log::debug!(
            "capping: {} low={} high={} (capped {capped_low} low, {capped_high} high)",
            column.name(), t.low, t.high,
        );
    }
    CapReport { column, thresholds, capped_low, capped_high }
}

/// Cap all four order-count and monetary columns independently.
pub fn cap_outliers(customers: &mut [Customer], config: &CappingConfig) -> Vec<CapReport> {
    CappedColumn::ALL
        .iter()
        .map(|&column| cap_column(customers, column, config))
        .collect()
}
