//! Per-customer CLTV inputs: recency, tenure (T), frequency and average
//! order value, all time quantities in weeks.
//!
//! RULE: only customers with more than one lifetime order are modelled.
//! Single-order customers carry no information about dropout and are
//! left out here (they still take part in RFM scoring).

use crate::{
    config::PipelineConfig,
    customer::Customer,
    error::{ScoreError, ScoreResult},
    types::{CustomerId, Weeks, DAYS_PER_WEEK},
};
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerMetrics {
    pub customer_id:   CustomerId,
    pub recency_weeks: Weeks,
    pub tenure_weeks:  Weeks,
    pub frequency:     u32,
    pub monetary_avg:  f64,
}

/// The analysis reference date: the configured override, otherwise the
/// latest `last_order_date` in the batch plus the configured buffer.
pub fn analysis_date(customers: &[Customer], config: &PipelineConfig) -> ScoreResult<NaiveDate> {
    if let Some(date) = config.analysis_date {
        return Ok(date);
    }
    let latest = customers
        .iter()
        .map(|c| c.last_order_date)
        .max()
        .ok_or_else(|| {
            ScoreError::data_contract("last_order_date", Vec::new(), "customer batch is empty")
        })?;
    Ok(latest + Duration::days(config.analysis_buffer_days))
}

fn weeks_between(from: NaiveDate, to: NaiveDate) -> Weeks {
    (to - from).num_days() as f64 / DAYS_PER_WEEK
}

/// Derive CLTV metrics for every customer with `frequency > 1`.
pub fn build_metrics(customers: &[Customer], analysis_date: NaiveDate) -> ScoreResult<Vec<CustomerMetrics>> {
    let late: Vec<CustomerId> = customers
        .iter()
        .filter(|c| c.last_order_date > analysis_date)
        .map(|c| c.customer_id.clone())
        .collect();
    if !late.is_empty() {
        return Err(ScoreError::data_contract(
            "last_order_date",
            late,
            format!("orders after analysis date {analysis_date}"),
        ));
    }

    let metrics: Vec<CustomerMetrics> = customers
        .iter()
        .filter(|c| c.total_orders() > 1)
        .map(|c| {
            let frequency = c.total_orders();
            CustomerMetrics {
                customer_id:   c.customer_id.clone(),
                recency_weeks: weeks_between(c.first_order_date, c.last_order_date),
                tenure_weeks:  weeks_between(c.first_order_date, analysis_date),
                frequency,
                monetary_avg:  c.total_value() / f64::from(frequency),
            }
        })
        .collect();

    log::debug!(
        "metrics: {} of {} customers have more than one order (analysis date {analysis_date})",
        metrics.len(),
        customers.len(),
    );
    Ok(metrics)
}
