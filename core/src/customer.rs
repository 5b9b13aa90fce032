//! Customer records, one row per unique customer from the order table.
//!
//! The table itself comes from an external provider. This module owns the
//! typed record, its data contract and a few informational views used
//! while preparing a batch.

use crate::{
    error::{ScoreError, ScoreResult},
    types::CustomerId,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

// ── Public types ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub customer_id:             CustomerId,
    pub order_channel:           Option<String>,
    pub last_order_channel:      Option<String>,
    pub first_order_date:        NaiveDate,
    pub last_order_date:         NaiveDate,
    pub last_order_date_online:  Option<NaiveDate>,
    pub last_order_date_offline: Option<NaiveDate>,
    pub order_count_online:      u32,
    pub order_count_offline:     u32,
    pub monetary_online:         f64,
    pub monetary_offline:        f64,
    pub category_interest:       Option<String>,
}

impl Customer {
    pub fn total_orders(&self) -> u32 {
        self.order_count_online + self.order_count_offline
    }

    pub fn total_value(&self) -> f64 {
        self.monetary_online + self.monetary_offline
    }
}

/// A row as delivered by the input provider: dates still unparsed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerRow {
    #[serde(alias = "master_id")]
    pub customer_id: String,
    #[serde(default)]
    pub order_channel: Option<String>,
    #[serde(default)]
    pub last_order_channel: Option<String>,
    pub first_order_date: String,
    pub last_order_date: String,
    #[serde(default)]
    pub last_order_date_online: Option<String>,
    #[serde(default)]
    pub last_order_date_offline: Option<String>,
    #[serde(alias = "order_num_total_ever_online")]
    pub order_count_online: f64,
    #[serde(alias = "order_num_total_ever_offline")]
    pub order_count_offline: f64,
    #[serde(alias = "customer_value_total_ever_online")]
    pub monetary_online: f64,
    #[serde(alias = "customer_value_total_ever_offline")]
    pub monetary_offline: f64,
    #[serde(default, alias = "interested_in_categories_12")]
    pub category_interest: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelSummary {
    pub channel:   String,
    pub customers: usize,
    pub orders:    u64,
    pub value:     f64,
}

// ── Parsing ──────────────────────────────────────────────────────────────────

/// Parse `YYYY-MM-DD`, tolerating a trailing time component.
pub fn parse_date(column: &str, customer_id: &str, raw: &str) -> ScoreResult<NaiveDate> {
    let day = raw.trim().split([' ', 'T']).next().unwrap_or_default();
    NaiveDate::parse_from_str(day, "%Y-%m-%d").map_err(|e| {
        ScoreError::data_contract(
            column,
            vec![customer_id.to_string()],
            format!("malformed date '{raw}': {e}"),
        )
    })
}

fn parse_count(column: &str, customer_id: &str, raw: f64) -> ScoreResult<u32> {
    if !raw.is_finite() || raw < 0.0 || raw.fract() != 0.0 || raw > u32::MAX as f64 {
        return Err(ScoreError::data_contract(
            column,
            vec![customer_id.to_string()],
            format!("order count must be a non-negative integer, got {raw}"),
        ));
    }
    Ok(raw as u32)
}

impl CustomerRow {
    pub fn into_customer(self) -> ScoreResult<Customer> {
        let id = self.customer_id.as_str();
        let optional = |column: &str, raw: &Option<String>| -> ScoreResult<Option<NaiveDate>> {
            match raw.as_deref().map(str::trim) {
                None | Some("") => Ok(None),
                Some(s) => parse_date(column, id, s).map(Some),
            }
        };
        Ok(Customer {
            first_order_date: parse_date("first_order_date", id, &self.first_order_date)?,
            last_order_date: parse_date("last_order_date", id, &self.last_order_date)?,
            last_order_date_online: optional("last_order_date_online", &self.last_order_date_online)?,
            last_order_date_offline: optional("last_order_date_offline", &self.last_order_date_offline)?,
            order_count_online: parse_count("order_count_online", id, self.order_count_online)?,
            order_count_offline: parse_count("order_count_offline", id, self.order_count_offline)?,
            monetary_online: self.monetary_online,
            monetary_offline: self.monetary_offline,
            category_interest: self.category_interest.filter(|c| !c.trim().is_empty()),
            order_channel: self.order_channel,
            last_order_channel: self.last_order_channel,
            customer_id: self.customer_id,
        })
    }
}

/// Convert and validate a whole provider batch.
pub fn parse_rows(rows: Vec<CustomerRow>) -> ScoreResult<Vec<Customer>> {
    let customers = rows
        .into_iter()
        .map(CustomerRow::into_customer)
        .collect::<ScoreResult<Vec<_>>>()?;
    validate_batch(&customers)?;
    Ok(customers)
}

// ── Data contract ────────────────────────────────────────────────────────────

/// Check the batch-level contract: unique ids, ordered dates and
/// non-negative finite spend. Every offending id is reported.
pub fn validate_batch(customers: &[Customer]) -> ScoreResult<()> {
    if customers.is_empty() {
        return Err(ScoreError::data_contract(
            "customer_id",
            Vec::new(),
            "customer batch is empty",
        ));
    }

    let mut seen = HashSet::with_capacity(customers.len());
    let duplicates: Vec<String> = customers
        .iter()
        .filter(|c| !seen.insert(c.customer_id.as_str()))
        .map(|c| c.customer_id.clone())
        .collect();
    if !duplicates.is_empty() {
        return Err(ScoreError::data_contract(
            "customer_id",
            duplicates,
            "customer_id must be unique",
        ));
    }

    let unordered: Vec<String> = customers
        .iter()
        .filter(|c| c.last_order_date < c.first_order_date)
        .map(|c| c.customer_id.clone())
        .collect();
    if !unordered.is_empty() {
        return Err(ScoreError::data_contract(
            "last_order_date",
            unordered,
            "last_order_date precedes first_order_date",
        ));
    }

    let monetary_columns: [(&str, fn(&Customer) -> f64); 2] = [
        ("monetary_online", |c| c.monetary_online),
        ("monetary_offline", |c| c.monetary_offline),
    ];
    for (column, get) in monetary_columns {
        let bad: Vec<String> = customers
            .iter()
            .filter(|c| {
                let v = get(c);
                !v.is_finite() || v < 0.0
            })
            .map(|c| c.customer_id.clone())
            .collect();
        if !bad.is_empty() {
            return Err(ScoreError::data_contract(
                column,
                bad,
                "monetary values must be finite and non-negative",
            ));
        }
    }
    Ok(())
}

// ── Informational views ──────────────────────────────────────────────────────

/// Unique customers, orders and value per acquisition channel.
pub fn channel_summary(customers: &[Customer]) -> Vec<ChannelSummary> {
    let mut by_channel: BTreeMap<&str, ChannelSummary> = BTreeMap::new();
    for c in customers {
        let channel = c.order_channel.as_deref().unwrap_or("unknown");
        let entry = by_channel.entry(channel).or_insert_with(|| ChannelSummary {
            channel:   channel.to_string(),
            customers: 0,
            orders:    0,
            value:     0.0,
        });
        entry.customers += 1;
        entry.orders += u64::from(c.total_orders());
        entry.value += c.total_value();
    }
    by_channel.into_values().collect()
}

/// The `n` highest-spending customers, ties kept in input order.
pub fn top_by_value(customers: &[Customer], n: usize) -> Vec<&Customer> {
    let mut sorted: Vec<&Customer> = customers.iter().collect();
    sorted.sort_by(|a, b| b.total_value().total_cmp(&a.total_value()));
    sorted.truncate(n);
    sorted
}

/// The `n` customers with the most orders, ties kept in input order.
pub fn top_by_orders(customers: &[Customer], n: usize) -> Vec<&Customer> {
    let mut sorted: Vec<&Customer> = customers.iter().collect();
    sorted.sort_by_key(|c| std::cmp::Reverse(c.total_orders()));
    sorted.truncate(n);
    sorted
}
