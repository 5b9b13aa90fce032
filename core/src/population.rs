//! Seeded synthetic customer batches.
//!
//! Customers are drawn from the same generative story the two models
//! assume: a Gamma-distributed purchase rate, a Beta-distributed dropout
//! probability checked after every order, and Gamma-distributed spend
//! around a customer-specific mean. Used by the runner and by tests.

use crate::{
    bgnbd::BetaGeoParams,
    customer::Customer,
    error::ScoreResult,
    gamma_gamma::GammaGammaParams,
    rng::{RngBank, RngSlot, ScoreRng},
};
use chrono::{Duration, NaiveDate};

const CHANNELS: [&str; 4] = ["Android App", "Desktop", "Ios App", "Mobile"];

const CATEGORIES: [&str; 7] = [
    "[KADIN]",
    "[ERKEK]",
    "[ERKEK, KADIN]",
    "[COCUK]",
    "[AKTIFCOCUK, ERKEK]",
    "[AKTIFSPOR]",
    "[]",
];

#[derive(Debug, Clone)]
pub struct PopulationConfig {
    pub customers:          usize,
    pub seed:               u64,
    /// Date of the last possible order.
    pub end_date:           NaiveDate,
    pub min_tenure_weeks:   f64,
    pub max_tenure_weeks:   f64,
    pub frequency:          BetaGeoParams,
    pub value:              GammaGammaParams,
    pub online_share:       f64,
    pub missing_categories: f64,
}

impl Default for PopulationConfig {
    fn default() -> Self {
        Self {
            customers:          500,
            seed:               42,
            end_date:           NaiveDate::from_ymd_opt(2021, 5, 30).unwrap_or(NaiveDate::MIN),
            min_tenure_weeks:   8.0,
            max_tenure_weeks:   120.0,
            frequency:          BetaGeoParams { r: 2.0, alpha: 20.0, a: 0.8, b: 4.0 },
            value:              GammaGammaParams { p: 6.0, q: 4.0, v: 60.0 },
            online_share:       0.6,
            missing_categories: 0.05,
        }
    }
}

/// Draw a batch of customers. Same config, same batch.
pub fn generate(config: &PopulationConfig) -> ScoreResult<Vec<Customer>> {
    let mut rng = RngBank::new(config.seed)
        .for_slot(RngSlot::Population)
        .with_name("population");

    let customers = (0..config.customers)
        .map(|i| draw_customer(&mut rng, config, i))
        .collect::<ScoreResult<Vec<_>>>()?;

    log::debug!(
        "population: generated {} customers (seed {})",
        customers.len(),
        config.seed,
    );
    Ok(customers)
}

fn pick<'a>(rng: &mut ScoreRng, items: &[&'a str]) -> &'a str {
    let idx = (rng.next_f64() * items.len() as f64) as usize;
    items[idx.min(items.len() - 1)]
}

fn draw_customer(rng: &mut ScoreRng, config: &PopulationConfig, index: usize) -> ScoreResult<Customer> {
    let BetaGeoParams { r, alpha, a, b } = config.frequency;
    let GammaGammaParams { p, q, v } = config.value;

    let tenure = config.min_tenure_weeks
        + rng.next_f64() * (config.max_tenure_weeks - config.min_tenure_weeks);
    let rate = rng.gamma(r, 1.0 / alpha)?;
    let dropout = rng.beta(a, b)?;
    let spend_rate = rng.gamma(q, 1.0 / v)?;

    // Weeks after the first order at which each order happened.
    let mut order_weeks = vec![0.0];
    let mut t = 0.0;
    while !rng.chance(dropout) {
        t += rng.exponential(rate)?;
        if t > tenure {
            break;
        }
        order_weeks.push(t);
    }

    let mut counts = [0u32; 2];
    let mut spend = [0.0f64; 2];
    let mut last_week = [None::<f64>; 2];
    for &week in &order_weeks {
        let channel = usize::from(!rng.chance(config.online_share));
        counts[channel] += 1;
        spend[channel] += rng.gamma(p, 1.0 / spend_rate)?;
        last_week[channel] = Some(week);
    }

    let first_order_date = config.end_date - days(tenure);
    let on = |week: f64| first_order_date + days(week);
    let last_order_date = on(order_weeks.last().copied().unwrap_or(0.0));

    let order_channel = pick(rng, &CHANNELS).to_string();
    let last_order_channel = if counts[0] > 0 && rng.chance(0.8) {
        order_channel.clone()
    } else {
        "Offline".to_string()
    };
    let category_interest = if rng.chance(config.missing_categories) {
        None
    } else {
        Some(pick(rng, &CATEGORIES).to_string())
    };

    Ok(Customer {
        customer_id: format!("cust-{index:06}"),
        order_channel: Some(order_channel),
        last_order_channel: Some(last_order_channel),
        first_order_date,
        last_order_date,
        last_order_date_online: last_week[0].map(on),
        last_order_date_offline: last_week[1].map(on),
        order_count_online: counts[0],
        order_count_offline: counts[1],
        monetary_online: round_cents(spend[0]),
        monetary_offline: round_cents(spend[1]),
        category_interest,
    })
}

fn days(weeks: f64) -> Duration {
    Duration::days((weeks * 7.0).round() as i64)
}

fn round_cents(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}
