//! Period-transactions diagnostic: observed purchase counts next to
//! counts simulated from a fitted BG/NBD model over each customer's own
//! tenure. Informational only; nothing here feeds back into scoring.

use crate::{
    bgnbd::{BetaGeoModel, BetaGeoParams},
    error::ScoreResult,
    metrics::CustomerMetrics,
    rng::{RngBank, RngSlot, ScoreRng},
};
use serde::Serialize;

/// Counts at or above this value share the last bin.
pub const DEFAULT_MAX_BIN: u32 = 7;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodBin {
    pub label:     String,
    pub observed:  usize,
    pub simulated: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodTransactions {
    pub bins: Vec<PeriodBin>,
}

impl PeriodTransactions {
    pub fn total_observed(&self) -> usize {
        self.bins.iter().map(|b| b.observed).sum()
    }

    pub fn total_simulated(&self) -> usize {
        self.bins.iter().map(|b| b.simulated).sum()
    }
}

pub fn period_transactions(
    model: &BetaGeoModel,
    metrics: &[CustomerMetrics],
    max_bin: u32,
    seed: u64,
) -> ScoreResult<PeriodTransactions> {
    let mut rng = RngBank::new(seed).for_slot(RngSlot::Diagnostics);
    let width = max_bin as usize + 1;
    let mut observed = vec![0usize; width];
    let mut simulated = vec![0usize; width];

    for m in metrics {
        observed[m.frequency.min(max_bin) as usize] += 1;
        let count = simulate_count(&mut rng, model.params(), m.tenure_weeks)?;
        simulated[count.min(max_bin) as usize] += 1;
    }

    let bins = (0..=max_bin)
        .map(|k| PeriodBin {
            label: if k == max_bin { format!("{k}+") } else { k.to_string() },
            observed: observed[k as usize],
            simulated: simulated[k as usize],
        })
        .collect::<Vec<_>>();

    for bin in &bins {
        log::info!(
            "period transactions {:>3}: observed {:>6} simulated {:>6}",
            bin.label, bin.observed, bin.simulated,
        );
    }
    Ok(PeriodTransactions { bins })
}

/// Purchases in (0, T] for one customer drawn from the model's priors.
fn simulate_count(rng: &mut ScoreRng, params: &BetaGeoParams, tenure: f64) -> ScoreResult<u32> {
    let rate = rng.gamma(params.r, 1.0 / params.alpha)?;
    let dropout = rng.beta(params.a, params.b)?;
    let mut t = 0.0;
    let mut count = 0;
    loop {
        t += rng.exponential(rate)?;
        if t > tenure {
            return Ok(count);
        }
        count += 1;
        if rng.chance(dropout) {
            return Ok(count);
        }
    }
}
