//! BG/NBD purchase-frequency model.
//!
//! While alive, a customer buys as a Poisson process with rate λ,
//! λ ~ Gamma(r, α) across customers. After every purchase the customer
//! drops out for good with probability p, p ~ Beta(a, b).
//!
//! Fitting maximises the mean log-likelihood over (frequency, recency, T)
//! minus an L2 penalty on (r, α, a, b). Time is rescaled so the longest
//! tenure is 10 units while fitting; α is mapped back to weeks afterwards.
//!
//! RULE: parameters are write-once. A model is produced by `fit` (or
//! `from_params`) and is only read afterwards.

use crate::{
    config::OptimizerConfig,
    error::{ScoreError, ScoreResult},
    metrics::CustomerMetrics,
    optimize::minimize_from_starts,
    special::{ln_gamma, ln_hyp2f1},
};
use serde::{Deserialize, Serialize};

pub const MODEL_NAME: &str = "BG/NBD";

/// Longest tenure after rescaling, for optimiser conditioning.
const FIT_TIME_SCALE: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BetaGeoParams {
    pub r:     f64,
    pub alpha: f64,
    pub a:     f64,
    pub b:     f64,
}

impl BetaGeoParams {
    fn validate(&self) -> ScoreResult<()> {
        let all = [self.r, self.alpha, self.a, self.b];
        if all.iter().all(|p| p.is_finite() && *p > 0.0) {
            Ok(())
        } else {
            Err(ScoreError::fit(MODEL_NAME, format!("parameters must be finite and positive: {self:?}")))
        }
    }
}

#[derive(Debug, Clone)]
pub struct BetaGeoModel {
    params:             BetaGeoParams,
    penalizer:          f64,
    n_customers:        usize,
    neg_log_likelihood: f64,
    iterations:         usize,
}

impl BetaGeoModel {
    /// Wrap already-known parameters (no fitting).
    pub fn from_params(params: BetaGeoParams) -> ScoreResult<Self> {
        params.validate()?;
        Ok(Self {
            params,
            penalizer: 0.0,
            n_customers: 0,
            neg_log_likelihood: f64::NAN,
            iterations: 0,
        })
    }

    /// Fit over the whole metrics population.
    pub fn fit(
        metrics: &[CustomerMetrics],
        penalizer: f64,
        optimizer: &OptimizerConfig,
    ) -> ScoreResult<Self> {
        if metrics.is_empty() {
            return Err(ScoreError::fit(MODEL_NAME, "population is empty"));
        }

        let invalid: Vec<String> = metrics
            .iter()
            .filter(|m| {
                !(m.recency_weeks >= 0.0
                    && m.tenure_weeks.is_finite()
                    && m.recency_weeks <= m.tenure_weeks)
            })
            .map(|m| m.customer_id.clone())
            .collect();
        if !invalid.is_empty() {
            return Err(ScoreError::data_contract(
                "recency_weeks",
                invalid,
                "recency must lie within [0, T]",
            ));
        }

        let max_tenure = metrics.iter().map(|m| m.tenure_weeks).fold(0.0, f64::max);
        if max_tenure <= 0.0 {
            return Err(ScoreError::fit(MODEL_NAME, "all tenures are zero"));
        }
        let scale = FIT_TIME_SCALE / max_tenure;

        let data: Vec<Observation> = metrics
            .iter()
            .map(|m| Observation {
                x:   f64::from(m.frequency),
                t_x: m.recency_weeks * scale,
                t:   m.tenure_weeks * scale,
            })
            .collect();

        let min = minimize_from_starts(
            MODEL_NAME,
            |log_params| negative_log_likelihood(log_params, &data, penalizer),
            4,
            optimizer,
        )?;

        let params = BetaGeoParams {
            r:     min.x[0].exp(),
            alpha: min.x[1].exp() / scale,
            a:     min.x[2].exp(),
            b:     min.x[3].exp(),
        };
        params.validate()?;

        log::info!(
            "{MODEL_NAME}: fitted {} customers: r={:.4} alpha={:.4} a={:.4} b={:.4}",
            metrics.len(), params.r, params.alpha, params.a, params.b,
        );

        Ok(Self {
            params,
            penalizer,
            n_customers: metrics.len(),
            neg_log_likelihood: min.value,
            iterations: min.iterations,
        })
    }

    pub fn params(&self) -> &BetaGeoParams {
        &self.params
    }

    pub fn penalizer(&self) -> f64 {
        self.penalizer
    }

    pub fn n_customers(&self) -> usize {
        self.n_customers
    }

    /// Penalised mean negative log-likelihood at the optimum (NaN when
    /// built from parameters).
    pub fn neg_log_likelihood(&self) -> f64 {
        self.neg_log_likelihood
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Expected number of purchases in the next `t` weeks for a customer
    /// with the given history.
    pub fn expected_transactions(&self, t: f64, frequency: f64, recency: f64, tenure: f64) -> f64 {
        if t <= 0.0 {
            return 0.0;
        }
        let BetaGeoParams { r, alpha, a, b } = self.params;
        let x = frequency;

        let hyp_a = r + x;
        let hyp_b = b + x;
        let hyp_c = a + b + x - 1.0;
        let z = t / (alpha + tenure + t);
        let ln_hyp = ln_hyp2f1(hyp_a, hyp_b, hyp_c, z);

        let first_term = (a + b + x - 1.0) / (a - 1.0);
        let second_term =
            1.0 - (ln_hyp + (r + x) * ((alpha + tenure) / (alpha + t + tenure)).ln()).exp();
        let numerator = first_term * second_term;

        let denominator = if x > 0.0 {
            1.0 + (a / (b + x - 1.0)) * ((alpha + tenure) / (alpha + recency)).powf(r + x)
        } else {
            1.0
        };
        numerator / denominator
    }

    pub fn expected_transactions_for(&self, t: f64, m: &CustomerMetrics) -> f64 {
        self.expected_transactions(t, f64::from(m.frequency), m.recency_weeks, m.tenure_weeks)
    }

    /// Probability the customer has not yet dropped out at T.
    pub fn probability_alive(&self, frequency: f64, recency: f64, tenure: f64) -> f64 {
        if frequency <= 0.0 {
            return 1.0;
        }
        let BetaGeoParams { r, alpha, a, b } = self.params;
        let log_div = (r + frequency) * ((alpha + tenure) / (alpha + recency)).ln()
            + (a / (b + frequency - 1.0)).ln();
        if log_div > f64::MAX.ln() {
            0.0
        } else {
            1.0 / (1.0 + log_div.exp())
        }
    }
}

// ── Likelihood ───────────────────────────────────────────────────────────────

struct Observation {
    x:   f64,
    t_x: f64,
    t:   f64,
}

fn negative_log_likelihood(log_params: &[f64], data: &[Observation], penalizer: f64) -> f64 {
    let r = log_params[0].exp();
    let alpha = log_params[1].exp();
    let a = log_params[2].exp();
    let b = log_params[3].exp();

    let ln_gamma_r = ln_gamma(r);
    let ln_gamma_b = ln_gamma(b);
    let ln_gamma_ab = ln_gamma(a + b);
    let ln_alpha = alpha.ln();
    let ln_a = a.ln();

    let total: f64 = data
        .iter()
        .map(|o| {
            let a1 = ln_gamma(r + o.x) - ln_gamma_r + r * ln_alpha;
            let a2 = ln_gamma_ab + ln_gamma(b + o.x) - ln_gamma_b - ln_gamma(a + b + o.x);
            let a3 = -(r + o.x) * (alpha + o.t).ln();
            let a4 = if o.x > 0.0 {
                ln_a - (b + o.x - 1.0).ln() - (r + o.x) * (o.t_x + alpha).ln()
            } else {
                f64::NEG_INFINITY
            };
            let peak = a3.max(a4);
            a1 + a2 + peak + ((a3 - peak).exp() + (a4 - peak).exp()).ln()
        })
        .sum();

    let penalty = penalizer * (r * r + alpha * alpha + a * a + b * b);
    -total / data.len() as f64 + penalty
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> BetaGeoModel {
        BetaGeoModel::from_params(BetaGeoParams { r: 0.25, alpha: 4.4, a: 0.8, b: 2.4 }).unwrap()
    }

    #[test]
    fn no_time_no_purchases() {
        assert_eq!(model().expected_transactions(0.0, 5.0, 10.0, 20.0), 0.0);
    }

    #[test]
    fn expectation_grows_with_horizon() {
        let m = model();
        let short = m.expected_transactions(12.0, 5.0, 10.0, 20.0);
        let long = m.expected_transactions(24.0, 5.0, 10.0, 20.0);
        assert!(short > 0.0);
        assert!(long > short);
    }

    #[test]
    fn recent_buyers_are_more_likely_alive() {
        let m = model();
        let recent = m.probability_alive(5.0, 19.0, 20.0);
        let lapsed = m.probability_alive(5.0, 2.0, 20.0);
        assert!(recent > lapsed);
        assert!((0.0..=1.0).contains(&recent));
        assert_eq!(m.probability_alive(0.0, 0.0, 20.0), 1.0);
    }

    #[test]
    fn rejects_non_positive_parameters() {
        let err = BetaGeoModel::from_params(BetaGeoParams { r: 1.0, alpha: 0.0, a: 1.0, b: 1.0 });
        assert!(matches!(err, Err(ScoreError::Fit { .. })));
    }

    #[test]
    fn empty_population_is_a_fit_error() {
        let err = BetaGeoModel::fit(&[], 0.001, &OptimizerConfig::default()).unwrap_err();
        assert!(matches!(err, ScoreError::Fit { model: MODEL_NAME, .. }));
    }
}
