//! Gamma-Gamma monetary-value model.
//!
//! Individual transaction values are Gamma(p, ν) with a shared shape p and
//! a customer-specific rate ν ~ Gamma(q, γ). The expected average value of
//! a customer is a credibility-weighted blend of the population mean and
//! the customer's own observed average; more transactions, more weight on
//! the customer's own figure.
//!
//! RULE: the model assumes spend per transaction is independent of
//! purchase frequency. The assumption is checked before fitting; a strong
//! sample correlation is reported per `IndependencePolicy`.

use crate::{
    config::{IndependenceConfig, IndependencePolicy, OptimizerConfig},
    error::{ScoreError, ScoreResult},
    metrics::CustomerMetrics,
    optimize::minimize_from_starts,
    special::ln_gamma,
    stats::pearson_correlation,
};
use serde::{Deserialize, Serialize};

pub const MODEL_NAME: &str = "Gamma-Gamma";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GammaGammaParams {
    pub p: f64,
    pub q: f64,
    /// Scale γ of the rate prior.
    pub v: f64,
}

impl GammaGammaParams {
    fn validate(&self) -> ScoreResult<()> {
        if [self.p, self.q, self.v].iter().all(|x| x.is_finite() && *x > 0.0) {
            Ok(())
        } else {
            Err(ScoreError::fit(MODEL_NAME, format!("parameters must be finite and positive: {self:?}")))
        }
    }
}

#[derive(Debug, Clone)]
pub struct GammaGammaModel {
    params:             GammaGammaParams,
    penalizer:          f64,
    n_customers:        usize,
    neg_log_likelihood: f64,
    correlation:        Option<f64>,
}

impl GammaGammaModel {
    pub fn from_params(params: GammaGammaParams) -> ScoreResult<Self> {
        params.validate()?;
        Ok(Self {
            params,
            penalizer: 0.0,
            n_customers: 0,
            neg_log_likelihood: f64::NAN,
            correlation: None,
        })
    }

    pub fn fit(
        metrics: &[CustomerMetrics],
        penalizer: f64,
        independence: &IndependenceConfig,
        optimizer: &OptimizerConfig,
    ) -> ScoreResult<Self> {
        if metrics.is_empty() {
            return Err(ScoreError::fit(MODEL_NAME, "population is empty"));
        }

        let non_positive: Vec<String> = metrics
            .iter()
            .filter(|m| !(m.monetary_avg.is_finite() && m.monetary_avg > 0.0))
            .map(|m| m.customer_id.clone())
            .collect();
        if !non_positive.is_empty() {
            return Err(ScoreError::data_contract(
                "monetary_avg",
                non_positive,
                "average transaction value must be positive",
            ));
        }
        let no_orders: Vec<String> = metrics
            .iter()
            .filter(|m| m.frequency == 0)
            .map(|m| m.customer_id.clone())
            .collect();
        if !no_orders.is_empty() {
            return Err(ScoreError::data_contract(
                "frequency",
                no_orders,
                "frequency must be positive",
            ));
        }

        let frequencies: Vec<f64> = metrics.iter().map(|m| f64::from(m.frequency)).collect();
        let values: Vec<f64> = metrics.iter().map(|m| m.monetary_avg).collect();
        let correlation = check_independence(&frequencies, &values, independence)?;

        let data: Vec<(f64, f64)> = frequencies.into_iter().zip(values).collect();
        let min = minimize_from_starts(
            MODEL_NAME,
            |log_params| negative_log_likelihood(log_params, &data, penalizer),
            3,
            optimizer,
        )?;

        let params = GammaGammaParams {
            p: min.x[0].exp(),
            q: min.x[1].exp(),
            v: min.x[2].exp(),
        };
        params.validate()?;
        if params.q <= 1.0 {
            log::warn!(
                "{MODEL_NAME}: q={:.4} <= 1, population mean spend is undefined; \
                 value estimates extrapolate from individual averages",
                params.q,
            );
        }

        log::info!(
            "{MODEL_NAME}: fitted {} customers: p={:.4} q={:.4} v={:.4}",
            metrics.len(), params.p, params.q, params.v,
        );

        Ok(Self {
            params,
            penalizer,
            n_customers: metrics.len(),
            neg_log_likelihood: min.value,
            correlation,
        })
    }

    pub fn params(&self) -> &GammaGammaParams {
        &self.params
    }

    pub fn penalizer(&self) -> f64 {
        self.penalizer
    }

    pub fn n_customers(&self) -> usize {
        self.n_customers
    }

    pub fn neg_log_likelihood(&self) -> f64 {
        self.neg_log_likelihood
    }

    /// Sample frequency/value correlation seen at fit time.
    pub fn correlation(&self) -> Option<f64> {
        self.correlation
    }

    /// Population mean transaction value, defined only for q > 1.
    pub fn population_mean(&self) -> Option<f64> {
        let GammaGammaParams { p, q, v } = self.params;
        (q > 1.0).then(|| v * p / (q - 1.0))
    }

    /// Expected average transaction value given the observed history.
    pub fn conditional_expected_average_value(&self, frequency: f64, monetary_avg: f64) -> f64 {
        let GammaGammaParams { p, q, v } = self.params;
        let individual_weight = p * frequency / (p * frequency + q - 1.0);
        let population_mean = v * p / (q - 1.0);
        (1.0 - individual_weight) * population_mean + individual_weight * monetary_avg
    }

    pub fn conditional_expected_average_value_for(&self, m: &CustomerMetrics) -> f64 {
        self.conditional_expected_average_value(f64::from(m.frequency), m.monetary_avg)
    }
}

fn check_independence(
    frequencies: &[f64],
    values: &[f64],
    config: &IndependenceConfig,
) -> ScoreResult<Option<f64>> {
    let Some(rho) = pearson_correlation(frequencies, values) else {
        log::debug!("{MODEL_NAME}: frequency/value correlation undefined, skipping check");
        return Ok(None);
    };
    if rho.abs() > config.max_abs_correlation {
        let message = format!(
            "frequency and average value correlate at {rho:.3} (limit {:.3}); \
             the independence assumption does not hold",
            config.max_abs_correlation,
        );
        match config.policy {
            IndependencePolicy::Fail => return Err(ScoreError::fit(MODEL_NAME, message)),
            IndependencePolicy::Warn => log::warn!("{MODEL_NAME}: {message}"),
        }
    }
    Ok(Some(rho))
}

fn negative_log_likelihood(log_params: &[f64], data: &[(f64, f64)], penalizer: f64) -> f64 {
    let p = log_params[0].exp();
    let q = log_params[1].exp();
    let v = log_params[2].exp();

    let ln_gamma_q = ln_gamma(q);
    let q_ln_v = q * v.ln();

    let total: f64 = data
        .iter()
        .map(|&(x, m)| {
            let px = p * x;
            ln_gamma(px + q) - ln_gamma(px) - ln_gamma_q + q_ln_v
                + (px - 1.0) * m.ln()
                + px * x.ln()
                - (px + q) * (x * m + v).ln()
        })
        .sum();

    let penalty = penalizer * (p * p + q * q + v * v);
    -total / data.len() as f64 + penalty
}
