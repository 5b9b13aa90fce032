//! Pipeline configuration.
//!
//! RULE: No stage reads ambient state. Every tunable flows through
//! `PipelineConfig`, passed explicitly into each stage, so two runs with
//! the same config and the same customer batch produce identical output.

use crate::rfm::RfmSegment;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// ── Outlier capping ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CappingConfig {
    pub lower_quantile: f64,
    pub upper_quantile: f64,
    pub iqr_multiplier: f64,
}

impl Default for CappingConfig {
    fn default() -> Self {
        Self {
            lower_quantile: 0.01,
            upper_quantile: 0.99,
            iqr_multiplier: 1.5,
        }
    }
}

// ── Optimiser ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OptimizerConfig {
    pub max_iterations: usize,
    pub tolerance: f64,
    /// Extra jittered starting points tried after the default start.
    pub restarts: usize,
    pub seed: u64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            max_iterations: 2000,
            tolerance: 1e-8,
            restarts: 8,
            seed: 42,
        }
    }
}

// ── Gamma-Gamma independence precondition ───────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IndependencePolicy {
    Warn,
    Fail,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IndependenceConfig {
    pub max_abs_correlation: f64,
    pub policy: IndependencePolicy,
}

impl Default for IndependenceConfig {
    fn default() -> Self {
        Self {
            max_abs_correlation: 0.3,
            policy: IndependencePolicy::Warn,
        }
    }
}

// ── Action filters ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActionFilterConfig {
    pub name: String,
    pub segments: Vec<RfmSegment>,
    /// Case-insensitive substrings; any one matching selects the customer.
    pub category_patterns: Vec<String>,
}

impl ActionFilterConfig {
    /// Champions and loyal customers interested in women's products.
    pub fn loyal_champ_women() -> Self {
        Self {
            name: "loyal_champ_woman_customers".into(),
            segments: vec![RfmSegment::Champions, RfmSegment::LoyalCustomers],
            category_patterns: vec!["KADIN".into()],
        }
    }

    /// Lapsing customers interested in men's or children's products.
    pub fn discount_men_children() -> Self {
        Self {
            name: "discount_male_kids".into(),
            segments: vec![
                RfmSegment::CantLoose,
                RfmSegment::AboutToSleep,
                RfmSegment::AtRisk,
            ],
            category_patterns: vec!["ERKEK".into(), "ÇOCUK".into(), "COCUK".into()],
        }
    }
}

// ── Pipeline ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    /// CLTV horizon in months.
    pub month: u32,
    /// Compute the period-transactions diagnostic. Never changes scores.
    pub show_plot: bool,
    /// Persist CLTV and action outputs to the attached store.
    #[serde(alias = "export_csv")]
    pub export: bool,
    pub bgnbd_penalizer: f64,
    pub gamma_gamma_penalizer: f64,
    pub discount_rate: f64,
    /// Overrides the derived analysis date when set.
    pub analysis_date: Option<NaiveDate>,
    pub analysis_buffer_days: i64,
    pub prediction_horizons_weeks: [f64; 2],
    pub weeks_per_month: f64,
    pub capping: CappingConfig,
    pub optimizer: OptimizerConfig,
    pub independence: IndependenceConfig,
    pub rfm_reference_date: NaiveDate,
    pub action_filters: Vec<ActionFilterConfig>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            month: 6,
            show_plot: false,
            export: false,
            bgnbd_penalizer: 0.001,
            gamma_gamma_penalizer: 0.01,
            discount_rate: 0.01,
            analysis_date: None,
            analysis_buffer_days: 2,
            prediction_horizons_weeks: [12.0, 24.0],
            weeks_per_month: 4.345,
            capping: CappingConfig::default(),
            optimizer: OptimizerConfig::default(),
            independence: IndependenceConfig::default(),
            rfm_reference_date: NaiveDate::from_ymd_opt(2021, 6, 1)
                .unwrap_or(NaiveDate::MIN),
            action_filters: vec![
                ActionFilterConfig::loyal_champ_women(),
                ActionFilterConfig::discount_men_children(),
            ],
        }
    }
}

impl PipelineConfig {
    /// Load from a JSON file. Missing fields take their defaults.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: PipelineConfig = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))?;
        config.validate()?;
        Ok(config)
    }

    /// Config with hardcoded defaults for use in tests.
    pub fn default_test() -> Self {
        Self::default()
    }

    /// Horizon tag used to name CLTV exports, e.g. `6m`.
    pub fn horizon_tag(&self) -> String {
        format!("{}m", self.month)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.month == 0 {
            anyhow::bail!("month must be at least 1");
        }
        if self.prediction_horizons_weeks.iter().any(|h| !(*h > 0.0)) {
            anyhow::bail!(
                "prediction horizons must be positive, got {:?}",
                self.prediction_horizons_weeks
            );
        }
        if !(self.weeks_per_month > 0.0) {
            anyhow::bail!("weeks_per_month must be positive");
        }
        let c = &self.capping;
        if !(0.0..=1.0).contains(&c.lower_quantile)
            || !(0.0..=1.0).contains(&c.upper_quantile)
            || c.lower_quantile > c.upper_quantile
        {
            anyhow::bail!(
                "capping quantiles must satisfy 0 <= lower <= upper <= 1, got {} / {}",
                c.lower_quantile,
                c.upper_quantile
            );
        }
        if self.bgnbd_penalizer < 0.0 || self.gamma_gamma_penalizer < 0.0 {
            anyhow::bail!("penalizer coefficients must be non-negative");
        }
        if self.discount_rate <= -1.0 {
            anyhow::bail!("discount_rate must be greater than -1");
        }
        if self.optimizer.max_iterations == 0 {
            anyhow::bail!("optimizer.max_iterations must be at least 1");
        }
        Ok(())
    }
}
