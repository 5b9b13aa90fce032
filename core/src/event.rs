//! Pipeline events and the run log.
//!
//! RULE: every stage start, completion and failure is recorded as an
//! event. When a store is attached the engine persists each event as it
//! is emitted; the in-memory log is kept either way.

use crate::types::RunId;
use serde::{Deserialize, Serialize};

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    OutlierCapping,
    MetricDerivation,
    FrequencyFit,
    MonetaryFit,
    CltvComposition,
    RfmScoring,
    RfmSegmentation,
    ActionFilter,
    Export,
}

impl PipelineStage {
    pub fn name(&self) -> &'static str {
        match self {
            Self::OutlierCapping   => "outlier_capping",
            Self::MetricDerivation => "metric_derivation",
            Self::FrequencyFit     => "frequency_fit",
            Self::MonetaryFit      => "monetary_fit",
            Self::CltvComposition  => "cltv_composition",
            Self::RfmScoring       => "rfm_scoring",
            Self::RfmSegmentation  => "rfm_segmentation",
            Self::ActionFilter     => "action_filter",
            Self::Export           => "export",
        }
    }
}

/// Every event emitted during a scoring run.
/// Variants may be added, never removed or reordered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    // ── Engine events ──────────────────────────────
    RunStarted {
        run_id: RunId,
        customers: usize,
        seed: u64,
    },
    StageStarted {
        stage: PipelineStage,
    },
    StageCompleted {
        stage: PipelineStage,
        records: usize,
    },
    StageFailed {
        stage: PipelineStage,
        error: String,
    },

    // ── CLTV events ────────────────────────────────
    OutliersCapped {
        column: String,
        low: f64,
        high: f64,
        capped_low: usize,
        capped_high: usize,
    },
    FrequencyModelFitted {
        r: f64,
        alpha: f64,
        a: f64,
        b: f64,
        neg_log_likelihood: f64,
    },
    MonetaryModelFitted {
        p: f64,
        q: f64,
        v: f64,
        correlation: Option<f64>,
    },

    // ── RFM events ─────────────────────────────────
    SegmentsAssigned {
        customers: usize,
        distinct_segments: usize,
    },
    ActionSelected {
        name: String,
        customers: usize,
    },
}

impl PipelineEvent {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::RunStarted { .. }           => "run_started",
            Self::StageStarted { .. }         => "stage_started",
            Self::StageCompleted { .. }       => "stage_completed",
            Self::StageFailed { .. }          => "stage_failed",
            Self::OutliersCapped { .. }       => "outliers_capped",
            Self::FrequencyModelFitted { .. } => "frequency_model_fitted",
            Self::MonetaryModelFitted { .. }  => "monetary_model_fitted",
            Self::SegmentsAssigned { .. }     => "segments_assigned",
            Self::ActionSelected { .. }       => "action_selected",
        }
    }
}

/// The event log entry as persisted to SQLite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub id:         Option<i64>,
    pub run_id:     RunId,
    pub seq:        u64,
    pub stage:      String,
    pub event_type: String,
    pub payload:    String, // JSON-serialized PipelineEvent
}
