//! The scoring engine: runs both pipelines over one customer batch.
//!
//! EXECUTION ORDER (fixed, documented, never reordered):
//!   CLTV:  outlier_capping → metric_derivation → frequency_fit →
//!          monetary_fit → cltv_composition → export
//!   RFM:   rfm_scoring → rfm_segmentation → action_filter → export
//!
//! RULES:
//!   - Configuration is passed in once and read by every stage.
//!   - Each model is fitted exactly once per run and only read afterwards.
//!   - A failing stage aborts the run; its error names the stage.
//!   - Every stage start, completion and failure is recorded as an event.

use crate::{
    action::select_customers,
    bgnbd::BetaGeoModel,
    cltv::{compose, CltvRecord},
    config::PipelineConfig,
    customer::{validate_batch, Customer},
    diagnostics::{period_transactions, PeriodTransactions, DEFAULT_MAX_BIN},
    error::{ScoreError, ScoreResult},
    event::{EventLogEntry, PipelineEvent, PipelineStage},
    gamma_gamma::GammaGammaModel,
    metrics::{analysis_date, build_metrics},
    outlier::{cap_outliers, CapReport},
    rfm::{assign_segments, compute_rfm, score_rfm, RfmRecord},
    store::ScoreStore,
    types::{CustomerId, RunId},
};
use chrono::NaiveDate;
use std::collections::HashSet;

/// Everything the CLTV pipeline produced.
#[derive(Debug, Clone)]
pub struct CltvOutcome {
    pub analysis_date:   NaiveDate,
    pub cap_reports:     Vec<CapReport>,
    /// Customers left out for having a single order.
    pub excluded:        usize,
    pub frequency_model: BetaGeoModel,
    pub value_model:     GammaGammaModel,
    pub records:         Vec<CltvRecord>,
    pub diagnostic:      Option<PeriodTransactions>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActionExport {
    pub name:         String,
    pub customer_ids: Vec<CustomerId>,
}

#[derive(Debug, Clone)]
pub struct ScoringReport {
    pub run_id:  RunId,
    pub cltv:    CltvOutcome,
    pub rfm:     Vec<RfmRecord>,
    pub actions: Vec<ActionExport>,
}

pub struct ScoringEngine {
    pub run_id: RunId,
    config:     PipelineConfig,
    store:      Option<ScoreStore>,
    events:     Vec<(&'static str, PipelineEvent)>,
    next_seq:   u64,
}

/// A fresh, globally unique run id.
pub fn new_run_id() -> RunId {
    format!("run-{}", uuid::Uuid::new_v4())
}

impl ScoringEngine {
    pub fn new(run_id: RunId, config: PipelineConfig) -> ScoreResult<Self> {
        config.validate()?;
        Ok(Self {
            run_id,
            config,
            store: None,
            events: Vec::new(),
            next_seq: 0,
        })
    }

    /// Persist this run's events (and exports, when enabled) to `store`.
    /// The store must already be migrated.
    pub fn attach_store(&mut self, store: ScoreStore) -> ScoreResult<()> {
        if !store.run_exists(&self.run_id)? {
            store.insert_run(
                &self.run_id,
                &serde_json::to_string(&self.config)?,
                env!("CARGO_PKG_VERSION"),
            )?;
        }
        for (seq, (stage, event)) in self.events.iter().enumerate() {
            store.append_event(&self.log_entry(seq as u64, stage, event)?)?;
        }
        self.store = Some(store);
        Ok(())
    }

    pub fn store(&self) -> Option<&ScoreStore> {
        self.store.as_ref()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Events emitted so far, in order.
    pub fn events(&self) -> impl Iterator<Item = &PipelineEvent> + '_ {
        self.events.iter().map(|(_, event)| event)
    }

    // ── Pipelines ──────────────────────────────────────────────

    /// Run both pipelines and the action filters.
    pub fn run(&mut self, customers: &[Customer]) -> ScoreResult<ScoringReport> {
        self.emit(
            "engine",
            PipelineEvent::RunStarted {
                run_id: self.run_id.clone(),
                customers: customers.len(),
                seed: self.config.optimizer.seed,
            },
        )?;

        let cltv = self.run_cltv(customers)?;
        let rfm = self.run_rfm(customers)?;
        let actions = self.run_actions(&rfm, customers)?;

        log::info!(
            "run {}: {} CLTV records, {} RFM records, {} action export(s)",
            self.run_id,
            cltv.records.len(),
            rfm.len(),
            actions.len(),
        );
        Ok(ScoringReport {
            run_id: self.run_id.clone(),
            cltv,
            rfm,
            actions,
        })
    }

    pub fn run_cltv(&mut self, customers: &[Customer]) -> ScoreResult<CltvOutcome> {
        let (capped, cap_reports) = self.run_stage(
            PipelineStage::OutlierCapping,
            |engine| {
                validate_batch(customers)?;
                let mut capped = customers.to_vec();
                let reports = cap_outliers(&mut capped, &engine.config.capping);
                for report in &reports {
                    if let Some(t) = report.thresholds {
                        engine.emit(
                            PipelineStage::OutlierCapping.name(),
                            PipelineEvent::OutliersCapped {
                                column: report.column.name().to_string(),
                                low: t.low,
                                high: t.high,
                                capped_low: report.capped_low,
                                capped_high: report.capped_high,
                            },
                        )?;
                    }
                }
                Ok((capped, reports))
            },
            |(capped, _)| capped.len(),
        )?;

        let (analysis_date, metrics) = self.run_stage(
            PipelineStage::MetricDerivation,
            |engine| {
                let date = analysis_date(&capped, &engine.config)?;
                Ok((date, build_metrics(&capped, date)?))
            },
            |(_, metrics)| metrics.len(),
        )?;
        let excluded = capped.len() - metrics.len();

        let frequency_model = self.run_stage(
            PipelineStage::FrequencyFit,
            |engine| {
                let model = BetaGeoModel::fit(
                    &metrics,
                    engine.config.bgnbd_penalizer,
                    &engine.config.optimizer,
                )?;
                let p = *model.params();
                engine.emit(
                    PipelineStage::FrequencyFit.name(),
                    PipelineEvent::FrequencyModelFitted {
                        r: p.r,
                        alpha: p.alpha,
                        a: p.a,
                        b: p.b,
                        neg_log_likelihood: model.neg_log_likelihood(),
                    },
                )?;
                Ok(model)
            },
            |model| model.n_customers(),
        )?;

        let value_model = self.run_stage(
            PipelineStage::MonetaryFit,
            |engine| {
                let model = GammaGammaModel::fit(
                    &metrics,
                    engine.config.gamma_gamma_penalizer,
                    &engine.config.independence,
                    &engine.config.optimizer,
                )?;
                let p = *model.params();
                engine.emit(
                    PipelineStage::MonetaryFit.name(),
                    PipelineEvent::MonetaryModelFitted {
                        p: p.p,
                        q: p.q,
                        v: p.v,
                        correlation: model.correlation(),
                    },
                )?;
                Ok(model)
            },
            |model| model.n_customers(),
        )?;

        let (records, diagnostic) = self.run_stage(
            PipelineStage::CltvComposition,
            |engine| {
                let records = compose(&metrics, &frequency_model, &value_model, &engine.config)?;
                let diagnostic = if engine.config.show_plot {
                    Some(period_transactions(
                        &frequency_model,
                        &metrics,
                        DEFAULT_MAX_BIN,
                        engine.config.optimizer.seed,
                    )?)
                } else {
                    None
                };
                Ok((records, diagnostic))
            },
            |(records, _)| records.len(),
        )?;

        if self.exporting() {
            let horizon_tag = self.config.horizon_tag();
            self.run_stage(
                PipelineStage::Export,
                |engine| {
                    if let Some(store) = &engine.store {
                        store.insert_cltv_records(&engine.run_id, &horizon_tag, &records)?;
                    }
                    Ok(())
                },
                |_| records.len(),
            )?;
        }

        Ok(CltvOutcome {
            analysis_date,
            cap_reports,
            excluded,
            frequency_model,
            value_model,
            records,
            diagnostic,
        })
    }

    /// RFM scores and segments for every customer, including those with a
    /// single order. Uses the batch as given, without outlier capping.
    pub fn run_rfm(&mut self, customers: &[Customer]) -> ScoreResult<Vec<RfmRecord>> {
        let (rows, scores) = self.run_stage(
            PipelineStage::RfmScoring,
            |engine| {
                validate_batch(customers)?;
                let rows = compute_rfm(customers, engine.config.rfm_reference_date);
                let scores = score_rfm(&rows);
                Ok((rows, scores))
            },
            |(rows, _)| rows.len(),
        )?;

        let records = self.run_stage(
            PipelineStage::RfmSegmentation,
            |engine| {
                let records = assign_segments(rows, &scores)?;
                let distinct: HashSet<_> = records.iter().map(|r| r.segment).collect();
                engine.emit(
                    PipelineStage::RfmSegmentation.name(),
                    PipelineEvent::SegmentsAssigned {
                        customers: records.len(),
                        distinct_segments: distinct.len(),
                    },
                )?;
                Ok(records)
            },
            |records| records.len(),
        )?;

        if self.exporting() {
            self.run_stage(
                PipelineStage::Export,
                |engine| {
                    if let Some(store) = &engine.store {
                        store.insert_rfm_records(&engine.run_id, &records)?;
                    }
                    Ok(())
                },
                |_| records.len(),
            )?;
        }
        Ok(records)
    }

    /// Apply every configured action filter to an RFM result.
    pub fn run_actions(
        &mut self,
        records: &[RfmRecord],
        customers: &[Customer],
    ) -> ScoreResult<Vec<ActionExport>> {
        let exports = self.run_stage(
            PipelineStage::ActionFilter,
            |engine| {
                let exports: Vec<ActionExport> = engine
                    .config
                    .action_filters
                    .iter()
                    .map(|filter| ActionExport {
                        name:         filter.name.clone(),
                        customer_ids: select_customers(records, customers, filter),
                    })
                    .collect();
                for export in &exports {
                    engine.emit(
                        PipelineStage::ActionFilter.name(),
                        PipelineEvent::ActionSelected {
                            name: export.name.clone(),
                            customers: export.customer_ids.len(),
                        },
                    )?;
                }
                Ok(exports)
            },
            |exports| exports.iter().map(|e| e.customer_ids.len()).sum(),
        )?;

        if self.exporting() {
            self.run_stage(
                PipelineStage::Export,
                |engine| {
                    if let Some(store) = &engine.store {
                        for export in &exports {
                            store.insert_action_export(&engine.run_id, &export.name, &export.customer_ids)?;
                        }
                    }
                    Ok(())
                },
                |_| exports.len(),
            )?;
        }
        Ok(exports)
    }

    // ── Internals ──────────────────────────────────────────────

    fn exporting(&self) -> bool {
        if self.config.export && self.store.is_none() {
            log::warn!("export requested but no store is attached; skipping export");
        }
        self.config.export && self.store.is_some()
    }

    /// Run one stage body between its start and completion events.
    /// Failures are logged as events and tagged with the stage name.
    fn run_stage<T>(
        &mut self,
        stage: PipelineStage,
        body: impl FnOnce(&mut Self) -> ScoreResult<T>,
        records: impl FnOnce(&T) -> usize,
    ) -> ScoreResult<T> {
        self.emit(stage.name(), PipelineEvent::StageStarted { stage })
            .map_err(|e| e.in_stage(stage.name()))?;

        match body(self) {
            Ok(value) => {
                let records = records(&value);
                log::info!("stage {}: {records} record(s)", stage.name());
                self.emit(stage.name(), PipelineEvent::StageCompleted { stage, records })
                    .map_err(|e| e.in_stage(stage.name()))?;
                Ok(value)
            }
            Err(err) => {
                log::error!("stage {} failed: {err}", stage.name());
                let failed = PipelineEvent::StageFailed {
                    stage,
                    error: err.to_string(),
                };
                if let Err(log_err) = self.emit(stage.name(), failed) {
                    log::warn!("could not record failure of stage {}: {log_err}", stage.name());
                }
                Err(err.in_stage(stage.name()))
            }
        }
    }

    fn log_entry(&self, seq: u64, stage: &str, event: &PipelineEvent) -> ScoreResult<EventLogEntry> {
        Ok(EventLogEntry {
            id:         None,
            run_id:     self.run_id.clone(),
            seq,
            stage:      stage.to_string(),
            event_type: event.type_name().to_string(),
            payload:    serde_json::to_string(event)?,
        })
    }

    fn emit(&mut self, stage: &'static str, event: PipelineEvent) -> ScoreResult<()> {
        let seq = self.next_seq;
        self.next_seq += 1;
        if let Some(store) = &self.store {
            store.append_event(&self.log_entry(seq, stage, &event)?)?;
        }
        self.events.push((stage, event));
        Ok(())
    }
}

impl std::fmt::Debug for ScoringEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScoringEngine")
            .field("run_id", &self.run_id)
            .field("events", &self.events.len())
            .field("store", &self.store.as_ref().map(|s| s.path().unwrap_or(":memory:")))
            .finish()
    }
}

/// Convenience for callers that only need the error's stage and root.
pub fn describe_failure(err: &ScoreError) -> String {
    match err.stage() {
        Some(stage) => format!("stage '{stage}': {}", err.root()),
        None => err.to_string(),
    }
}
