use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Data contract violated on '{column}' ({} customer(s): {}): {reason}",
        .customer_ids.len(), preview_ids(.customer_ids))]
    DataContract {
        column: String,
        customer_ids: Vec<String>,
        reason: String,
    },

    #[error("{model} fit failed: {reason}")]
    Fit { model: &'static str, reason: String },

    #[error("RF code '{rf_code}' of customer '{customer_id}' matches no segment rule")]
    Segmentation { rf_code: String, customer_id: String },

    #[error("Stage '{stage}' failed: {source}")]
    Stage {
        stage: &'static str,
        #[source]
        source: Box<ScoreError>,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ScoreError {
    pub fn data_contract(
        column: impl Into<String>,
        customer_ids: Vec<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::DataContract {
            column: column.into(),
            customer_ids,
            reason: reason.into(),
        }
    }

    pub fn fit(model: &'static str, reason: impl Into<String>) -> Self {
        Self::Fit { model, reason: reason.into() }
    }

    /// Attach the failing pipeline stage. Already-wrapped errors are kept as is
    /// so the innermost stage name survives.
    pub fn in_stage(self, stage: &'static str) -> Self {
        match self {
            e @ Self::Stage { .. } => e,
            other => Self::Stage { stage, source: Box::new(other) },
        }
    }

    /// The stage name, if this error was raised inside the engine.
    pub fn stage(&self) -> Option<&'static str> {
        match self {
            Self::Stage { stage, .. } => Some(stage),
            _ => None,
        }
    }

    /// Strip the stage wrapper, if any.
    pub fn root(&self) -> &ScoreError {
        match self {
            Self::Stage { source, .. } => source.root(),
            other => other,
        }
    }
}

fn preview_ids(ids: &[String]) -> String {
    const SHOWN: usize = 5;
    let mut out = ids.iter().take(SHOWN).cloned().collect::<Vec<_>>().join(", ");
    if ids.len() > SHOWN {
        out.push_str(", ...");
    }
    out
}

pub type ScoreResult<T> = Result<T, ScoreError>;
