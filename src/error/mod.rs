use std::fmt;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("pipeline error: {context}")]
    Pipeline { context: &'static str },

    #[error("stage `{stage}` error: {message}")]
    Stage { stage: &'static str, message: String },

    #[error("stage `{stage}` failed on item {index}: {source}")]
    Item {
        stage: &'static str,
        index: u64,
        #[source]
        source: Box<Error>,
    },

    #[error(transparent)]
    Aggregate(#[from] AggregateError),

    #[error("pipeline closed early by stage `{stage}`")]
    Closed { stage: &'static str },

    #[error("pipeline aborted")]
    Aborted,

    #[error("worker {worker_index} failed: {message}")]
    WorkerFailed { worker_index: usize, message: String },

    #[cfg(feature = "ndjson")]
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("{0}")]
    Custom(String),
}

impl Error {
    pub fn pipeline(context: &'static str) -> Self {
        Self::Pipeline { context }
    }

    pub fn stage(stage: &'static str, message: impl Into<String>) -> Self {
        Self::Stage {
            stage,
            message: message.into(),
        }
    }

    pub fn item(stage: &'static str, index: u64, source: Error) -> Self {
        Self::Item {
            stage,
            index,
            source: Box::new(source),
        }
    }

    pub fn custom(message: impl fmt::Display) -> Self {
        Self::Custom(message.to_string())
    }

    /// Whether a stage failing with this error stops the rest of the
    /// pipeline. An aggregate error is only raised once its stage consumed
    /// all of its input, so the stages after it are left to drain.
    pub fn cancels_pipeline(&self) -> bool {
        !matches!(self, Self::Aggregate(_))
    }

    /// True for the outcomes the driver can be told to treat as success.
    pub fn is_graceful(&self) -> bool {
        matches!(self, Self::Closed { .. } | Self::Aborted)
    }
}

/// One failed item inside an [`AggregateError`].
#[derive(Debug)]
pub struct ItemFailure {
    pub index: u64,
    pub error: Error,
}

/// Every per-item failure collected by a stage running in
/// `ErrorMode::ThrowAggregated`, raised once the stage input is exhausted.
#[derive(Debug)]
pub struct AggregateError {
    stage: &'static str,
    failures: Vec<ItemFailure>,
    succeeded: u64,
}

impl AggregateError {
    pub fn new(stage: &'static str, failures: Vec<ItemFailure>, succeeded: u64) -> Self {
        Self {
            stage,
            failures,
            succeeded,
        }
    }

    pub fn stage(&self) -> &'static str {
        self.stage
    }

    pub fn failures(&self) -> &[ItemFailure] {
        &self.failures
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    /// Items that went through the stage without error.
    pub fn succeeded(&self) -> u64 {
        self.succeeded
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "stage `{}`: {} item(s) failed, {} succeeded",
            self.stage,
            self.failures.len(),
            self.succeeded
        )?;
        for failure in &self.failures {
            write!(f, "\n  item {}: {}", failure.index, failure.error)?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregateError {}
