use scanline_core::ScanlineError;
use scanline_scheduler::SchedulerError;
use thiserror::Error;

/// Errors that can occur while firing triggers.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// Underlying SQLite / rusqlite error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The trigger's effective scan settings were rejected.
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    /// The job system refused the request. Nothing was persisted.
    #[error("Dispatch failed for trigger {trigger_id}: {reason}")]
    Dispatch { trigger_id: String, reason: String },

    #[error("Query build failed for connector {connector}: {reason}")]
    Query { connector: String, reason: String },

    #[error("Trigger not found: {id}")]
    TriggerNotFound { id: String },

    /// A thread panicked while holding the metadata store lock.
    #[error("Metadata store lock poisoned")]
    LockPoisoned,

    #[error(transparent)]
    Core(#[from] ScanlineError),
}

pub type Result<T> = std::result::Result<T, RunnerError>;
