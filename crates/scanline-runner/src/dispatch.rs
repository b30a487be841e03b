use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scanline_core::TriggerId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::query::ScanPlan;

/// One ingestion job handed to the job system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchRequest {
    pub trigger_id: TriggerId,
    /// Unique per invocation (UUIDv7, time-sortable).
    pub iteration_id: Uuid,
    pub iteration_ts: DateTime<Utc>,
    pub partial: bool,
    pub tags: BTreeSet<String>,
    /// Connector-specific query.
    pub query: Value,
}

impl DispatchRequest {
    pub fn new(trigger_id: TriggerId, now: DateTime<Utc>, plan: &ScanPlan, query: Value) -> Self {
        Self {
            trigger_id,
            iteration_id: Uuid::now_v7(),
            iteration_ts: now,
            partial: plan.is_partial(),
            tags: plan.class.tags(),
            query,
        }
    }
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("job system unavailable: {0}")]
    Unavailable(String),

    #[error("job rejected: {0}")]
    Rejected(String),
}

/// The seam to whatever actually runs ingestion jobs.
#[async_trait]
pub trait JobDispatcher: Send + Sync {
    /// Submit `request`. An `Err` means the job was not accepted.
    async fn dispatch(&self, request: &DispatchRequest) -> Result<(), DispatchError>;
}

/// Forwards requests over an mpsc channel to an in-process consumer.
///
/// Uses `try_send`: a full or closed channel is a failed dispatch, so the
/// trigger's cursors stay put and the window is retried next time.
pub struct ChannelDispatcher {
    tx: mpsc::Sender<DispatchRequest>,
}

impl ChannelDispatcher {
    pub fn new(tx: mpsc::Sender<DispatchRequest>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl JobDispatcher for ChannelDispatcher {
    async fn dispatch(&self, request: &DispatchRequest) -> Result<(), DispatchError> {
        self.tx.try_send(request.clone()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                DispatchError::Unavailable("dispatch channel full".to_string())
            }
            mpsc::error::TrySendError::Closed(_) => {
                DispatchError::Unavailable("dispatch channel closed".to_string())
            }
        })
    }
}
