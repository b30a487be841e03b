//! Fires scan triggers.
//!
//! Each firing loads the trigger's metadata blob, asks
//! [`scanline_scheduler::CursorScheduler`] for the next window, builds the
//! connector query, dispatches the job and, only once the job is accepted,
//! persists the new blob.

pub mod db;
pub mod dispatch;
pub mod error;
pub mod firing;
pub mod query;
pub mod runner;
pub mod store;
pub mod trigger;

pub use dispatch::{ChannelDispatcher, DispatchError, DispatchRequest, JobDispatcher};
pub use error::{Result, RunnerError};
pub use firing::FiringLoop;
pub use query::{ConnectorQueryBuilder, IterativeScanQueryBuilder, QueryError, ScanPlan};
pub use runner::{FireOutcome, TriggerRunner};
pub use store::{MemoryMetadataStore, Metadata, MetadataStore, SqliteMetadataStore};
pub use trigger::{TriggerRecord, TriggerRegistry, TriggerSource};
