//! Cursor-based incremental / historical scan scheduling.
//!
//! # Overview
//!
//! Connectors that poll an external system run as stateless trigger
//! firings. Each firing hands the persisted [`ScanCursorState`] to
//! [`CursorScheduler::next`], which returns the [`ScanWindow`] to fetch,
//! its [`ScanClass`], and the state to persist after a successful dispatch.
//! Everything in this crate is pure: no I/O and no logging.
//!
//! # Decision order
//!
//! | Step | Condition                                   | Class        |
//! |------|---------------------------------------------|--------------|
//! | 1    | never ran (no forward cursor)               | `Full`       |
//! | 2    | `now - last_full_scan_at >= full interval`  | `Full`       |
//! | 3    | historical escalation active                | `Historical` |
//! | 4    | backward cursor above the onboarding horizon| `Backward`   |
//! | 5    | otherwise: `[forward cursor, now]`          | `Forward`    |
//!
//! A zero-width `Forward` window is the "nothing to do" signal.
//! [`AuxiliaryGate`] decides independently which secondary entity kinds
//! ride along with the dispatched job.

pub mod auxiliary;
pub mod config;
pub mod engine;
pub mod error;
pub mod historical;
pub mod state;
pub mod window;

pub use auxiliary::{AuxiliaryGate, AuxiliaryPlan};
pub use config::{HistoricalConfig, TriggerConfig};
pub use engine::{CursorScheduler, Decision};
pub use error::{Result, SchedulerError};
pub use historical::HistoricalBackfillEscalation;
pub use state::{Decoded, HistoricalMode, ScanCursorState, StateRepair};
pub use window::{ScanClass, ScanType, ScanWindow};
