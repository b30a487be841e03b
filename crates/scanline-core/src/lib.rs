//! Identifiers, configuration and errors shared by the
//! scheduler library and the trigger runner.

pub mod config;
pub mod error;
pub mod types;

pub use config::{ScanOverrides, ScanSettings, ScanlineConfig};
pub use error::{Result, ScanlineError};
pub use types::{EntityKind, TriggerId};
