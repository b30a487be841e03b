use thiserror::Error;

/// Errors that can occur within the scheduler subsystem.
///
/// Deciding never fails; only building a scheduler from bad configuration does.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    /// A configuration value is out of range or inconsistent with its siblings.
    #[error("Invalid config `{field}`: {reason}")]
    InvalidConfig { field: &'static str, reason: String },
}

impl SchedulerError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        SchedulerError::InvalidConfig {
            field,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
