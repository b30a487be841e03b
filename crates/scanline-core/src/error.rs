use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScanlineError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ScanlineError {
    /// Short error code string, stable across releases.
    pub fn code(&self) -> &'static str {
        match self {
            ScanlineError::Config(_) => "CONFIG_ERROR",
            ScanlineError::Io(_) => "IO_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, ScanlineError>;
