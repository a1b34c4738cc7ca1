use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum TaxError {
    #[error("Time source unavailable: {0}")]
    TimeSourceUnavailable(String),

    #[error("Invalid time of day: '{0}'")]
    InvalidTime(String),

    #[error("State source error: {0}")]
    StateSource(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt ledger file {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Background task failed: {0}")]
    Task(String),
}

impl TaxError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        TaxError::Io {
            path: path.into(),
            source,
        }
    }

    /// Transient failures that are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            TaxError::Io { source, .. } => source.kind() != std::io::ErrorKind::NotFound,
            TaxError::TimeSourceUnavailable(_) | TaxError::StateSource(_) => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, TaxError>;
