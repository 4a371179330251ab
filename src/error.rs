use thiserror::Error;

use crate::models::Signal;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("invalid transcript: {0}")]
    InvalidTranscript(String),

    #[error("invalid severity {value} for {signal} in window {window_id}")]
    InvalidSeverity {
        window_id: usize,
        signal: Signal,
        value: f64,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, AnalysisError>;

/// Failure of an external collaborator call. Never fails a run on its own.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CollaboratorError {
    #[error("call timed out after {0} ms")]
    Timeout(u64),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("unavailable: {0}")]
    Unavailable(String),
}

impl CollaboratorError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::RateLimited(_))
    }
}
