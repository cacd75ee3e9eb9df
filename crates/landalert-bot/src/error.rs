//! Error types for the service layer.

use landalert_core::{Hazard, ScoringError};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ServiceError>;

/// Failures while answering a chat update or an API request.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// A hazard evaluation did not finish in time (after the retry).
    #[error("{hazard} evaluation timed out after {secs}s")]
    Timeout { hazard: Hazard, secs: u64 },

    /// A hazard backend failed outright.
    #[error("{hazard} backend failed: {message}")]
    Backend { hazard: Hazard, message: String },

    #[error(transparent)]
    Scoring(#[from] ScoringError),

    #[error(transparent)]
    Advisor(#[from] AdvisorError),

    /// Record store failure (connection, query, missing row).
    #[error("store error: {0}")]
    Store(String),
}

impl ServiceError {
    /// Timeouts and backend failures: worth a "try again" answer.
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Backend { .. })
    }
}

impl From<sqlx::Error> for ServiceError {
    fn from(e: sqlx::Error) -> Self {
        Self::Store(e.to_string())
    }
}

/// AI text generation errors.
#[derive(Debug, Error)]
pub enum AdvisorError {
    /// Missing API key or invalid settings.
    #[error("advisor not configured: {0}")]
    Config(String),

    #[error("advisor network error: {0}")]
    Network(String),

    /// Non-2xx response.
    #[error("advisor API error: {0}")]
    Api(String),

    /// Unexpected response body.
    #[error("advisor parse error: {0}")]
    Parse(String),

    #[error("advisor timed out")]
    Timeout,
}

/// Outbound chat delivery errors.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport network error: {0}")]
    Network(String),

    #[error("transport API error ({status}): {body}")]
    Api { status: u16, body: String },
}
