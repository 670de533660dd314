//! Error types used throughout the application

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Main error type for duesync
#[derive(Error, Debug)]
pub enum DueSyncError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("authentication error: {0}")]
    Auth(String),

    /// The upstream signalled an active lock-out (`PUCX-ER1001`). The call
    /// already registered the release instant with the rate gate; this error
    /// only tells the pipeline to record the failure and move on.
    #[error("upstream lock-out active until {until}")]
    RateLocked { until: DateTime<Utc> },

    #[error("transient upstream error: {0}")]
    Transient(String),

    #[error("permanent upstream error: {0}")]
    Permanent(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("normalization error: {0}")]
    Normalize(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type alias for duesync operations
pub type Result<T> = std::result::Result<T, DueSyncError>;

impl DueSyncError {
    /// Stable label suitable for run summaries and structured logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Auth(_) => "auth",
            Self::RateLocked { .. } => "rate_locked",
            Self::Transient(_) => "transient",
            Self::Permanent(_) => "permanent",
            Self::Database(_) => "database",
            Self::Normalize(_) => "normalize",
            Self::Cancelled => "cancelled",
            Self::Internal(_) => "internal",
        }
    }

    /// Errors that abort the whole run instead of skipping one DUE.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Auth(_) | Self::Database(_))
    }
}
