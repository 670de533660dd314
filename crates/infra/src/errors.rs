//! Error mapping between third-party crates and the domain error type.

use duesync_domain::DueSyncError;

pub(crate) fn map_sql(err: rusqlite::Error) -> DueSyncError {
    DueSyncError::Database(err.to_string())
}

pub(crate) fn map_pool(err: r2d2::Error) -> DueSyncError {
    DueSyncError::Database(format!("connection pool: {err}"))
}

pub(crate) fn map_join(err: tokio::task::JoinError) -> DueSyncError {
    if err.is_cancelled() {
        DueSyncError::Internal("blocking task cancelled".into())
    } else {
        DueSyncError::Internal(format!("blocking task failed: {err}"))
    }
}

/// Network-level failures are transient (the caller decides whether to
/// retry); anything else at this layer is an internal defect.
pub(crate) fn classify_reqwest(err: reqwest::Error) -> DueSyncError {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        DueSyncError::Transient(format!("http: {err}"))
    } else if err.is_decode() {
        DueSyncError::Transient(format!("http body: {err}"))
    } else {
        DueSyncError::Internal(format!("http client: {err}"))
    }
}
