//! Error taxonomy for the sync job boundary.
//!
//! Every failure a reconciliation pass can hit is folded into a `SyncError`
//! before it leaves the runner. Callers branch on `kind()`, never on message
//! text.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Transport,
    Timeout,
    Persistence,
    Validation,
    Busy,
    Unknown,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Transport => "transport",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Persistence => "persistence",
            ErrorKind::Validation => "validation",
            ErrorKind::Busy => "busy",
            ErrorKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error)]
pub enum SyncError {
    #[error("catalog transport error: {0}")]
    Transport(String),
    #[error("{0}")]
    Timeout(String),
    #[error("data store error: {0}")]
    Persistence(String),
    #[error("invalid catalog data: {0}")]
    Validation(String),
    #[error("a catalog sync is already in progress")]
    Busy,
    #[error("unexpected failure: {0}")]
    Unknown(String),
}

impl SyncError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::Transport(_) => ErrorKind::Transport,
            SyncError::Timeout(_) => ErrorKind::Timeout,
            SyncError::Persistence(_) => ErrorKind::Persistence,
            SyncError::Validation(_) => ErrorKind::Validation,
            SyncError::Busy => ErrorKind::Busy,
            SyncError::Unknown(_) => ErrorKind::Unknown,
        }
    }

    pub fn timeout(what: &str, after: Duration) -> Self {
        SyncError::Timeout(format!("{what} timed out after {}ms", after.as_millis()))
    }

    /// Store-side reqwest failures are persistence errors, not catalog transport errors.
    pub fn from_store_http(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SyncError::Timeout(format!("data store request timed out: {err}"))
        } else {
            SyncError::Persistence(err.to_string())
        }
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SyncError::Timeout(format!("catalog request timed out: {err}"))
        } else if err.is_decode() {
            SyncError::Validation(format!("catalog payload could not be decoded: {err}"))
        } else {
            SyncError::Transport(err.to_string())
        }
    }
}

impl From<sqlx::Error> for SyncError {
    fn from(err: sqlx::Error) -> Self {
        SyncError::Persistence(err.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for SyncError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        SyncError::Persistence(format!("migration failed: {err}"))
    }
}

/// Bound an external call with `limit`, folding expiry into `SyncError::Timeout`.
pub async fn with_timeout<T, F>(what: &str, limit: Duration, fut: F) -> Result<T, SyncError>
where
    F: std::future::Future<Output = Result<T, SyncError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(res) => res,
        Err(_) => Err(SyncError::timeout(what, limit)),
    }
}
