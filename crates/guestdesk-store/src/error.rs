//! Error types for the guestdesk-store crate.
//!
//! All storage operations return [`StoreError`] via [`StoreResult`].
//! Absence of a row is never an error — lookups return `Ok(None)`.

use thiserror::Error;

/// Alias for `Result<T, StoreError>`.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in the storage layer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// SQLite operation failed. Surfaced to the caller as-is; this layer
    /// performs no retries.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// JSON serialization failed. Deserialization failures never reach this
    /// variant — stored payloads that fail to parse decode to an empty value.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Table creation or additive migration failed. The process keeps
    /// running, but operations against the affected table will fail.
    #[error("schema init for `{table}` failed: {message}")]
    Schema { table: &'static str, message: String },

    /// A blocking task was cancelled or panicked.
    #[error("background task failed: {0}")]
    TaskJoin(String),
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::TaskJoin(err.to_string())
    }
}
