//! Store error types.

use thiserror::Error;

/// Errors from store operations, covering the whole caller-facing taxonomy.
///
/// `Forbidden` and `NotFound` deliberately carry no detail: for point
/// lookups an unauthorized row is indistinguishable from a missing one.
/// Raw database errors stay in `Database` and are only ever logged, never
/// surfaced verbatim.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("forbidden")]
    Forbidden,

    #[error("not found")]
    NotFound,

    #[error("constraint violation: {0}")]
    Conflict(String),

    #[error("{0}")]
    User(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl From<alcove_core::Error> for StoreError {
    fn from(err: alcove_core::Error) -> Self {
        Self::User(err.to_string())
    }
}

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// True when the error wraps a database unique-constraint violation.
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}
