//! Store error types.

use thiserror::Error;

/// Store operation errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A caller-supplied step failed inside a transaction, which was rolled back.
    #[error("transaction aborted: {0}")]
    Aborted(anyhow::Error),

    #[error("corrupt row: {0}")]
    Corrupt(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

impl StoreError {
    pub fn not_found(what: impl std::fmt::Display) -> Self {
        Self::NotFound(what.to_string())
    }

    /// Map unique and foreign key violations to the matching variants.
    pub(crate) fn from_write(err: sqlx::Error, what: impl std::fmt::Display) -> Self {
        if let Some(db_err) = err.as_database_error() {
            if db_err.is_unique_violation() {
                return Self::AlreadyExists(what.to_string());
            }
            if db_err.is_foreign_key_violation() {
                return Self::NotFound(format!("parent of {}", what));
            }
        }
        Self::Database(err)
    }
}
