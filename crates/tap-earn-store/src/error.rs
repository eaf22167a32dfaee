//! Error types for tap-earn storage.

use tap_earn_core::LedgerError;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(String),

    /// A stored row could not be decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Record not found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of record.
        entity: &'static str,
        /// Its id.
        id: String,
    },

    /// A concurrent writer won (serialization failure, deadlock or unique race).
    #[error("write conflict")]
    Conflict,

    /// The ledger rules rejected the operation.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl StoreError {
    /// Create a not-found error.
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Ledger(e) => e,
            StoreError::Conflict => Self::PersistenceConflict,
            StoreError::NotFound { entity, id } => Self::Storage(format!("{entity} not found: {id}")),
            StoreError::Database(msg) | StoreError::Serialization(msg) => Self::Storage(msg),
        }
    }
}

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        // serialization_failure, deadlock_detected, unique_violation
        if let Some(db) = err.as_database_error() {
            if matches!(db.code().as_deref(), Some("40001" | "40P01" | "23505")) {
                return Self::Conflict;
            }
        }
        Self::Database(err.to_string())
    }
}
