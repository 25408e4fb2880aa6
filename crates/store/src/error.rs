use thiserror::Error;

/// SQLSTATE for `serialization_failure`.
const SERIALIZATION_FAILURE: &str = "40001";
/// SQLSTATE for `deadlock_detected`.
const DEADLOCK_DETECTED: &str = "40P01";

/// Errors that can occur when interacting with the relational store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The transaction lost a concurrency conflict and was aborted.
    #[error("Transaction conflict: {0}")]
    Conflict(String),

    /// A row held a value outside the domain of its column.
    #[error("Corrupt row in {table}: {detail}")]
    CorruptRow { table: &'static str, detail: String },
}

impl StoreError {
    /// Returns true if the transaction was aborted by the database's
    /// concurrency control and can be re-run from the start.
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::Database(sqlx::Error::Database(db_err)) => matches!(
                db_err.code().as_deref(),
                Some(SERIALIZATION_FAILURE | DEADLOCK_DETECTED)
            ),
            StoreError::Conflict(_) => true,
            _ => false,
        }
    }

    pub(crate) fn corrupt(table: &'static str, detail: impl Into<String>) -> Self {
        StoreError::CorruptRow {
            table,
            detail: detail.into(),
        }
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_database_errors_are_not_retryable() {
        let err = StoreError::corrupt("carts", "status 'weird'");
        assert!(!err.is_retryable());
        assert_eq!(err.to_string(), "Corrupt row in carts: status 'weird'");
    }

    #[test]
    fn conflicts_are_retryable() {
        assert!(StoreError::Conflict("injected".to_string()).is_retryable());
    }

    #[test]
    fn pool_timeouts_are_not_retryable() {
        assert!(!StoreError::Database(sqlx::Error::PoolTimedOut).is_retryable());
    }
}
