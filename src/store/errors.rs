//! # Store Errors
//!
//! Error types for the record store engines.

use thiserror::Error;

use crate::record::RecordId;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Record store failures
#[derive(Debug, Error)]
pub enum StoreError {
    /// The table's unique constraint rejected a write
    #[error("unique constraint violated on {column}")]
    UniqueViolation { column: &'static str },

    /// A lock could not be acquired within the configured wait
    #[error("lock wait timeout exceeded")]
    LockTimeout,

    /// The caller's cancellation signal fired
    #[error("operation cancelled")]
    Cancelled,

    /// A write was attempted on a row this transaction has not locked
    #[error("row {0} is not locked by this transaction")]
    LockNotHeld(RecordId),

    /// A stored row could not be decoded
    #[error("malformed row: {0}")]
    MalformedRow(String),

    /// Engine state lock was poisoned by a panicking writer
    #[error("store state lock poisoned")]
    Poisoned,

    /// SQLite engine failure
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Filesystem failure
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Whether this is the storage-level uniqueness signal
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, StoreError::UniqueViolation { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, StoreError::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(StoreError::UniqueViolation {
            column: "account_id"
        }
        .is_unique_violation());
        assert!(!StoreError::LockTimeout.is_unique_violation());
        assert!(StoreError::Cancelled.is_cancelled());
    }

    #[test]
    fn test_messages() {
        let err = StoreError::UniqueViolation {
            column: "account_id",
        };
        assert_eq!(err.to_string(), "unique constraint violated on account_id");
        assert_eq!(
            StoreError::LockNotHeld(7).to_string(),
            "row 7 is not locked by this transaction"
        );
    }
}
