//! # Coordinator Errors
//!
//! The error taxonomy every record operation reports.

use thiserror::Error;

use crate::record::{RecordId, ValidationError};
use crate::store::StoreError;

/// Result type for coordinator operations
pub type CoordinatorResult<T> = Result<T, CoordinatorError>;

/// Record operation failures
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// Shape or length violation; nothing was written
    #[error("{0}")]
    InvalidInput(#[from] ValidationError),

    /// Another record already holds this account identifier
    #[error("account_id already exists: {account_id}")]
    Conflict { account_id: String },

    /// No record with this id
    #[error("user {0} not found")]
    NotFound(RecordId),

    /// Storage or connectivity failure; the operation was rolled back
    #[error("internal error: {0}")]
    Internal(StoreError),

    /// The caller's cancellation signal fired; the operation was rolled back
    #[error("operation cancelled")]
    Cancelled,
}

impl From<StoreError> for CoordinatorError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Cancelled => CoordinatorError::Cancelled,
            other => CoordinatorError::Internal(other),
        }
    }
}

impl CoordinatorError {
    /// Stable kind name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            CoordinatorError::InvalidInput(_) => "invalid_input",
            CoordinatorError::Conflict { .. } => "conflict",
            CoordinatorError::NotFound(_) => "not_found",
            CoordinatorError::Internal(_) => "internal",
            CoordinatorError::Cancelled => "cancelled",
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, CoordinatorError::Conflict { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CoordinatorError::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_cancellation_maps_to_cancelled() {
        let err = CoordinatorError::from(StoreError::Cancelled);
        assert!(matches!(err, CoordinatorError::Cancelled));
    }

    #[test]
    fn test_other_store_errors_are_internal() {
        let err = CoordinatorError::from(StoreError::LockTimeout);
        assert_eq!(err.kind(), "internal");
        assert!(err.to_string().contains("lock wait timeout"));
    }

    #[test]
    fn test_conflict_message() {
        let err = CoordinatorError::Conflict {
            account_id: "alice_01".to_string(),
        };
        assert!(err.is_conflict());
        assert_eq!(err.to_string(), "account_id already exists: alice_01");
    }
}
