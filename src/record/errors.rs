//! # Validation Errors
//!
//! Error types for record field validation.

use thiserror::Error;

/// Result type for validation checks
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Field validation failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Account identifier does not match the allowed shape
    #[error(
        "account_id must be between 4 and 64 characters and contain only letters, numbers, and underscores"
    )]
    InvalidAccountId,

    /// A name field exceeds the code point limit
    #[error("invalid {field}: name must be 100 characters or less (got {chars})")]
    NameTooLong { field: &'static str, chars: usize },

    /// An update tried to change the account identifier
    #[error("account_id is immutable")]
    AccountIdImmutable,
}

impl ValidationError {
    /// Name of the offending field
    pub fn field(&self) -> &'static str {
        match self {
            ValidationError::InvalidAccountId | ValidationError::AccountIdImmutable => "account_id",
            ValidationError::NameTooLong { field, .. } => field,
        }
    }
}
