//! # Field Validator
//!
//! Stateless shape and length checks for user records.
//!
//! Uniqueness of `account_id` is never checked here; it needs visibility
//! into concurrent writers and is enforced by the coordinator inside a
//! transaction.

use std::sync::OnceLock;

use regex::Regex;

use super::errors::{ValidationError, ValidationResult};
use super::user::NewUser;

pub const MIN_ACCOUNT_ID_CHARS: usize = 4;
pub const MAX_ACCOUNT_ID_CHARS: usize = 64;

/// Maximum name length in Unicode code points
pub const MAX_NAME_CHARS: usize = 100;

fn account_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-zA-Z0-9_]{4,64}$").expect("Invalid account id pattern"))
}

/// Check that an account identifier is 4-64 ASCII letters, digits or underscores
pub fn validate_account_id_shape(account_id: &str) -> ValidationResult<()> {
    if account_id_pattern().is_match(account_id) {
        Ok(())
    } else {
        Err(ValidationError::InvalidAccountId)
    }
}

/// Check a name against the code point limit.
///
/// Returns the offending length on failure.
pub fn validate_name_length(name: &str) -> Result<(), usize> {
    let chars = name.chars().count();
    if chars > MAX_NAME_CHARS {
        Err(chars)
    } else {
        Ok(())
    }
}

/// Validate both name fields, reporting the first that fails
pub fn validate_record_names(first_name: &str, last_name: &str) -> ValidationResult<()> {
    validate_name_length(first_name).map_err(|chars| ValidationError::NameTooLong {
        field: "first_name",
        chars,
    })?;
    validate_name_length(last_name).map_err(|chars| ValidationError::NameTooLong {
        field: "last_name",
        chars,
    })?;
    Ok(())
}

/// Full pre-transaction validation of a create payload
pub fn validate_new_user(new_user: &NewUser) -> ValidationResult<()> {
    validate_account_id_shape(&new_user.account_id)?;
    validate_record_names(&new_user.first_name, &new_user.last_name)
}
