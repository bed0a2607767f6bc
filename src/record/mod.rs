//! # Record Module
//!
//! The user record model and the pure field validation rules that gate
//! every write path.

pub mod errors;
pub mod user;
pub mod validator;

pub use errors::{ValidationError, ValidationResult};
pub use user::{NewUser, RecordId, UserPatch, UserRecord};
pub use validator::{
    validate_account_id_shape, validate_name_length, validate_new_user, validate_record_names,
    MAX_ACCOUNT_ID_CHARS, MAX_NAME_CHARS, MIN_ACCOUNT_ID_CHARS,
};
