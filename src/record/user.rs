//! # User Records
//!
//! The persisted user entity plus the create and update payloads.

use serde::{Deserialize, Serialize};

/// Store-assigned surrogate key
pub type RecordId = u64;

/// A persisted user record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    /// Surrogate primary key, assigned once by the store
    pub id: RecordId,

    /// Caller-chosen unique identifier, immutable after creation
    pub account_id: String,

    pub first_name: String,

    pub last_name: String,

    pub age: u8,
}

impl UserRecord {
    /// Build the stored form of a new user once the store has assigned an id
    pub fn from_new(id: RecordId, new_user: &NewUser) -> Self {
        Self {
            id,
            account_id: new_user.account_id.clone(),
            first_name: new_user.first_name.clone(),
            last_name: new_user.last_name.clone(),
            age: new_user.age,
        }
    }

    /// Merge a partial update into this record.
    ///
    /// Empty names and a zero age mean "leave unchanged", so a patch can
    /// never clear a name or reset the age to 0.
    pub fn apply_patch(&mut self, patch: &UserPatch) {
        if !patch.first_name.is_empty() {
            self.first_name = patch.first_name.clone();
        }
        if !patch.last_name.is_empty() {
            self.last_name = patch.last_name.clone();
        }
        if patch.age != 0 {
            self.age = patch.age;
        }
    }
}

/// Create payload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUser {
    #[serde(default)]
    pub account_id: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub age: u8,
}

impl NewUser {
    pub fn new(
        account_id: impl Into<String>,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        age: u8,
    ) -> Self {
        Self {
            account_id: account_id.into(),
            first_name: first_name.into(),
            last_name: last_name.into(),
            age,
        }
    }
}

/// Partial update payload
///
/// Any subset of fields may be supplied; missing fields decode to their
/// empty/zero values and are treated as "no change".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPatch {
    /// Accepted only when absent, empty or equal to the stored value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub age: u8,
}

impl UserPatch {
    pub fn first_name(mut self, name: impl Into<String>) -> Self {
        self.first_name = name.into();
        self
    }

    pub fn last_name(mut self, name: impl Into<String>) -> Self {
        self.last_name = name.into();
        self
    }

    pub fn age(mut self, age: u8) -> Self {
        self.age = age;
        self
    }

    /// Returns the requested account identifier if it differs from `current`
    pub fn account_id_change<'a>(&'a self, current: &str) -> Option<&'a str> {
        match self.account_id.as_deref() {
            Some(requested) if !requested.is_empty() && requested != current => Some(requested),
            _ => None,
        }
    }
}
