//! # Record Store
//!
//! Transaction-capable handles to the persisted `users` table.
//!
//! The coordinator only ever talks to a `RecordStore`; which engine backs it
//! is decided at startup and injected.
//!
//! ## Engines
//!
//! - `SqliteStore`: persistent table with a UNIQUE constraint on
//!   `account_id`. Write transactions use `BEGIN IMMEDIATE`, which holds the
//!   database write lock for the whole transaction.
//! - `MemoryStore`: in-process table with a unique index that reserves keys
//!   at insert time and a per-row lock table, so updates to different rows
//!   never block each other.
//!
//! ## Transaction contract
//!
//! - Dropping a `StoreTransaction` without `commit` rolls it back.
//! - `select_for_update` holds an exclusive lock on the row until the
//!   transaction ends.
//! - `insert` reports a duplicate `account_id` as
//!   `StoreError::UniqueViolation`, even when the duplicate was committed
//!   after this transaction's own existence check.

mod errors;
mod locks;
mod memory;
mod sqlite;

pub use errors::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::cancel::CancelSignal;
use crate::record::{NewUser, RecordId, UserRecord};

/// Handle to the record table
pub trait RecordStore: Send + Sync {
    /// Short engine name for logs
    fn engine(&self) -> &'static str;

    /// Open a write transaction
    fn begin<'a>(&'a self, signal: &CancelSignal) -> StoreResult<Box<dyn StoreTransaction + 'a>>;

    /// Read one committed row
    fn fetch(&self, id: RecordId) -> StoreResult<Option<UserRecord>>;

    /// Read every committed row in the engine's natural order
    fn fetch_all(&self) -> StoreResult<Vec<UserRecord>>;

    /// Delete a row outside any explicit transaction.
    ///
    /// Returns the number of rows removed (0 or 1).
    fn remove(&self, id: RecordId, signal: &CancelSignal) -> StoreResult<u64>;
}

/// An open write transaction
pub trait StoreTransaction {
    /// Whether a row with this `account_id` is visible to the transaction
    fn account_id_exists(&mut self, account_id: &str) -> StoreResult<bool>;

    /// Insert a new row and return its assigned id
    fn insert(&mut self, new_user: &NewUser) -> StoreResult<RecordId>;

    /// Read a row and hold an exclusive lock on it until commit or rollback
    fn select_for_update(&mut self, id: RecordId) -> StoreResult<Option<UserRecord>>;

    /// Write back the name and age columns of a locked row.
    ///
    /// Returns the number of rows affected.
    fn update(&mut self, record: &UserRecord) -> StoreResult<u64>;

    fn commit(self: Box<Self>) -> StoreResult<()>;

    fn rollback(self: Box<Self>) -> StoreResult<()>;
}
