//! SQLite-backed record table
//!
//! Each operation opens its own connection, so concurrent callers never
//! share connection state. Write transactions start with `BEGIN IMMEDIATE`,
//! which takes the database write lock up front: the existence check in
//! create and the locking read in update are both covered by it, and the
//! UNIQUE constraint on `account_id` stays the final arbiter.
//!
//! SQLite has no row locks, so writers to different rows also queue on the
//! write lock, bounded by the busy timeout.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::{ffi, params, Connection, ErrorCode, OptionalExtension, Row};

use super::errors::{StoreError, StoreResult};
use super::{RecordStore, StoreTransaction};
use crate::cancel::CancelSignal;
use crate::record::{NewUser, RecordId, UserRecord};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    account_id  TEXT    NOT NULL UNIQUE,
    first_name  TEXT    NOT NULL DEFAULT '',
    last_name   TEXT    NOT NULL DEFAULT '',
    age         INTEGER NOT NULL DEFAULT 0 CHECK (age BETWEEN 0 AND 255)
);
";

const SELECT_COLUMNS: &str = "SELECT id, account_id, first_name, last_name, age FROM users";

/// Virtual machine steps between cancellation checks
const PROGRESS_STEPS: i32 = 1000;

/// Map engine failures onto the store taxonomy
fn classify(err: rusqlite::Error) -> StoreError {
    match &err {
        rusqlite::Error::SqliteFailure(e, _) if e.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE => {
            StoreError::UniqueViolation {
                column: "account_id",
            }
        }
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::OperationInterrupted => {
            StoreError::Cancelled
        }
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == ErrorCode::DatabaseBusy || e.code == ErrorCode::DatabaseLocked =>
        {
            StoreError::LockTimeout
        }
        _ => StoreError::Sqlite(err),
    }
}

/// A row as SQLite hands it back, before range checks
struct RawRow {
    id: i64,
    account_id: String,
    first_name: String,
    last_name: String,
    age: i64,
}

impl RawRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            account_id: row.get(1)?,
            first_name: row.get(2)?,
            last_name: row.get(3)?,
            age: row.get(4)?,
        })
    }

    fn into_record(self) -> StoreResult<UserRecord> {
        let id = RecordId::try_from(self.id)
            .map_err(|_| StoreError::MalformedRow(format!("negative id {}", self.id)))?;
        let age = u8::try_from(self.age)
            .map_err(|_| StoreError::MalformedRow(format!("age {} out of range for id {}", self.age, id)))?;
        Ok(UserRecord {
            id,
            account_id: self.account_id,
            first_name: self.first_name,
            last_name: self.last_name,
            age,
        })
    }
}

/// Record store persisted in a SQLite database file
#[derive(Debug, Clone)]
pub struct SqliteStore {
    path: PathBuf,
    busy_timeout: Duration,
}

impl SqliteStore {
    /// Open (creating if needed) the database file and its schema
    pub fn open(path: impl AsRef<Path>, busy_timeout: Duration) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let store = Self { path, busy_timeout };
        let conn = store.connect(busy_timeout)?;
        // journal_mode returns the resulting mode as a row
        conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))
            .map_err(classify)?;
        conn.execute_batch(SCHEMA).map_err(classify)?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self, busy_timeout: Duration) -> StoreResult<Connection> {
        let conn = Connection::open(&self.path).map_err(classify)?;
        conn.busy_timeout(busy_timeout).map_err(classify)?;
        Ok(conn)
    }

    /// Connection whose statements abort once `signal` fires and whose
    /// lock waits end no later than the signal's deadline
    fn connect_for(&self, signal: &CancelSignal) -> StoreResult<Connection> {
        if signal.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        let busy_timeout = match signal.remaining() {
            Some(remaining) => remaining.min(self.busy_timeout),
            None => self.busy_timeout,
        };
        let conn = self.connect(busy_timeout)?;
        let watched = signal.clone();
        conn.progress_handler(PROGRESS_STEPS, Some(move || watched.is_cancelled()));
        Ok(conn)
    }
}

impl RecordStore for SqliteStore {
    fn engine(&self) -> &'static str {
        "sqlite"
    }

    fn begin<'a>(&'a self, signal: &CancelSignal) -> StoreResult<Box<dyn StoreTransaction + 'a>> {
        let conn = self.connect_for(signal)?;
        conn.execute_batch("BEGIN IMMEDIATE").map_err(classify)?;
        Ok(Box::new(SqliteTransaction {
            conn,
            signal: signal.clone(),
            finished: false,
        }))
    }

    fn fetch(&self, id: RecordId) -> StoreResult<Option<UserRecord>> {
        let Ok(key) = i64::try_from(id) else {
            return Ok(None);
        };
        let conn = self.connect(self.busy_timeout)?;
        let raw = conn
            .query_row(
                &format!("{SELECT_COLUMNS} WHERE id = ?1"),
                params![key],
                RawRow::read,
            )
            .optional()
            .map_err(classify)?;
        raw.map(RawRow::into_record).transpose()
    }

    fn fetch_all(&self) -> StoreResult<Vec<UserRecord>> {
        let conn = self.connect(self.busy_timeout)?;
        let mut stmt = conn.prepare(SELECT_COLUMNS).map_err(classify)?;
        let rows = stmt.query_map([], RawRow::read).map_err(classify)?;

        let mut users = Vec::new();
        for raw in rows {
            users.push(raw.map_err(classify)?.into_record()?);
        }
        Ok(users)
    }

    fn remove(&self, id: RecordId, signal: &CancelSignal) -> StoreResult<u64> {
        let Ok(key) = i64::try_from(id) else {
            return Ok(0);
        };
        let conn = self.connect_for(signal)?;
        let affected = conn
            .execute("DELETE FROM users WHERE id = ?1", params![key])
            .map_err(classify)?;
        Ok(affected as u64)
    }
}

/// Write transaction on a dedicated connection
struct SqliteTransaction {
    conn: Connection,
    signal: CancelSignal,
    finished: bool,
}

impl StoreTransaction for SqliteTransaction {
    fn account_id_exists(&mut self, account_id: &str) -> StoreResult<bool> {
        let count: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM users WHERE account_id = ?1",
                params![account_id],
                |row| row.get(0),
            )
            .map_err(classify)?;
        Ok(count > 0)
    }

    fn insert(&mut self, new_user: &NewUser) -> StoreResult<RecordId> {
        self.conn
            .execute(
                "INSERT INTO users (account_id, first_name, last_name, age) VALUES (?1, ?2, ?3, ?4)",
                params![
                    new_user.account_id,
                    new_user.first_name,
                    new_user.last_name,
                    new_user.age
                ],
            )
            .map_err(classify)?;
        let rowid = self.conn.last_insert_rowid();
        RecordId::try_from(rowid)
            .map_err(|_| StoreError::MalformedRow(format!("negative rowid {rowid}")))
    }

    fn select_for_update(&mut self, id: RecordId) -> StoreResult<Option<UserRecord>> {
        // BEGIN IMMEDIATE already holds the write lock, so this plain read
        // cannot be interleaved with another writer.
        let Ok(key) = i64::try_from(id) else {
            return Ok(None);
        };
        let raw = self
            .conn
            .query_row(
                &format!("{SELECT_COLUMNS} WHERE id = ?1"),
                params![key],
                RawRow::read,
            )
            .optional()
            .map_err(classify)?;
        raw.map(RawRow::into_record).transpose()
    }

    fn update(&mut self, record: &UserRecord) -> StoreResult<u64> {
        let Ok(key) = i64::try_from(record.id) else {
            return Ok(0);
        };
        let affected = self
            .conn
            .execute(
                "UPDATE users SET first_name = ?1, last_name = ?2, age = ?3 WHERE id = ?4",
                params![record.first_name, record.last_name, record.age, key],
            )
            .map_err(classify)?;
        Ok(affected as u64)
    }

    fn commit(mut self: Box<Self>) -> StoreResult<()> {
        if self.signal.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        self.conn.execute_batch("COMMIT").map_err(classify)?;
        self.finished = true;
        Ok(())
    }

    fn rollback(mut self: Box<Self>) -> StoreResult<()> {
        self.finished = true;
        self.conn.execute_batch("ROLLBACK").map_err(classify)
    }
}

impl Drop for SqliteTransaction {
    fn drop(&mut self) {
        if !self.finished {
            // Nothing useful can be done with a failed rollback here; the
            // connection closes right after and SQLite discards the journal.
            let _ = self.conn.execute_batch("ROLLBACK");
        }
    }
}
