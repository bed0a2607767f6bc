//! In-process record table
//!
//! Committed rows live in a `BTreeMap` keyed by id. The `account_id` index
//! holds either a committed entry or a reservation made by an in-flight
//! insert; a second insert of the same key waits for the reserving
//! transaction to finish, then fails with `UniqueViolation` if it committed.
//! Uncommitted rows are invisible to every other reader.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::errors::{StoreError, StoreResult};
use super::locks::{LockWait, RowLocks, TxId};
use super::{RecordStore, StoreTransaction};
use crate::cancel::CancelSignal;
use crate::record::{NewUser, RecordId, UserRecord};

const DEFAULT_LOCK_WAIT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IndexEntry {
    Committed(RecordId),
    Reserved { tx: TxId, id: RecordId },
}

impl IndexEntry {
    fn reserved_by(&self, owner: TxId) -> bool {
        matches!(self, IndexEntry::Reserved { tx, .. } if *tx == owner)
    }
}

#[derive(Debug)]
struct TableState {
    rows: BTreeMap<RecordId, UserRecord>,
    account_index: HashMap<String, IndexEntry>,
    row_locks: RowLocks,
    next_id: RecordId,
}

impl Default for TableState {
    fn default() -> Self {
        Self {
            rows: BTreeMap::new(),
            account_index: HashMap::new(),
            row_locks: RowLocks::default(),
            next_id: 1,
        }
    }
}

/// In-process `users` table with row-level locking
#[derive(Debug)]
pub struct MemoryStore {
    state: Mutex<TableState>,
    /// Signalled whenever locks or key reservations are released
    released: Condvar,
    next_tx: AtomicU64,
    lock_wait: Duration,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_lock_wait(DEFAULT_LOCK_WAIT)
    }

    /// Create a store whose lock waits give up after `lock_wait`
    pub fn with_lock_wait(lock_wait: Duration) -> Self {
        Self {
            state: Mutex::new(TableState::default()),
            released: Condvar::new(),
            next_tx: AtomicU64::new(1),
            lock_wait,
        }
    }

    fn lock_state(&self) -> StoreResult<MutexGuard<'_, TableState>> {
        self.state.lock().map_err(|_| StoreError::Poisoned)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordStore for MemoryStore {
    fn engine(&self) -> &'static str {
        "memory"
    }

    fn begin<'a>(&'a self, signal: &CancelSignal) -> StoreResult<Box<dyn StoreTransaction + 'a>> {
        if signal.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        Ok(Box::new(MemoryTransaction {
            store: self,
            tx: self.next_tx.fetch_add(1, Ordering::SeqCst),
            signal: signal.clone(),
            inserted: BTreeMap::new(),
            updated: BTreeMap::new(),
            finished: false,
        }))
    }

    fn fetch(&self, id: RecordId) -> StoreResult<Option<UserRecord>> {
        Ok(self.lock_state()?.rows.get(&id).cloned())
    }

    fn fetch_all(&self) -> StoreResult<Vec<UserRecord>> {
        Ok(self.lock_state()?.rows.values().cloned().collect())
    }

    fn remove(&self, id: RecordId, signal: &CancelSignal) -> StoreResult<u64> {
        let wait = LockWait::new(signal, self.lock_wait);
        let mut state = self.lock_state()?;
        while state.row_locks.holder(id).is_some() {
            state = wait.wait(&self.released, state)?;
        }

        let Some(row) = state.rows.remove(&id) else {
            return Ok(0);
        };
        if state.account_index.get(&row.account_id) == Some(&IndexEntry::Committed(id)) {
            state.account_index.remove(&row.account_id);
        }
        Ok(1)
    }
}

/// Copy the mutable columns of `source` onto `target`
fn write_columns(target: &mut UserRecord, source: &UserRecord) {
    target.first_name = source.first_name.clone();
    target.last_name = source.last_name.clone();
    target.age = source.age;
}

/// Write transaction over a `MemoryStore`.
///
/// Inserts and updates are staged locally and applied atomically on
/// commit.
struct MemoryTransaction<'a> {
    store: &'a MemoryStore,
    tx: TxId,
    signal: CancelSignal,
    inserted: BTreeMap<RecordId, UserRecord>,
    updated: BTreeMap<RecordId, UserRecord>,
    finished: bool,
}

impl MemoryTransaction<'_> {
    fn wait(&self) -> LockWait<'_> {
        LockWait::new(&self.signal, self.store.lock_wait)
    }

    /// Drop reservations and locks held by this transaction
    fn release(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;

        let mut state = self
            .store
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let tx = self.tx;
        state.account_index.retain(|_, entry| !entry.reserved_by(tx));
        state.row_locks.release_all(tx);
        drop(state);
        self.store.released.notify_all();
    }
}

impl StoreTransaction for MemoryTransaction<'_> {
    fn account_id_exists(&mut self, account_id: &str) -> StoreResult<bool> {
        let state = self.store.lock_state()?;
        Ok(match state.account_index.get(account_id) {
            Some(IndexEntry::Committed(_)) => true,
            Some(entry) => entry.reserved_by(self.tx),
            None => false,
        })
    }

    fn insert(&mut self, new_user: &NewUser) -> StoreResult<RecordId> {
        let wait = self.wait();
        let mut state = self.store.lock_state()?;
        loop {
            match state.account_index.get(&new_user.account_id).copied() {
                None => break,
                Some(IndexEntry::Committed(_)) => {
                    return Err(StoreError::UniqueViolation {
                        column: "account_id",
                    })
                }
                Some(entry) if entry.reserved_by(self.tx) => {
                    return Err(StoreError::UniqueViolation {
                        column: "account_id",
                    })
                }
                Some(IndexEntry::Reserved { .. }) => {
                    state = wait.wait(&self.store.released, state)?;
                }
            }
        }

        // Ids come from a counter that never rewinds, so a rolled back
        // insert burns its id.
        let id = state.next_id;
        state.next_id += 1;
        state.account_index.insert(
            new_user.account_id.clone(),
            IndexEntry::Reserved { tx: self.tx, id },
        );
        state.row_locks.acquire(id, self.tx);
        drop(state);

        self.inserted.insert(id, UserRecord::from_new(id, new_user));
        Ok(id)
    }

    fn select_for_update(&mut self, id: RecordId) -> StoreResult<Option<UserRecord>> {
        let wait = self.wait();
        let mut state = self.store.lock_state()?;
        while state.row_locks.is_blocked(id, self.tx) {
            state = wait.wait(&self.store.released, state)?;
        }

        let current = self
            .updated
            .get(&id)
            .or_else(|| self.inserted.get(&id))
            .or_else(|| state.rows.get(&id))
            .cloned();
        if current.is_some() {
            state.row_locks.acquire(id, self.tx);
        }
        Ok(current)
    }

    fn update(&mut self, record: &UserRecord) -> StoreResult<u64> {
        let id = record.id;
        let state = self.store.lock_state()?;
        if state.row_locks.holder(id) != Some(self.tx) {
            return Err(StoreError::LockNotHeld(id));
        }

        if let Some(row) = self.inserted.get_mut(&id) {
            write_columns(row, record);
            return Ok(1);
        }
        if let Some(row) = self.updated.get_mut(&id) {
            write_columns(row, record);
            return Ok(1);
        }
        let Some(existing) = state.rows.get(&id) else {
            return Ok(0);
        };
        let mut row = existing.clone();
        drop(state);
        write_columns(&mut row, record);
        self.updated.insert(id, row);
        Ok(1)
    }

    fn commit(mut self: Box<Self>) -> StoreResult<()> {
        if self.signal.is_cancelled() {
            self.release();
            return Err(StoreError::Cancelled);
        }

        let mut state = self.store.lock_state()?;
        for (id, row) in std::mem::take(&mut self.inserted) {
            state
                .account_index
                .insert(row.account_id.clone(), IndexEntry::Committed(id));
            state.rows.insert(id, row);
        }
        for (id, row) in std::mem::take(&mut self.updated) {
            if let Some(existing) = state.rows.get_mut(&id) {
                write_columns(existing, &row);
            }
        }
        state.row_locks.release_all(self.tx);
        drop(state);

        self.finished = true;
        self.store.released.notify_all();
        Ok(())
    }

    fn rollback(mut self: Box<Self>) -> StoreResult<()> {
        self.release();
        Ok(())
    }
}

impl Drop for MemoryTransaction<'_> {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn alice() -> NewUser {
        NewUser::new("alice_01", "Alice", "A", 30)
    }

    #[test]
    fn test_ids_start_at_one_and_are_not_reused() {
        let store = MemoryStore::new();
        let signal = CancelSignal::new();

        let mut tx = store.begin(&signal).unwrap();
        assert_eq!(tx.insert(&alice()).unwrap(), 1);
        tx.rollback().unwrap();

        let mut tx = store.begin(&signal).unwrap();
        assert_eq!(tx.insert(&alice()).unwrap(), 2);
        tx.commit().unwrap();

        assert!(store.fetch(1).unwrap().is_none());
        assert_eq!(store.fetch(2).unwrap().unwrap().account_id, "alice_01");
    }

    #[test]
    fn test_uncommitted_insert_is_invisible() {
        let store = MemoryStore::new();
        let signal = CancelSignal::new();

        let mut writer = store.begin(&signal).unwrap();
        writer.insert(&alice()).unwrap();

        assert!(store.fetch_all().unwrap().is_empty());
        let mut reader = store.begin(&signal).unwrap();
        assert!(!reader.account_id_exists("alice_01").unwrap());
        assert!(writer.account_id_exists("alice_01").unwrap());
        drop(reader);

        writer.commit().unwrap();
        assert_eq!(store.fetch_all().unwrap().len(), 1);
    }

    #[test]
    fn test_drop_rolls_back_and_frees_key() {
        let store = MemoryStore::new();
        let signal = CancelSignal::new();
        {
            let mut tx = store.begin(&signal).unwrap();
            tx.insert(&alice()).unwrap();
        }

        let mut tx = store.begin(&signal).unwrap();
        assert!(!tx.account_id_exists("alice_01").unwrap());
        tx.insert(&alice()).unwrap();
        tx.commit().unwrap();
        assert_eq!(store.fetch_all().unwrap().len(), 1);
    }

    #[test]
    fn test_insert_after_racing_commit_violates_unique_index() {
        let store = MemoryStore::new();
        let signal = CancelSignal::new();

        let mut first = store.begin(&signal).unwrap();
        let mut second = store.begin(&signal).unwrap();
        assert!(!first.account_id_exists("alice_01").unwrap());
        assert!(!second.account_id_exists("alice_01").unwrap());

        first.insert(&alice()).unwrap();
        first.commit().unwrap();

        let err = second.insert(&alice()).unwrap_err();
        assert!(err.is_unique_violation());
    }

    #[test]
    fn test_insert_waits_for_reserving_transaction() {
        let store = Arc::new(MemoryStore::new());
        let signal = CancelSignal::new();

        let mut first = store.begin(&signal).unwrap();
        first.insert(&alice()).unwrap();

        let contender = {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                let signal = CancelSignal::new();
                let mut tx = store.begin(&signal).unwrap();
                let result = tx.insert(&alice()).map(|_| ());
                if result.is_ok() {
                    tx.commit().unwrap();
                }
                result
            })
        };

        thread::sleep(Duration::from_millis(50));
        first.rollback().unwrap();

        // The reservation was released, so the contender's insert went through
        assert!(contender.join().unwrap().is_ok());
        assert_eq!(store.fetch_all().unwrap().len(), 1);
    }

    #[test]
    fn test_select_for_update_blocks_second_locker() {
        let store = MemoryStore::with_lock_wait(Duration::from_millis(50));
        let signal = CancelSignal::new();
        let mut tx = store.begin(&signal).unwrap();
        tx.insert(&alice()).unwrap();
        tx.insert(&NewUser::new("bob_0001", "Bob", "B", 40)).unwrap();
        tx.commit().unwrap();

        let mut holder = store.begin(&signal).unwrap();
        assert!(holder.select_for_update(1).unwrap().is_some());

        let mut waiter = store.begin(&signal).unwrap();
        assert!(matches!(
            waiter.select_for_update(1),
            Err(StoreError::LockTimeout)
        ));

        let started = std::time::Instant::now();
        let other = waiter.select_for_update(2).unwrap().unwrap();
        assert_eq!(other.account_id, "bob_0001");
        assert!(started.elapsed() < Duration::from_millis(50));
    }

    #[test]
    fn test_update_requires_row_lock() {
        let store = MemoryStore::new();
        let signal = CancelSignal::new();
        let mut tx = store.begin(&signal).unwrap();
        tx.insert(&alice()).unwrap();
        tx.commit().unwrap();

        let mut row = store.fetch(1).unwrap().unwrap();
        row.age = 40;
        let mut tx = store.begin(&signal).unwrap();
        assert!(matches!(tx.update(&row), Err(StoreError::LockNotHeld(1))));

        tx.select_for_update(1).unwrap();
        assert_eq!(tx.update(&row).unwrap(), 1);
        tx.commit().unwrap();
        assert_eq!(store.fetch(1).unwrap().unwrap().age, 40);
    }

    #[test]
    fn test_update_never_changes_account_id() {
        let store = MemoryStore::new();
        let signal = CancelSignal::new();
        let mut tx = store.begin(&signal).unwrap();
        tx.insert(&alice()).unwrap();
        tx.commit().unwrap();

        let mut tx = store.begin(&signal).unwrap();
        let mut row = tx.select_for_update(1).unwrap().unwrap();
        row.account_id = "mallory".to_string();
        tx.update(&row).unwrap();
        tx.commit().unwrap();

        assert_eq!(store.fetch(1).unwrap().unwrap().account_id, "alice_01");
    }

    #[test]
    fn test_cancelled_commit_rolls_back() {
        let store = MemoryStore::new();
        let signal = CancelSignal::new();
        let mut tx = store.begin(&signal).unwrap();
        tx.insert(&alice()).unwrap();

        signal.cancel();
        assert!(matches!(tx.commit(), Err(StoreError::Cancelled)));
        assert!(store.fetch_all().unwrap().is_empty());
    }

    #[test]
    fn test_remove_is_idempotent_and_frees_key() {
        let store = MemoryStore::new();
        let signal = CancelSignal::new();
        let mut tx = store.begin(&signal).unwrap();
        tx.insert(&alice()).unwrap();
        tx.commit().unwrap();

        assert_eq!(store.remove(1, &signal).unwrap(), 1);
        assert_eq!(store.remove(1, &signal).unwrap(), 0);

        let mut tx = store.begin(&signal).unwrap();
        assert!(!tx.account_id_exists("alice_01").unwrap());
    }

    #[test]
    fn test_remove_waits_for_row_lock() {
        let store = MemoryStore::with_lock_wait(Duration::from_millis(40));
        let signal = CancelSignal::new();
        let mut tx = store.begin(&signal).unwrap();
        tx.insert(&alice()).unwrap();
        tx.commit().unwrap();

        let mut holder = store.begin(&signal).unwrap();
        holder.select_for_update(1).unwrap();
        assert!(matches!(
            store.remove(1, &signal),
            Err(StoreError::LockTimeout)
        ));

        drop(holder);
        assert_eq!(store.remove(1, &signal).unwrap(), 1);
    }
}
