//! # Record Store Coordinator
//!
//! The only component allowed to write the `users` table.
//!
//! ## Create
//!
//! Validate, then check-then-insert inside one transaction. Two creators
//! can both pass the existence check; the store's unique constraint rejects
//! the second insert and that rejection is reported as `Conflict`, never as
//! an internal failure.
//!
//! ## Update
//!
//! Read the row under an exclusive lock, merge the patch, validate, write
//! back and commit, all in one transaction. Concurrent updates to the same
//! id queue on the lock, so disjoint field changes are never lost.
//!
//! Every early exit drops the open transaction, which rolls it back.

mod errors;

pub use errors::{CoordinatorError, CoordinatorResult};

use std::sync::Arc;

use crate::cancel::CancelSignal;
use crate::observability::{log_event_with_fields, Event};
use crate::record::{
    validate_new_user, validate_record_names, NewUser, RecordId, UserPatch, UserRecord,
    ValidationError,
};
use crate::store::{RecordStore, StoreError, StoreTransaction};

/// Transactional front door to the record store
#[derive(Clone)]
pub struct RecordCoordinator {
    store: Arc<dyn RecordStore>,
}

impl RecordCoordinator {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Name of the backing engine
    pub fn engine(&self) -> &'static str {
        self.store.engine()
    }

    /// Create a user, enforcing `account_id` uniqueness
    pub fn create(&self, new_user: NewUser, signal: &CancelSignal) -> CoordinatorResult<UserRecord> {
        if let Err(err) = validate_new_user(&new_user) {
            return Err(reject("create", err));
        }

        let mut tx = self.store.begin(signal).map_err(|e| failure("create", e))?;

        let exists = tx
            .account_id_exists(&new_user.account_id)
            .map_err(|e| failure("create", e))?;
        if exists {
            abandon(tx, "create");
            log_event_with_fields(
                Event::UserCreateConflict,
                &[("account_id", &new_user.account_id)],
            );
            return Err(CoordinatorError::Conflict {
                account_id: new_user.account_id,
            });
        }

        let id = match tx.insert(&new_user) {
            Ok(id) => id,
            Err(err) if err.is_unique_violation() => {
                // Lost the race: another creator committed between our
                // check and our insert.
                abandon(tx, "create");
                log_event_with_fields(
                    Event::UserCreateRaceLost,
                    &[("account_id", &new_user.account_id)],
                );
                return Err(CoordinatorError::Conflict {
                    account_id: new_user.account_id,
                });
            }
            Err(err) => return Err(failure("create", err)),
        };

        commit(tx, signal, "create")?;

        let record = UserRecord::from_new(id, &new_user);
        log_event_with_fields(
            Event::UserCreated,
            &[("id", &id.to_string()), ("account_id", &record.account_id)],
        );
        Ok(record)
    }

    /// Look up a single user
    pub fn get(&self, id: RecordId, signal: &CancelSignal) -> CoordinatorResult<UserRecord> {
        ensure_live(signal, "get")?;
        self.store
            .fetch(id)
            .map_err(|e| failure("get", e))?
            .ok_or(CoordinatorError::NotFound(id))
    }

    /// Every user, in the store's natural order
    pub fn list(&self, signal: &CancelSignal) -> CoordinatorResult<Vec<UserRecord>> {
        ensure_live(signal, "list")?;
        self.store.fetch_all().map_err(|e| failure("list", e))
    }

    /// Apply a partial update under a row lock
    pub fn update(
        &self,
        id: RecordId,
        patch: UserPatch,
        signal: &CancelSignal,
    ) -> CoordinatorResult<UserRecord> {
        let mut tx = self.store.begin(signal).map_err(|e| failure("update", e))?;

        let Some(mut record) = tx.select_for_update(id).map_err(|e| failure("update", e))? else {
            abandon(tx, "update");
            return Err(CoordinatorError::NotFound(id));
        };

        if patch.account_id_change(&record.account_id).is_some() {
            abandon(tx, "update");
            return Err(reject("update", ValidationError::AccountIdImmutable));
        }

        record.apply_patch(&patch);
        if let Err(err) = validate_record_names(&record.first_name, &record.last_name) {
            abandon(tx, "update");
            return Err(reject("update", err));
        }

        let affected = tx.update(&record).map_err(|e| failure("update", e))?;
        if affected == 0 {
            abandon(tx, "update");
            return Err(CoordinatorError::NotFound(id));
        }

        commit(tx, signal, "update")?;

        log_event_with_fields(
            Event::UserUpdated,
            &[("id", &id.to_string()), ("account_id", &record.account_id)],
        );
        Ok(record)
    }

    /// Delete by id. Deleting a missing id succeeds and returns `false`.
    pub fn delete(&self, id: RecordId, signal: &CancelSignal) -> CoordinatorResult<bool> {
        let affected = self
            .store
            .remove(id, signal)
            .map_err(|e| failure("delete", e))?;
        log_event_with_fields(
            Event::UserDeleted,
            &[("id", &id.to_string()), ("rows", &affected.to_string())],
        );
        Ok(affected > 0)
    }
}

fn ensure_live(signal: &CancelSignal, op: &str) -> CoordinatorResult<()> {
    if signal.is_cancelled() {
        return Err(failure(op, StoreError::Cancelled));
    }
    Ok(())
}

/// Log and convert a validation failure
fn reject(op: &str, err: ValidationError) -> CoordinatorError {
    log_event_with_fields(
        Event::ValidationRejected,
        &[("op", op), ("field", err.field()), ("reason", &err.to_string())],
    );
    CoordinatorError::InvalidInput(err)
}

/// Log and convert a store failure
fn failure(op: &str, err: StoreError) -> CoordinatorError {
    if err.is_cancelled() {
        log_event_with_fields(Event::OperationCancelled, &[("op", op)]);
    } else {
        log_event_with_fields(
            Event::StoreFailure,
            &[("op", op), ("error", &err.to_string())],
        );
    }
    CoordinatorError::from(err)
}

/// Explicitly roll back a transaction we are walking away from
fn abandon(tx: Box<dyn StoreTransaction + '_>, op: &str) {
    match tx.rollback() {
        Ok(()) => log_event_with_fields(Event::TxRollback, &[("op", op)]),
        Err(err) => log_event_with_fields(
            Event::StoreFailure,
            &[("op", op), ("error", &err.to_string())],
        ),
    }
}

fn commit(tx: Box<dyn StoreTransaction + '_>, signal: &CancelSignal, op: &str) -> CoordinatorResult<()> {
    if signal.is_cancelled() {
        abandon(tx, op);
        return Err(failure(op, StoreError::Cancelled));
    }
    tx.commit().map_err(|err| {
        if !err.is_cancelled() {
            log_event_with_fields(
                Event::TxCommitFailed,
                &[("op", op), ("error", &err.to_string())],
            );
        }
        failure(op, err)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, StoreResult};

    fn coordinator() -> RecordCoordinator {
        RecordCoordinator::new(Arc::new(MemoryStore::new()))
    }

    fn alice() -> NewUser {
        NewUser::new("alice_01", "Alice", "A", 30)
    }

    /// Store whose existence check never sees anything, so every duplicate
    /// reaches the unique constraint as it would in a lost race.
    struct BlindCheckStore(MemoryStore);

    struct BlindCheckTx<'a>(Box<dyn StoreTransaction + 'a>);

    impl StoreTransaction for BlindCheckTx<'_> {
        fn account_id_exists(&mut self, _account_id: &str) -> StoreResult<bool> {
            Ok(false)
        }
        fn insert(&mut self, new_user: &NewUser) -> StoreResult<RecordId> {
            self.0.insert(new_user)
        }
        fn select_for_update(&mut self, id: RecordId) -> StoreResult<Option<UserRecord>> {
            self.0.select_for_update(id)
        }
        fn update(&mut self, record: &UserRecord) -> StoreResult<u64> {
            self.0.update(record)
        }
        fn commit(self: Box<Self>) -> StoreResult<()> {
            self.0.commit()
        }
        fn rollback(self: Box<Self>) -> StoreResult<()> {
            self.0.rollback()
        }
    }

    impl RecordStore for BlindCheckStore {
        fn engine(&self) -> &'static str {
            "blind"
        }
        fn begin<'a>(&'a self, signal: &CancelSignal) -> StoreResult<Box<dyn StoreTransaction + 'a>> {
            Ok(Box::new(BlindCheckTx(self.0.begin(signal)?)))
        }
        fn fetch(&self, id: RecordId) -> StoreResult<Option<UserRecord>> {
            self.0.fetch(id)
        }
        fn fetch_all(&self) -> StoreResult<Vec<UserRecord>> {
            self.0.fetch_all()
        }
        fn remove(&self, id: RecordId, signal: &CancelSignal) -> StoreResult<u64> {
            self.0.remove(id, signal)
        }
    }

    #[test]
    fn test_create_assigns_id() {
        let coord = coordinator();
        let user = coord.create(alice(), &CancelSignal::new()).unwrap();
        assert_eq!(user.id, 1);
        assert_eq!(user.account_id, "alice_01");
    }

    #[test]
    fn test_create_rejects_invalid_input_before_writing() {
        let coord = coordinator();
        let signal = CancelSignal::new();

        let err = coord
            .create(NewUser::new("abc", "A", "B", 1), &signal)
            .unwrap_err();
        assert!(matches!(
            err,
            CoordinatorError::InvalidInput(ValidationError::InvalidAccountId)
        ));

        let err = coord
            .create(NewUser::new("abcd", "x".repeat(101), "B", 1), &signal)
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_input");
        assert!(coord.list(&signal).unwrap().is_empty());
    }

    #[test]
    fn test_duplicate_create_conflicts() {
        let coord = coordinator();
        let signal = CancelSignal::new();
        coord.create(alice(), &signal).unwrap();
        assert!(coord.create(alice(), &signal).unwrap_err().is_conflict());
        assert_eq!(coord.list(&signal).unwrap().len(), 1);
    }

    #[test]
    fn test_unique_constraint_fallback_reports_conflict() {
        let coord = RecordCoordinator::new(Arc::new(BlindCheckStore(MemoryStore::new())));
        let signal = CancelSignal::new();
        coord.create(alice(), &signal).unwrap();

        let err = coord.create(alice(), &signal).unwrap_err();
        assert!(err.is_conflict(), "got {err:?}");
        assert_eq!(coord.list(&signal).unwrap().len(), 1);
    }

    #[test]
    fn test_update_merges_and_keeps_empty_fields() {
        let coord = coordinator();
        let signal = CancelSignal::new();
        coord.create(alice(), &signal).unwrap();

        let updated = coord
            .update(1, UserPatch::default().age(31), &signal)
            .unwrap();
        assert_eq!(updated.first_name, "Alice");
        assert_eq!(updated.last_name, "A");
        assert_eq!(updated.age, 31);
        assert_eq!(coord.get(1, &signal).unwrap(), updated);
    }

    #[test]
    fn test_update_missing_row_is_not_found() {
        let coord = coordinator();
        let err = coord
            .update(9, UserPatch::default().age(1), &CancelSignal::new())
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_update_rejects_overlong_name_and_rolls_back() {
        let coord = coordinator();
        let signal = CancelSignal::new();
        coord.create(alice(), &signal).unwrap();

        let patch = UserPatch::default().first_name("x".repeat(101)).age(50);
        assert!(matches!(
            coord.update(1, patch, &signal),
            Err(CoordinatorError::InvalidInput(ValidationError::NameTooLong { .. }))
        ));

        let stored = coord.get(1, &signal).unwrap();
        assert_eq!(stored.age, 30);

        // The row lock was released by the rollback
        coord.update(1, UserPatch::default().age(40), &signal).unwrap();
    }

    #[test]
    fn test_update_rejects_account_id_change() {
        let coord = coordinator();
        let signal = CancelSignal::new();
        coord.create(alice(), &signal).unwrap();

        let patch = UserPatch {
            account_id: Some("mallory".to_string()),
            age: 99,
            ..Default::default()
        };
        assert!(matches!(
            coord.update(1, patch, &signal),
            Err(CoordinatorError::InvalidInput(ValidationError::AccountIdImmutable))
        ));

        let same = UserPatch {
            account_id: Some("alice_01".to_string()),
            age: 99,
            ..Default::default()
        };
        assert_eq!(coord.update(1, same, &signal).unwrap().age, 99);
    }

    #[test]
    fn test_delete_is_idempotent() {
        let coord = coordinator();
        let signal = CancelSignal::new();
        coord.create(alice(), &signal).unwrap();

        assert!(coord.delete(1, &signal).unwrap());
        assert!(!coord.delete(1, &signal).unwrap());
        assert!(coord.get(1, &signal).unwrap_err().is_not_found());
    }

    #[test]
    fn test_cancelled_signal_writes_nothing() {
        let coord = coordinator();
        let signal = CancelSignal::new();
        signal.cancel();

        assert!(matches!(
            coord.create(alice(), &signal),
            Err(CoordinatorError::Cancelled)
        ));
        assert!(matches!(coord.list(&signal), Err(CoordinatorError::Cancelled)));
        assert!(coord.list(&CancelSignal::new()).unwrap().is_empty());
    }
}
