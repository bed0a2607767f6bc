//! Row lock table and bounded lock waits for the memory engine

use std::collections::HashMap;
use std::sync::{Condvar, MutexGuard};
use std::time::{Duration, Instant};

use super::errors::{StoreError, StoreResult};
use crate::cancel::CancelSignal;
use crate::record::RecordId;

/// Transaction identity inside one engine instance
pub(super) type TxId = u64;

/// Upper bound on a single condvar sleep, so cancellation is noticed
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Exclusive row locks keyed by record id
#[derive(Debug, Default)]
pub(super) struct RowLocks {
    holders: HashMap<RecordId, TxId>,
}

impl RowLocks {
    pub(super) fn holder(&self, id: RecordId) -> Option<TxId> {
        self.holders.get(&id).copied()
    }

    /// Whether `tx` would have to wait to lock `id`
    pub(super) fn is_blocked(&self, id: RecordId, tx: TxId) -> bool {
        matches!(self.holder(id), Some(holder) if holder != tx)
    }

    /// Take the lock for `tx`. Caller must have checked `is_blocked`.
    pub(super) fn acquire(&mut self, id: RecordId, tx: TxId) {
        self.holders.insert(id, tx);
    }

    pub(super) fn release_all(&mut self, tx: TxId) {
        self.holders.retain(|_, holder| *holder != tx);
    }

    #[cfg(test)]
    pub(super) fn len(&self) -> usize {
        self.holders.len()
    }
}

/// Tracks one bounded wait for a lock or key reservation
pub(super) struct LockWait<'s> {
    signal: &'s CancelSignal,
    started: Instant,
    limit: Duration,
}

impl<'s> LockWait<'s> {
    pub(super) fn new(signal: &'s CancelSignal, limit: Duration) -> Self {
        Self {
            signal,
            started: Instant::now(),
            limit,
        }
    }

    /// Sleep on `released` until woken or the poll interval passes.
    ///
    /// Fails with `Cancelled` or `LockTimeout` instead of sleeping once the
    /// signal has fired or the wait budget is spent.
    pub(super) fn wait<'g, T>(
        &self,
        released: &Condvar,
        guard: MutexGuard<'g, T>,
    ) -> StoreResult<MutexGuard<'g, T>> {
        if self.signal.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        let elapsed = self.started.elapsed();
        if elapsed >= self.limit {
            return Err(StoreError::LockTimeout);
        }
        let slice = (self.limit - elapsed).min(POLL_INTERVAL);
        let (guard, _) = released
            .wait_timeout(guard, slice)
            .map_err(|_| StoreError::Poisoned)?;
        Ok(guard)
    }
}
