//! Caller-supplied cancellation and deadline signal
//!
//! Every coordinator operation takes a `CancelSignal`. Stores poll it while
//! waiting on locks and before committing; a fired signal rolls the open
//! transaction back.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Cancellation flag plus optional deadline.
///
/// Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelSignal {
    /// A signal that only fires when `cancel` is called
    pub fn new() -> Self {
        Self::default()
    }

    /// A signal that also fires once `timeout` has elapsed
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            deadline: Some(Instant::now() + timeout),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        if self.cancelled.load(Ordering::SeqCst) {
            return true;
        }
        matches!(self.deadline, Some(deadline) if Instant::now() >= deadline)
    }

    /// Time left before the deadline, if one is set
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Drop guard that cancels this signal unless disarmed
    pub fn guard(&self) -> CancelOnDrop {
        CancelOnDrop {
            signal: self.clone(),
            armed: true,
        }
    }
}

/// Cancels its signal when dropped while still armed.
///
/// Held by request handlers so that an abandoned request rolls back any
/// transaction still running on its behalf.
#[derive(Debug)]
pub struct CancelOnDrop {
    signal: CancelSignal,
    armed: bool,
}

impl CancelOnDrop {
    pub fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if self.armed {
            self.signal.cancel();
        }
    }
}
