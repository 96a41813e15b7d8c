//! Callback gate shared by a call's driver task and its cancel path.
//!
//! Header and data callbacks run inside [`DispatchGate::pass`]. Closing the
//! gate blocks until an in-flight callback returns, after which no further
//! callback is let through. A callback that closes its own gate (cancel from
//! inside `on_chunk`) does not wait on itself.

use std::cell::Cell;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

static NEXT_GATE_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static DISPATCHING: Cell<Option<u64>> = const { Cell::new(None) };
}

/// Serializes callbacks against cancellation.
#[derive(Debug)]
pub(crate) struct DispatchGate {
    id: u64,
    lock: Mutex<()>,
    closed: AtomicBool,
}

impl DispatchGate {
    pub(crate) fn new() -> Self {
        Self {
            id: NEXT_GATE_ID.fetch_add(1, Ordering::Relaxed),
            lock: Mutex::new(()),
            closed: AtomicBool::new(false),
        }
    }

    /// Run `f` unless the gate has been closed.
    pub(crate) fn pass<R>(&self, f: impl FnOnce() -> R) -> Option<R> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        if self.closed.load(Ordering::Acquire) {
            return None;
        }
        let _marker = DispatchMarker::enter(self.id);
        Some(f())
    }

    /// Close the gate, waiting for an in-flight callback on another thread.
    ///
    /// The wait is a blocking `std::sync::Mutex` acquisition, not an await.
    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::Release);
        let reentrant = DISPATCHING.with(|current| current.get() == Some(self.id));
        if !reentrant {
            drop(self.lock.lock().unwrap_or_else(PoisonError::into_inner));
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

struct DispatchMarker {
    previous: Option<u64>,
}

impl DispatchMarker {
    fn enter(id: u64) -> Self {
        let previous = DISPATCHING.with(|current| current.replace(Some(id)));
        Self { previous }
    }
}

impl Drop for DispatchMarker {
    fn drop(&mut self) {
        DISPATCHING.with(|current| current.set(self.previous));
    }
}
