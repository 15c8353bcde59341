use std::{
    collections::{HashMap, hash_map::Entry},
    time::{Duration, Instant},
};

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::{
    error::ErrorDetails,
    handle::{CommandHandle, Handle, HandleAllocator},
    payload::RawPayload,
};

// -------------------------------------------------------------------------------------------------------

/// What a callback delivered, before translation into the caller's result type.
#[derive(Debug)]
pub struct RawOutcome {
    pub error_code: i32,
    pub payload: RawPayload,
    pub details: Option<ErrorDetails>,
}

/// One in-flight native call. Its slot is filled at most once, by whoever
/// removed the operation from the registry.
#[derive(Debug)]
pub struct PendingOperation {
    handle: Handle,
    slot: oneshot::Sender<RawOutcome>,
    submitted_at: Instant,
}

impl PendingOperation {
    pub fn new(handle: Handle) -> (PendingOperation, oneshot::Receiver<RawOutcome>) {
        let (slot, receiver) = oneshot::channel();
        let operation = PendingOperation {
            handle,
            slot,
            submitted_at: Instant::now(),
        };
        (operation, receiver)
    }

    pub fn handle(&self) -> Handle {
        self.handle
    }

    pub fn elapsed(&self) -> Duration {
        self.submitted_at.elapsed()
    }

    /// Hand the outcome to the waiting caller. Gives the outcome back if the
    /// caller already stopped waiting.
    pub fn complete(self, outcome: RawOutcome) -> Result<(), RawOutcome> {
        self.slot.send(outcome)
    }
}

// -------------------------------------------------------------------------------------------------------

/// handle -> in-flight operation, shared between submitting threads and the
/// threads the native library calls back on.
///
/// Every method holds the lock for exactly one map operation; there is no way
/// to iterate or snapshot the contents.
///
/// The registry also owns the handle counter, so every bridge sharing one
/// registry draws from the same sequence.
#[derive(Debug, Default)]
pub struct PendingRegistry {
    pending: Mutex<HashMap<Handle, PendingOperation>>,
    allocator: HandleAllocator,
}

impl PendingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_first_handle(first: CommandHandle) -> Self {
        PendingRegistry {
            pending: Mutex::default(),
            allocator: HandleAllocator::new(first),
        }
    }

    /// Next correlation handle for an operation on this registry.
    pub fn allocate(&self) -> Handle {
        self.allocator.allocate()
    }

    /// # Panics
    /// If the handle is still pending. The allocator never issues a pending
    /// handle unless the 32-bit counter wrapped onto an operation that never
    /// completed, which leaves the bridge in an unrecoverable state.
    pub fn insert(&self, operation: PendingOperation) {
        let mut pending = self.pending.lock();
        match pending.entry(operation.handle) {
            Entry::Occupied(existing) => {
                let handle = *existing.key();
                drop(pending);
                panic!(
                    "invariant violation: handle {} is already pending, refusing to overwrite it",
                    handle
                );
            }
            Entry::Vacant(slot) => {
                slot.insert(operation);
            }
        }
    }

    /// Atomically take the operation out of the registry. `None` for handles
    /// that are unknown, already resolved, or abandoned.
    pub fn remove(&self, handle: Handle) -> Option<PendingOperation> {
        self.pending.lock().remove(&handle)
    }

    pub fn contains(&self, handle: Handle) -> bool {
        self.pending.lock().contains_key(&handle)
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }
}

// -------------------------------------------------------------------------------------------------------
// Tests
// -------------------------------------------------------------------------------------------------------

#[cfg(test)]
mod registry_tests {
    use std::sync::Arc;

    use super::*;

    fn outcome(code: i32) -> RawOutcome {
        RawOutcome {
            error_code: code,
            payload: RawPayload::empty(),
            details: None,
        }
    }

    #[test]
    fn insert_then_remove() {
        let registry = PendingRegistry::new();
        let handle = Handle::from_raw(1);

        let (op, _rx) = PendingOperation::new(handle);
        registry.insert(op);
        assert!(registry.contains(handle));
        assert_eq!(registry.len(), 1);

        let op = registry.remove(handle).unwrap();
        assert_eq!(op.handle(), handle);
        assert!(registry.is_empty());

        // second remove finds nothing
        assert!(registry.remove(handle).is_none());
    }

    #[test]
    fn unknown_handle_is_none() {
        let registry = PendingRegistry::new();
        assert!(registry.remove(Handle::from_raw(12345)).is_none());
    }

    #[test]
    #[should_panic(expected = "invariant violation")]
    fn duplicate_insert_is_fatal() {
        let registry = PendingRegistry::new();
        let (first, _rx1) = PendingOperation::new(Handle::from_raw(5));
        let (second, _rx2) = PendingOperation::new(Handle::from_raw(5));
        registry.insert(first);
        registry.insert(second);
    }

    #[test]
    fn handles_come_from_the_shared_counter() {
        let registry = Arc::new(PendingRegistry::with_first_handle(40));
        assert_eq!(registry.allocate().as_raw(), 40);

        let other = registry.clone();
        assert_eq!(other.allocate().as_raw(), 41);
        assert_eq!(registry.allocate().as_raw(), 42);
    }

    #[test]
    fn complete_reaches_receiver() {
        let (op, rx) = PendingOperation::new(Handle::from_raw(2));
        op.complete(outcome(0)).unwrap();
        let received = rx.blocking_recv().unwrap();
        assert_eq!(received.error_code, 0);
    }

    #[test]
    fn complete_after_receiver_dropped_returns_outcome() {
        let (op, rx) = PendingOperation::new(Handle::from_raw(2));
        drop(rx);
        let returned = op.complete(outcome(7)).unwrap_err();
        assert_eq!(returned.error_code, 7);
    }

    #[test]
    fn concurrent_insert_and_remove() {
        const THREADS: usize = 8;
        const PER_THREAD: usize = 500;

        let registry = Arc::new(PendingRegistry::new());

        let workers: Vec<_> = (0..THREADS)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    let mut removed = 0;
                    for _ in 0..PER_THREAD {
                        let handle = registry.allocate();
                        let (op, _rx) = PendingOperation::new(handle);
                        registry.insert(op);
                        if registry.remove(handle).is_some() {
                            removed += 1;
                        }
                    }
                    removed
                })
            })
            .collect();

        let total: usize = workers.into_iter().map(|w| w.join().unwrap()).sum();
        assert_eq!(total, THREADS * PER_THREAD);
        assert!(registry.is_empty());
    }
}
