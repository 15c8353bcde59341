use std::{
    fmt::Display,
    sync::atomic::{AtomicI32, Ordering},
};

// -------------------------------------------------------------------------------------------------------

/// The raw correlation integer passed across the C ABI.
pub type CommandHandle = i32;

/// The native ABI treats this value as "no command".
pub const INVALID_COMMAND_HANDLE: CommandHandle = 0;

/// Correlates one native call with the callback that completes it.
///
/// A handle is unique among the operations that are currently pending in the
/// registry that issued it. Once its operation is resolved (or abandoned) the
/// value may come around again after the 32-bit counter wraps.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(CommandHandle);

impl Handle {
    pub fn from_raw(raw: CommandHandle) -> Self {
        Handle(raw)
    }

    pub fn as_raw(self) -> CommandHandle {
        self.0
    }
}

impl Display for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<Handle> for CommandHandle {
    fn from(handle: Handle) -> Self {
        handle.0
    }
}

// -------------------------------------------------------------------------------------------------------

/// Issues correlation handles from a monotonically increasing counter.
///
/// Handles are strictly positive. When the counter passes `i32::MAX` it wraps
/// and continues at `1`; the registry rejects a wrapped value that is still
/// pending.
#[derive(Debug)]
pub struct HandleAllocator {
    next: AtomicI32,
}

impl HandleAllocator {
    pub fn new(first: CommandHandle) -> Self {
        HandleAllocator {
            next: AtomicI32::new(first.max(1)),
        }
    }

    pub fn allocate(&self) -> Handle {
        loop {
            // fetch_add wraps on overflow
            let raw = self.next.fetch_add(1, Ordering::Relaxed);
            if raw > INVALID_COMMAND_HANDLE {
                return Handle(raw);
            }
            // landed in the reserved range after a wrap; pull the counter back to 1.
            // Losing this race to another thread is harmless, both retry.
            let _ = self
                .next
                .compare_exchange(raw.wrapping_add(1), 1, Ordering::Relaxed, Ordering::Relaxed);
        }
    }
}

impl Default for HandleAllocator {
    fn default() -> Self {
        Self::new(1)
    }
}

// -------------------------------------------------------------------------------------------------------
// Tests
// -------------------------------------------------------------------------------------------------------
