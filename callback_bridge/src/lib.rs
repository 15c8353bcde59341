//! Correlates asynchronous completion callbacks from a native library with
//! awaitable Rust futures.
//!
//! Every call into the native library gets a fresh [`Handle`]. The bridge
//! parks a completion slot under that handle in a [`PendingRegistry`], the
//! native side later invokes one of the C [`trampoline`]s with the same
//! handle, and the [`Dispatcher`] hands the raw outcome to whoever awaits the
//! matching [`PendingResult`]. Native error codes and payloads are translated
//! into a typed `Result` on the awaiting side.

pub mod bridge;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod error_code;
pub mod handle;
pub mod payload;
pub mod registry;
pub mod trampoline;
pub mod translate;

pub use bridge::{AsyncBridge, PendingResult};
pub use config::{BridgeConfig, ConfigError};
pub use dispatcher::{
    CallbackDelivery, DispatchOutcome, DispatchStats, Dispatcher, DispatcherActor,
    DispatcherMessage,
};
pub use error::{BridgeError, DecodeError, ErrorDetails};
pub use error_code::{ErrorCategory, ErrorCode};
pub use handle::{CommandHandle, Handle, HandleAllocator, INVALID_COMMAND_HANDLE};
pub use payload::{PayloadField, RawPayload, decode};
pub use registry::{PendingOperation, PendingRegistry, RawOutcome};
