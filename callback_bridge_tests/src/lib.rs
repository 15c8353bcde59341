//! A stand-in for a native library with the "call now, get the result through
//! a callback later" calling convention, plus thin typed wrappers over it.
//!
//! Integration tests and the sample app drive the bridge through these
//! entry points exactly as they would drive the real C library.

pub mod api;
pub mod native;

use std::sync::OnceLock;

use callback_bridge::{AsyncBridge, BridgeConfig};

static DIRECT_BRIDGE: OnceLock<AsyncBridge> = OnceLock::new();

/// A process-wide bridge with the trampolines bound to it directly.
///
/// Binding the trampolines is process-wide, so a test binary uses either this
/// or its own actor-routed bridge, never both.
pub fn direct_bridge() -> &'static AsyncBridge {
    DIRECT_BRIDGE.get_or_init(|| {
        let bridge = AsyncBridge::new(BridgeConfig::default())
            .with_error_details(native::native_get_current_error);
        bridge
            .bind_trampolines()
            .expect("trampolines bound twice in one test binary");
        bridge
    })
}
