//! C ABI entry points the native library calls back into.
//!
//! The native callback signatures carry no user-data pointer, only the
//! command handle, so the trampolines cannot reach a particular bridge through
//! their arguments. Instead they forward to one [`TrampolineRoute`] that is
//! bound once per process with [`install`]. Everything behind the route (the
//! registry, the dispatcher) is still an explicit instance owned by an
//! [`AsyncBridge`](crate::bridge::AsyncBridge).
//!
//! Each trampoline copies its arguments into owned Rust data before it
//! returns, since the native side frees its strings and buffers afterwards.
//! Panics are caught here and never unwind into native code.

use std::{
    ffi::CStr,
    os::raw::c_char,
    panic::{AssertUnwindSafe, catch_unwind},
    ptr,
    sync::OnceLock,
};

use log::error;
use ractor::ActorRef;

use crate::{
    dispatcher::{CallbackDelivery, Dispatcher, DispatcherMessage},
    error::ErrorDetails,
    handle::{CommandHandle, Handle},
    payload::{PayloadField, RawPayload},
    translate::SUCCESS,
};

// -------------------------------------------------------------------------------------------------------

/// `callback(command_handle, err)`
pub type EmptyCallback = extern "C" fn(command_handle: CommandHandle, err: i32);
/// `callback(command_handle, err, value)`, usually a native object handle
pub type I32Callback = extern "C" fn(command_handle: CommandHandle, err: i32, value: i32);
pub type BoolCallback = extern "C" fn(command_handle: CommandHandle, err: i32, value: bool);
pub type StringCallback =
    extern "C" fn(command_handle: CommandHandle, err: i32, value: *const c_char);
pub type StringStringCallback = extern "C" fn(
    command_handle: CommandHandle,
    err: i32,
    first: *const c_char,
    second: *const c_char,
);
pub type BytesCallback =
    extern "C" fn(command_handle: CommandHandle, err: i32, data: *const u8, len: u32);

/// Native accessor for the json details of the calling thread's last error,
/// e.g. `indy_get_current_error`. The pointer it writes stays owned by the library.
pub type ErrorDetailsFn = unsafe extern "C" fn(error_json_p: *mut *const c_char);

// -------------------------------------------------------------------------------------------------------

pub enum TrampolineRoute {
    /// resolve on the native thread that delivered the callback
    Direct(Dispatcher),
    /// enqueue into a dispatcher actor
    Actor(ActorRef<DispatcherMessage>),
}

struct TrampolineBinding {
    route: TrampolineRoute,
    error_details: Option<ErrorDetailsFn>,
}

static BINDING: OnceLock<TrampolineBinding> = OnceLock::new();

#[derive(Debug, thiserror::Error)]
pub enum TrampolineError {
    #[error("the callback trampolines are already bound to a dispatcher")]
    AlreadyInstalled,
}

/// Bind the trampolines. Can succeed only once per process.
pub fn install(
    route: TrampolineRoute,
    error_details: Option<ErrorDetailsFn>,
) -> Result<(), TrampolineError> {
    BINDING
        .set(TrampolineBinding {
            route,
            error_details,
        })
        .map_err(|_| TrampolineError::AlreadyInstalled)
}

pub fn is_installed() -> bool {
    BINDING.get().is_some()
}

/// Read and parse the native error details for the current thread.
pub fn read_error_details(hook: ErrorDetailsFn) -> Option<ErrorDetails> {
    let mut error_json_p: *const c_char = ptr::null();
    unsafe { hook(&mut error_json_p) };

    let json = unsafe { copy_c_str(error_json_p) }?;
    ErrorDetails::from_json(&json)
}

/// # Safety
/// `p` is null or points to a nul-terminated string that stays valid for the call.
unsafe fn copy_c_str(p: *const c_char) -> Option<String> {
    if p.is_null() {
        None
    } else {
        Some(unsafe { CStr::from_ptr(p) }.to_string_lossy().into_owned())
    }
}

/// # Safety
/// `data` is null or points to `len` readable bytes.
unsafe fn copy_bytes(data: *const u8, len: u32) -> Vec<u8> {
    if data.is_null() || len == 0 {
        Vec::new()
    } else {
        unsafe { std::slice::from_raw_parts(data, len as usize) }.to_vec()
    }
}

fn route(command_handle: CommandHandle, err: i32, collect: impl FnOnce() -> RawPayload) {
    let result = catch_unwind(AssertUnwindSafe(|| {
        let Some(binding) = BINDING.get() else {
            error!(
                "Callback for handle {} (error code {}) arrived before the trampolines were bound, dropping it",
                command_handle, err
            );
            return;
        };

        // error details are thread-local on the native side, read them on this thread
        let details = match (err, binding.error_details) {
            (SUCCESS, _) | (_, None) => None,
            (_, Some(hook)) => read_error_details(hook),
        };

        let delivery = CallbackDelivery {
            handle: Handle::from_raw(command_handle),
            error_code: err,
            payload: collect(),
            details,
        };

        match &binding.route {
            TrampolineRoute::Direct(dispatcher) => {
                dispatcher.dispatch(delivery);
            }
            TrampolineRoute::Actor(actor) => {
                if let Err(send_err) = actor.send_message(DispatcherMessage::Deliver(delivery)) {
                    error!(
                        "Dispatcher actor is gone, callback for handle {} is lost: {}",
                        command_handle, send_err
                    );
                }
            }
        }
    }));

    if result.is_err() {
        tracing::error!(
            "Panic while delivering callback for handle {}, swallowed at the C boundary",
            command_handle
        );
    }
}

// Trampolines
// -------------------------------------------------------------------------------------------------------

pub extern "C" fn empty_callback(command_handle: CommandHandle, err: i32) {
    route(command_handle, err, RawPayload::empty);
}

pub extern "C" fn i32_callback(command_handle: CommandHandle, err: i32, value: i32) {
    route(command_handle, err, || {
        RawPayload::new(vec![PayloadField::I32(value)])
    });
}

pub extern "C" fn bool_callback(command_handle: CommandHandle, err: i32, value: bool) {
    route(command_handle, err, || {
        RawPayload::new(vec![PayloadField::Bool(value)])
    });
}

pub extern "C" fn string_callback(command_handle: CommandHandle, err: i32, value: *const c_char) {
    route(command_handle, err, || {
        RawPayload::new(vec![PayloadField::Str(unsafe { copy_c_str(value) })])
    });
}

pub extern "C" fn string_string_callback(
    command_handle: CommandHandle,
    err: i32,
    first: *const c_char,
    second: *const c_char,
) {
    route(command_handle, err, || {
        RawPayload::new(vec![
            PayloadField::Str(unsafe { copy_c_str(first) }),
            PayloadField::Str(unsafe { copy_c_str(second) }),
        ])
    });
}

pub extern "C" fn bytes_callback(
    command_handle: CommandHandle,
    err: i32,
    data: *const u8,
    len: u32,
) {
    route(command_handle, err, || {
        RawPayload::new(vec![PayloadField::Bytes(unsafe { copy_bytes(data, len) })])
    });
}

// statically check the trampolines against the aliases the native entry points take
const _: EmptyCallback = empty_callback;
const _: I32Callback = i32_callback;
const _: BoolCallback = bool_callback;
const _: StringCallback = string_callback;
const _: StringStringCallback = string_string_callback;
const _: BytesCallback = bytes_callback;

// -------------------------------------------------------------------------------------------------------
// Tests
// -------------------------------------------------------------------------------------------------------
