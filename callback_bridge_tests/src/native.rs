//! Simulated native library.
//!
//! Entry points validate their arguments synchronously (returning a non-zero
//! status without ever calling back), copy what they need, and then complete
//! on a worker thread after a short random delay. Failures record a json
//! error description in thread-local storage that
//! [`native_get_current_error`] exposes, like the real library does.

use std::{
    cell::RefCell,
    ffi::{CStr, CString},
    os::raw::c_char,
    ptr,
    sync::atomic::{AtomicI32, Ordering},
    thread,
    time::Duration,
};

use callback_bridge::{
    CommandHandle, ErrorCode,
    trampoline::{BoolCallback, BytesCallback, EmptyCallback, I32Callback, StringCallback, StringStringCallback},
};
use rand::Rng;

pub const SUCCESS: i32 = ErrorCode::Success as i32;
pub const INVALID_PARAM_2: i32 = ErrorCode::CommonInvalidParam2 as i32;
pub const INVALID_PARAM_3: i32 = ErrorCode::CommonInvalidParam3 as i32;
pub const INVALID_PARAM_4: i32 = ErrorCode::CommonInvalidParam4 as i32;
pub const INVALID_STRUCTURE: i32 = ErrorCode::CommonInvalidStructure as i32;
pub const WALLET_NOT_FOUND: i32 = ErrorCode::WalletNotFoundError as i32;

thread_local! {
    static CURRENT_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

static NEXT_WALLET_HANDLE: AtomicI32 = AtomicI32::new(1);

fn set_current_error(message: &str) {
    let json = serde_json::json!({
        "message": message,
        "backtrace": format!("simulated backtrace for: {message}"),
    })
    .to_string();
    CURRENT_ERROR.with(|current| *current.borrow_mut() = CString::new(json).ok());
}

fn clear_current_error() {
    CURRENT_ERROR.with(|current| *current.borrow_mut() = None);
}

/// Writes the calling thread's last error as json, or null if there is none.
/// The string stays valid until the next call on the same thread fails.
///
/// # Safety
/// `error_json_p` must be a valid pointer to write to.
pub unsafe extern "C" fn native_get_current_error(error_json_p: *mut *const c_char) {
    CURRENT_ERROR.with(|current| {
        let p = current.borrow().as_ref().map_or(ptr::null(), |json| json.as_ptr());
        unsafe { *error_json_p = p };
    });
}

unsafe fn copy_str(p: *const c_char) -> Option<String> {
    if p.is_null() {
        return None;
    }
    unsafe { CStr::from_ptr(p) }.to_str().ok().map(str::to_owned)
}

fn reject(code: i32, message: &str) -> i32 {
    set_current_error(message);
    code
}

fn complete_later(work: impl FnOnce() + Send + 'static) {
    let delay = Duration::from_micros(rand::rng().random_range(0..3_000));
    thread::spawn(move || {
        thread::sleep(delay);
        work();
    });
}

// -------------------------------------------------------------------------------------------------------

/// Calls back with a copy of `message`.
///
/// # Safety
/// `message` is null or a valid nul-terminated string.
pub unsafe extern "C" fn native_echo(
    command_handle: CommandHandle,
    message: *const c_char,
    cb: Option<StringCallback>,
) -> i32 {
    let Some(message) = (unsafe { copy_str(message) }) else {
        return reject(INVALID_PARAM_2, "message is null or not utf-8");
    };
    let Some(cb) = cb else {
        return reject(INVALID_PARAM_3, "callback is missing");
    };

    complete_later(move || {
        clear_current_error();
        match CString::new(message) {
            Ok(message) => cb(command_handle, SUCCESS, message.as_ptr()),
            Err(_) => {
                set_current_error("message contains a nul byte");
                cb(command_handle, INVALID_STRUCTURE, ptr::null())
            }
        }
    });
    SUCCESS
}

/// Accepts the call, then fails asynchronously with `error_code`.
///
/// # Safety
/// `message` is null or a valid nul-terminated string.
pub unsafe extern "C" fn native_fail(
    command_handle: CommandHandle,
    error_code: i32,
    message: *const c_char,
    cb: Option<EmptyCallback>,
) -> i32 {
    let message = unsafe { copy_str(message) }.unwrap_or_else(|| "operation failed".to_string());
    let Some(cb) = cb else {
        return reject(INVALID_PARAM_4, "callback is missing");
    };

    complete_later(move || {
        set_current_error(&message);
        cb(command_handle, error_code)
    });
    SUCCESS
}

/// Opens the wallet described by the json `config` (`{"id": "..."}`) and calls
/// back with a wallet handle. The id `"missing"` does not exist.
///
/// # Safety
/// `config` is null or a valid nul-terminated string.
pub unsafe extern "C" fn native_open_wallet(
    command_handle: CommandHandle,
    config: *const c_char,
    cb: Option<I32Callback>,
) -> i32 {
    let Some(config) = (unsafe { copy_str(config) }) else {
        return reject(INVALID_PARAM_2, "wallet config is null");
    };
    let Some(cb) = cb else {
        return reject(INVALID_PARAM_3, "callback is missing");
    };
    let id = match serde_json::from_str::<serde_json::Value>(&config) {
        Ok(value) => value.get("id").and_then(|id| id.as_str()).map(str::to_owned),
        Err(_) => None,
    };
    let Some(id) = id else {
        return reject(INVALID_STRUCTURE, "wallet config has no string 'id'");
    };

    complete_later(move || {
        if id == "missing" {
            set_current_error(&format!("wallet '{id}' not found"));
            cb(command_handle, WALLET_NOT_FOUND, 0)
        } else {
            clear_current_error();
            let wallet_handle = NEXT_WALLET_HANDLE.fetch_add(1, Ordering::Relaxed);
            cb(command_handle, SUCCESS, wallet_handle)
        }
    });
    SUCCESS
}

/// Calls back with a json description of an open wallet.
pub extern "C" fn native_wallet_info(
    command_handle: CommandHandle,
    wallet_handle: i32,
    cb: Option<StringCallback>,
) -> i32 {
    if wallet_handle <= 0 {
        return reject(ErrorCode::WalletInvalidHandle as i32, "wallet handle must be positive");
    }
    let Some(cb) = cb else {
        return reject(INVALID_PARAM_3, "callback is missing");
    };

    complete_later(move || {
        let info = serde_json::json!({ "handle": wallet_handle, "storage": "simulated" }).to_string();
        let info = CString::new(info).unwrap_or_default();
        cb(command_handle, SUCCESS, info.as_ptr())
    });
    SUCCESS
}

/// Calls back with whether `did` is known, i.e. starts with `did:known:`.
///
/// # Safety
/// `did` is null or a valid nul-terminated string.
pub unsafe extern "C" fn native_is_known_did(
    command_handle: CommandHandle,
    did: *const c_char,
    cb: Option<BoolCallback>,
) -> i32 {
    let Some(did) = (unsafe { copy_str(did) }) else {
        return reject(INVALID_PARAM_2, "did is null");
    };
    let Some(cb) = cb else {
        return reject(INVALID_PARAM_3, "callback is missing");
    };

    complete_later(move || cb(command_handle, SUCCESS, did.starts_with("did:known:")));
    SUCCESS
}

/// Derives a `(did, verkey)` pair from `seed` and calls back with both.
///
/// # Safety
/// `seed` is null or a valid nul-terminated string.
pub unsafe extern "C" fn native_create_key_pair(
    command_handle: CommandHandle,
    seed: *const c_char,
    cb: Option<StringStringCallback>,
) -> i32 {
    let Some(seed) = (unsafe { copy_str(seed) }) else {
        return reject(INVALID_PARAM_2, "seed is null");
    };
    let Some(cb) = cb else {
        return reject(INVALID_PARAM_3, "callback is missing");
    };

    complete_later(move || {
        let did = CString::new(format!("did:sim:{}", seed.len())).unwrap_or_default();
        let verkey = CString::new(seed.chars().rev().collect::<String>()).unwrap_or_default();
        cb(command_handle, SUCCESS, did.as_ptr(), verkey.as_ptr())
    });
    SUCCESS
}

/// "Signs" `len` bytes at `data` and calls back with the signature. The
/// buffer passed to the callback is freed right after it returns.
///
/// # Safety
/// `data` is null or points to `len` readable bytes.
pub unsafe extern "C" fn native_sign(
    command_handle: CommandHandle,
    data: *const u8,
    len: u32,
    cb: Option<BytesCallback>,
) -> i32 {
    if data.is_null() {
        return reject(INVALID_PARAM_2, "data is null");
    }
    let Some(cb) = cb else {
        return reject(INVALID_PARAM_4, "callback is missing");
    };
    let data = unsafe { std::slice::from_raw_parts(data, len as usize) }.to_vec();

    complete_later(move || {
        let signature = sign(&data);
        cb(command_handle, SUCCESS, signature.as_ptr(), signature.len() as u32);
    });
    SUCCESS
}

/// What [`native_sign`] produces for `data`.
pub fn sign(data: &[u8]) -> Vec<u8> {
    data.iter().rev().map(|b| b ^ 0x5a).collect()
}

/// Completes on the calling thread before returning.
pub extern "C" fn native_ping_sync(command_handle: CommandHandle, cb: Option<I32Callback>) -> i32 {
    let Some(cb) = cb else {
        return reject(INVALID_PARAM_2, "callback is missing");
    };
    cb(command_handle, SUCCESS, 42);
    SUCCESS
}

/// Misbehaves by calling back twice for the same handle.
pub extern "C" fn native_double_callback(command_handle: CommandHandle, cb: Option<I32Callback>) -> i32 {
    let Some(cb) = cb else {
        return reject(INVALID_PARAM_2, "callback is missing");
    };
    complete_later(move || {
        cb(command_handle, SUCCESS, 1);
        cb(command_handle, SUCCESS, 2);
    });
    SUCCESS
}

/// Misbehaves by calling back synchronously and then still reporting failure.
pub extern "C" fn native_reject_after_callback(
    command_handle: CommandHandle,
    cb: Option<I32Callback>,
) -> i32 {
    let Some(cb) = cb else {
        return reject(INVALID_PARAM_2, "callback is missing");
    };
    cb(command_handle, SUCCESS, 7);
    reject(ErrorCode::CommonInvalidState as i32, "rejected after calling back")
}
