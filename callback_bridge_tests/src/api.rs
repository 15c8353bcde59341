//! Typed wrappers over the simulated native entry points.
//!
//! Inputs are converted to C strings up front; an interior nul byte fails the
//! wrapper before anything is submitted.

use std::ffi::CString;

use callback_bridge::{AsyncBridge, PendingResult, decode, trampoline};
use serde::Deserialize;

use crate::native;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPair {
    pub did: String,
    pub verkey: String,
}

pub fn echo(bridge: &AsyncBridge, message: &str) -> anyhow::Result<PendingResult<String>> {
    let message = CString::new(message)?;
    Ok(bridge.submit(
        |handle| unsafe {
            native::native_echo(
                handle.as_raw(),
                message.as_ptr(),
                Some(trampoline::string_callback),
            )
        },
        decode::string,
    ))
}

pub fn fail(
    bridge: &AsyncBridge,
    error_code: i32,
    message: &str,
) -> anyhow::Result<PendingResult<()>> {
    let message = CString::new(message)?;
    Ok(bridge.submit(
        |handle| unsafe {
            native::native_fail(
                handle.as_raw(),
                error_code,
                message.as_ptr(),
                Some(trampoline::empty_callback),
            )
        },
        decode::unit,
    ))
}

pub fn open_wallet(bridge: &AsyncBridge, config: &str) -> anyhow::Result<PendingResult<i32>> {
    let config = CString::new(config)?;
    Ok(bridge.submit(
        |handle| unsafe {
            native::native_open_wallet(handle.as_raw(), config.as_ptr(), Some(trampoline::i32_callback))
        },
        decode::int,
    ))
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WalletInfo {
    pub handle: i32,
    pub storage: String,
}

pub fn wallet_info(bridge: &AsyncBridge, wallet_handle: i32) -> PendingResult<WalletInfo> {
    bridge.submit(
        |handle| {
            native::native_wallet_info(handle.as_raw(), wallet_handle, Some(trampoline::string_callback))
        },
        decode::json,
    )
}

pub fn is_known_did(bridge: &AsyncBridge, did: &str) -> anyhow::Result<PendingResult<bool>> {
    let did = CString::new(did)?;
    Ok(bridge.submit(
        |handle| unsafe {
            native::native_is_known_did(handle.as_raw(), did.as_ptr(), Some(trampoline::bool_callback))
        },
        decode::boolean,
    ))
}

pub fn create_key_pair(
    bridge: &AsyncBridge,
    seed: &str,
) -> anyhow::Result<PendingResult<KeyPair>> {
    let seed = CString::new(seed)?;
    Ok(bridge.submit(
        |handle| unsafe {
            native::native_create_key_pair(
                handle.as_raw(),
                seed.as_ptr(),
                Some(trampoline::string_string_callback),
            )
        },
        |payload| {
            let (did, verkey) = decode::string_pair(payload)?;
            Ok(KeyPair { did, verkey })
        },
    ))
}

pub fn sign(bridge: &AsyncBridge, data: &[u8]) -> PendingResult<Vec<u8>> {
    bridge.submit(
        |handle| unsafe {
            native::native_sign(
                handle.as_raw(),
                data.as_ptr(),
                data.len() as u32,
                Some(trampoline::bytes_callback),
            )
        },
        decode::bytes,
    )
}

pub fn ping_sync(bridge: &AsyncBridge) -> PendingResult<i32> {
    bridge.submit(
        |handle| native::native_ping_sync(handle.as_raw(), Some(trampoline::i32_callback)),
        decode::int,
    )
}
