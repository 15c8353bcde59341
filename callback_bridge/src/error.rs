use std::time::Duration;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::{error_code::ErrorCode, handle::Handle};

// -------------------------------------------------------------------------------------------------------

/// Extra context the native library keeps about its most recent failure.
/// The library exposes it as a json document (`{"message": .., "backtrace": ..}`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub message: String,
    #[serde(default)]
    pub backtrace: Option<String>,
}

impl ErrorDetails {
    pub fn from_json(json: &str) -> Option<ErrorDetails> {
        match serde_json::from_str(json) {
            Ok(details) => Some(details),
            Err(err) => {
                warn!("Failed to parse native error details: {}", err);
                None
            }
        }
    }
}

// -------------------------------------------------------------------------------------------------------

/// The callback payload did not have the shape the call-site expected.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("payload field {index} is missing (expected {expected})")]
    MissingField { index: usize, expected: &'static str },

    #[error("payload field {index} is {found}, expected {expected}")]
    UnexpectedField {
        index: usize,
        expected: &'static str,
        found: &'static str,
    },

    #[error("payload field {index} is a null string")]
    NullString { index: usize },

    #[error("payload is not valid json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Custom(String),
}

// -------------------------------------------------------------------------------------------------------

/// Everything a caller can observe when awaiting a bridged native call.
///
/// Immediate rejections and asynchronous failures arrive through the same
/// result, use [`BridgeError::native_code`] when the failure channel does not matter.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// The native entry point returned a non-zero status; the operation never started.
    #[error("native call {handle} was rejected: {code} (raw {raw})")]
    ImmediateRejection {
        handle: Handle,
        code: ErrorCode,
        raw: i32,
        details: Option<ErrorDetails>,
    },

    /// The operation ran natively and its callback reported a non-zero status.
    #[error("native call {handle} failed: {code} (raw {raw})")]
    AsyncFailure {
        handle: Handle,
        code: ErrorCode,
        raw: i32,
        details: Option<ErrorDetails>,
    },

    #[error("result of native call {handle} could not be decoded: {source}")]
    Decode {
        handle: Handle,
        #[source]
        source: DecodeError,
    },

    /// The caller stopped waiting. The native operation itself is not cancelled.
    #[error("gave up waiting for native call {handle} after {after:?}")]
    Timeout { handle: Handle, after: Duration },

    /// The completion slot was dropped without a delivery.
    #[error("native call {handle} was abandoned before it completed")]
    Abandoned { handle: Handle },
}

impl BridgeError {
    pub fn handle(&self) -> Handle {
        match self {
            BridgeError::ImmediateRejection { handle, .. }
            | BridgeError::AsyncFailure { handle, .. }
            | BridgeError::Decode { handle, .. }
            | BridgeError::Timeout { handle, .. }
            | BridgeError::Abandoned { handle } => *handle,
        }
    }

    /// The native status behind this error, regardless of whether it was
    /// returned synchronously or delivered through the callback.
    pub fn native_code(&self) -> Option<ErrorCode> {
        match self {
            BridgeError::ImmediateRejection { code, .. }
            | BridgeError::AsyncFailure { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn raw_code(&self) -> Option<i32> {
        match self {
            BridgeError::ImmediateRejection { raw, .. } | BridgeError::AsyncFailure { raw, .. } => {
                Some(*raw)
            }
            _ => None,
        }
    }

    pub fn details(&self) -> Option<&ErrorDetails> {
        match self {
            BridgeError::ImmediateRejection { details, .. }
            | BridgeError::AsyncFailure { details, .. } => details.as_ref(),
            _ => None,
        }
    }
}

// -------------------------------------------------------------------------------------------------------
// Tests
// -------------------------------------------------------------------------------------------------------
