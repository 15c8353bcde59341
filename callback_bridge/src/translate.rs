use crate::{
    error::{BridgeError, DecodeError, ErrorDetails},
    error_code::ErrorCode,
    handle::Handle,
    payload::RawPayload,
};

// -------------------------------------------------------------------------------------------------------

/// The status every native entry point and callback uses for "no error".
pub const SUCCESS: i32 = 0;

#[derive(Debug)]
pub enum TranslateError {
    Native { code: ErrorCode, raw: i32 },
    Decode(DecodeError),
}

/// Which of the two failure channels of a native call produced a status.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureChannel {
    /// the synchronous return value of the native entry point
    Immediate,
    /// the error code passed to the callback
    Callback,
}

/// Success decodes the payload with the call-site's decoder, any other code
/// is looked up in the native error table.
pub fn translate<T, D>(raw_code: i32, payload: RawPayload, decoder: D) -> Result<T, TranslateError>
where
    D: FnOnce(RawPayload) -> Result<T, DecodeError>,
{
    if raw_code == SUCCESS {
        decoder(payload).map_err(TranslateError::Decode)
    } else {
        Err(TranslateError::Native {
            code: ErrorCode::lookup(raw_code),
            raw: raw_code,
        })
    }
}

impl TranslateError {
    pub fn into_bridge_error(
        self,
        handle: Handle,
        channel: FailureChannel,
        details: Option<ErrorDetails>,
    ) -> BridgeError {
        match (self, channel) {
            (TranslateError::Native { code, raw }, FailureChannel::Immediate) => {
                BridgeError::ImmediateRejection {
                    handle,
                    code,
                    raw,
                    details,
                }
            }
            (TranslateError::Native { code, raw }, FailureChannel::Callback) => {
                BridgeError::AsyncFailure {
                    handle,
                    code,
                    raw,
                    details,
                }
            }
            (TranslateError::Decode(source), _) => BridgeError::Decode { handle, source },
        }
    }
}

// -------------------------------------------------------------------------------------------------------
// Tests
// -------------------------------------------------------------------------------------------------------

#[cfg(test)]
mod translate_tests {
    use super::*;
    use crate::payload::{PayloadField, decode};

    #[test]
    fn success_decodes_payload() {
        let payload = RawPayload::new(vec![PayloadField::Str(Some("payload".into()))]);
        let value = translate(SUCCESS, payload, decode::string).unwrap();
        assert_eq!(value, "payload");
    }

    #[test]
    fn failure_skips_the_decoder() {
        let result: Result<(), _> = translate(113, RawPayload::empty(), |_| {
            panic!("decoder must not run for a failed call")
        });

        match result {
            Err(TranslateError::Native { code, raw }) => {
                assert_eq!(code, ErrorCode::CommonInvalidStructure);
                assert_eq!(raw, 113);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn unknown_code_is_generic_error() {
        let result = translate(4242, RawPayload::empty(), decode::unit);
        assert!(matches!(
            result,
            Err(TranslateError::Native {
                code: ErrorCode::UnknownNativeError,
                raw: 4242
            })
        ));
    }

    #[test]
    fn channel_selects_error_kind() {
        let handle = Handle::from_raw(9);
        let native = || TranslateError::Native {
            code: ErrorCode::lookup(100),
            raw: 100,
        };

        assert!(matches!(
            native().into_bridge_error(handle, FailureChannel::Immediate, None),
            BridgeError::ImmediateRejection { raw: 100, .. }
        ));
        assert!(matches!(
            native().into_bridge_error(handle, FailureChannel::Callback, None),
            BridgeError::AsyncFailure { raw: 100, .. }
        ));

        let decode = TranslateError::Decode(DecodeError::NullString { index: 0 });
        assert!(matches!(
            decode.into_bridge_error(handle, FailureChannel::Callback, None),
            BridgeError::Decode { .. }
        ));
    }
}
