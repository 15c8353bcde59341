//! Owned copies of the result fields a native callback delivers, and the
//! decoders call-sites use to turn them into typed values.

use crate::error::DecodeError;

// -------------------------------------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PayloadField {
    I32(i32),
    U32(u32),
    I64(i64),
    Bool(bool),
    /// `None` when the native side passed a null pointer.
    Str(Option<String>),
    Bytes(Vec<u8>),
}

impl PayloadField {
    fn kind(&self) -> &'static str {
        match self {
            PayloadField::I32(_) => "i32",
            PayloadField::U32(_) => "u32",
            PayloadField::I64(_) => "i64",
            PayloadField::Bool(_) => "bool",
            PayloadField::Str(_) => "string",
            PayloadField::Bytes(_) => "bytes",
        }
    }
}

/// The result fields of one callback, in ABI order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RawPayload {
    fields: Vec<PayloadField>,
}

impl RawPayload {
    pub fn empty() -> Self {
        RawPayload { fields: Vec::new() }
    }

    pub fn new(fields: Vec<PayloadField>) -> Self {
        RawPayload { fields }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn into_fields(self) -> Vec<PayloadField> {
        self.fields
    }

    pub fn field(&self, index: usize, expected: &'static str) -> Result<&PayloadField, DecodeError> {
        self.fields
            .get(index)
            .ok_or(DecodeError::MissingField { index, expected })
    }

    pub fn i32_at(&self, index: usize) -> Result<i32, DecodeError> {
        match self.field(index, "i32")? {
            PayloadField::I32(v) => Ok(*v),
            other => Err(unexpected(index, "i32", other)),
        }
    }

    pub fn u32_at(&self, index: usize) -> Result<u32, DecodeError> {
        match self.field(index, "u32")? {
            PayloadField::U32(v) => Ok(*v),
            other => Err(unexpected(index, "u32", other)),
        }
    }

    pub fn i64_at(&self, index: usize) -> Result<i64, DecodeError> {
        match self.field(index, "i64")? {
            PayloadField::I64(v) => Ok(*v),
            other => Err(unexpected(index, "i64", other)),
        }
    }

    pub fn bool_at(&self, index: usize) -> Result<bool, DecodeError> {
        match self.field(index, "bool")? {
            PayloadField::Bool(v) => Ok(*v),
            other => Err(unexpected(index, "bool", other)),
        }
    }

    pub fn opt_str_at(&self, index: usize) -> Result<Option<&str>, DecodeError> {
        match self.field(index, "string")? {
            PayloadField::Str(v) => Ok(v.as_deref()),
            other => Err(unexpected(index, "string", other)),
        }
    }

    pub fn str_at(&self, index: usize) -> Result<&str, DecodeError> {
        self.opt_str_at(index)?
            .ok_or(DecodeError::NullString { index })
    }

    pub fn bytes_at(&self, index: usize) -> Result<&[u8], DecodeError> {
        match self.field(index, "bytes")? {
            PayloadField::Bytes(v) => Ok(v),
            other => Err(unexpected(index, "bytes", other)),
        }
    }
}

impl From<Vec<PayloadField>> for RawPayload {
    fn from(fields: Vec<PayloadField>) -> Self {
        RawPayload::new(fields)
    }
}

fn unexpected(index: usize, expected: &'static str, found: &PayloadField) -> DecodeError {
    DecodeError::UnexpectedField {
        index,
        expected,
        found: found.kind(),
    }
}

// -------------------------------------------------------------------------------------------------------

/// Decoders for the callback shapes the native library uses most.
pub mod decode {
    use serde::de::DeserializeOwned;

    use super::RawPayload;
    use crate::error::DecodeError;

    /// `callback(handle, err)`
    pub fn unit(_payload: RawPayload) -> Result<(), DecodeError> {
        Ok(())
    }

    /// `callback(handle, err, i32)`, typically a native object handle.
    pub fn int(payload: RawPayload) -> Result<i32, DecodeError> {
        payload.i32_at(0)
    }

    pub fn boolean(payload: RawPayload) -> Result<bool, DecodeError> {
        payload.bool_at(0)
    }

    pub fn string(payload: RawPayload) -> Result<String, DecodeError> {
        payload.str_at(0).map(str::to_owned)
    }

    pub fn opt_string(payload: RawPayload) -> Result<Option<String>, DecodeError> {
        payload.opt_str_at(0).map(|s| s.map(str::to_owned))
    }

    pub fn string_pair(payload: RawPayload) -> Result<(String, String), DecodeError> {
        Ok((payload.str_at(0)?.to_owned(), payload.str_at(1)?.to_owned()))
    }

    pub fn bytes(payload: RawPayload) -> Result<Vec<u8>, DecodeError> {
        payload.bytes_at(0).map(<[u8]>::to_vec)
    }

    /// The first field is a json document.
    pub fn json<T: DeserializeOwned>(payload: RawPayload) -> Result<T, DecodeError> {
        Ok(serde_json::from_str(payload.str_at(0)?)?)
    }
}

// -------------------------------------------------------------------------------------------------------
// Tests
// -------------------------------------------------------------------------------------------------------

#[cfg(test)]
mod payload_tests {
    use super::*;

    #[derive(Debug, PartialEq, serde::Deserialize)]
    struct Did {
        did: String,
        verkey: String,
    }

    #[test]
    fn typed_accessors() {
        let payload = RawPayload::new(vec![
            PayloadField::I32(-4),
            PayloadField::Str(Some("abc".into())),
            PayloadField::Str(None),
            PayloadField::Bytes(vec![1, 2, 3]),
        ]);

        assert_eq!(payload.i32_at(0).unwrap(), -4);
        assert_eq!(payload.str_at(1).unwrap(), "abc");
        assert_eq!(payload.opt_str_at(2).unwrap(), None);
        assert_eq!(payload.bytes_at(3).unwrap(), &[1, 2, 3]);
    }

    #[test]
    fn shape_mismatches_are_reported() {
        let payload = RawPayload::new(vec![PayloadField::Bool(true), PayloadField::Str(None)]);

        assert!(matches!(
            payload.i32_at(0),
            Err(DecodeError::UnexpectedField { index: 0, expected: "i32", found: "bool" })
        ));
        assert!(matches!(
            payload.str_at(1),
            Err(DecodeError::NullString { index: 1 })
        ));
        assert!(matches!(
            payload.bytes_at(5),
            Err(DecodeError::MissingField { index: 5, .. })
        ));
    }

    #[test]
    fn stock_decoders() {
        let json = RawPayload::new(vec![PayloadField::Str(Some(
            r#"{"did": "did:sov:1", "verkey": "vk"}"#.into(),
        ))]);
        let did: Did = decode::json(json).unwrap();
        assert_eq!(did.did, "did:sov:1");
        assert_eq!(did.verkey, "vk");

        let pair = RawPayload::new(vec![
            PayloadField::Str(Some("a".into())),
            PayloadField::Str(Some("b".into())),
        ]);
        assert_eq!(
            decode::string_pair(pair).unwrap(),
            ("a".to_string(), "b".to_string())
        );

        assert!(decode::unit(RawPayload::empty()).is_ok());
        assert!(matches!(
            decode::json::<Did>(RawPayload::new(vec![PayloadField::Str(Some("{".into()))])),
            Err(DecodeError::Json(_))
        ));
    }
}
