//! Wire-format codecs.
//!
//! Codecs translate between bytes on the wire and a `serde_json::Value`
//! intermediate. Working on `Value` keeps [`Codec`] object-safe, so a codec can
//! be swapped at runtime behind an `Arc<dyn Codec>`, while callers stay typed
//! through [`encode_value`] and [`decode_value`].

use crate::config::CONTENT_TYPE_JSON;
use crate::error::CodecError;
use bytes::Bytes;
use serde::Deserialize;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Encode/decode capability for a wire payload format.
pub trait Codec: Send + Sync {
    /// Encode a value into wire bytes.
    ///
    /// # Errors
    /// Returns `CodecError` if the value cannot be represented.
    fn encode(&self, value: &Value) -> Result<Bytes, CodecError>;

    /// Decode wire bytes into a value.
    ///
    /// # Errors
    /// Returns `CodecError` if the bytes are malformed or rejected.
    fn decode(&self, data: &[u8]) -> Result<Value, CodecError>;

    /// Content type produced by [`Codec::encode`].
    fn content_type(&self) -> &str {
        CONTENT_TYPE_JSON
    }
}

/// Shared, type-erased codec handle.
pub type SharedCodec = Arc<dyn Codec>;

/// The codec used when none is configured.
#[must_use]
pub fn default_codec() -> SharedCodec {
    Arc::new(JsonCodec)
}

/// Serialize `value` and encode it with `codec`.
///
/// # Errors
/// Returns `CodecError` if serialization or encoding fails.
pub fn encode_value<T>(codec: &dyn Codec, value: &T) -> Result<Bytes, CodecError>
where
    T: Serialize + ?Sized,
{
    let value = serde_json::to_value(value)?;
    codec.encode(&value)
}

/// Decode `data` with `codec` into a typed target.
///
/// # Errors
/// Returns `CodecError` if decoding fails or the shape does not match `T`.
pub fn decode_value<T: DeserializeOwned>(codec: &dyn Codec, data: &[u8]) -> Result<T, CodecError> {
    let value = codec.decode(data)?;
    Ok(serde_json::from_value(value)?)
}

/// Plain JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode(&self, value: &Value) -> Result<Bytes, CodecError> {
        Ok(Bytes::from(serde_json::to_vec(value)?))
    }

    fn decode(&self, data: &[u8]) -> Result<Value, CodecError> {
        Ok(serde_json::from_slice(data)?)
    }
}

#[derive(Deserialize)]
struct StatusEnvelope {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    data: Value,
}

/// JSON wrapped in a `{"code": 0, "msg": "", "data": ...}` envelope.
///
/// Decoding unwraps `data`; any non-zero `code` is a [`CodecError::Status`].
/// Encoding writes the bare value.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusJsonCodec;

impl Codec for StatusJsonCodec {
    fn encode(&self, value: &Value) -> Result<Bytes, CodecError> {
        JsonCodec.encode(value)
    }

    fn decode(&self, data: &[u8]) -> Result<Value, CodecError> {
        let envelope: StatusEnvelope = serde_json::from_slice(data)?;
        if envelope.code != 0 {
            return Err(CodecError::Status {
                code: envelope.code,
                msg: envelope.msg,
            });
        }
        Ok(envelope.data)
    }
}

type EncodeFn = dyn Fn(&Value) -> Result<Bytes, CodecError> + Send + Sync;
type DecodeFn = dyn Fn(&[u8]) -> Result<Value, CodecError> + Send + Sync;

/// Codec assembled from an encoder/decoder function pair.
#[derive(Clone)]
pub struct FnCodec {
    encoder: Arc<EncodeFn>,
    decoder: Arc<DecodeFn>,
    content_type: String,
}

impl FnCodec {
    #[must_use]
    pub fn new<E, D>(encoder: E, decoder: D) -> Self
    where
        E: Fn(&Value) -> Result<Bytes, CodecError> + Send + Sync + 'static,
        D: Fn(&[u8]) -> Result<Value, CodecError> + Send + Sync + 'static,
    {
        Self {
            encoder: Arc::new(encoder),
            decoder: Arc::new(decoder),
            content_type: CONTENT_TYPE_JSON.to_owned(),
        }
    }

    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }
}

impl fmt::Debug for FnCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnCodec")
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

impl Codec for FnCodec {
    fn encode(&self, value: &Value) -> Result<Bytes, CodecError> {
        (self.encoder)(value)
    }

    fn decode(&self, data: &[u8]) -> Result<Value, CodecError> {
        (self.decoder)(data)
    }

    fn content_type(&self) -> &str {
        &self.content_type
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Payload {
        #[serde(rename = "Data")]
        data: String,
    }

    #[test]
    fn test_json_codec_round_trip() {
        let given = Payload {
            data: "hello world".to_owned(),
        };
        let bytes = encode_value(&JsonCodec, &given).unwrap();
        assert_eq!(&bytes[..], br#"{"Data":"hello world"}"#);

        let got: Payload = decode_value(&JsonCodec, &bytes).unwrap();
        assert_eq!(got, given);
    }

    #[test]
    fn test_json_codec_rejects_wrong_shape() {
        let result = decode_value::<Payload>(&JsonCodec, br#"{"Other":1}"#);
        assert!(matches!(result, Err(CodecError::Json(_))));

        let result = decode_value::<Payload>(&JsonCodec, b"");
        assert!(matches!(result, Err(CodecError::Json(_))));
    }

    #[test]
    fn test_status_codec_unwraps_data() {
        let body = json!({"code": 0, "msg": "", "data": {"Data": "hello world"}}).to_string();
        let got: Payload = decode_value(&StatusJsonCodec, body.as_bytes()).unwrap();
        assert_eq!(got.data, "hello world");
    }

    #[test]
    fn test_status_codec_non_zero_code_is_error() {
        let body = br#"{"code":5,"msg":"bad","data":null}"#;
        let err = decode_value::<Payload>(&StatusJsonCodec, body).unwrap_err();
        match err {
            CodecError::Status { code, msg } => {
                assert_eq!(code, 5);
                assert_eq!(msg, "bad");
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[test]
    fn test_status_codec_missing_code_means_success() {
        let got: Option<Payload> = decode_value(&StatusJsonCodec, br#"{"msg":"ok"}"#).unwrap();
        assert!(got.is_none());
    }

    #[test]
    fn test_status_codec_encodes_bare_value() {
        let bytes = encode_value(
            &StatusJsonCodec,
            &Payload {
                data: "x".to_owned(),
            },
        )
        .unwrap();
        assert_eq!(&bytes[..], br#"{"Data":"x"}"#);
    }

    #[test]
    fn test_fn_codec_uses_supplied_functions() {
        let codec = FnCodec::new(
            |value| Ok(Bytes::from(format!("v={value}"))),
            |data| {
                let text = std::str::from_utf8(data)
                    .map_err(|e| CodecError::Custom(Box::new(e)))?;
                Ok(Value::String(text.trim_start_matches("v=").to_owned()))
            },
        )
        .with_content_type("text/plain");

        assert_eq!(codec.content_type(), "text/plain");
        assert_eq!(&codec.encode(&json!(1)).unwrap()[..], b"v=1");
        assert_eq!(codec.decode(b"v=abc").unwrap(), json!("abc"));
        assert_eq!(JsonCodec.content_type(), CONTENT_TYPE_JSON);
    }
}
