use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;
use serde_json::Value;

use super::{DomainError, DomainResult};

/// Delivery metadata wrapped around one encoded measurement pack.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Envelope {
    pub channel: String,
    pub publisher: String,
    pub protocol: String,
    pub content_type: String,
    pub payload: Vec<u8>,
}

/// Envelope as published on the bus
#[derive(Deserialize)]
struct WireEnvelope {
    channel: String,
    publisher: String,
    protocol: String,
    #[serde(default)]
    content_type: Option<String>,
    #[serde(default)]
    payload: Value,
}

impl Envelope {
    /// Decode a bus message.
    ///
    /// Empty input is not an error: it yields the default envelope, which the
    /// pipeline treats as nothing to do.
    pub fn decode(bytes: &[u8]) -> DomainResult<Self> {
        if bytes.is_empty() {
            return Ok(Self::default());
        }

        let wire: WireEnvelope =
            serde_json::from_slice(bytes).map_err(|e| DomainError::DecodeError(e.to_string()))?;

        Ok(Self {
            channel: wire.channel,
            publisher: wire.publisher,
            protocol: wire.protocol,
            content_type: wire.content_type.unwrap_or_default(),
            payload: payload_bytes(wire.payload)?,
        })
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Byte slices arrive base64 encoded; producers that inline the pack as
/// JSON or as plain text are accepted too.
fn payload_bytes(payload: Value) -> DomainResult<Vec<u8>> {
    match payload {
        Value::Null => Ok(Vec::new()),
        Value::String(text) => Ok(STANDARD.decode(&text).unwrap_or_else(|_| text.into_bytes())),
        inline @ (Value::Array(_) | Value::Object(_)) => {
            serde_json::to_vec(&inline).map_err(|e| DomainError::DecodeError(e.to_string()))
        }
        other => Err(DomainError::DecodeError(format!(
            "payload must be a string, array or object, got {other}"
        ))),
    }
}
