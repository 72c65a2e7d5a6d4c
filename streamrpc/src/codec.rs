//! Wire encodings for message payloads.
//!
//! Payloads are JSON (serde) or protobuf (prost), chosen per call from the
//! request content type. The same message type serves both.

use bytes::Bytes;
use prost::Message;
use serde::{Serialize, de::DeserializeOwned};

use crate::error::RpcError;

/// Content type for JSON-encoded streams.
pub const CONTENT_TYPE_JSON: &str = "application/connect+json";
/// Content type for protobuf-encoded streams.
pub const CONTENT_TYPE_PROTO: &str = "application/connect+proto";

/// A message that can travel in either encoding.
///
/// Implemented for every type with both prost and serde support.
pub trait RpcMessage: Message + Serialize + DeserializeOwned + Default + Send + 'static {}

impl<T> RpcMessage for T where T: Message + Serialize + DeserializeOwned + Default + Send + 'static {}

/// Serialization format of a call's messages.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Encoding {
    #[default]
    Json,
    Proto,
}

impl Encoding {
    /// Pick the encoding for a request content type.
    ///
    /// Parameters such as `; charset=utf-8` are ignored. Returns `None` for
    /// content types this runtime does not serve.
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            CONTENT_TYPE_JSON | "application/json" => Some(Self::Json),
            CONTENT_TYPE_PROTO | "application/proto" => Some(Self::Proto),
            _ => None,
        }
    }

    /// Content type of responses in this encoding.
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Json => CONTENT_TYPE_JSON,
            Self::Proto => CONTENT_TYPE_PROTO,
        }
    }

    pub fn is_proto(&self) -> bool {
        matches!(self, Self::Proto)
    }

    /// Decode one message payload.
    pub fn decode<T>(&self, payload: &[u8]) -> Result<T, RpcError>
    where
        T: Message + DeserializeOwned + Default,
    {
        match self {
            Self::Proto => T::decode(payload)
                .map_err(|e| RpcError::Decode(format!("invalid protobuf message: {e}"))),
            Self::Json => serde_json::from_slice(payload)
                .map_err(|e| RpcError::Decode(format!("invalid JSON message: {e}"))),
        }
    }

    /// Encode one message payload.
    pub fn encode<T>(&self, message: &T) -> Result<Bytes, RpcError>
    where
        T: Message + Serialize,
    {
        match self {
            Self::Proto => Ok(Bytes::from(message.encode_to_vec())),
            Self::Json => serde_json::to_vec(message)
                .map(Bytes::from)
                .map_err(|e| RpcError::Encode(e.to_string())),
        }
    }
}
