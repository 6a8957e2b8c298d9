//! Serialization for the Pulse wire protocol.
//!
//! Events travel as postcard-encoded WebSocket binary frames. Frame
//! boundaries are preserved by the transport, so no length-prefix framing
//! is needed; decode failures surface as a typed [`CodecError`] at the
//! boundary instead of propagating malformed payloads into handlers.

use crate::event::{ClientEvent, ServerEvent};

/// Error type for codec encode/decode operations.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Serialization failed.
    #[error("encode error: {0}")]
    Encode(String),
    /// The frame does not decode as a known protocol event.
    #[error("malformed frame: {0}")]
    Malformed(String),
}

/// Encodes a [`ClientEvent`] into a binary frame.
///
/// # Errors
///
/// Returns [`CodecError::Encode`] if the event cannot be serialized.
pub fn encode_client(event: &ClientEvent) -> Result<Vec<u8>, CodecError> {
    postcard::to_allocvec(event).map_err(|e| CodecError::Encode(e.to_string()))
}

/// Decodes a [`ClientEvent`] from a binary frame.
///
/// # Errors
///
/// Returns [`CodecError::Malformed`] if the bytes are not a valid event.
pub fn decode_client(bytes: &[u8]) -> Result<ClientEvent, CodecError> {
    postcard::from_bytes(bytes).map_err(|e| CodecError::Malformed(e.to_string()))
}

/// Encodes a [`ServerEvent`] into a binary frame.
///
/// # Errors
///
/// Returns [`CodecError::Encode`] if the event cannot be serialized.
pub fn encode_server(event: &ServerEvent) -> Result<Vec<u8>, CodecError> {
    postcard::to_allocvec(event).map_err(|e| CodecError::Encode(e.to_string()))
}

/// Decodes a [`ServerEvent`] from a binary frame.
///
/// # Errors
///
/// Returns [`CodecError::Malformed`] if the bytes are not a valid event.
pub fn decode_server(bytes: &[u8]) -> Result<ServerEvent, CodecError> {
    postcard::from_bytes(bytes).map_err(|e| CodecError::Malformed(e.to_string()))
}
