//! Streaming envelope framing.
//!
//! Every message that crosses the transport boundary is wrapped in an
//! envelope:
//!
//! ```text
//! [flags:1][length:4][payload:length]
//! ```
//!
//! A stream of envelopes ends with one END_STREAM frame whose JSON payload
//! carries the terminal [`Status`]: `{}` for success, or
//! `{"error": {"code": "...", "message": "..."}}` otherwise.

use bytes::{Buf, Bytes, BytesMut};
use serde::Deserialize;

use crate::error::{EnvelopeError, Status};

/// Envelope flags.
pub mod envelope_flags {
    /// Regular message.
    pub const MESSAGE: u8 = 0x00;
    /// End of stream.
    pub const END_STREAM: u8 = 0x02;
}

/// Envelope header size (flags + length).
pub const ENVELOPE_HEADER_SIZE: usize = 5;

/// A decoded envelope.
#[derive(Clone, Debug, PartialEq)]
pub enum Frame {
    /// A serialized message.
    Message(Bytes),
    /// The terminal frame with the call's status.
    EndStream(Status),
}

/// Wrap payload in a message envelope.
pub fn wrap_envelope(payload: &[u8]) -> Vec<u8> {
    frame_with_flags(envelope_flags::MESSAGE, payload)
}

/// Build the END_STREAM envelope for a terminal status.
pub fn end_stream_envelope(status: &Status) -> Vec<u8> {
    let body = if status.is_ok() {
        serde_json::json!({})
    } else {
        serde_json::json!({ "error": status })
    };
    frame_with_flags(envelope_flags::END_STREAM, body.to_string().as_bytes())
}

fn frame_with_flags(flags: u8, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(ENVELOPE_HEADER_SIZE + payload.len());
    frame.push(flags);
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(payload);
    frame
}

/// Parse envelope header from bytes.
///
/// Returns `(flags, length)` if successful.
pub fn parse_envelope_header(data: &[u8]) -> Result<(u8, u32), EnvelopeError> {
    if data.len() < ENVELOPE_HEADER_SIZE {
        return Err(EnvelopeError::IncompleteHeader {
            expected: ENVELOPE_HEADER_SIZE,
            actual: data.len(),
        });
    }

    let flags = data[0];
    let length = u32::from_be_bytes([data[1], data[2], data[3], data[4]]);

    Ok((flags, length))
}

#[derive(Deserialize)]
struct EndStreamBody {
    #[serde(default)]
    error: Option<Status>,
}

/// Parse the JSON payload of an END_STREAM frame into a status.
pub fn parse_end_stream(payload: &[u8]) -> Result<Status, EnvelopeError> {
    let body: EndStreamBody = serde_json::from_slice(payload)
        .map_err(|e| EnvelopeError::MalformedEndStream(e.to_string()))?;
    Ok(body.error.unwrap_or_else(Status::ok))
}

/// Incremental decoder turning arbitrary byte chunks into [`Frame`]s.
///
/// Chunks are appended with [`extend`](Self::extend); complete frames are
/// taken out with [`decode`](Self::decode). A frame is only returned once all
/// of its payload has arrived.
#[derive(Debug, Default)]
pub struct EnvelopeDecoder {
    buf: BytesMut,
    max_message_size: Option<usize>,
}

impl EnvelopeDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject envelopes whose payload is larger than `max` bytes.
    pub fn max_message_size(mut self, max: Option<usize>) -> Self {
        self.max_message_size = max;
        self
    }

    /// Append a chunk of body bytes.
    pub fn extend(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Take the next complete frame, if one is buffered.
    pub fn decode(&mut self) -> Result<Option<Frame>, EnvelopeError> {
        if self.buf.len() < ENVELOPE_HEADER_SIZE {
            return Ok(None);
        }

        let (flags, length) = parse_envelope_header(&self.buf)?;
        if flags != envelope_flags::MESSAGE && flags != envelope_flags::END_STREAM {
            return Err(EnvelopeError::InvalidFlags(flags));
        }

        let length = length as usize;
        if let Some(limit) = self.max_message_size
            && length > limit
        {
            return Err(EnvelopeError::MessageTooLarge {
                size: length,
                limit,
            });
        }

        if self.buf.len() < ENVELOPE_HEADER_SIZE + length {
            return Ok(None);
        }

        self.buf.advance(ENVELOPE_HEADER_SIZE);
        let payload = self.buf.split_to(length).freeze();

        if flags == envelope_flags::END_STREAM {
            return parse_end_stream(&payload).map(|status| Some(Frame::EndStream(status)));
        }
        Ok(Some(Frame::Message(payload)))
    }

    /// Check that the input ended on a frame boundary.
    pub fn finish(&self) -> Result<(), EnvelopeError> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let (_, length) = parse_envelope_header(&self.buf)?;
        Err(EnvelopeError::Truncated {
            expected: length as usize,
            actual: self.buf.len() - ENVELOPE_HEADER_SIZE,
        })
    }
}
