//! Binary wire format for chat messages
//!
//! Payloads arrive from an untrusted peer, so the layout is fixed and
//! independent of any host-language object model:
//!
//! ```text
//! +---------+-------------+------------+-------------+------------+-------------+
//! | version | name_len    | name       | body_len    | body       | sent_at     |
//! | u8      | u16 BE      | UTF-8      | u32 BE      | UTF-8      | u64 BE (ms) |
//! +---------+-------------+------------+-------------+------------+-------------+
//! ```
//!
//! Decoding never panics; every malformed input maps to a [`CodecError`].

use crate::errors::CodecError;
use crate::protocol::message::ChatMessage;
use crate::types::Timestamp;

// ----------------------------------------------------------------------------
// Constants
// ----------------------------------------------------------------------------

/// Current wire format version
pub const WIRE_VERSION: u8 = 1;

/// Largest sender name the format can carry
pub const MAX_NAME_LEN: usize = u16::MAX as usize;

/// Largest sender name accepted by default
pub const DEFAULT_MAX_NAME_LEN: usize = 256;

/// Largest body accepted by default (64 KiB)
pub const DEFAULT_MAX_BODY_LEN: usize = 64 * 1024;

const VERSION_SIZE: usize = 1;
const NAME_LEN_SIZE: usize = 2;
const BODY_LEN_SIZE: usize = 4;
const TIMESTAMP_SIZE: usize = 8;

/// Smallest possible frame: empty name and body
pub const MIN_FRAME_LEN: usize = VERSION_SIZE + NAME_LEN_SIZE + BODY_LEN_SIZE + TIMESTAMP_SIZE;

// ----------------------------------------------------------------------------
// Wire Format Codec
// ----------------------------------------------------------------------------

/// Encoder/decoder for [`ChatMessage`] payloads
#[derive(Debug, Clone, Copy)]
pub struct MessageCodec {
    max_name_len: usize,
    max_body_len: usize,
}

impl Default for MessageCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_NAME_LEN, DEFAULT_MAX_BODY_LEN)
    }
}

impl MessageCodec {
    /// Create a codec with per-field byte limits, clamped to what the frame can carry
    pub fn new(max_name_len: usize, max_body_len: usize) -> Self {
        Self {
            max_name_len: max_name_len.min(MAX_NAME_LEN),
            max_body_len: max_body_len.min(u32::MAX as usize),
        }
    }

    pub fn max_name_len(&self) -> usize {
        self.max_name_len
    }

    pub fn max_body_len(&self) -> usize {
        self.max_body_len
    }

    /// Encode a message to its wire representation
    pub fn encode(&self, message: &ChatMessage) -> Result<Vec<u8>, CodecError> {
        let name = message.sender_name().as_bytes();
        let body = message.body().as_bytes();

        if name.len() > self.max_name_len {
            return Err(CodecError::FieldTooLong {
                field: "sender_name",
                len: name.len(),
                max: self.max_name_len,
            });
        }
        if body.len() > self.max_body_len {
            return Err(CodecError::FieldTooLong {
                field: "body",
                len: body.len(),
                max: self.max_body_len,
            });
        }

        let mut bytes = Vec::with_capacity(MIN_FRAME_LEN + name.len() + body.len());
        bytes.push(WIRE_VERSION);
        bytes.extend_from_slice(&(name.len() as u16).to_be_bytes());
        bytes.extend_from_slice(name);
        bytes.extend_from_slice(&(body.len() as u32).to_be_bytes());
        bytes.extend_from_slice(body);
        bytes.extend_from_slice(&message.sent_at().as_millis().to_be_bytes());
        Ok(bytes)
    }

    /// Decode a message, rejecting anything that is not exactly one frame
    pub fn decode(&self, bytes: &[u8]) -> Result<ChatMessage, CodecError> {
        let mut reader = Reader::new(bytes);

        let version = reader.take_array::<VERSION_SIZE>()?[0];
        if version != WIRE_VERSION {
            return Err(CodecError::UnsupportedVersion { version });
        }

        let name_len = u16::from_be_bytes(reader.take_array::<NAME_LEN_SIZE>()?) as usize;
        if name_len > self.max_name_len {
            return Err(CodecError::FieldTooLong {
                field: "sender_name",
                len: name_len,
                max: self.max_name_len,
            });
        }
        let name = reader.take_str(name_len, "sender_name")?;

        let body_len = u32::from_be_bytes(reader.take_array::<BODY_LEN_SIZE>()?) as usize;
        if body_len > self.max_body_len {
            return Err(CodecError::FieldTooLong {
                field: "body",
                len: body_len,
                max: self.max_body_len,
            });
        }
        let body = reader.take_str(body_len, "body")?;

        let sent_at = u64::from_be_bytes(reader.take_array::<TIMESTAMP_SIZE>()?);

        let remaining = reader.remaining();
        if remaining != 0 {
            return Err(CodecError::TrailingBytes { count: remaining });
        }

        Ok(ChatMessage::with_timestamp(
            name,
            body,
            Timestamp::new(sent_at),
        ))
    }
}

/// Encode with the default codec limits
pub fn encode(message: &ChatMessage) -> Result<Vec<u8>, CodecError> {
    MessageCodec::default().encode(message)
}

/// Decode with the default codec limits
pub fn decode(bytes: &[u8]) -> Result<ChatMessage, CodecError> {
    MessageCodec::default().decode(bytes)
}

// ----------------------------------------------------------------------------
// Bounds-checked reader
// ----------------------------------------------------------------------------

struct Reader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.offset
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], CodecError> {
        if self.remaining() < len {
            return Err(CodecError::Truncated {
                offset: self.offset,
                needed: len,
                available: self.remaining(),
            });
        }
        let slice = &self.bytes[self.offset..self.offset + len];
        self.offset += len;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn take_str(&mut self, len: usize, field: &'static str) -> Result<String, CodecError> {
        let raw = self.take(len)?;
        core::str::from_utf8(raw)
            .map(str::to_owned)
            .map_err(|_| CodecError::InvalidUtf8 { field })
    }
}
