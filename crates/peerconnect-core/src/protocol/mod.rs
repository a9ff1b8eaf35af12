//! Chat message model and its wire codec

pub mod message;
pub mod wire;

pub use message::ChatMessage;
pub use wire::{
    decode, encode, MessageCodec, DEFAULT_MAX_BODY_LEN, DEFAULT_MAX_NAME_LEN, MAX_NAME_LEN,
    WIRE_VERSION,
};
