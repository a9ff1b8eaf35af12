//! Property-based tests for the chat message codec
//!
//! Payloads come from untrusted peers, so beyond the round-trip law these
//! tests check that arbitrary and mutated input never panics.

use peerconnect_core::{
    protocol::{decode, encode, DEFAULT_MAX_BODY_LEN, DEFAULT_MAX_NAME_LEN},
    ChatMessage, CodecError, MessageCodec, Timestamp,
};
use proptest::prelude::*;

/// Display names within the default name limit, unicode included
fn arb_name() -> impl Strategy<Value = String> {
    prop::string::string_regex(r"\PC{0,40}")
        .unwrap()
        .prop_filter("fits name limit", |s| s.len() <= DEFAULT_MAX_NAME_LEN)
}

/// Message bodies of any unicode text
fn arb_body() -> impl Strategy<Value = String> {
    prop::string::string_regex(r"\PC{0,500}").unwrap()
}

fn arb_message() -> impl Strategy<Value = ChatMessage> {
    (arb_name(), arb_body(), any::<u64>()).prop_map(|(name, body, ts)| {
        ChatMessage::with_timestamp(name, body, Timestamp::new(ts))
    })
}

proptest! {
    /// Property: decode(encode(m)) == m
    #[test]
    fn roundtrip_law(message in arb_message()) {
        let bytes = encode(&message).expect("valid message must encode");
        prop_assert_eq!(decode(&bytes).expect("encoded message must decode"), message);
    }

    /// Property: decoding arbitrary bytes returns, never panics
    #[test]
    fn arbitrary_bytes_never_panic(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
        let _ = decode(&bytes);
    }

    /// Property: any strict prefix of a valid frame is reported as truncated
    #[test]
    fn strict_prefix_is_truncated(message in arb_message(), cut in any::<prop::sample::Index>()) {
        let bytes = encode(&message).unwrap();
        let len = cut.index(bytes.len());
        let is_truncated = matches!(decode(&bytes[..len]), Err(CodecError::Truncated { .. }));
        prop_assert!(is_truncated);
    }

    /// Property: flipping a byte either still decodes or yields a codec error
    #[test]
    fn single_byte_corruption_is_contained(
        message in arb_message(),
        at in any::<prop::sample::Index>(),
        mask in 1u8..=255,
    ) {
        let mut bytes = encode(&message).unwrap();
        let i = at.index(bytes.len());
        bytes[i] ^= mask;
        let codec = MessageCodec::new(DEFAULT_MAX_NAME_LEN, DEFAULT_MAX_BODY_LEN);
        let _ = codec.decode(&bytes);
    }
}
