//! Property tests for the message contexts.
//!
//! Every value written with a capacity taken from `bounds` must fit, decode
//! back to itself, and be a well-formed CBOR sequence according to an
//! independent parser.

use proptest::prelude::*;
use stubwire_proto::{DecodeCtx, DecodeOutcome, EncodeCtx, FixedBound, bounds};

/// Parse `bytes` as a CBOR sequence with ciborium and return the item count.
fn cbor_items(bytes: &[u8]) -> usize {
    let mut reader = bytes;
    let mut items = 0;
    while !reader.is_empty() {
        let _: ciborium::Value = ciborium::de::from_reader(&mut reader).unwrap();
        items += 1;
    }
    items
}

proptest! {
    #[test]
    fn scalars_round_trip(
        a in any::<u32>(),
        b in any::<i64>(),
        c in any::<bool>(),
        d in any::<u8>(),
    ) {
        let capacity = u32::MAX_ENCODED + i64::MAX_ENCODED + bool::MAX_ENCODED + u8::MAX_ENCODED;
        let mut enc = EncodeCtx::with_capacity(capacity);
        enc.encode_uint(u64::from(a));
        enc.encode_int(b);
        enc.encode_bool(c);
        enc.encode_uint(u64::from(d));
        let bytes = enc.finish().unwrap();
        prop_assert!(bytes.len() <= capacity);
        prop_assert_eq!(cbor_items(&bytes), 4);

        let mut dec = DecodeCtx::new(&bytes);
        prop_assert_eq!(dec.decode_u32(), a);
        prop_assert_eq!(dec.decode_int(), b);
        prop_assert_eq!(dec.decode_bool(), c);
        prop_assert_eq!(dec.decode_u8(), d);
        prop_assert_eq!(dec.finish(), DecodeOutcome::Success);
    }

    #[test]
    fn string_bound_covers_written_bytes(text in ".{0,300}") {
        let bound = bounds::string(text.len()).unwrap();
        let mut enc = EncodeCtx::with_capacity(bound);
        enc.encode_str(&text);
        let bytes = enc.finish().unwrap();
        prop_assert!(bytes.len() <= bound);

        let mut dec = DecodeCtx::new(&bytes);
        prop_assert_eq!(dec.decode_str(), text.as_str());
        prop_assert!(dec.finish().is_success());
    }

    #[test]
    fn buffer_bound_covers_written_bytes(
        data in proptest::collection::vec(any::<u8>(), 0..70_000),
    ) {
        let bound = bounds::string(data.len()).unwrap();
        let mut enc = EncodeCtx::with_capacity(bound);
        enc.encode_buffer(&data);
        let bytes = enc.finish().unwrap();
        prop_assert_eq!(bytes.len(), bound);
    }

    #[test]
    fn every_strict_prefix_is_malformed(
        value in any::<u64>(),
        text in "[a-z]{0,40}",
        flag in any::<bool>(),
    ) {
        let capacity = u64::MAX_ENCODED + bounds::string(text.len()).unwrap() + bounds::BOOL;
        let mut enc = EncodeCtx::with_capacity(capacity);
        enc.encode_uint(value);
        enc.encode_str(&text);
        enc.encode_bool(flag);
        let bytes = enc.finish().unwrap();

        for cut in 0..bytes.len() {
            let mut dec = DecodeCtx::new(&bytes[..cut]);
            let _ = dec.decode_uint();
            let _ = dec.decode_str();
            let _ = dec.decode_bool();
            let outcome = dec.finish();
            prop_assert!(matches!(outcome, DecodeOutcome::Malformed(_)), "prefix {} decoded", cut);
        }
    }

    #[test]
    fn trailing_bytes_never_succeed(
        value in any::<u16>(),
        extra in proptest::collection::vec(any::<u8>(), 1..8),
    ) {
        let mut enc = EncodeCtx::with_capacity(u16::MAX_ENCODED);
        enc.encode_uint(u64::from(value));
        let mut bytes = enc.finish().unwrap().to_vec();
        bytes.extend_from_slice(&extra);

        let mut dec = DecodeCtx::new(&bytes);
        prop_assert_eq!(dec.decode_u16(), value);
        prop_assert_eq!(dec.finish(), DecodeOutcome::TrailingData { remaining: extra.len() });
    }
}
