//! Forward-only decoding context with a single sticky fault.
//!
//! Handlers decode every argument without checking each step; the first
//! failure is recorded and all later `decode_*` calls return placeholder
//! values without touching the input. [`DecodeCtx::finish`] is the one place
//! the outcome is inspected, which is also where unconsumed trailing bytes
//! are detected.

use minicbor::{Decoder, data::Type};
use thiserror::Error;

use crate::ids::CallbackHandle;

/// Why an inbound message was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeFault {
    /// The message ended before the field was complete.
    #[error("message truncated at byte {position}")]
    Truncated {
        /// Read cursor when the input ran out
        position: usize,
    },

    /// A field did not have the expected CBOR shape.
    #[error("invalid field at byte {position}: {reason}")]
    Invalid {
        /// Read cursor at the offending field
        position: usize,
        /// Codec diagnostic
        reason: String,
    },

    /// Indefinite-length items are never produced by stubs.
    #[error("indefinite-length item at byte {position}")]
    IndefiniteLength {
        /// Read cursor at the offending item
        position: usize,
    },

    /// A fixed-size buffer had the wrong length.
    #[error("expected {expected} bytes, got {actual}")]
    LengthMismatch {
        /// Length required by the field
        expected: usize,
        /// Length found on the wire
        actual: usize,
    },

    /// A declared count cannot possibly fit in the remaining input.
    #[error("count {count} exceeds what {remaining} remaining bytes can hold")]
    CountTooLarge {
        /// Declared element count
        count: u64,
        /// Bytes left in the message
        remaining: usize,
    },

    /// A count or size field exceeded an operation limit.
    #[error("{field} is {value}, limit is {limit}")]
    LimitExceeded {
        /// Field name
        field: &'static str,
        /// Decoded value
        value: u64,
        /// Largest accepted value
        limit: u64,
    },

    /// A callback reference used the reserved zero handle.
    #[error("callback handle 0 is reserved")]
    ReservedCallbackHandle,

    /// Variable-length data needed more scratchpad than the header announced.
    #[error("scratchpad overrun: {requested} bytes requested, {remaining} remaining")]
    ScratchpadOverrun {
        /// Aligned size of the failing reservation
        requested: usize,
        /// Bytes still free in the scratchpad
        remaining: usize,
    },

    /// Size arithmetic on decoded shape data overflowed.
    #[error("size arithmetic overflow")]
    SizeOverflow,

    /// All fields decoded but bytes were left over.
    #[error("{remaining} trailing bytes after last field")]
    TrailingData {
        /// Unconsumed bytes
        remaining: usize,
    },
}

/// Result of decoding one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeOutcome {
    /// Every field decoded and the input was consumed exactly.
    Success,
    /// A field failed to decode.
    Malformed(DecodeFault),
    /// Every field decoded but bytes remain.
    TrailingData {
        /// Unconsumed bytes
        remaining: usize,
    },
}

impl DecodeOutcome {
    /// True only for [`DecodeOutcome::Success`].
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Collapse into a result, folding trailing data into a fault.
    pub fn into_result(self) -> Result<(), DecodeFault> {
        match self {
            Self::Success => Ok(()),
            Self::Malformed(fault) => Err(fault),
            Self::TrailingData { remaining } => Err(DecodeFault::TrailingData { remaining }),
        }
    }
}

/// Read-only, forward-only context over one inbound message.
pub struct DecodeCtx<'a> {
    decoder: Decoder<'a>,
    fault: Option<DecodeFault>,
}

impl std::fmt::Debug for DecodeCtx<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodeCtx")
            .field("position", &self.decoder.position())
            .field("len", &self.decoder.input().len())
            .field("fault", &self.fault)
            .finish()
    }
}

impl<'a> DecodeCtx<'a> {
    /// Start decoding `input` from its first byte.
    pub fn new(input: &'a [u8]) -> Self {
        Self { decoder: Decoder::new(input), fault: None }
    }

    /// Current read cursor.
    pub fn position(&self) -> usize {
        self.decoder.position()
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.decoder.input().len().saturating_sub(self.decoder.position())
    }

    /// True while no fault has been recorded.
    pub fn is_ok(&self) -> bool {
        self.fault.is_none()
    }

    /// The recorded fault, if any.
    pub fn fault(&self) -> Option<&DecodeFault> {
        self.fault.as_ref()
    }

    /// Record a fault found outside the codec (limits, scratchpad).
    ///
    /// Only the first fault is kept.
    pub fn fail(&mut self, fault: DecodeFault) {
        if self.fault.is_none() {
            self.fault = Some(fault);
        }
    }

    fn guard<T: Default>(
        &mut self,
        step: impl FnOnce(&mut Decoder<'a>) -> Result<T, minicbor::decode::Error>,
    ) -> T {
        if self.fault.is_some() {
            return T::default();
        }
        let position = self.decoder.position();
        match step(&mut self.decoder) {
            Ok(value) => value,
            Err(err) => {
                let fault = if err.is_end_of_input() {
                    DecodeFault::Truncated { position }
                } else {
                    DecodeFault::Invalid { position, reason: err.to_string() }
                };
                self.fault = Some(fault);
                T::default()
            },
        }
    }

    /// Decode an unsigned integer.
    pub fn decode_uint(&mut self) -> u64 {
        self.guard(Decoder::u64)
    }

    /// Decode an unsigned integer that must fit in `u8`.
    pub fn decode_u8(&mut self) -> u8 {
        self.guard(Decoder::u8)
    }

    /// Decode an unsigned integer that must fit in `u16`.
    pub fn decode_u16(&mut self) -> u16 {
        self.guard(Decoder::u16)
    }

    /// Decode an unsigned integer that must fit in `u32`.
    pub fn decode_u32(&mut self) -> u32 {
        self.guard(Decoder::u32)
    }

    /// Decode a signed integer.
    pub fn decode_int(&mut self) -> i64 {
        self.guard(Decoder::i64)
    }

    /// Decode a signed integer that must fit in `i32`.
    pub fn decode_i32(&mut self) -> i32 {
        self.guard(Decoder::i32)
    }

    /// Decode a boolean.
    pub fn decode_bool(&mut self) -> bool {
        self.guard(Decoder::bool)
    }

    /// Decode a definite-length UTF-8 string, borrowed from the input.
    pub fn decode_str(&mut self) -> &'a str {
        self.guard(Decoder::str)
    }

    /// Decode a definite-length byte buffer, borrowed from the input.
    pub fn decode_buffer(&mut self) -> &'a [u8] {
        self.guard(Decoder::bytes)
    }

    /// Decode a byte buffer that must be exactly `N` bytes long.
    pub fn decode_fixed<const N: usize>(&mut self) -> [u8; N] {
        let raw = self.decode_buffer();
        if !self.is_ok() {
            return [0; N];
        }
        match <[u8; N]>::try_from(raw) {
            Ok(fixed) => fixed,
            Err(_) => {
                self.fail(DecodeFault::LengthMismatch { expected: N, actual: raw.len() });
                [0; N]
            },
        }
    }

    /// Decode the head of a definite array.
    ///
    /// `min_element_len` is the smallest encoded size of one element; a count
    /// that could not fit in the remaining input is rejected before the
    /// caller sizes anything from it.
    pub fn decode_array_header(&mut self, min_element_len: usize) -> usize {
        let position = self.decoder.position();
        let Some(declared) = self.guard(Decoder::array) else {
            if self.is_ok() {
                self.fail(DecodeFault::IndefiniteLength { position });
            }
            return 0;
        };
        let remaining = self.remaining();
        let needed = usize::try_from(declared)
            .ok()
            .and_then(|count| count.checked_mul(min_element_len));
        match needed {
            Some(needed) if needed <= remaining => usize::try_from(declared).unwrap_or(0),
            _ => {
                self.fail(DecodeFault::CountTooLarge { count: declared, remaining });
                0
            },
        }
    }

    /// Peek at a nullable field.
    ///
    /// Consumes and returns `false` for null; returns `true` without
    /// consuming anything when a value follows.
    pub fn decode_present(&mut self) -> bool {
        let ty = self.guard(|d| d.datatype().map(Some));
        match ty {
            Some(Type::Null) => {
                self.guard(Decoder::null);
                false
            },
            Some(_) => true,
            None => false,
        }
    }

    /// Decode a callback reference; null becomes `None`.
    pub fn decode_callback(&mut self) -> Option<CallbackHandle> {
        if !self.decode_present() {
            return None;
        }
        let raw = self.decode_u32();
        if !self.is_ok() {
            return None;
        }
        let handle = CallbackHandle::new(raw);
        if handle.is_none() {
            self.fail(DecodeFault::ReservedCallbackHandle);
        }
        handle
    }

    /// Decode the scratchpad size announced ahead of variable-length data.
    pub fn decode_scratchpad_header(&mut self) -> usize {
        self.decode_u32() as usize
    }

    /// Finish decoding and classify the outcome.
    pub fn finish(self) -> DecodeOutcome {
        if let Some(fault) = self.fault {
            return DecodeOutcome::Malformed(fault);
        }
        let remaining = self.remaining();
        if remaining > 0 {
            return DecodeOutcome::TrailingData { remaining };
        }
        DecodeOutcome::Success
    }
}
