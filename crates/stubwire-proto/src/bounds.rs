//! Worst-case encoded sizes of CBOR primitives.
//!
//! Size calculators add these constants up before a message context is
//! allocated. Every value here is an upper bound on what [`crate::EncodeCtx`]
//! writes for the corresponding call, never an estimate.

/// Encoded size of a CBOR null.
pub const NULL: usize = 1;

/// Encoded size of a CBOR boolean.
pub const BOOL: usize = 1;

/// Encoded size of a callback reference (`u32` handle or null).
pub const CALLBACK: usize = head_len(u32::MAX as u64);

/// Largest scratchpad header a message can carry.
///
/// Scratchpad sizes travel as `u32`.
pub const SCRATCHPAD_HEADER_MAX: usize = head_len(u32::MAX as u64);

/// Number of bytes a CBOR head takes for the given argument.
///
/// The head carries the major type plus the integer value, string length or
/// array count.
pub const fn head_len(value: u64) -> usize {
    if value < 24 {
        1
    } else if value <= 0xff {
        2
    } else if value <= 0xffff {
        3
    } else if value <= 0xffff_ffff {
        5
    } else {
        9
    }
}

/// Encoded size of a text or byte string of `len` bytes.
///
/// Returns `None` if the sum overflows `usize`.
pub fn string(len: usize) -> Option<usize> {
    head_len(len as u64).checked_add(len)
}

/// Encoded size of a definite array head with `count` elements.
pub const fn array_head(count: usize) -> usize {
    head_len(count as u64)
}

/// Encoded size of an unsigned integer with the given value.
pub const fn uint(value: u64) -> usize {
    head_len(value)
}

/// Types whose encoded size is known statically.
pub trait FixedBound {
    /// Largest number of bytes a value of this type encodes to.
    const MAX_ENCODED: usize;
}

macro_rules! fixed_bound {
    ($($ty:ty => $max:expr),* $(,)?) => {
        $(impl FixedBound for $ty {
            const MAX_ENCODED: usize = $max;
        })*
    };
}

// Negative values encode `-1 - n`, so the magnitude of MIN fits in the same
// head width as MAX.
fixed_bound! {
    u8 => head_len(u8::MAX as u64),
    u16 => head_len(u16::MAX as u64),
    u32 => head_len(u32::MAX as u64),
    u64 => head_len(u64::MAX),
    i8 => head_len(i8::MAX as u64),
    i16 => head_len(i16::MAX as u64),
    i32 => head_len(i32::MAX as u64),
    i64 => head_len(i64::MAX as u64),
    bool => BOOL,
}
