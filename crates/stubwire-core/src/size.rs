//! Size estimates.
//!
//! Calculators work on shape only: lengths, counts and presence. They never
//! look at content, so both ends of a link derive the same bound from the
//! same shape. All arithmetic is checked; an overflow is a [`SizeError`],
//! never a wrapped value.

use stubwire_proto::{FixedBound, bounds};

use crate::error::SizeError;

/// Alignment of every scratchpad region.
pub const SCRATCHPAD_ALIGN: usize = std::mem::align_of::<usize>();

/// Round `len` up to the scratchpad alignment.
pub fn align_up(len: usize) -> Option<usize> {
    len.checked_add(SCRATCHPAD_ALIGN - 1).map(|padded| padded & !(SCRATCHPAD_ALIGN - 1))
}

/// Upper bounds for one message, computed before anything is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SizeEstimate {
    /// Largest number of bytes the encoded message can occupy
    pub max_encoded: usize,
    /// Scratchpad bytes the receiver reserves while decoding
    pub scratchpad: usize,
}

impl SizeEstimate {
    /// Nothing to encode.
    pub const ZERO: Self = Self { max_encoded: 0, scratchpad: 0 };

    /// A field with a known encoded size and no scratchpad use.
    pub const fn encoded(max_encoded: usize) -> Self {
        Self { max_encoded, scratchpad: 0 }
    }

    /// A fixed-size scalar.
    pub const fn scalar<T: FixedBound>() -> Self {
        Self::encoded(T::MAX_ENCODED)
    }

    /// A null marker.
    pub const fn null() -> Self {
        Self::encoded(bounds::NULL)
    }

    /// A callback reference.
    pub const fn callback() -> Self {
        Self::encoded(bounds::CALLBACK)
    }

    /// A string decoded into the scratchpad.
    pub fn str(len: usize) -> Result<Self, SizeError> {
        Self::buffer(len)
    }

    /// A byte buffer decoded into the scratchpad.
    pub fn buffer(len: usize) -> Result<Self, SizeError> {
        Ok(Self {
            max_encoded: bounds::string(len).ok_or(SizeError::Overflow)?,
            scratchpad: align_up(len).ok_or(SizeError::Overflow)?,
        })
    }

    /// A fixed-length byte buffer decoded straight into an array.
    pub fn raw(len: usize) -> Result<Self, SizeError> {
        bounds::string(len).map(Self::encoded).ok_or(SizeError::Overflow)
    }

    /// The head of a definite array.
    pub const fn array_head(count: usize) -> Self {
        Self::encoded(bounds::array_head(count))
    }

    /// A nullable field: the value's estimate when present, a null marker
    /// otherwise.
    pub fn nullable(present: Option<Self>) -> Self {
        present.unwrap_or_else(Self::null)
    }

    /// Combine two estimates.
    pub fn plus(self, other: Self) -> Result<Self, SizeError> {
        Ok(Self {
            max_encoded: self
                .max_encoded
                .checked_add(other.max_encoded)
                .ok_or(SizeError::Overflow)?,
            scratchpad: self.scratchpad.checked_add(other.scratchpad).ok_or(SizeError::Overflow)?,
        })
    }

    /// The same estimate repeated `count` times.
    pub fn repeat(self, count: usize) -> Result<Self, SizeError> {
        Ok(Self {
            max_encoded: self.max_encoded.checked_mul(count).ok_or(SizeError::Overflow)?,
            scratchpad: self.scratchpad.checked_mul(count).ok_or(SizeError::Overflow)?,
        })
    }

    /// Sum an iterator of fallible estimates.
    pub fn sum<I>(parts: I) -> Result<Self, SizeError>
    where
        I: IntoIterator<Item = Result<Self, SizeError>>,
    {
        parts.into_iter().try_fold(Self::ZERO, |acc, part| acc.plus(part?))
    }

    /// Account for the scratchpad header that precedes variable-length data.
    ///
    /// The header carries [`SizeEstimate::scratchpad`] as a `u32`.
    pub fn with_scratchpad_header(self) -> Result<Self, SizeError> {
        let announced = u32::try_from(self.scratchpad).map_err(|_| SizeError::Overflow)?;
        let header = bounds::uint(u64::from(announced));
        Ok(Self {
            max_encoded: self.max_encoded.checked_add(header).ok_or(SizeError::Overflow)?,
            scratchpad: self.scratchpad,
        })
    }
}

/// Values that can compute their own size bounds from their shape.
pub trait WireShape {
    /// Bounds for encoding this value and decoding it on the peer.
    fn size_estimate(&self) -> Result<SizeEstimate, SizeError>;
}

/// Arrays of shaped values: the array head plus every element.
impl<T: WireShape> WireShape for [T] {
    fn size_estimate(&self) -> Result<SizeEstimate, SizeError> {
        let elements = SizeEstimate::sum(self.iter().map(T::size_estimate))?;
        SizeEstimate::array_head(self.len()).plus(elements)
    }
}
