//! Per-call scratchpad.
//!
//! A handler (or a stub decoding a variable response) opens one scratchpad
//! with exactly the size announced by the message header. Variable-length
//! fields are copied into it in decode order and referenced afterwards
//! through [`Region`] handles. The scratchpad never grows: a reservation
//! that does not fit fails the decode as malformed.
//!
//! Regions are offsets into a single buffer, so the whole scratchpad is
//! released at once by [`Scratchpad::close`] or by dropping it.

use stubwire_proto::{DecodeCtx, DecodeFault};
use thiserror::Error;

use crate::size::align_up;

/// Errors raised by scratchpad reservations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ScratchpadError {
    /// The reservation does not fit in what is left.
    #[error("scratchpad overrun: {requested} bytes requested, {remaining} remaining")]
    Overrun {
        /// Aligned size of the reservation
        requested: usize,
        /// Bytes still free
        remaining: usize,
    },

    /// The announced size exceeds the configured limit.
    #[error("scratchpad of {announced} bytes exceeds limit {limit}")]
    TooLarge {
        /// Size from the message header
        announced: usize,
        /// Configured maximum
        limit: usize,
    },

    /// The scratchpad was already released.
    #[error("scratchpad is closed")]
    Closed,

    /// Aligning the requested length overflowed.
    #[error("scratchpad size overflow")]
    Overflow,
}

impl From<ScratchpadError> for DecodeFault {
    fn from(err: ScratchpadError) -> Self {
        match err {
            ScratchpadError::Overrun { requested, remaining } => {
                Self::ScratchpadOverrun { requested, remaining }
            },
            ScratchpadError::TooLarge { announced, limit } => Self::LimitExceeded {
                field: "scratchpad",
                value: announced as u64,
                limit: limit as u64,
            },
            ScratchpadError::Closed => Self::ScratchpadOverrun { requested: 0, remaining: 0 },
            ScratchpadError::Overflow => Self::SizeOverflow,
        }
    }
}

/// Handle to bytes reserved in a [`Scratchpad`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Region {
    offset: usize,
    len: usize,
}

impl Region {
    /// Length of the data in bytes (without alignment padding).
    pub fn len(&self) -> usize {
        self.len
    }

    /// True for zero-length data.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Handle to a UTF-8 string stored in a [`Scratchpad`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StrRegion(Region);

impl StrRegion {
    /// Length of the string in bytes.
    pub fn len(&self) -> usize {
        self.0.len
    }

    /// True for the empty string.
    pub fn is_empty(&self) -> bool {
        self.0.len == 0
    }

    /// The underlying byte region.
    pub fn region(&self) -> Region {
        self.0
    }
}

/// Bump arena sized once from a message header.
#[derive(Debug)]
pub struct Scratchpad {
    buf: Vec<u8>,
    capacity: usize,
    regions: usize,
    closed: bool,
}

impl Scratchpad {
    /// Open a scratchpad of exactly `capacity` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ScratchpadError::TooLarge`] if `capacity` exceeds `limit`;
    /// nothing is allocated in that case.
    pub fn open(capacity: usize, limit: usize) -> Result<Self, ScratchpadError> {
        if capacity > limit {
            return Err(ScratchpadError::TooLarge { announced: capacity, limit });
        }
        Ok(Self { buf: Vec::with_capacity(capacity), capacity, regions: 0, closed: false })
    }

    /// A zero-capacity scratchpad for operations without variable data.
    pub fn empty() -> Self {
        Self { buf: Vec::new(), capacity: 0, regions: 0, closed: false }
    }

    /// Decode the scratchpad header and open a scratchpad of that size.
    ///
    /// On a malformed or oversized header the fault is recorded in `ctx` and
    /// an empty scratchpad is returned, so decoding can run to `finish`.
    pub fn from_header(ctx: &mut DecodeCtx<'_>, limit: usize) -> Self {
        let announced = ctx.decode_scratchpad_header();
        if !ctx.is_ok() {
            return Self::empty();
        }
        match Self::open(announced, limit) {
            Ok(pad) => pad,
            Err(err) => {
                ctx.fail(err.into());
                Self::empty()
            },
        }
    }

    /// Reserve `len` bytes, rounded up to the scratchpad alignment.
    ///
    /// The returned region reads as zeroes until written.
    ///
    /// # Errors
    ///
    /// - [`ScratchpadError::Overrun`] if the aligned length does not fit
    /// - [`ScratchpadError::Closed`] after [`Scratchpad::close`]
    pub fn reserve(&mut self, len: usize) -> Result<Region, ScratchpadError> {
        if self.closed {
            return Err(ScratchpadError::Closed);
        }
        let aligned = align_up(len).ok_or(ScratchpadError::Overflow)?;
        let remaining = self.remaining();
        if aligned > remaining {
            return Err(ScratchpadError::Overrun { requested: aligned, remaining });
        }
        let offset = self.buf.len();
        // within the capacity reserved at open, so this never reallocates
        self.buf.resize(offset + aligned, 0);
        self.regions += 1;
        Ok(Region { offset, len })
    }

    /// Reserve a region and copy `data` into it.
    ///
    /// # Errors
    ///
    /// Same as [`Scratchpad::reserve`].
    pub fn alloc_bytes(&mut self, data: &[u8]) -> Result<Region, ScratchpadError> {
        let region = self.reserve(data.len())?;
        if let Some(dst) = self.buf.get_mut(region.offset..region.offset + region.len) {
            dst.copy_from_slice(data);
        }
        Ok(region)
    }

    /// Reserve a region and copy `data` into it as a string.
    ///
    /// # Errors
    ///
    /// Same as [`Scratchpad::reserve`].
    pub fn alloc_str(&mut self, data: &str) -> Result<StrRegion, ScratchpadError> {
        self.alloc_bytes(data.as_bytes()).map(StrRegion)
    }

    /// Bytes stored in `region`.
    ///
    /// Empty if the region does not belong to this scratchpad or the
    /// scratchpad is closed.
    pub fn bytes(&self, region: Region) -> &[u8] {
        self.buf.get(region.offset..region.offset + region.len).unwrap_or_default()
    }

    /// String stored in `region`.
    pub fn str(&self, region: StrRegion) -> &str {
        std::str::from_utf8(self.bytes(region.0)).unwrap_or_default()
    }

    /// Decode a string field into the scratchpad.
    ///
    /// Failures are recorded in `ctx`; the returned handle is then empty.
    pub fn decode_str(&mut self, ctx: &mut DecodeCtx<'_>) -> StrRegion {
        let raw = ctx.decode_str();
        if !ctx.is_ok() {
            return StrRegion::default();
        }
        self.alloc_str(raw).unwrap_or_else(|err| {
            ctx.fail(err.into());
            StrRegion::default()
        })
    }

    /// Decode a byte buffer field into the scratchpad.
    ///
    /// Failures are recorded in `ctx`; the returned handle is then empty.
    pub fn decode_buffer(&mut self, ctx: &mut DecodeCtx<'_>) -> Region {
        let raw = ctx.decode_buffer();
        if !ctx.is_ok() {
            return Region::default();
        }
        self.alloc_bytes(raw).unwrap_or_else(|err| {
            ctx.fail(err.into());
            Region::default()
        })
    }

    /// Total size announced at open.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes reserved so far, including alignment padding.
    pub fn used(&self) -> usize {
        self.buf.len()
    }

    /// Bytes still free.
    pub fn remaining(&self) -> usize {
        self.capacity.saturating_sub(self.buf.len())
    }

    /// Number of live regions.
    pub fn region_count(&self) -> usize {
        self.regions
    }

    /// True once released.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Release every region at once.
    ///
    /// Returns `true` on the first call. Later calls are no-ops that return
    /// `false`.
    pub fn close(&mut self) -> bool {
        if self.closed {
            tracing::debug!("scratchpad closed twice");
            return false;
        }
        tracing::trace!(regions = self.regions, used = self.buf.len(), "scratchpad released");
        self.closed = true;
        self.regions = 0;
        self.buf = Vec::new();
        true
    }
}

impl Drop for Scratchpad {
    fn drop(&mut self) {
        if !self.closed {
            self.close();
        }
    }
}
