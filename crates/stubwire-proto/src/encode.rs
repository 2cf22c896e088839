//! Bounded encoding context.

use bytes::Bytes;
use minicbor::{Encoder, encode::Write};

use crate::{
    errors::{ProtocolError, Result},
    ids::CallbackHandle,
};

/// Returned by [`BoundedWriter`] once the capacity is exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Overflow;

impl std::fmt::Display for Overflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("message capacity exceeded")
    }
}

/// Append-only byte sink that refuses to grow past its capacity.
///
/// Bytes are only accepted while they fit. After the first refusal the
/// writer keeps counting what callers tried to write, so the sizing defect
/// can be reported with the real size.
#[derive(Debug)]
pub struct BoundedWriter {
    buf: Vec<u8>,
    capacity: usize,
    attempted: usize,
}

impl BoundedWriter {
    fn new(capacity: usize) -> Self {
        Self { buf: Vec::with_capacity(capacity), capacity, attempted: 0 }
    }

    fn overflowed(&self) -> bool {
        self.attempted > self.capacity
    }
}

impl Write for BoundedWriter {
    type Error = Overflow;

    fn write_all(&mut self, data: &[u8]) -> std::result::Result<(), Self::Error> {
        self.attempted = self.attempted.saturating_add(data.len());
        if self.overflowed() {
            return Err(Overflow);
        }
        self.buf.extend_from_slice(data);
        Ok(())
    }
}

/// Write-only, append-only context for one outbound message.
///
/// Created with the capacity computed by the size calculator. Writes never
/// reallocate past that capacity; an overflow is remembered and surfaces from
/// [`EncodeCtx::finish`].
pub struct EncodeCtx {
    encoder: Encoder<BoundedWriter>,
}

impl std::fmt::Debug for EncodeCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let writer = self.encoder.writer();
        f.debug_struct("EncodeCtx")
            .field("len", &writer.buf.len())
            .field("capacity", &writer.capacity)
            .field("attempted", &writer.attempted)
            .finish()
    }
}

type Step<'e> =
    std::result::Result<&'e mut Encoder<BoundedWriter>, minicbor::encode::Error<Overflow>>;

impl EncodeCtx {
    /// Create a context able to hold at most `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self { encoder: Encoder::new(BoundedWriter::new(capacity)) }
    }

    /// Capacity the context was created with.
    pub fn capacity(&self) -> usize {
        self.encoder.writer().capacity
    }

    /// Bytes written so far.
    pub fn len(&self) -> usize {
        self.encoder.writer().buf.len()
    }

    /// True if nothing has been written yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True once a write exceeded the capacity.
    pub fn overflowed(&self) -> bool {
        self.encoder.writer().overflowed()
    }

    // Errors are recorded by the writer itself; the encoder result carries
    // nothing extra.
    fn put(&mut self, step: impl FnOnce(&mut Encoder<BoundedWriter>) -> Step<'_>) {
        let _ = step(&mut self.encoder);
    }

    /// Encode an unsigned integer.
    pub fn encode_uint(&mut self, value: u64) {
        self.put(|e| e.u64(value));
    }

    /// Encode a signed integer.
    pub fn encode_int(&mut self, value: i64) {
        self.put(|e| e.i64(value));
    }

    /// Encode a boolean.
    pub fn encode_bool(&mut self, value: bool) {
        self.put(|e| e.bool(value));
    }

    /// Encode a null marker (absent nullable field).
    pub fn encode_null(&mut self) {
        self.put(Encoder::null);
    }

    /// Encode a UTF-8 string.
    pub fn encode_str(&mut self, value: &str) {
        self.put(|e| e.str(value));
    }

    /// Encode a raw byte buffer.
    pub fn encode_buffer(&mut self, value: &[u8]) {
        self.put(|e| e.bytes(value));
    }

    /// Encode a callback reference; `None` becomes null.
    pub fn encode_callback(&mut self, handle: Option<CallbackHandle>) {
        match handle {
            Some(handle) => self.encode_uint(u64::from(handle.get())),
            None => self.encode_null(),
        }
    }

    /// Encode the head of a definite array with `count` elements.
    pub fn encode_array_header(&mut self, count: usize) {
        self.put(|e| e.array(count as u64));
    }

    /// Encode the scratchpad size announced ahead of variable-length data.
    pub fn encode_scratchpad_header(&mut self, size: usize) {
        self.encode_uint(size as u64);
    }

    /// Finish the message.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::SizingDefect`] if any write exceeded the
    /// capacity. The partially written bytes are discarded.
    pub fn finish(self) -> Result<Bytes> {
        let writer = self.encoder.into_writer();
        if writer.overflowed() {
            return Err(ProtocolError::SizingDefect {
                capacity: writer.capacity,
                attempted: writer.attempted,
            });
        }
        Ok(Bytes::from(writer.buf))
    }
}
