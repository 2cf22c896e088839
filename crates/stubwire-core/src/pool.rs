//! Message context leasing.
//!
//! Every outbound message (request, response or event) is encoded into a
//! context leased from a [`MessagePool`]. The pool bounds how many messages
//! may be in flight; running out is a resource error for the caller, never
//! a decode error.

use std::{
    ops::{Deref, DerefMut},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use bytes::Bytes;
use stubwire_proto::{EncodeCtx, OperationId, ProtocolError};
use thiserror::Error;

use crate::{config::RpcConfig, error::RpcError, size::SizeEstimate};

/// Leasing failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PoolError {
    /// All slots are leased.
    #[error("all {slots} message slots in use")]
    Exhausted {
        /// Pool size
        slots: usize,
    },

    /// The requested context is larger than any message may be.
    #[error("message of {requested} bytes exceeds limit {limit}")]
    MessageTooLarge {
        /// Capacity from the size calculator
        requested: usize,
        /// Configured maximum
        limit: usize,
    },
}

#[derive(Debug)]
struct PoolInner {
    slots: usize,
    max_message_size: usize,
    in_use: AtomicUsize,
}

/// Counted pool of message slots.
///
/// Cloning shares the same counter.
#[derive(Debug, Clone)]
pub struct MessagePool {
    inner: Arc<PoolInner>,
}

impl MessagePool {
    /// A pool with `slots` concurrent leases of at most `max_message_size`
    /// bytes each.
    pub fn new(slots: usize, max_message_size: usize) -> Self {
        Self { inner: Arc::new(PoolInner { slots, max_message_size, in_use: AtomicUsize::new(0) }) }
    }

    /// A pool sized from the runtime limits.
    pub fn from_config(config: &RpcConfig) -> Self {
        Self::new(config.message_slots, config.max_message_size)
    }

    /// Lease a context able to hold exactly `capacity` bytes.
    ///
    /// # Errors
    ///
    /// - [`PoolError::MessageTooLarge`] if `capacity` exceeds the message limit
    /// - [`PoolError::Exhausted`] if every slot is leased
    pub fn acquire(&self, capacity: usize) -> Result<MessageContext, PoolError> {
        let limit = self.inner.max_message_size;
        if capacity > limit {
            return Err(PoolError::MessageTooLarge { requested: capacity, limit });
        }

        let slots = self.inner.slots;
        let leased = self
            .inner
            .in_use
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < slots).then_some(n + 1));
        if leased.is_err() {
            tracing::debug!(slots, "message pool exhausted");
            return Err(PoolError::Exhausted { slots });
        }

        Ok(MessageContext {
            ctx: EncodeCtx::with_capacity(capacity),
            slot: Slot { pool: Arc::clone(&self.inner) },
        })
    }

    /// Slots currently leased.
    pub fn in_use(&self) -> usize {
        self.inner.in_use.load(Ordering::Acquire)
    }

    /// Slots free to lease.
    pub fn available(&self) -> usize {
        self.inner.slots.saturating_sub(self.in_use())
    }
}

/// One leased slot; released on drop.
#[derive(Debug)]
pub struct Slot {
    pool: Arc<PoolInner>,
}

impl Drop for Slot {
    fn drop(&mut self) {
        self.pool.in_use.fetch_sub(1, Ordering::AcqRel);
    }
}

/// An encode context holding a pool slot.
#[derive(Debug)]
pub struct MessageContext {
    ctx: EncodeCtx,
    slot: Slot,
}

impl MessageContext {
    /// Finish encoding.
    ///
    /// The slot is handed back alongside the bytes so the caller decides how
    /// long the message stays counted (a command keeps it until its response
    /// arrives).
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::SizingDefect`] if the context overflowed; the
    /// slot is released.
    pub fn finish(self) -> Result<(Bytes, Slot), ProtocolError> {
        let bytes = self.ctx.finish()?;
        Ok((bytes, self.slot))
    }
}

impl Deref for MessageContext {
    type Target = EncodeCtx;

    fn deref(&self) -> &EncodeCtx {
        &self.ctx
    }
}

impl DerefMut for MessageContext {
    fn deref_mut(&mut self) -> &mut EncodeCtx {
        &mut self.ctx
    }
}

/// Encode one message for `op` from a precomputed estimate.
///
/// Variable messages are prefixed with their scratchpad header. A sizing
/// defect is logged at `error` and nothing is returned for sending.
pub(crate) fn encode_message(
    op: OperationId,
    pool: &MessagePool,
    estimate: SizeEstimate,
    variable: bool,
    encode: impl FnOnce(&mut EncodeCtx),
) -> Result<(Bytes, Slot), RpcError> {
    let estimate = if variable { estimate.with_scratchpad_header()? } else { estimate };

    let mut msg = pool.acquire(estimate.max_encoded)?;
    if variable {
        msg.encode_scratchpad_header(estimate.scratchpad);
    }
    encode(&mut *msg);

    msg.finish().map_err(|err| match err {
        ProtocolError::SizingDefect { capacity, attempted } => {
            tracing::error!(%op, capacity, attempted, "sizing defect, message dropped");
            RpcError::SizingDefect { op, capacity, attempted }
        },
        ProtocolError::Malformed(fault) => RpcError::Decode { op, fault },
    })
}
