//! Transport abstraction.
//!
//! The protocol core never touches sockets or channels. A transport takes a
//! fully encoded message and delivers it to the peer's registry. Commands
//! block until the peer's response bytes come back; events return as soon as
//! the message is handed off.

use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use stubwire_proto::OperationId;
use thiserror::Error;

/// Delivery failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The peer is gone or was never attached.
    #[error("transport disconnected")]
    Disconnected,

    /// No response arrived in time.
    #[error("{op} timed out after {after:?}")]
    Timeout {
        /// Command that timed out
        op: OperationId,
        /// Configured wait
        after: Duration,
    },

    /// The peer handled the command but produced no response (its handler
    /// rejected the request).
    #[error("no response to {op}")]
    NoResponse {
        /// Command without a response
        op: OperationId,
    },

    /// The peer has no handler for the operation.
    #[error("peer does not serve {op}")]
    UnknownOperation {
        /// Unrouted operation
        op: OperationId,
    },
}

/// Moves encoded messages to the peer.
pub trait Transport: Send + Sync {
    /// Deliver a command and wait for its response bytes.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when delivery or the response fails.
    fn dispatch_command(&self, op: OperationId, message: Bytes) -> Result<Bytes, TransportError>;

    /// Deliver an event without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when the message cannot be handed off.
    fn dispatch_event(&self, op: OperationId, message: Bytes) -> Result<(), TransportError>;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn dispatch_command(&self, op: OperationId, message: Bytes) -> Result<Bytes, TransportError> {
        (**self).dispatch_command(op, message)
    }

    fn dispatch_event(&self, op: OperationId, message: Bytes) -> Result<(), TransportError> {
        (**self).dispatch_event(op, message)
    }
}
