//! Error taxonomy.
//!
//! Decode errors on the host never leave the handler; they go to the
//! [`crate::DecodeErrorReporter`]. Everything a stub can hit is an
//! [`RpcError`] returned to its caller.

use stubwire_proto::{DecodeFault, OperationId};
use thiserror::Error;

use crate::{pool::PoolError, transport::TransportError};

/// Result of a stub call.
pub type Result<T> = std::result::Result<T, RpcError>;

/// Size arithmetic failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SizeError {
    /// A sum or product of sizes overflowed.
    #[error("size arithmetic overflow")]
    Overflow,
}

/// Errors returned to the caller of a stub.
#[derive(Debug, Error)]
pub enum RpcError {
    /// No message context could be leased.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(#[from] PoolError),

    /// The transport failed to deliver the call or its response.
    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),

    /// The response did not decode cleanly.
    #[error("malformed response to {op}: {fault}")]
    Decode {
        /// Operation whose response was rejected
        op: OperationId,
        /// What was wrong with it
        fault: DecodeFault,
    },

    /// A size calculator under-estimated; the message was not sent.
    #[error("sizing defect in {op}: wrote {attempted} bytes into {capacity}")]
    SizingDefect {
        /// Operation being encoded
        op: OperationId,
        /// Precomputed bound
        capacity: usize,
        /// Bytes the encoder tried to write
        attempted: usize,
    },

    /// An argument is larger than the operation accepts; nothing was sent.
    #[error("{field} is {len} bytes, limit is {max}")]
    LimitExceeded {
        /// Argument name
        field: &'static str,
        /// Actual length
        len: usize,
        /// Declared maximum
        max: usize,
    },

    /// Size arithmetic on the arguments overflowed.
    #[error("argument size: {0}")]
    Size(#[from] SizeError),

    /// A command was sent as an event or the other way round.
    #[error("{op} used with the wrong call kind")]
    KindMismatch {
        /// Offending operation
        op: OperationId,
    },
}

impl RpcError {
    /// True for errors caused by a bug in size calculation.
    pub fn is_sizing_defect(&self) -> bool {
        matches!(self, Self::SizingDefect { .. })
    }
}

/// Invalid [`crate::RpcConfig`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A limit that must be positive is zero.
    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    /// Scratchpad sizes travel as `u32`.
    #[error("max_scratchpad {0} does not fit in a u32 header")]
    ScratchpadTooLarge(usize),
}

/// Errors building a [`crate::Registry`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// Two handlers claimed the same route.
    #[error("{0} registered twice")]
    Duplicate(OperationId),

    /// No handler serves the route.
    #[error("no handler for group {group} {kind:?} {op:#04x}")]
    UnknownOperation {
        /// Group id
        group: u8,
        /// Command or event
        kind: stubwire_proto::OpKind,
        /// Operation id
        op: u8,
    },
}

/// Errors invoking a local callback trampoline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallbackError {
    /// The handle was never registered, or was already consumed.
    #[error("unknown callback handle {0}")]
    UnknownHandle(stubwire_proto::CallbackHandle),
}
