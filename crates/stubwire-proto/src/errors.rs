//! Protocol error types.

use thiserror::Error;

use crate::decode::DecodeFault;

/// Convenience alias for results produced by this crate.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors raised while producing or consuming a message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// The encoder was asked to write more bytes than the precomputed bound.
    ///
    /// This is a bug in a size calculator, never a runtime condition.
    #[error("sizing defect: {attempted} bytes written into a {capacity} byte message")]
    SizingDefect {
        /// Capacity the message context was created with
        capacity: usize,
        /// Total bytes the encoder tried to write
        attempted: usize,
    },

    /// The inbound message did not decode cleanly.
    #[error("malformed message: {0}")]
    Malformed(#[from] DecodeFault),
}
