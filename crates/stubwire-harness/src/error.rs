//! Harness errors.

use thiserror::Error;

/// Misuse of the harness itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HarnessError {
    /// The transport already has a peer.
    #[error("transport is already bound to a peer")]
    AlreadyBound,

    /// The worker thread could not be started.
    #[error("failed to spawn peer thread: {0}")]
    Spawn(String),
}
