//! Decode error reporting.

use stubwire_proto::{DecodeFault, OperationId};

/// Receives every inbound message a handler rejected.
///
/// Reporting is the end of the line for a decode error: nothing is
/// returned to the sender and nothing propagates.
pub trait DecodeErrorReporter: Send + Sync {
    /// Called once per rejected message, after its scratchpad is released.
    fn report_decoding_error(&self, op: OperationId, fault: &DecodeFault);
}

/// Logs rejected messages at `warn`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl DecodeErrorReporter for TracingReporter {
    fn report_decoding_error(&self, op: OperationId, fault: &DecodeFault) {
        tracing::warn!(%op, %fault, "dropping malformed message");
    }
}
