//! Reporter that keeps what it was told.

use std::sync::{Mutex, PoisonError};

use stubwire_core::DecodeErrorReporter;
use stubwire_proto::{DecodeFault, OperationId};

/// Records every rejected message for later assertions.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    reports: Mutex<Vec<(OperationId, DecodeFault)>>,
}

impl RecordingReporter {
    /// An empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports received so far, in order.
    pub fn reports(&self) -> Vec<(OperationId, DecodeFault)> {
        self.reports.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Number of reports received.
    pub fn count(&self) -> usize {
        self.reports.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl DecodeErrorReporter for RecordingReporter {
    fn report_decoding_error(&self, op: OperationId, fault: &DecodeFault) {
        tracing::warn!(%op, %fault, "dropping malformed message");
        self.reports.lock().unwrap_or_else(PoisonError::into_inner).push((op, fault.clone()));
    }
}
