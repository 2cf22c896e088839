//! Synchronous in-process transport.
//!
//! Delivers each message straight into the peer registry on the calling
//! thread. The transport is created unbound so that both sides of a link
//! can hold a [`stubwire_core::Caller`] before either registry is built;
//! [`LoopbackTransport::bind`] attaches the peer once.

use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use bytes::Bytes;
use stubwire_core::{HandlerOutcome, Registry, RegistryError, Transport, TransportError};
use stubwire_proto::OperationId;

use crate::{
    error::HarnessError,
    fault::{FaultInjector, FaultPlan},
};

#[derive(Debug, Default)]
struct Inner {
    peer: OnceLock<Registry>,
    faults: Mutex<Option<FaultInjector>>,
}

/// Calls the peer registry directly. Clones share the same peer.
#[derive(Debug, Clone, Default)]
pub struct LoopbackTransport {
    inner: Arc<Inner>,
}

impl LoopbackTransport {
    /// An unbound transport; calls fail with `Disconnected` until bound.
    pub fn new() -> Self {
        Self::default()
    }

    /// An unbound transport that damages traffic according to `plan`.
    pub fn with_faults(plan: FaultPlan, seed: u64) -> Self {
        let transport = Self::new();
        *transport.faults() = Some(FaultInjector::new(plan, seed));
        transport
    }

    /// Attach the peer registry.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::AlreadyBound`] on a second call.
    pub fn bind(&self, peer: Registry) -> Result<(), HarnessError> {
        self.inner.peer.set(peer).map_err(|_| HarnessError::AlreadyBound)
    }

    /// The peer registry, once bound.
    pub fn peer(&self) -> Option<&Registry> {
        self.inner.peer.get()
    }

    /// Faults injected so far.
    pub fn injected_faults(&self) -> Vec<crate::Fault> {
        self.faults().as_ref().map(|f| f.injected().to_vec()).unwrap_or_default()
    }

    fn faults(&self) -> std::sync::MutexGuard<'_, Option<FaultInjector>> {
        self.inner.faults.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn deliver(&self, op: OperationId, message: Bytes) -> Result<HandlerOutcome, TransportError> {
        let peer = self.inner.peer.get().ok_or(TransportError::Disconnected)?;
        // lock released before delivery: handlers may call back over this link
        let message = match self.faults().as_mut() {
            Some(injector) => injector.mangle(message),
            None => message,
        };
        peer.deliver(op.route_key(), &message).map_err(|err| match err {
            RegistryError::UnknownOperation { .. } | RegistryError::Duplicate(_) => {
                TransportError::UnknownOperation { op }
            },
        })
    }
}

impl Transport for LoopbackTransport {
    fn dispatch_command(&self, op: OperationId, message: Bytes) -> Result<Bytes, TransportError> {
        match self.deliver(op, message)? {
            HandlerOutcome::Sent(response) => {
                let dropped = self.faults().as_mut().is_some_and(FaultInjector::drop_response);
                if dropped {
                    return Err(TransportError::NoResponse { op });
                }
                Ok(response)
            },
            HandlerOutcome::Completed | HandlerOutcome::Reported(_) | HandlerOutcome::Failed(_) => {
                Err(TransportError::NoResponse { op })
            },
        }
    }

    fn dispatch_event(&self, op: OperationId, message: Bytes) -> Result<(), TransportError> {
        self.deliver(op, message).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use stubwire_core::RpcConfig;
    use stubwire_proto::Group;

    use super::*;

    #[test]
    fn unbound_transport_is_disconnected() {
        let transport = LoopbackTransport::new();
        let op = OperationId::command(Group::new(1, "lb"), 1);
        assert_eq!(
            transport.dispatch_command(op, Bytes::new()),
            Err(TransportError::Disconnected)
        );
    }

    #[test]
    fn binding_twice_is_refused() {
        let transport = LoopbackTransport::new();
        let empty = || stubwire_core::RegistryBuilder::new(RpcConfig::default()).build();
        transport.bind(empty()).unwrap();
        let second = transport.bind(empty());
        assert_eq!(second, Err(HarnessError::AlreadyBound));
    }

    #[test]
    fn unserved_operation_is_reported_by_the_transport() {
        let transport = LoopbackTransport::new();
        transport.bind(stubwire_core::RegistryBuilder::new(RpcConfig::default()).build()).unwrap();
        let op = OperationId::event(Group::new(1, "lb"), 3);
        assert_eq!(
            transport.dispatch_event(op, Bytes::new()),
            Err(TransportError::UnknownOperation { op })
        );
    }
}
