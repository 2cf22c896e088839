//! Peer running on its own thread.
//!
//! Messages cross a channel to a worker that owns the peer registry, so a
//! command really blocks on a response from another thread and can time
//! out. Events are queued and never waited on.

use std::{
    sync::mpsc::{self, RecvTimeoutError},
    thread::JoinHandle,
    time::Duration,
};

use bytes::Bytes;
use stubwire_core::{HandlerOutcome, Registry, Transport, TransportError};
use stubwire_proto::OperationId;

use crate::error::HarnessError;

enum Envelope {
    Command { op: OperationId, message: Bytes, reply: mpsc::Sender<Option<Bytes>> },
    Event { op: OperationId, message: Bytes },
    Stop,
}

/// Sends messages to a [`ThreadedPeer`].
#[derive(Debug, Clone)]
pub struct ThreadedTransport {
    queue: mpsc::Sender<Envelope>,
    timeout: Duration,
}

impl std::fmt::Debug for Envelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Command { op, message, .. } => {
                write!(f, "Command({op}, {} bytes)", message.len())
            },
            Self::Event { op, message } => write!(f, "Event({op}, {} bytes)", message.len()),
            Self::Stop => f.write_str("Stop"),
        }
    }
}

impl Transport for ThreadedTransport {
    fn dispatch_command(&self, op: OperationId, message: Bytes) -> Result<Bytes, TransportError> {
        let (reply, response) = mpsc::channel();
        self.queue
            .send(Envelope::Command { op, message, reply })
            .map_err(|_| TransportError::Disconnected)?;
        match response.recv_timeout(self.timeout) {
            Ok(Some(bytes)) => Ok(bytes),
            Ok(None) => Err(TransportError::NoResponse { op }),
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!(%op, after = ?self.timeout, "command timed out");
                Err(TransportError::Timeout { op, after: self.timeout })
            },
            Err(RecvTimeoutError::Disconnected) => Err(TransportError::Disconnected),
        }
    }

    fn dispatch_event(&self, op: OperationId, message: Bytes) -> Result<(), TransportError> {
        self.queue.send(Envelope::Event { op, message }).map_err(|_| TransportError::Disconnected)
    }
}

/// Worker thread serving one registry.
///
/// Dropping the peer stops the worker after the messages already queued.
#[derive(Debug)]
pub struct ThreadedPeer {
    transport: ThreadedTransport,
    worker: Option<JoinHandle<()>>,
}

impl ThreadedPeer {
    /// Start serving `registry`; commands wait at most `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Spawn`] if the thread cannot be started.
    pub fn spawn(registry: Registry, timeout: Duration) -> Result<Self, HarnessError> {
        Self::spawn_with_latency(registry, timeout, Duration::ZERO)
    }

    /// Like [`ThreadedPeer::spawn`], but the worker sleeps `latency` before
    /// handling each message.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Spawn`] if the thread cannot be started.
    pub fn spawn_with_latency(
        registry: Registry,
        timeout: Duration,
        latency: Duration,
    ) -> Result<Self, HarnessError> {
        let (queue, inbox) = mpsc::channel();
        let worker = std::thread::Builder::new()
            .name("stubwire-peer".into())
            .spawn(move || serve(&registry, &inbox, latency))
            .map_err(|err| HarnessError::Spawn(err.to_string()))?;
        Ok(Self { transport: ThreadedTransport { queue, timeout }, worker: Some(worker) })
    }

    /// A transport delivering to this peer.
    pub fn transport(&self) -> ThreadedTransport {
        self.transport.clone()
    }
}

impl Drop for ThreadedPeer {
    fn drop(&mut self) {
        let _ = self.transport.queue.send(Envelope::Stop);
        if self.worker.take().is_some_and(|worker| worker.join().is_err()) {
            tracing::error!("peer thread panicked");
        }
    }
}

fn serve(registry: &Registry, inbox: &mpsc::Receiver<Envelope>, latency: Duration) {
    while let Ok(envelope) = inbox.recv() {
        if !latency.is_zero() {
            std::thread::sleep(latency);
        }
        match envelope {
            Envelope::Command { op, message, reply } => {
                let response = match registry.deliver(op.route_key(), &message) {
                    Ok(HandlerOutcome::Sent(bytes)) => Some(bytes),
                    Ok(_) => None,
                    Err(err) => {
                        tracing::warn!(%op, %err, "unrouted command");
                        None
                    },
                };
                // the caller may have timed out and gone away
                let _ = reply.send(response);
            },
            Envelope::Event { op, message } => {
                if let Err(err) = registry.deliver(op.route_key(), &message) {
                    tracing::warn!(%op, %err, "unrouted event");
                }
            },
            Envelope::Stop => break,
        }
    }
    tracing::debug!("peer thread stopped");
}
