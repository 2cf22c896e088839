//! In-process test harness for stubwire links.
//!
//! Transports that connect a [`stubwire_core::Caller`] directly to a peer's
//! [`stubwire_core::Registry`], either synchronously on the calling thread or
//! through a worker thread, plus deterministic fault injection driven by a
//! seeded RNG.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod fault;
pub mod loopback;
pub mod reporter;
pub mod threaded;

pub use error::HarnessError;
pub use fault::{Fault, FaultInjector, FaultPlan};
pub use loopback::LoopbackTransport;
pub use reporter::RecordingReporter;
pub use threaded::{ThreadedPeer, ThreadedTransport};
