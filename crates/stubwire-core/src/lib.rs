//! Stub/handler protocol core.
//!
//! Both ends of a link run the same discipline for every remote operation:
//! compute a size bound from the shape of the values, allocate exactly that,
//! encode in a fixed order, and on the receiving side decode into a per-call
//! scratchpad before anything else runs. Nothing here knows about a concrete
//! transport or a concrete service; those plug in through [`Transport`],
//! [`HostOperation`] and the client-side [`Request`]/[`Command`] traits.
//!
//! # Components
//!
//! - [`size`]: size estimates and the shape-only calculators
//! - [`scratchpad`]: per-call bump arena for variable-length decode targets
//! - [`pool`]: bounded message-context leasing
//! - [`stub`]: client-side call driver
//! - [`handler`]: host-side invocation state machine
//! - [`registry`]: frozen `(group, kind, op)` to handler table
//! - [`callback`]: opaque-handle callback trampolines
//! - [`report`]: decode error reporting boundary
//! - [`transport`]: transport abstraction
//! - [`config`]: runtime limits
//! - [`error`]: error taxonomy

pub mod callback;
pub mod config;
pub mod error;
pub mod handler;
pub mod pool;
pub mod registry;
pub mod report;
pub mod scratchpad;
pub mod size;
pub mod stub;
pub mod transport;

pub use callback::{CallbackRegistry, RemoteCallback};
pub use config::{CallbackPolicy, RpcConfig};
pub use error::{CallbackError, ConfigError, RegistryError, Result, RpcError, SizeError};
pub use handler::{HandlerOutcome, HandlerState, HostOperation, Served};
pub use pool::{MessageContext, MessagePool, PoolError, Slot};
pub use registry::{Handler, HandlerEnv, Registry, RegistryBuilder};
pub use report::{DecodeErrorReporter, TracingReporter};
pub use scratchpad::{Region, Scratchpad, ScratchpadError, StrRegion};
pub use size::{SCRATCHPAD_ALIGN, SizeEstimate, WireShape, align_up};
pub use stub::{Caller, Command, Request};
pub use transport::{Transport, TransportError};
