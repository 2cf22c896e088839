//! Wire-level building blocks for stubwire.
//!
//! Every remote call travels as a CBOR sequence: an optional scratchpad-size
//! header followed by the arguments in a fixed order. This crate provides the
//! two message contexts both sides use to produce and consume those
//! sequences, the worst-case size constants they are sized from, and the
//! identities that route a message to its handler.
//!
//! # Contexts
//!
//! [`EncodeCtx`] is append-only and bounded: it is created with the capacity
//! the size calculator produced, and writing past that capacity is reported
//! as a [`ProtocolError::SizingDefect`] when the message is finished. Bytes
//! are never silently truncated.
//!
//! [`DecodeCtx`] is forward-only and keeps a single sticky fault. Individual
//! `decode_*` calls return placeholder values once a fault is recorded, and
//! the outcome is inspected exactly once through [`DecodeCtx::finish`].
#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod bounds;
pub mod decode;
pub mod encode;
pub mod errors;
pub mod ids;

pub use bounds::FixedBound;
pub use decode::{DecodeCtx, DecodeFault, DecodeOutcome};
pub use encode::EncodeCtx;
pub use errors::{ProtocolError, Result};
pub use ids::{CallbackHandle, Group, OpKind, OperationId, RouteKey};
