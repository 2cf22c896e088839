//! Client-side call driver.
//!
//! A stub describes one operation through [`Request`] (and [`Command`] when
//! a response comes back). [`Caller`] runs the fixed sequence for it:
//!
//! 1. check per-operation argument limits
//! 2. compute the request bound from the argument shapes
//! 3. lease a message context of exactly that size
//! 4. encode the scratchpad header (variable requests) and the arguments
//! 5. hand the message to the transport
//! 6. decode the response with the same discipline as the host
//! 7. copy variable response data into caller storage and release the
//!    response scratchpad
//!
//! The message slot stays leased until the response has been processed.

use std::sync::Arc;

use bytes::Bytes;
use stubwire_proto::{DecodeCtx, DecodeFault, EncodeCtx, OperationId};

use crate::{
    config::RpcConfig,
    error::{RpcError, SizeError},
    pool::{MessagePool, Slot, encode_message},
    scratchpad::Scratchpad,
    size::SizeEstimate,
    transport::Transport,
};

/// Outbound half of an operation: arguments and their encoding.
pub trait Request {
    /// Operation being called.
    fn id(&self) -> OperationId;

    /// True if the request carries a scratchpad header.
    fn has_variable_args(&self) -> bool {
        false
    }

    /// Reject arguments the operation does not accept. Runs before any size
    /// computation; nothing is sent on error.
    fn check_limits(&self) -> Result<(), RpcError> {
        Ok(())
    }

    /// Bound the request from argument shapes only.
    fn request_size(&self) -> Result<SizeEstimate, SizeError>;

    /// Encode the arguments in field order.
    fn encode_request(&self, ctx: &mut EncodeCtx);
}

/// A request that expects exactly one response.
pub trait Command: Request {
    /// Response fields as decoded, possibly referring into the scratchpad.
    type Decoded;
    /// Value handed back to the caller.
    type Response;

    /// True if the response carries its own scratchpad header.
    fn has_variable_response(&self) -> bool {
        false
    }

    /// Decode response fields. Faults are recorded in `ctx`.
    fn decode_response(&self, ctx: &mut DecodeCtx<'_>, pad: &mut Scratchpad) -> Self::Decoded;

    /// Build the caller's result, copying anything it needs out of `pad`.
    ///
    /// Only called once the response decoded cleanly.
    fn complete(
        self,
        decoded: Self::Decoded,
        pad: &Scratchpad,
    ) -> Result<Self::Response, DecodeFault>;
}

/// Sends stubs over a transport.
#[derive(Clone)]
pub struct Caller {
    transport: Arc<dyn Transport>,
    pool: MessagePool,
    config: Arc<RpcConfig>,
}

impl std::fmt::Debug for Caller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Caller").field("pool", &self.pool).field("config", &self.config).finish()
    }
}

impl Caller {
    /// A caller with its own message pool sized from `config`.
    pub fn new(transport: Arc<dyn Transport>, config: RpcConfig) -> Self {
        let pool = MessagePool::from_config(&config);
        Self { transport, pool, config: Arc::new(config) }
    }

    /// A caller drawing from an existing pool.
    pub fn with_pool(transport: Arc<dyn Transport>, config: RpcConfig, pool: MessagePool) -> Self {
        Self { transport, pool, config: Arc::new(config) }
    }

    /// Limits used for every call.
    pub fn config(&self) -> &RpcConfig {
        &self.config
    }

    /// Pool requests are leased from.
    pub fn pool(&self) -> &MessagePool {
        &self.pool
    }

    /// Call a command and wait for its response.
    ///
    /// # Errors
    ///
    /// - [`RpcError::KindMismatch`] if `command` names an event
    /// - [`RpcError::LimitExceeded`] or [`RpcError::Size`] for unacceptable
    ///   arguments
    /// - [`RpcError::ResourceExhausted`] if no message slot is free
    /// - [`RpcError::SizingDefect`] if the request bound was wrong
    /// - [`RpcError::Transport`] if delivery failed
    /// - [`RpcError::Decode`] if the response was malformed
    pub fn call<C: Command>(&self, command: C) -> Result<C::Response, RpcError> {
        let op = command.id();
        if !op.expects_response() {
            return Err(RpcError::KindMismatch { op });
        }
        let (request, slot) = self.encode(&command)?;

        let response = self.transport.dispatch_command(op, request)?;
        tracing::trace!(%op, response = %hex::encode(&response), "response received");

        let mut ctx = DecodeCtx::new(&response);
        let mut pad = if command.has_variable_response() {
            Scratchpad::from_header(&mut ctx, self.config.max_scratchpad)
        } else {
            Scratchpad::empty()
        };
        let decoded = command.decode_response(&mut ctx, &mut pad);
        let result = ctx.finish().into_result().and_then(|()| command.complete(decoded, &pad));
        pad.close();
        drop(slot);

        result.map_err(|fault| {
            tracing::warn!(%op, %fault, "malformed response");
            RpcError::Decode { op, fault }
        })
    }

    /// Send an event. Returns once the transport accepted it.
    ///
    /// # Errors
    ///
    /// Same as [`Caller::call`] up to delivery; [`RpcError::KindMismatch`] if
    /// `event` names a command.
    pub fn notify<R: Request>(&self, event: &R) -> Result<(), RpcError> {
        let op = event.id();
        if op.expects_response() {
            return Err(RpcError::KindMismatch { op });
        }
        let (message, _slot) = self.encode(event)?;
        self.transport.dispatch_event(op, message)?;
        Ok(())
    }

    fn encode<R: Request>(&self, request: &R) -> Result<(Bytes, Slot), RpcError> {
        let op = request.id();
        request.check_limits()?;
        let estimate = request.request_size()?;
        let (message, slot) =
            encode_message(op, &self.pool, estimate, request.has_variable_args(), |ctx| {
                request.encode_request(ctx);
            })?;
        tracing::trace!(%op, request = %hex::encode(&message), "request encoded");
        Ok((message, slot))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use stubwire_proto::Group;

    use super::*;
    use crate::{scratchpad::StrRegion, transport::TransportError};

    const GRP: Group = Group::new(4, "stub_test");

    /// Returns a canned response and records what was sent.
    struct Canned {
        response: Bytes,
        sent: Mutex<Vec<Bytes>>,
    }

    impl Transport for Canned {
        fn dispatch_command(
            &self,
            _op: OperationId,
            message: Bytes,
        ) -> Result<Bytes, TransportError> {
            self.sent.lock().unwrap().push(message);
            Ok(self.response.clone())
        }

        fn dispatch_event(&self, _op: OperationId, message: Bytes) -> Result<(), TransportError> {
            self.sent.lock().unwrap().push(message);
            Ok(())
        }
    }

    /// `echo(name) -> name`, with a variable request and response.
    struct Echo<'a>(&'a str);

    impl Request for Echo<'_> {
        fn id(&self) -> OperationId {
            OperationId::command(GRP, 1)
        }

        fn has_variable_args(&self) -> bool {
            true
        }

        fn check_limits(&self) -> Result<(), RpcError> {
            if self.0.len() > 8 {
                return Err(RpcError::LimitExceeded { field: "name", len: self.0.len(), max: 8 });
            }
            Ok(())
        }

        fn request_size(&self) -> Result<SizeEstimate, SizeError> {
            SizeEstimate::str(self.0.len())
        }

        fn encode_request(&self, ctx: &mut EncodeCtx) {
            ctx.encode_str(self.0);
        }
    }

    impl Command for Echo<'_> {
        type Decoded = StrRegion;
        type Response = String;

        fn has_variable_response(&self) -> bool {
            true
        }

        fn decode_response(&self, ctx: &mut DecodeCtx<'_>, pad: &mut Scratchpad) -> StrRegion {
            pad.decode_str(ctx)
        }

        fn complete(self, decoded: StrRegion, pad: &Scratchpad) -> Result<String, DecodeFault> {
            Ok(pad.str(decoded).to_owned())
        }
    }

    fn caller(response: &[u8]) -> (Caller, Arc<Canned>) {
        let transport =
            Arc::new(Canned { response: Bytes::copy_from_slice(response), sent: Mutex::default() });
        (Caller::new(Arc::clone(&transport) as _, RpcConfig::default()), transport)
    }

    #[test]
    fn variable_response_is_copied_out() {
        // header 8, "hi"
        let (caller, transport) = caller(&[0x08, 0x62, b'h', b'i']);
        assert_eq!(caller.call(Echo("hi")).unwrap(), "hi");
        assert_eq!(&transport.sent.lock().unwrap()[0][..], &[0x08, 0x62, b'h', b'i']);
        assert_eq!(caller.pool().in_use(), 0);
    }

    #[test]
    fn limit_violation_sends_nothing() {
        let (caller, transport) = caller(&[]);
        let err = caller.call(Echo("much too long")).unwrap_err();
        assert!(matches!(err, RpcError::LimitExceeded { field: "name", len: 13, max: 8 }));
        assert!(transport.sent.lock().unwrap().is_empty());
    }

    #[test]
    fn malformed_response_is_a_decode_error() {
        // trailing byte after a valid response
        let (caller, _) = caller(&[0x08, 0x62, b'h', b'i', 0x00]);
        let err = caller.call(Echo("hi")).unwrap_err();
        assert!(matches!(
            err,
            RpcError::Decode { fault: DecodeFault::TrailingData { remaining: 1 }, .. }
        ));
        assert_eq!(caller.pool().in_use(), 0);
    }

    #[test]
    fn commands_cannot_be_sent_as_events() {
        let (caller, _) = caller(&[]);
        assert!(matches!(caller.notify(&Echo("x")), Err(RpcError::KindMismatch { .. })));
    }
}
