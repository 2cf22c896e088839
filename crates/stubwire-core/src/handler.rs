//! Host-side handler invocation.
//!
//! Every inbound message runs through the same state machine. Application
//! code only runs after the whole message decoded cleanly; a decode error is
//! reported and nothing is sent back.
//!
//! # State Machine
//!
//! ```text
//! ┌──────────┐  finish ok  ┌───────────┐     ┌───────────┐  command  ┌──────────┐  ok   ┌──────┐
//! │ Decoding │────────────>│ DecodedOk │────>│ Executing │──────────>│ Encoding │──────>│ Sent │
//! └──────────┘             └───────────┘     └───────────┘           └──────────┘       └──────┘
//!      │                                           │                      │
//!      │ fault / trailing data                     │ event                │ size error
//!      ↓                                           ↓                      ↓
//! ┌─────────────┐  report  ┌──────────┐      ┌───────────┐          ┌────────┐
//! │ DecodeError │─────────>│ Reported │      │ Completed │          │ Failed │
//! └─────────────┘          └──────────┘      └───────────┘          └────────┘
//! ```
//!
//! The scratchpad opened in `Decoding` is released before the invocation
//! reaches any terminal state.

use bytes::Bytes;
use stubwire_proto::{DecodeCtx, DecodeFault, EncodeCtx, OperationId};

use crate::{
    error::{RpcError, SizeError},
    pool::encode_message,
    registry::{Handler, HandlerEnv},
    scratchpad::Scratchpad,
    size::SizeEstimate,
};

/// Invocation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerState {
    /// Reading the scratchpad header and arguments
    Decoding,
    /// Every argument decoded and the input was consumed exactly
    DecodedOk,
    /// The message was rejected
    DecodeError,
    /// Application code is running
    Executing,
    /// Encoding the response
    Encoding,
    /// Response produced (terminal)
    Sent,
    /// Event handled, nothing to send (terminal)
    Completed,
    /// Decode error handed to the reporter (terminal)
    Reported,
    /// Response could not be produced (terminal)
    Failed,
}

impl HandlerState {
    /// True if `next` may follow `self`.
    pub fn can_transition(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Decoding, Self::DecodedOk | Self::DecodeError)
                | (Self::DecodeError, Self::Reported)
                | (Self::DecodedOk, Self::Executing)
                | (Self::Executing, Self::Encoding | Self::Completed)
                | (Self::Encoding, Self::Sent | Self::Failed)
        )
    }

    /// True for states that end an invocation.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Sent | Self::Completed | Self::Reported | Self::Failed)
    }
}

/// How an invocation ended.
#[derive(Debug)]
pub enum HandlerOutcome {
    /// Response bytes for the command
    Sent(Bytes),
    /// Event handled
    Completed,
    /// Message rejected and reported
    Reported(DecodeFault),
    /// Arguments were fine but the response could not be encoded
    Failed(RpcError),
}

impl HandlerOutcome {
    /// Terminal state this outcome corresponds to.
    pub fn state(&self) -> HandlerState {
        match self {
            Self::Sent(_) => HandlerState::Sent,
            Self::Completed => HandlerState::Completed,
            Self::Reported(_) => HandlerState::Reported,
            Self::Failed(_) => HandlerState::Failed,
        }
    }

    /// Response bytes, if any.
    pub fn into_response(self) -> Option<Bytes> {
        match self {
            Self::Sent(bytes) => Some(bytes),
            _ => None,
        }
    }
}

/// One remote operation as seen by the host.
///
/// `decode` reads the arguments in the order the stub wrote them. Variable
/// fields go into the scratchpad and are referenced from `Args` by region
/// handles; `execute` resolves them against the same scratchpad.
pub trait HostOperation: Send + Sync {
    /// Decoded arguments.
    type Args;
    /// Application result, owned so it outlives the scratchpad.
    type Output;

    /// Operation served.
    fn id(&self) -> OperationId;

    /// True if requests carry a scratchpad header.
    fn has_variable_args(&self) -> bool {
        false
    }

    /// Decode the arguments. Faults are recorded in `ctx`.
    fn decode(&self, ctx: &mut DecodeCtx<'_>, pad: &mut Scratchpad) -> Self::Args;

    /// Run the application function.
    fn execute(&self, args: Self::Args, pad: &Scratchpad) -> Self::Output;

    /// True if responses carry a scratchpad header.
    fn has_variable_response(&self) -> bool {
        false
    }

    /// Bound the response from the application output.
    ///
    /// # Errors
    ///
    /// Returns [`SizeError`] if the arithmetic overflows.
    fn response_size(&self, _output: &Self::Output) -> Result<SizeEstimate, SizeError> {
        Ok(SizeEstimate::ZERO)
    }

    /// Encode the response in field order.
    fn encode_response(&self, _output: &Self::Output, _ctx: &mut EncodeCtx) {}
}

/// Tracks and traces state transitions of one invocation.
struct Invocation {
    op: OperationId,
    state: HandlerState,
}

impl Invocation {
    fn start(op: OperationId) -> Self {
        tracing::trace!(%op, state = ?HandlerState::Decoding, "handler invoked");
        Self { op, state: HandlerState::Decoding }
    }

    fn advance(&mut self, next: HandlerState) {
        debug_assert!(self.state.can_transition(next), "{:?} -> {next:?}", self.state);
        tracing::trace!(op = %self.op, from = ?self.state, to = ?next, "handler transition");
        self.state = next;
    }
}

/// Adapter that runs a [`HostOperation`] as a registry [`Handler`].
#[derive(Debug, Clone)]
pub struct Served<O>(pub O);

impl<O: HostOperation> Handler for Served<O> {
    fn id(&self) -> OperationId {
        self.0.id()
    }

    fn handle(&self, message: &[u8], env: &HandlerEnv<'_>) -> HandlerOutcome {
        let operation = &self.0;
        let op = operation.id();
        let mut invocation = Invocation::start(op);

        let mut ctx = DecodeCtx::new(message);
        let mut pad = if operation.has_variable_args() {
            Scratchpad::from_header(&mut ctx, env.config.max_scratchpad)
        } else {
            Scratchpad::empty()
        };
        let args = operation.decode(&mut ctx, &mut pad);

        if let Err(fault) = ctx.finish().into_result() {
            invocation.advance(HandlerState::DecodeError);
            pad.close();
            env.reporter.report_decoding_error(op, &fault);
            invocation.advance(HandlerState::Reported);
            return HandlerOutcome::Reported(fault);
        }
        invocation.advance(HandlerState::DecodedOk);

        invocation.advance(HandlerState::Executing);
        let output = operation.execute(args, &pad);

        if !op.expects_response() {
            pad.close();
            invocation.advance(HandlerState::Completed);
            return HandlerOutcome::Completed;
        }

        invocation.advance(HandlerState::Encoding);
        let encoded = operation.response_size(&output).map_err(RpcError::from).and_then(|estimate| {
            encode_message(op, env.pool, estimate, operation.has_variable_response(), |ctx| {
                operation.encode_response(&output, ctx);
            })
        });
        pad.close();

        match encoded {
            Ok((bytes, _slot)) => {
                invocation.advance(HandlerState::Sent);
                tracing::trace!(%op, response = %hex::encode(&bytes), "response encoded");
                HandlerOutcome::Sent(bytes)
            },
            Err(err) => {
                invocation.advance(HandlerState::Failed);
                HandlerOutcome::Failed(err)
            },
        }
    }
}
