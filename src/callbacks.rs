//! Host callbacks
//!
//! A session delivers everything it has to say through one [`SessionHandler`].
//! The handler is moved into the session at build time and only ever invoked
//! from the session's dispatcher, so calls never overlap. They do arrive on a
//! thread other than the one that called `send_message`.
//!
//! [`CallbackSet`] is the closure form: a typed host context plus optional
//! handlers, with a teardown closure that receives the context by value once
//! the session is gone.

use crate::approval::ToolApprovalGate;
use crate::conversation::TranscriptSource;
use crate::error::SessionFailure;

/// Rejection reason used when nobody is there to approve a tool call.
pub(crate) const NO_APPROVAL_HANDLER: &str = "no approval handler registered";

/// Receiver of session events.
pub trait SessionHandler: Send + 'static {
    /// The current turn finished. Fires exactly once per accepted message.
    fn on_idle(&mut self);

    /// A transcript segment, in production order.
    fn on_transcript(&mut self, text: &str, source: TranscriptSource);

    /// The provider wants to run a tool. The session stays suspended until
    /// `gate` is approved or rejected. Dropping the gate rejects it.
    fn on_tool_call_request(&mut self, gate: ToolApprovalGate);

    /// The agent loop gave up on the current turn. `on_idle` follows.
    fn on_error(&mut self, _failure: &SessionFailure) {}

    /// Last call for this handler.
    fn on_teardown(&mut self) {}
}

type IdleFn<C> = Box<dyn FnMut(&mut C) + Send>;
type TranscriptFn<C> = Box<dyn FnMut(&mut C, &str, TranscriptSource) + Send>;
type ToolRequestFn<C> = Box<dyn FnMut(&mut C, ToolApprovalGate) + Send>;
type ErrorFn<C> = Box<dyn FnMut(&mut C, &SessionFailure) + Send>;
type TeardownFn<C> = Box<dyn FnOnce(C) + Send>;

/// Closure-based handler bundle with an owned host context.
///
/// Unset handlers are no-ops, except the tool request handler whose absence
/// rejects every tool call.
pub struct CallbackSet<C: Send + 'static> {
    context: Option<C>,
    idle: Option<IdleFn<C>>,
    transcript: Option<TranscriptFn<C>>,
    tool_request: Option<ToolRequestFn<C>>,
    error: Option<ErrorFn<C>>,
    teardown: Option<TeardownFn<C>>,
}

impl<C: Send + 'static> CallbackSet<C> {
    pub fn new(context: C) -> Self {
        Self {
            context: Some(context),
            idle: None,
            transcript: None,
            tool_request: None,
            error: None,
            teardown: None,
        }
    }

    #[must_use]
    pub fn with_idle(mut self, f: impl FnMut(&mut C) + Send + 'static) -> Self {
        self.idle = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn with_transcript(
        mut self,
        f: impl FnMut(&mut C, &str, TranscriptSource) + Send + 'static,
    ) -> Self {
        self.transcript = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn with_tool_call_request(
        mut self,
        f: impl FnMut(&mut C, ToolApprovalGate) + Send + 'static,
    ) -> Self {
        self.tool_request = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn with_error(mut self, f: impl FnMut(&mut C, &SessionFailure) + Send + 'static) -> Self {
        self.error = Some(Box::new(f));
        self
    }

    /// Runs once with the context when the session (or unused builder) is released.
    #[must_use]
    pub fn with_teardown(mut self, f: impl FnOnce(C) + Send + 'static) -> Self {
        self.teardown = Some(Box::new(f));
        self
    }
}

impl<C: Send + 'static> SessionHandler for CallbackSet<C> {
    fn on_idle(&mut self) {
        if let (Some(f), Some(ctx)) = (self.idle.as_mut(), self.context.as_mut()) {
            f(ctx);
        }
    }

    fn on_transcript(&mut self, text: &str, source: TranscriptSource) {
        if let (Some(f), Some(ctx)) = (self.transcript.as_mut(), self.context.as_mut()) {
            f(ctx, text, source);
        }
    }

    fn on_tool_call_request(&mut self, gate: ToolApprovalGate) {
        match (self.tool_request.as_mut(), self.context.as_mut()) {
            (Some(f), Some(ctx)) => f(ctx, gate),
            _ => {
                tracing::warn!(call_id = %gate.call_id(), "No tool request handler set, rejecting");
                gate.reject_with_reason(NO_APPROVAL_HANDLER);
            }
        }
    }

    fn on_error(&mut self, failure: &SessionFailure) {
        if let (Some(f), Some(ctx)) = (self.error.as_mut(), self.context.as_mut()) {
            f(ctx, failure);
        }
    }

    fn on_teardown(&mut self) {
        let Some(ctx) = self.context.take() else {
            return;
        };
        if let Some(f) = self.teardown.take() {
            f(ctx);
        }
    }
}
