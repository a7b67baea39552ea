//! Sessions
//!
//! A [`Session`] owns one conversation and drives its agent loop. The loop is
//! the pure [`transition`] function plus this module, which carries out the
//! resulting effects: provider requests, retries, approval gates and tool runs
//! are spawned on the session's runtime and report back as [`Event`]s.
//!
//! State and conversation sit behind one lock. `send_message` and the event
//! loop are the only two places that take it, and every effect is applied
//! while it is held, so callbacks are enqueued in exactly the order the state
//! machine produced them.

mod builder;
#[cfg(test)]
pub(crate) mod testing;

pub use builder::SessionBuilder;
pub use crate::state_machine::SessionState;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::approval::{ApprovalDecision, ToolApprovalGate, DROPPED_REASON};
use crate::callbacks::SessionHandler;
use crate::config::{SessionConfig, SessionOptions};
use crate::conversation::{Conversation, ToolCallRequest};
use crate::dispatcher::{self, Dispatch, DispatchHandle, DispatchSender};
use crate::error::{Error, ProviderError};
use crate::provider::{ProviderClient, ProviderRequest};
use crate::state_machine::{
    transition, Effect, Event, LoopState, SessionContext, TransitionError, TransitionResult,
};
use crate::tools::{ToolContext, ToolExecutor};

/// A live agent session.
///
/// Dropping the session releases it: in-flight provider and tool work is
/// cancelled, no further callbacks are delivered, and the handler's teardown
/// runs exactly once on the dispatcher.
pub struct Session {
    shared: Arc<SessionShared>,
    dispatch: DispatchHandle,
}

struct SessionShared {
    context: SessionContext,
    config: SessionConfig,
    system_prompt: Option<String>,
    request_timeout: Duration,
    core: Mutex<SessionCore>,
    dispatcher: DispatchSender,
    events: mpsc::UnboundedSender<Event>,
    provider: Arc<dyn ProviderClient>,
    tools: Arc<dyn ToolExecutor>,
    runtime: Handle,
    cancel: CancellationToken,
}

#[derive(Default)]
struct SessionCore {
    state: LoopState,
    conversation: Conversation,
}

impl Session {
    pub(crate) fn start(
        runtime: Handle,
        config: SessionConfig,
        options: SessionOptions,
        provider: Arc<dyn ProviderClient>,
        tools: Arc<dyn ToolExecutor>,
        handler: Box<dyn SessionHandler>,
    ) -> Result<Self, Error> {
        let id = uuid::Uuid::new_v4().to_string();
        let cancel = CancellationToken::new();
        let (dispatcher, dispatch) = dispatcher::spawn(&id, handler, cancel.clone())?;
        let (events, event_rx) = mpsc::unbounded_channel();

        let shared = Arc::new(SessionShared {
            context: SessionContext::new(id.clone(), &options),
            config,
            system_prompt: options.system_prompt,
            request_timeout: options.request_timeout,
            core: Mutex::new(SessionCore::default()),
            dispatcher,
            events,
            provider,
            tools,
            runtime: runtime.clone(),
            cancel,
        });

        let span = tracing::info_span!("session", session_id = %id);
        runtime.spawn(Arc::clone(&shared).run(event_rx).instrument(span));
        tracing::info!(session_id = %id, model = %shared.config.model(), "Session started");

        Ok(Self { shared, dispatch })
    }

    /// Send a user message. Only valid while idle.
    ///
    /// Returns once the message is accepted and the agent loop has started.
    /// Completion is signalled later through `on_idle`.
    pub fn send_message(&self, text: impl Into<String>) -> Result<(), Error> {
        let shared = &self.shared;
        let mut core = shared.lock_core();

        match transition(&core.state, &shared.context, Event::UserMessage { text: text.into() }) {
            Ok(result) => {
                shared.apply(&mut core, result);
                Ok(())
            }
            Err(TransitionError::Busy { state }) => {
                tracing::debug!(session_id = %shared.context.session_id, %state, "Rejecting message while busy");
                Err(Error::InvalidState { state })
            }
            Err(e) => {
                tracing::warn!(session_id = %shared.context.session_id, error = %e, "Unexpected transition error");
                Err(Error::InvalidState {
                    state: core.state.public(),
                })
            }
        }
    }

    pub fn state(&self) -> SessionState {
        self.shared.lock_core().state.public()
    }

    /// Snapshot of the conversation so far.
    pub fn conversation(&self) -> Conversation {
        self.shared.lock_core().conversation.clone()
    }

    pub fn id(&self) -> &str {
        &self.shared.context.session_id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.shared.config
    }

    /// Release the session. Equivalent to dropping it.
    pub fn release(self) {
        drop(self);
    }

    /// Release the session and block until the handler has been torn down.
    ///
    /// Must not be called from an async context; use `spawn_blocking`.
    pub fn release_and_wait(self) {
        let dispatch = self.dispatch.clone();
        drop(self);
        dispatch.wait();
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shared.shutdown();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.shared.context.session_id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl SessionShared {
    fn lock_core(&self) -> MutexGuard<'_, SessionCore> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn shutdown(&self) {
        // Holding the lock means no transition is half applied
        let core = self.lock_core();
        if self.cancel.is_cancelled() {
            return;
        }
        tracing::info!(
            session_id = %self.context.session_id,
            state = core.state.name(),
            messages = core.conversation.len(),
            "Releasing session"
        );
        self.cancel.cancel();
        self.dispatcher.send(Dispatch::Shutdown);
    }

    async fn run(self: Arc<Self>, mut events: mpsc::UnboundedReceiver<Event>) {
        tracing::debug!("Session runtime started");

        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                Some(event) = events.recv() => self.process_event(event),
                else => break,
            }
        }

        tracing::debug!("Session runtime stopped");
    }

    fn process_event(&self, event: Event) {
        let mut core = self.lock_core();
        if self.cancel.is_cancelled() {
            return;
        }

        let name = event.name();
        match transition(&core.state, &self.context, event) {
            Ok(result) => self.apply(&mut core, result),
            // Late or mismatched events are dropped, never fatal
            Err(e) => tracing::warn!(event = name, state = core.state.name(), error = %e, "Ignoring event"),
        }
    }

    /// Commit a transition and run its effects. Called with the core lock held.
    fn apply(&self, core: &mut SessionCore, result: TransitionResult) {
        let old = std::mem::replace(&mut core.state, result.new_state);
        if old.name() != core.state.name() {
            tracing::debug!(from = old.name(), to = core.state.name(), "State transition");
        }

        for effect in result.effects {
            self.execute_effect(core, effect);
        }
    }

    fn execute_effect(&self, core: &mut SessionCore, effect: Effect) {
        match effect {
            Effect::Record(message) => core.conversation.push(message),

            Effect::Emit(event) => {
                self.dispatcher.send(Dispatch::Transcript(event));
            }

            Effect::RequestProvider => {
                let attempt = match &core.state {
                    LoopState::Requesting { attempt, .. } => *attempt,
                    _ => 1,
                };
                let request = ProviderRequest {
                    system: self.system_prompt.clone(),
                    messages: core.conversation.messages(),
                    tools: self.tools.definitions(),
                };
                self.spawn_provider_request(request, attempt);
            }

            Effect::ScheduleRetry { delay, attempt } => {
                tracing::info!(attempt, delay_ms = %delay.as_millis(), "Scheduling provider retry");
                let events = self.events.clone();
                self.spawn_cancellable(async move {
                    tokio::time::sleep(delay).await;
                    let _ = events.send(Event::RetryTimeout { attempt });
                });
            }

            Effect::RequestApproval { call } => self.request_approval(&call),

            Effect::ExecuteTool { call } => self.spawn_tool(call),

            Effect::ReportFailure(failure) => {
                tracing::warn!(kind = ?failure.kind, error = %failure.message, "Turn failed");
                self.dispatcher.send(Dispatch::Failure(failure));
            }

            Effect::NotifyIdle => {
                self.dispatcher.send(Dispatch::Idle);
            }
        }
    }

    /// Run `fut` on the session runtime until it finishes or the session is released.
    fn spawn_cancellable<F>(&self, fut: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let cancel = self.cancel.clone();
        self.runtime.spawn(
            async move {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => {}
                    () = fut => {}
                }
            }
            .in_current_span(),
        );
    }

    fn spawn_provider_request(&self, request: ProviderRequest, attempt: u32) {
        let provider = Arc::clone(&self.provider);
        let tools = Arc::clone(&self.tools);
        let events = self.events.clone();
        let timeout = self.request_timeout;

        tracing::info!(attempt, messages = request.messages.len(), "Making provider request (background)");
        self.spawn_cancellable(async move {
            let result = match tokio::time::timeout(timeout, provider.complete(&request)).await {
                Ok(result) => result,
                Err(_) => Err(ProviderError::network(format!(
                    "Request timed out after {}s",
                    timeout.as_secs()
                ))),
            };

            let event = match result {
                Ok(mut response) => {
                    for call in &mut response.tool_calls {
                        if let Some(description) = tools.describe(call) {
                            call.description = description;
                        }
                    }
                    Event::ProviderResponse { response }
                }
                Err(error) => Event::ProviderError { error, attempt },
            };
            let _ = events.send(event);
        });
    }

    fn request_approval(&self, call: &ToolCallRequest) {
        let (gate, decision_rx) = ToolApprovalGate::new(call);
        tracing::info!(tool = %call.name, call_id = %call.id, "Waiting for tool approval");
        self.dispatcher.send(Dispatch::ToolRequest(gate));

        let events = self.events.clone();
        let call_id = call.id.clone();
        self.spawn_cancellable(async move {
            // Closed without a decision only if the gate was forgotten
            let decision = decision_rx.await.unwrap_or_else(|_| ApprovalDecision::Rejected {
                reason: Some(DROPPED_REASON.to_string()),
            });
            tracing::info!(call_id = %call_id, approved = decision.is_approved(), "Tool approval resolved");
            let _ = events.send(Event::ApprovalResolved { call_id, decision });
        });
    }

    fn spawn_tool(&self, call: ToolCallRequest) {
        let tools = Arc::clone(&self.tools);
        let events = self.events.clone();
        let ctx = ToolContext::new(self.cancel.child_token(), self.context.session_id.clone());

        self.spawn_cancellable(async move {
            tracing::info!(tool = %call.name, call_id = %call.id, "Executing tool (background)");
            let (content, is_error) = match tools.execute(&call, ctx).await {
                Ok(output) => (output.output, !output.success),
                Err(e) => {
                    tracing::warn!(tool = %call.name, error = %e, "Tool failed");
                    (e.reason, true)
                }
            };
            let _ = events.send(Event::ToolComplete {
                call_id: call.id,
                content,
                is_error,
            });
        });
    }
}
