//! Per-session callback dispatcher
//!
//! Every handler invocation for a session goes through one FIFO channel that
//! is drained by a worker thread owned by that session. Provider and tool
//! tasks only ever enqueue, so handler calls are totally ordered and never
//! overlap. A host handler that blocks (say, waiting on a human for approval)
//! stalls only its own session and holds no runtime thread.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, OnceLock, PoisonError};
use std::thread::ThreadId;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::approval::ToolApprovalGate;
use crate::callbacks::SessionHandler;
use crate::conversation::TranscriptEvent;
use crate::error::{Error, SessionFailure};

/// One queued handler invocation.
#[derive(Debug)]
pub(crate) enum Dispatch {
    Transcript(TranscriptEvent),
    ToolRequest(ToolApprovalGate),
    Failure(SessionFailure),
    Idle,
    /// Stop delivering and tear the handler down.
    Shutdown,
}

impl Dispatch {
    fn label(&self) -> &'static str {
        match self {
            Dispatch::Transcript(_) => "transcript",
            Dispatch::ToolRequest(_) => "tool_call_request",
            Dispatch::Failure(_) => "error",
            Dispatch::Idle => "idle",
            Dispatch::Shutdown => "shutdown",
        }
    }
}

/// Enqueue side of the dispatcher.
#[derive(Debug, Clone)]
pub(crate) struct DispatchSender {
    tx: mpsc::UnboundedSender<Dispatch>,
}

impl DispatchSender {
    /// Queue `item` for delivery. Returns false once the dispatcher has stopped.
    pub fn send(&self, item: Dispatch) -> bool {
        match self.tx.send(item) {
            Ok(()) => true,
            Err(mpsc::error::SendError(item)) => {
                tracing::debug!(callback = item.label(), "Dispatcher stopped, dropping callback");
                false
            }
        }
    }
}

#[derive(Default)]
struct Completion {
    finished: Mutex<bool>,
    cv: Condvar,
    worker: OnceLock<ThreadId>,
}

/// Lets the session wait for teardown to finish.
#[derive(Clone)]
pub(crate) struct DispatchHandle {
    completion: Arc<Completion>,
}

impl DispatchHandle {
    /// Block until the handler has been torn down.
    ///
    /// Returns immediately when called from a handler, since the worker
    /// cannot finish while it is still inside that call.
    pub fn wait(&self) {
        if self.completion.worker.get() == Some(&std::thread::current().id()) {
            tracing::warn!("Waiting for dispatcher from inside a callback, not blocking");
            return;
        }
        let mut finished = self
            .completion
            .finished
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        while !*finished {
            finished = self
                .completion
                .cv
                .wait(finished)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

/// Start the dispatcher thread for one session.
///
/// Once `cancel` fires nothing else is delivered, even items already queued.
pub(crate) fn spawn(
    session_id: &str,
    handler: Box<dyn SessionHandler>,
    cancel: CancellationToken,
) -> Result<(DispatchSender, DispatchHandle), Error> {
    let (tx, rx) = mpsc::unbounded_channel();
    let completion = Arc::new(Completion::default());
    let worker_completion = Arc::clone(&completion);
    let session_id = session_id.to_string();

    std::thread::Builder::new()
        .name("embed-agent-dispatch".to_string())
        .spawn(move || {
            let _ = worker_completion.worker.set(std::thread::current().id());
            run(&session_id, handler, rx, &cancel);

            let mut finished = worker_completion
                .finished
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            *finished = true;
            worker_completion.cv.notify_all();
        })
        .map_err(|e| Error::Runtime(format!("failed to start dispatcher thread: {e}")))?;

    Ok((DispatchSender { tx }, DispatchHandle { completion }))
}

fn run(
    session_id: &str,
    mut handler: Box<dyn SessionHandler>,
    mut rx: mpsc::UnboundedReceiver<Dispatch>,
    cancel: &CancellationToken,
) {
    let span = tracing::info_span!("dispatcher", session_id = %session_id);
    let _guard = span.enter();
    tracing::debug!("Dispatcher started");

    let mut delivered = 0u64;
    while let Some(item) = rx.blocking_recv() {
        if matches!(item, Dispatch::Shutdown) {
            break;
        }
        if cancel.is_cancelled() {
            tracing::debug!(callback = item.label(), "Session released, dropping callback");
            break;
        }
        deliver(handler.as_mut(), item);
        delivered += 1;
    }

    // Queued items are dropped here; any gate among them rejects itself.
    rx.close();
    drop(rx);

    guarded("teardown", || handler.on_teardown());
    tracing::debug!(delivered, "Dispatcher stopped");
}

fn deliver(handler: &mut dyn SessionHandler, item: Dispatch) {
    let label = item.label();
    tracing::trace!(callback = label, "Delivering");
    guarded(label, move || match item {
        Dispatch::Transcript(event) => handler.on_transcript(&event.text, event.source),
        Dispatch::ToolRequest(gate) => handler.on_tool_call_request(gate),
        Dispatch::Failure(failure) => handler.on_error(&failure),
        Dispatch::Idle => handler.on_idle(),
        Dispatch::Shutdown => {}
    });
}

/// A panicking handler must not take the worker (and the teardown) with it.
fn guarded(label: &'static str, f: impl FnOnce()) {
    if panic::catch_unwind(AssertUnwindSafe(f)).is_err() {
        tracing::error!(callback = label, "Session handler panicked");
    }
}
