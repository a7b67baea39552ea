//! Effects produced by state transitions

use std::time::Duration;

use crate::conversation::{Message, ToolCallRequest, TranscriptEvent};
use crate::error::SessionFailure;

/// Effects to be executed after a state transition, in order
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Append a message to the conversation
    Record(Message),

    /// Deliver a transcript segment to the host
    Emit(TranscriptEvent),

    /// Send the conversation to the provider
    RequestProvider,

    /// Retry the provider after `delay`
    ScheduleRetry { delay: Duration, attempt: u32 },

    /// Hand the host an approval gate for `call`
    RequestApproval { call: ToolCallRequest },

    /// Run an approved tool (spawns as background task)
    ExecuteTool { call: ToolCallRequest },

    /// Tell the host the turn failed
    ReportFailure(SessionFailure),

    /// Tell the host the turn is over
    NotifyIdle,
}

impl Effect {
    pub fn emit_user(text: impl Into<String>) -> Self {
        Effect::Emit(TranscriptEvent::user(text))
    }

    pub fn emit_assistant(text: impl Into<String>) -> Self {
        Effect::Emit(TranscriptEvent::assistant(text))
    }

    /// Effects that start asynchronous work the loop will wait on.
    #[cfg(test)]
    pub fn is_pending_work(&self) -> bool {
        matches!(
            self,
            Effect::RequestProvider
                | Effect::ScheduleRetry { .. }
                | Effect::RequestApproval { .. }
                | Effect::ExecuteTool { .. }
        )
    }
}
