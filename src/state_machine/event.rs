//! Events that drive the agent loop

use crate::approval::ApprovalDecision;
use crate::error::ProviderError;
use crate::provider::ProviderResponse;

/// Events that trigger state transitions
#[derive(Debug, Clone)]
pub enum Event {
    // Host events
    UserMessage {
        text: String,
    },

    // Provider events
    ProviderResponse {
        response: ProviderResponse,
    },
    ProviderError {
        error: ProviderError,
        attempt: u32,
    },
    RetryTimeout {
        attempt: u32,
    },

    // Tool events
    ApprovalResolved {
        call_id: String,
        decision: ApprovalDecision,
    },
    ToolComplete {
        call_id: String,
        content: String,
        is_error: bool,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::UserMessage { .. } => "user_message",
            Event::ProviderResponse { .. } => "provider_response",
            Event::ProviderError { .. } => "provider_error",
            Event::RetryTimeout { .. } => "retry_timeout",
            Event::ApprovalResolved { .. } => "approval_resolved",
            Event::ToolComplete { .. } => "tool_complete",
        }
    }
}
