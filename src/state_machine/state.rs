//! Session state types

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::SessionOptions;
use crate::conversation::ToolCallRequest;

/// The three states a session reports to its host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Processing,
    WaitingForApproval,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Processing => "processing",
            SessionState::WaitingForApproval => "waiting_for_approval",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable per-session limits consulted by transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    pub session_id: String,
    /// Provider attempts per exchange, including the first
    pub max_attempts: u32,
    /// Provider exchanges per user message
    pub max_turns: u32,
}

impl SessionContext {
    pub fn new(session_id: impl Into<String>, options: &SessionOptions) -> Self {
        Self {
            session_id: session_id.into(),
            max_attempts: options.max_attempts.max(1),
            max_turns: options.max_turns.max(1),
        }
    }
}

/// Internal agent loop state.
///
/// Finer grained than [`SessionState`]: the loop distinguishes waiting on the
/// provider from running an approved tool, and carries the queue of tool calls
/// still to be gated.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum LoopState {
    /// Ready for a user message
    #[default]
    Idle,

    /// Provider request in flight or scheduled for retry
    Requesting {
        /// Attempt within this exchange, starting at 1
        attempt: u32,
        /// Provider exchange within this user message, starting at 1
        turn: u32,
    },

    /// Suspended until the host resolves the gate for `current`
    AwaitingApproval {
        current: ToolCallRequest,
        remaining: Vec<ToolCallRequest>,
        turn: u32,
    },

    /// Running an approved tool
    ExecutingTool {
        current: ToolCallRequest,
        remaining: Vec<ToolCallRequest>,
        turn: u32,
    },
}

impl LoopState {
    /// Host-facing state
    pub fn public(&self) -> SessionState {
        match self {
            LoopState::Idle => SessionState::Idle,
            LoopState::Requesting { .. } | LoopState::ExecutingTool { .. } => SessionState::Processing,
            LoopState::AwaitingApproval { .. } => SessionState::WaitingForApproval,
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, LoopState::Idle)
    }

    /// Short name for logging
    pub fn name(&self) -> &'static str {
        match self {
            LoopState::Idle => "idle",
            LoopState::Requesting { .. } => "requesting",
            LoopState::AwaitingApproval { .. } => "awaiting_approval",
            LoopState::ExecutingTool { .. } => "executing_tool",
        }
    }
}
