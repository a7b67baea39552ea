//! Embeddable LLM agent sessions
//!
//! A host builds a [`Session`] from a [`SessionBuilder`], registers a
//! [`SessionHandler`] and sends it user messages. The session runs the agent
//! loop in the background: it calls the provider, asks the host to approve
//! each tool call through a [`ToolApprovalGate`], runs approved tools and
//! reports transcripts until the turn is over and the session is idle again.
//!
//! The same surface is exported to C from [`ffi`].

// Library-wide pedantic relaxations
#![allow(clippy::must_use_candidate, clippy::missing_errors_doc, clippy::module_name_repetitions)]

pub mod approval;
pub mod callbacks;
pub mod config;
pub mod conversation;
mod dispatcher;
pub mod error;
pub mod ffi;
pub mod provider;
pub mod runtime;
pub mod session;
pub mod state_machine;
pub mod telemetry;
pub mod tools;

pub use approval::{ApprovalDecision, GateState, ToolApprovalGate};
pub use callbacks::{CallbackSet, SessionHandler};
pub use config::{ProviderKind, SessionConfig, SessionOptions};
pub use conversation::{Conversation, Message, ToolCallRequest, TranscriptEvent, TranscriptSource};
pub use error::{Error, ErrorCode, FailureKind, ProviderError, SessionFailure, ToolError};
pub use provider::{OpenAiClient, ProviderClient, ProviderRequest, ProviderResponse};
pub use session::{Session, SessionBuilder, SessionState};
pub use telemetry::init_tracing;
pub use tools::{Tool, ToolContext, ToolExecutor, ToolOutput, ToolRegistry};
