//! Tool approval gate
//!
//! A gate is handed to the host for every tool call the provider requests.
//! The owning session stays in `WaitingForApproval` until the gate resolves.
//!
//! Resolution is modeled explicitly: a gate moves from [`GateState::Unresolved`]
//! to `Approved` or `Rejected` exactly once. The public `approve`/`reject`
//! methods consume the gate, so a second resolution cannot be written in safe
//! Rust. A gate dropped while unresolved resolves itself as a rejection, which
//! lets the session resume instead of waiting forever.

use std::fmt::{self, Debug, Display};
use tokio::sync::oneshot;

use crate::conversation::ToolCallRequest;
use crate::error::Error;

pub(crate) const DROPPED_REASON: &str = "approval dropped";

/// The host's answer to a tool call request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalDecision {
    Approved,
    Rejected { reason: Option<String> },
}

impl ApprovalDecision {
    pub fn is_approved(&self) -> bool {
        matches!(self, ApprovalDecision::Approved)
    }
}

/// Resolution state of a gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Unresolved,
    Approved,
    Rejected,
}

/// A pending tool invocation awaiting a host decision.
pub struct ToolApprovalGate {
    call_id: String,
    tool_name: String,
    description: String,
    justification: String,
    state: GateState,
    responder: Option<oneshot::Sender<ApprovalDecision>>,
}

impl ToolApprovalGate {
    /// Create a gate for `request` and the receiver the session waits on.
    pub(crate) fn new(request: &ToolCallRequest) -> (Self, oneshot::Receiver<ApprovalDecision>) {
        let (tx, rx) = oneshot::channel();
        let gate = Self {
            call_id: request.id.clone(),
            tool_name: request.name.clone(),
            description: request.description.clone(),
            justification: request.justification.clone(),
            state: GateState::Unresolved,
            responder: Some(tx),
        };
        (gate, rx)
    }

    /// What the tool is going to do.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Why the provider asked for it.
    pub fn justification(&self) -> &str {
        &self.justification
    }

    pub fn tool_name(&self) -> &str {
        &self.tool_name
    }

    pub fn call_id(&self) -> &str {
        &self.call_id
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    /// Approve the tool call. The session resumes and runs the tool.
    pub fn approve(mut self) {
        self.resolve_or_log(ApprovalDecision::Approved);
    }

    /// Reject the tool call. The session resumes without running the tool.
    pub fn reject(mut self) {
        self.resolve_or_log(ApprovalDecision::Rejected { reason: None });
    }

    /// Reject with a reason that is passed on to the provider.
    pub fn reject_with_reason(mut self, reason: impl Into<String>) {
        self.resolve_or_log(ApprovalDecision::Rejected {
            reason: Some(reason.into()),
        });
    }

    fn resolve_or_log(&mut self, decision: ApprovalDecision) {
        if let Err(e) = self.resolve(decision) {
            tracing::error!(call_id = %self.call_id, error = %e, "Failed to resolve approval gate");
        }
    }

    /// Move the gate out of `Unresolved`. Any further call is a contract violation.
    pub(crate) fn resolve(&mut self, decision: ApprovalDecision) -> Result<(), Error> {
        if self.state != GateState::Unresolved {
            return Err(Error::ContractViolation(
                "tool approval gate resolved more than once",
            ));
        }
        self.state = if decision.is_approved() {
            GateState::Approved
        } else {
            GateState::Rejected
        };
        tracing::debug!(call_id = %self.call_id, state = ?self.state, "Approval gate resolved");

        if let Some(tx) = self.responder.take() {
            if tx.send(decision).is_err() {
                // Session released while the gate was out
                tracing::debug!(call_id = %self.call_id, "Session no longer waiting for approval");
            }
        }
        Ok(())
    }
}

impl Drop for ToolApprovalGate {
    fn drop(&mut self) {
        if self.state == GateState::Unresolved {
            tracing::warn!(
                call_id = %self.call_id,
                tool = %self.tool_name,
                "Approval gate dropped without a decision, rejecting"
            );
            self.resolve_or_log(ApprovalDecision::Rejected {
                reason: Some(DROPPED_REASON.to_string()),
            });
        }
    }
}

impl Debug for ToolApprovalGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolApprovalGate")
            .field("call_id", &self.call_id)
            .field("description", &self.description)
            .field("justification", &self.justification)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Display for ToolApprovalGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.description, self.justification)
    }
}
