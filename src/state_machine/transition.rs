//! Pure state transition function

use super::{Effect, Event, LoopState, SessionContext, SessionState};
use crate::approval::ApprovalDecision;
use crate::conversation::{Message, ToolCallRequest};
use crate::error::SessionFailure;
use std::time::Duration;
use thiserror::Error;

const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: LoopState,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: LoopState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    #[must_use]
    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    #[must_use]
    pub fn with_effects(mut self, effects: impl IntoIterator<Item = Effect>) -> Self {
        self.effects.extend(effects);
        self
    }
}

/// Errors that can occur during transition
#[derive(Debug, Error)]
pub enum TransitionError {
    #[error("Session is {state}, cannot accept a message until it is idle")]
    Busy { state: SessionState },
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
}

/// Pure transition function
///
/// Given the same inputs it always produces the same outputs, with no I/O.
pub fn transition(
    state: &LoopState,
    context: &SessionContext,
    event: Event,
) -> Result<TransitionResult, TransitionError> {
    match (state, event) {
        // ============================================================
        // User messages
        // ============================================================
        (LoopState::Idle, Event::UserMessage { text }) => {
            Ok(TransitionResult::new(LoopState::Requesting { attempt: 1, turn: 1 })
                .with_effect(Effect::Record(Message::user(text.clone())))
                .with_effect(Effect::emit_user(text))
                .with_effect(Effect::RequestProvider))
        }

        // One loop per session; a second message is rejected, not queued
        (state, Event::UserMessage { .. }) => Err(TransitionError::Busy {
            state: state.public(),
        }),

        // ============================================================
        // Provider responses
        // ============================================================
        (LoopState::Requesting { turn, .. }, Event::ProviderResponse { response }) => {
            let record = Effect::Record(Message::assistant(
                response.joined_text(),
                response.tool_calls.clone(),
            ));
            let segments = response
                .segments
                .into_iter()
                .filter(|s| !s.is_empty())
                .map(Effect::emit_assistant);

            let mut calls = response.tool_calls.into_iter();
            let result = match calls.next() {
                None => TransitionResult::new(LoopState::Idle)
                    .with_effect(record)
                    .with_effects(segments)
                    .with_effect(Effect::NotifyIdle),
                Some(first) => TransitionResult::new(LoopState::AwaitingApproval {
                    current: first.clone(),
                    remaining: calls.collect(),
                    turn: *turn,
                })
                .with_effect(record)
                .with_effects(segments)
                .with_effect(Effect::RequestApproval { call: first }),
            };
            Ok(result)
        }

        // ============================================================
        // Provider errors and retry
        // ============================================================
        (LoopState::Requesting { attempt, turn }, Event::ProviderError { error, attempt: failed })
            if failed == *attempt
                && error.kind.is_retryable()
                && *attempt < context.max_attempts =>
        {
            let next = attempt + 1;
            let delay = retry_delay(next, error.retry_after);
            Ok(TransitionResult::new(LoopState::Requesting {
                attempt: next,
                turn: *turn,
            })
            .with_effect(Effect::ScheduleRetry {
                delay,
                attempt: next,
            }))
        }

        (LoopState::Requesting { attempt, .. }, Event::ProviderError { error, attempt: failed })
            if failed == *attempt =>
        {
            Ok(fail(SessionFailure::provider(&error, *attempt)))
        }

        (LoopState::Requesting { attempt, turn }, Event::RetryTimeout { attempt: due })
            if due == *attempt =>
        {
            Ok(TransitionResult::new(LoopState::Requesting {
                attempt: *attempt,
                turn: *turn,
            })
            .with_effect(Effect::RequestProvider))
        }

        // ============================================================
        // Approval
        // ============================================================
        (
            LoopState::AwaitingApproval {
                current,
                remaining,
                turn,
            },
            Event::ApprovalResolved { call_id, decision },
        ) if call_id == current.id => match decision {
            ApprovalDecision::Approved => Ok(TransitionResult::new(LoopState::ExecutingTool {
                current: current.clone(),
                remaining: remaining.clone(),
                turn: *turn,
            })
            .with_effect(Effect::ExecuteTool {
                call: current.clone(),
            })),
            ApprovalDecision::Rejected { reason } => Ok(advance(remaining, *turn, context)
                .prepend([
                    Effect::Record(Message::tool_result(
                        call_id,
                        rejection_content(reason.as_deref()),
                        true,
                    )),
                    Effect::emit_assistant(format!("Tool call rejected: {}", current.description)),
                ])),
        },

        // ============================================================
        // Tool execution
        // ============================================================
        (
            LoopState::ExecutingTool {
                current,
                remaining,
                turn,
            },
            Event::ToolComplete {
                call_id,
                content,
                is_error,
            },
        ) if call_id == current.id => Ok(advance(remaining, *turn, context)
            .prepend([Effect::Record(Message::tool_result(call_id, content, is_error))])),

        // ============================================================
        // Invalid transitions
        // ============================================================
        (state, event) => Err(TransitionError::InvalidTransition(format!(
            "No transition from {} with event {}",
            state.name(),
            event.name()
        ))),
    }
}

impl TransitionResult {
    fn prepend(mut self, effects: impl IntoIterator<Item = Effect>) -> Self {
        let mut all: Vec<Effect> = effects.into_iter().collect();
        all.append(&mut self.effects);
        self.effects = all;
        self
    }
}

/// Gate the next queued tool call, or go back to the provider.
fn advance(remaining: &[ToolCallRequest], turn: u32, context: &SessionContext) -> TransitionResult {
    if let Some((next, rest)) = remaining.split_first() {
        return TransitionResult::new(LoopState::AwaitingApproval {
            current: next.clone(),
            remaining: rest.to_vec(),
            turn,
        })
        .with_effect(Effect::RequestApproval { call: next.clone() });
    }

    if turn >= context.max_turns {
        return fail(SessionFailure::turn_limit(context.max_turns));
    }

    TransitionResult::new(LoopState::Requesting {
        attempt: 1,
        turn: turn + 1,
    })
    .with_effect(Effect::RequestProvider)
}

/// End the turn with a failure notice.
fn fail(failure: SessionFailure) -> TransitionResult {
    TransitionResult::new(LoopState::Idle)
        .with_effect(Effect::emit_assistant(failure.notice()))
        .with_effect(Effect::ReportFailure(failure))
        .with_effect(Effect::NotifyIdle)
}

fn rejection_content(reason: Option<&str>) -> String {
    match reason {
        Some(reason) if !reason.is_empty() => format!("rejected by user: {reason}"),
        _ => "rejected by user".to_string(),
    }
}

/// Exponential backoff: 1s, 2s, 4s ... capped at 30s.
/// A provider supplied `retry_after` wins when present.
fn retry_delay(attempt: u32, retry_after: Option<Duration>) -> Duration {
    let shift = attempt.saturating_sub(2).min(5);
    let backoff = Duration::from_secs(1 << shift);
    retry_after.unwrap_or(backoff).min(MAX_RETRY_DELAY)
}
