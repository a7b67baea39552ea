//! Property-based tests for the state machine
//!
//! These tests verify key invariants hold across all possible inputs.

use super::transition::*;
use super::*;
use crate::approval::ApprovalDecision;
use crate::config::SessionOptions;
use crate::conversation::{Message, ToolCallRequest, TranscriptSource};
use crate::error::ProviderError;
use crate::provider::ProviderResponse;
use proptest::prelude::*;

// ============================================================================
// Test Helpers
// ============================================================================

fn test_context() -> SessionContext {
    SessionContext::new("test-session", &SessionOptions::default())
}

fn pending_work(effects: &[Effect]) -> usize {
    effects.iter().filter(|e| e.is_pending_work()).count()
}

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_tool_call() -> impl Strategy<Value = ToolCallRequest> {
    ("[a-z]{8}", "[a-z_]{1,12}", "[a-zA-Z ]{0,30}").prop_map(|(id, name, justification)| {
        ToolCallRequest::new(id, name.clone(), name, justification)
    })
}

fn arb_response() -> impl Strategy<Value = ProviderResponse> {
    (
        proptest::collection::vec("[a-zA-Z ]{0,20}", 0..4),
        proptest::collection::vec(arb_tool_call(), 0..4),
    )
        .prop_map(|(segments, tool_calls)| ProviderResponse {
            segments,
            tool_calls,
            ..ProviderResponse::default()
        })
}

fn arb_provider_error() -> impl Strategy<Value = ProviderError> {
    prop_oneof![
        Just(ProviderError::network("connection reset")),
        Just(ProviderError::rate_limit("slow down")),
        Just(ProviderError::server_error("502")),
        Just(ProviderError::auth("bad key")),
        Just(ProviderError::invalid_request("bad request")),
        Just(ProviderError::unknown("???")),
    ]
}

fn arb_decision() -> impl Strategy<Value = ApprovalDecision> {
    prop_oneof![
        Just(ApprovalDecision::Approved),
        Just(ApprovalDecision::Rejected { reason: None }),
        "[a-z ]{1,20}".prop_map(|r| ApprovalDecision::Rejected { reason: Some(r) }),
    ]
}

fn arb_requesting_state() -> impl Strategy<Value = LoopState> {
    (1u32..4, 1u32..50).prop_map(|(attempt, turn)| LoopState::Requesting { attempt, turn })
}

fn arb_awaiting_state() -> impl Strategy<Value = LoopState> {
    (
        arb_tool_call(),
        proptest::collection::vec(arb_tool_call(), 0..3),
        1u32..50,
    )
        .prop_map(|(current, remaining, turn)| LoopState::AwaitingApproval {
            current,
            remaining,
            turn,
        })
}

fn arb_executing_state() -> impl Strategy<Value = LoopState> {
    (
        arb_tool_call(),
        proptest::collection::vec(arb_tool_call(), 0..3),
        1u32..50,
    )
        .prop_map(|(current, remaining, turn)| LoopState::ExecutingTool {
            current,
            remaining,
            turn,
        })
}

fn arb_busy_state() -> impl Strategy<Value = LoopState> {
    prop_oneof![
        arb_requesting_state(),
        arb_awaiting_state(),
        arb_executing_state(),
    ]
}

fn arb_state() -> impl Strategy<Value = LoopState> {
    prop_oneof![Just(LoopState::Idle), arb_busy_state()]
}

fn arb_event() -> impl Strategy<Value = Event> {
    prop_oneof![
        "[a-zA-Z ]{1,20}".prop_map(|text| Event::UserMessage { text }),
        arb_response().prop_map(|response| Event::ProviderResponse { response }),
        (arb_provider_error(), 1u32..4)
            .prop_map(|(error, attempt)| Event::ProviderError { error, attempt }),
        (1u32..4).prop_map(|attempt| Event::RetryTimeout { attempt }),
        ("[a-z]{8}", arb_decision())
            .prop_map(|(call_id, decision)| Event::ApprovalResolved { call_id, decision }),
        ("[a-z]{8}", "[a-z ]{0,20}", any::<bool>()).prop_map(|(call_id, content, is_error)| {
            Event::ToolComplete {
                call_id,
                content,
                is_error,
            }
        }),
    ]
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    /// A busy session rejects new messages without producing effects
    #[test]
    fn busy_states_reject_messages(state in arb_busy_state(), text in "[a-zA-Z ]{1,20}") {
        let result = transition(&state, &test_context(), Event::UserMessage { text });
        match result {
            Err(TransitionError::Busy { state: reported }) => prop_assert_eq!(reported, state.public()),
            other => prop_assert!(false, "expected Busy, got {:?}", other),
        }
    }

    /// The user transcript is emitted before any provider work starts
    #[test]
    fn user_message_is_echoed_first(text in "[a-zA-Z ]{1,40}") {
        let result = transition(&LoopState::Idle, &test_context(), Event::UserMessage { text: text.clone() })
            .unwrap();
        let first_emit = result.effects.iter().position(|e| matches!(e, Effect::Emit(_)));
        let request = result.effects.iter().position(|e| matches!(e, Effect::RequestProvider));
        prop_assert!(first_emit < request);
        prop_assert_eq!(
            &result.effects[first_emit.unwrap()],
            &Effect::Emit(crate::conversation::TranscriptEvent::user(text))
        );
    }

    /// Assistant segments are emitted in production order, empty ones skipped
    #[test]
    fn segments_emitted_in_order(state in arb_requesting_state(), response in arb_response()) {
        let expected: Vec<String> = response.segments.iter().filter(|s| !s.is_empty()).cloned().collect();
        let result = transition(&state, &test_context(), Event::ProviderResponse { response }).unwrap();
        let emitted: Vec<String> = result
            .effects
            .iter()
            .filter_map(|e| match e {
                Effect::Emit(t) => {
                    assert_eq!(t.source, TranscriptSource::Assistant);
                    Some(t.text.clone())
                }
                _ => None,
            })
            .collect();
        prop_assert_eq!(emitted, expected);
    }

    /// The idle notification fires exactly when the loop lands in Idle, and last
    #[test]
    fn idle_notified_iff_idle(state in arb_state(), event in arb_event()) {
        if let Ok(result) = transition(&state, &test_context(), event) {
            let idle_count = result.effects.iter().filter(|e| matches!(e, Effect::NotifyIdle)).count();
            if result.new_state.is_idle() {
                prop_assert_eq!(idle_count, 1);
                prop_assert_eq!(result.effects.last(), Some(&Effect::NotifyIdle));
            } else {
                prop_assert_eq!(idle_count, 0);
            }
        }
    }

    /// At most one piece of asynchronous work is started per transition,
    /// and a busy state always has exactly one outstanding
    #[test]
    fn one_outstanding_operation(state in arb_state(), event in arb_event()) {
        if let Ok(result) = transition(&state, &test_context(), event) {
            let work = pending_work(&result.effects);
            prop_assert!(work <= 1);
            let continues_same_request = matches!(
                (&state, &result.new_state),
                (LoopState::Requesting { .. }, LoopState::Requesting { .. })
            );
            if !result.new_state.is_idle() && !continues_same_request {
                prop_assert_eq!(work, 1, "no work started for {:?}", result.new_state);
            }
        }
    }

    /// A rejected tool is never executed and always answered
    #[test]
    fn rejection_never_executes(state in arb_awaiting_state(), reason in proptest::option::of("[a-z ]{1,20}")) {
        let LoopState::AwaitingApproval { current, .. } = &state else { unreachable!() };
        let call_id = current.id.clone();
        let result = transition(&state, &test_context(), Event::ApprovalResolved {
            call_id: call_id.clone(),
            decision: ApprovalDecision::Rejected { reason },
        }).unwrap();

        prop_assert!(
            !result.effects.iter().any(|e| matches!(e, Effect::ExecuteTool { .. })),
            "rejected call was executed: {:?}",
            result.effects
        );
        let answered = result.effects.iter().any(|e| matches!(
            e,
            Effect::Record(Message::ToolResult { call_id: id, is_error: true, .. }) if *id == call_id
        ));
        prop_assert!(answered);
    }

    /// Retries never exceed the attempt budget
    #[test]
    fn retries_bounded(attempt in 1u32..6, error in arb_provider_error()) {
        let context = test_context();
        let state = LoopState::Requesting { attempt, turn: 1 };
        if let Ok(result) = transition(&state, &context, Event::ProviderError { error, attempt }) {
            if let LoopState::Requesting { attempt: next, .. } = result.new_state {
                prop_assert!(next <= context.max_attempts);
                prop_assert_eq!(next, attempt + 1);
            }
        }
    }

    /// Tool events for a call that is not current are refused
    #[test]
    fn mismatched_call_ids_rejected(state in arb_awaiting_state(), decision in arb_decision()) {
        let result = transition(&state, &test_context(), Event::ApprovalResolved {
            call_id: "not-a-real-call-id".to_string(),
            decision,
        });
        prop_assert!(matches!(result, Err(TransitionError::InvalidTransition(_))), "expected InvalidTransition");
    }

    /// Transition is deterministic
    #[test]
    fn transition_is_pure(state in arb_state(), event in arb_event()) {
        let a = transition(&state, &test_context(), event.clone());
        let b = transition(&state, &test_context(), event);
        match (a, b) {
            (Ok(a), Ok(b)) => {
                prop_assert_eq!(a.new_state, b.new_state);
                prop_assert_eq!(a.effects, b.effects);
            }
            (Err(_), Err(_)) => {}
            _ => prop_assert!(false, "non-deterministic result"),
        }
    }
}
