// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use tack::agent::state::{transition, AgentState, InvalidTransitionError, StateMachine};

const ALLOWED: [(AgentState, AgentState); 5] = [
    (AgentState::UserInput, AgentState::Assistant),
    (AgentState::Assistant, AgentState::ToolExecution),
    (AgentState::Assistant, AgentState::Response),
    (AgentState::ToolExecution, AgentState::Response),
    (AgentState::Response, AgentState::Assistant),
];

#[test]
fn test_transition_table_is_exhaustive() {
    let mut allowed = 0;
    let mut rejected = 0;

    for from in AgentState::ALL {
        for to in AgentState::ALL {
            let result = transition(from, to);
            if ALLOWED.contains(&(from, to)) {
                assert_eq!(result, Ok(to), "{} -> {} should be allowed", from, to);
                allowed += 1;
            } else {
                assert_eq!(
                    result,
                    Err(InvalidTransitionError { from, to }),
                    "{} -> {} should be rejected",
                    from,
                    to
                );
                rejected += 1;
            }
        }
    }

    assert_eq!(allowed, 5);
    assert_eq!(rejected, 11);
}

#[test]
fn test_transition_has_no_side_effects() {
    let current = AgentState::Assistant;
    let next = transition(current, AgentState::Response).unwrap();
    assert_eq!(current, AgentState::Assistant);
    assert_eq!(next, AgentState::Response);
}

#[test]
fn test_state_machine_rejects_without_moving() {
    let mut machine = StateMachine::new();
    let err = machine.transition_to(AgentState::ToolExecution).unwrap_err();
    assert_eq!(err.from, AgentState::UserInput);
    assert_eq!(err.to, AgentState::ToolExecution);
    assert_eq!(machine.current(), AgentState::UserInput);
}

#[test]
fn test_full_turn_cycle() {
    let mut machine = StateMachine::new();
    for target in [
        AgentState::Assistant,
        AgentState::ToolExecution,
        AgentState::Response,
        AgentState::Assistant,
        AgentState::Response,
    ] {
        machine.transition_to(target).unwrap();
    }
    assert_eq!(machine.current(), AgentState::Response);
}

#[test]
fn test_error_names_both_states() {
    let err = transition(AgentState::Response, AgentState::UserInput).unwrap_err();
    let text = err.to_string();
    assert!(text.contains("RESPONSE"));
    assert!(text.contains("USER_INPUT"));
}
