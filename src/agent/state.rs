// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Agent state machine
//!
//! Gates the legal state changes of one in-flight request:
//!
//! ```text
//! USER_INPUT -> ASSISTANT -> TOOL_EXECUTION -> RESPONSE
//!                   |                             |
//!                   +---------> RESPONSE <--------+
//!                                  |
//!                                  +--> ASSISTANT (next turn)
//! ```
//!
//! A request owns exactly one [`StateMachine`] and mutates it from a single
//! task, so there is no locking here. Sharing an instance across requests
//! would need a `Mutex` around it.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle state of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentState {
    UserInput,
    Assistant,
    ToolExecution,
    Response,
}

impl AgentState {
    pub const ALL: [AgentState; 4] = [
        AgentState::UserInput,
        AgentState::Assistant,
        AgentState::ToolExecution,
        AgentState::Response,
    ];

    /// States reachable in one step from `self`.
    pub fn successors(self) -> &'static [AgentState] {
        match self {
            AgentState::UserInput => &[AgentState::Assistant],
            AgentState::Assistant => &[AgentState::ToolExecution, AgentState::Response],
            AgentState::ToolExecution => &[AgentState::Response],
            AgentState::Response => &[AgentState::Assistant],
        }
    }

    pub fn can_transition_to(self, target: AgentState) -> bool {
        self.successors().contains(&target)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AgentState::UserInput => "USER_INPUT",
            AgentState::Assistant => "ASSISTANT",
            AgentState::ToolExecution => "TOOL_EXECUTION",
            AgentState::Response => "RESPONSE",
        }
    }
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raised when a transition is not in the allowed table
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Invalid state transition: {from} -> {to}")]
pub struct InvalidTransitionError {
    pub from: AgentState,
    pub to: AgentState,
}

/// Validate a transition without storing it.
pub fn transition(
    current: AgentState,
    target: AgentState,
) -> std::result::Result<AgentState, InvalidTransitionError> {
    if current.can_transition_to(target) {
        Ok(target)
    } else {
        Err(InvalidTransitionError {
            from: current,
            to: target,
        })
    }
}

/// Per-request state holder
#[derive(Debug, Clone)]
pub struct StateMachine {
    state: AgentState,
    completion_detected: bool,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            state: AgentState::UserInput,
            completion_detected: false,
        }
    }

    pub fn current(&self) -> AgentState {
        self.state
    }

    /// Move to `target`, rejecting anything outside the table.
    pub fn transition_to(
        &mut self,
        target: AgentState,
    ) -> std::result::Result<AgentState, InvalidTransitionError> {
        let next = transition(self.state, target)?;
        tracing::trace!(
            target: "tack.agent.state",
            from = %self.state,
            to = %next,
            "state transition"
        );
        self.state = next;
        Ok(next)
    }

    pub fn can_transition_to(&self, target: AgentState) -> bool {
        self.state.can_transition_to(target)
    }

    /// Mark that the model declared the task complete.
    pub fn set_completion_detected(&mut self) {
        self.completion_detected = true;
    }

    /// Completed means RESPONSE with an accepted completion marker.
    pub fn is_completed(&self) -> bool {
        self.state == AgentState::Response && self.completion_detected
    }

    pub fn reset(&mut self) {
        self.state = AgentState::UserInput;
        self.completion_detected = false;
    }
}
