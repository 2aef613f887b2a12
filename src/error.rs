// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Error types for Tack
//!
//! `TackError` covers every failure the orchestrator can observe. Fatal
//! request-level failures are wrapped in [`RequestFailure`], which records
//! the phase that failed and the last few turns of context.

use std::fmt;

use thiserror::Error;

use crate::agent::state::InvalidTransitionError;

/// Main error type for Tack operations
#[derive(Error, Debug)]
pub enum TackError {
    /// The user aborted the request (Ctrl+C, Esc)
    #[error("Request aborted by user")]
    UserAbort,

    /// Error text that should be returned to the model as feedback
    #[error("Model retry: {0}")]
    ModelRetry(String),

    /// Cooperative cancellation of in-flight work
    #[error("Operation cancelled")]
    Cancelled,

    /// Tool execution errors
    #[error("Tool '{tool}' failed: {message}")]
    ToolExecution { tool: String, message: String },

    /// A tool exceeded its declared timeout
    #[error("Tool '{tool}' timed out after {secs}s")]
    ToolTimeout { tool: String, secs: u64 },

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid input or tool arguments
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The whole request ran longer than the configured limit
    #[error("Request exceeded global timeout of {secs}s")]
    GlobalRequestTimeout { secs: u64 },

    /// Illegal agent state change (programming error)
    #[error(transparent)]
    InvalidStateTransition(#[from] InvalidTransitionError),

    /// The model kept answering with nothing actionable
    #[error("Model returned {attempts} consecutive empty responses")]
    EmptyResponse { attempts: u32 },

    /// Model transport errors
    #[error("Model error: {0}")]
    Model(String),

    /// Authorization gate errors
    #[error("Authorization error: {0}")]
    Authorization(String),
}

impl TackError {
    /// Shorthand for a tool execution failure.
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        TackError::ToolExecution {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// True for a user-initiated abort.
    pub fn is_user_abort(&self) -> bool {
        matches!(self, TackError::UserAbort)
    }
}

/// Result type alias for Tack operations
pub type Result<T> = std::result::Result<T, TackError>;

/// Which part of the request lifecycle produced a fatal error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePhase {
    /// Pulling nodes from the model transport
    ModelCall,
    /// Running tools
    ToolExecution,
    /// Asking the authorization gate
    Authorization,
    /// Loop bookkeeping (state machine, recovery budget, timeout)
    Orchestration,
}

impl fmt::Display for FailurePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FailurePhase::ModelCall => "model call",
            FailurePhase::ToolExecution => "tool execution",
            FailurePhase::Authorization => "authorization",
            FailurePhase::Orchestration => "orchestration",
        };
        f.write_str(label)
    }
}

/// A fatal request failure, reported with its phase and recent context
#[derive(Debug)]
pub struct RequestFailure {
    pub phase: FailurePhase,
    /// Iteration during which the failure happened
    pub iteration: u32,
    pub error: TackError,
    /// One-line summaries of the last few turns
    pub recent_turns: Vec<String>,
}

impl RequestFailure {
    pub fn new(phase: FailurePhase, iteration: u32, error: TackError) -> Self {
        Self {
            phase,
            iteration,
            error,
            recent_turns: Vec::new(),
        }
    }

    pub fn with_recent_turns(mut self, turns: Vec<String>) -> Self {
        self.recent_turns = turns;
        self
    }

    pub fn is_user_abort(&self) -> bool {
        self.error.is_user_abort()
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self.error, TackError::GlobalRequestTimeout { .. })
    }
}

impl fmt::Display for RequestFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} failed at iteration {}: {}",
            self.phase, self.iteration, self.error
        )?;
        if !self.recent_turns.is_empty() {
            write!(f, "\nRecent turns:")?;
            for turn in &self.recent_turns {
                write!(f, "\n  - {}", turn)?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for RequestFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}
