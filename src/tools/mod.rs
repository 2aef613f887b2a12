// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Tool calls and their execution
//!
//! Tool implementations live outside this crate and are reached through
//! [`ToolInvoker`]. This module owns the call model, the classification
//! table, the retrying executor, fallback parsing and the authorization gate.

pub mod authorization;
pub mod catalog;
pub mod executor;
pub mod parsing;
pub mod registry;
pub mod retry;

pub use authorization::*;
pub use catalog::*;
pub use executor::*;
pub use registry::*;
pub use retry::*;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use crate::error::Result;

/// How a tool call may be scheduled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ToolCategory {
    /// Safe to run concurrently with other reads
    ReadOnly,
    /// Mutates the filesystem
    Write,
    /// Runs commands
    Execute,
    /// Hands work to a sub-agent
    Delegated,
}

impl ToolCategory {
    /// Write and execute calls run strictly one at a time.
    pub fn is_mutating(self) -> bool {
        matches!(self, ToolCategory::Write | ToolCategory::Execute)
    }
}

/// A tool invocation requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub args: Value,
    pub category: ToolCategory,
}

impl ToolCall {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        args: Value,
        category: ToolCategory,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            args,
            category,
        }
    }
}

/// Async tool implementation boundary
///
/// No thread-safety is assumed beyond `Send + Sync`; the executor never runs
/// two mutating calls at once.
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    async fn invoke(&self, name: &str, args: &Value) -> Result<String>;
}

/// What happened to a call that did not fail the batch
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutcome {
    /// Tool output
    Success(String),
    /// Error text the model should see and correct itself from
    SelfCorrect(String),
    /// Authorization gate denied the call
    Rejected(String),
}

impl ToolOutcome {
    pub fn text(&self) -> &str {
        match self {
            ToolOutcome::Success(text)
            | ToolOutcome::SelfCorrect(text)
            | ToolOutcome::Rejected(text) => text,
        }
    }

    pub fn is_error(&self) -> bool {
        !matches!(self, ToolOutcome::Success(_))
    }
}

/// Result of one call, ready to be folded into history
#[derive(Debug, Clone)]
pub struct CallResult {
    pub call: ToolCall,
    pub outcome: ToolOutcome,
    /// Invocations made, including the successful one
    pub attempts: u32,
    /// Wall time spent on this call, backoff included
    pub duration: Duration,
}

impl CallResult {
    /// Result for a call the gate rejected; nothing was invoked.
    pub fn rejected(call: ToolCall, message: impl Into<String>) -> Self {
        Self {
            call,
            outcome: ToolOutcome::Rejected(message.into()),
            attempts: 0,
            duration: Duration::ZERO,
        }
    }
}
