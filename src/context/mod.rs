// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! History maintenance hooks
//!
//! The orchestrator calls these at request start: pruning on every request,
//! dangling-call removal only when a persisted session is resumed.

pub mod pruner;
pub mod sanitizer;

pub use pruner::{ToolOutputPruner, PRUNE_PLACEHOLDER};
pub use sanitizer::DanglingCallSanitizer;

use crate::config::settings::CompactionConfig;
use crate::llm::message::Message;

/// Compaction and sanitization contract
pub trait ContextHooks: Send + Sync {
    /// Replace old tool output with placeholders. Returns tokens reclaimed.
    fn prune_old_outputs(&self, history: &mut Vec<Message>) -> usize;

    /// Drop tool calls that never got a result.
    fn remove_dangling_tool_calls(&self, history: Vec<Message>) -> Vec<Message>;
}

/// Hooks that leave history untouched
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopContextHooks;

impl ContextHooks for NoopContextHooks {
    fn prune_old_outputs(&self, _history: &mut Vec<Message>) -> usize {
        0
    }

    fn remove_dangling_tool_calls(&self, history: Vec<Message>) -> Vec<Message> {
        history
    }
}

/// Default hooks: [`ToolOutputPruner`] plus [`DanglingCallSanitizer`]
#[derive(Debug, Clone, Default)]
pub struct DefaultContextHooks {
    pruner: Option<ToolOutputPruner>,
}

impl DefaultContextHooks {
    pub fn new(config: &CompactionConfig) -> Self {
        Self {
            pruner: config.enabled.then(|| ToolOutputPruner::from(config)),
        }
    }
}

impl ContextHooks for DefaultContextHooks {
    fn prune_old_outputs(&self, history: &mut Vec<Message>) -> usize {
        self.pruner
            .as_ref()
            .map(|pruner| pruner.prune(history))
            .unwrap_or(0)
    }

    fn remove_dangling_tool_calls(&self, history: Vec<Message>) -> Vec<Message> {
        DanglingCallSanitizer.sanitize(history)
    }
}
