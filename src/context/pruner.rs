// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Old tool output pruning
//!
//! Scans history newest to oldest. Tool output inside the newest
//! `protect_tokens` is kept; everything older is replaced with a placeholder,
//! but only when that reclaims at least `minimum_savings` tokens.

use crate::config::settings::CompactionConfig;
use crate::llm::message::{estimate_tokens, Message, MessageKind};

/// Content left in place of pruned output
pub const PRUNE_PLACEHOLDER: &str = "[Old tool result content cleared]";

#[derive(Debug, Clone)]
pub struct ToolOutputPruner {
    pub protect_tokens: usize,
    pub minimum_savings: usize,
    pub min_user_turns: usize,
}

impl Default for ToolOutputPruner {
    fn default() -> Self {
        Self::from(&CompactionConfig::default())
    }
}

impl From<&CompactionConfig> for ToolOutputPruner {
    fn from(config: &CompactionConfig) -> Self {
        Self {
            protect_tokens: config.protect_tokens,
            minimum_savings: config.minimum_savings,
            min_user_turns: config.min_user_turns,
        }
    }
}

impl ToolOutputPruner {
    /// Prune `history` in place and return the tokens reclaimed.
    pub fn prune(&self, history: &mut [Message]) -> usize {
        let user_turns = history.iter().filter(|m| m.is_user_request()).count();
        if user_turns < self.min_user_turns {
            return 0;
        }

        // (index, tokens), newest first
        let tool_returns: Vec<(usize, usize)> = history
            .iter()
            .enumerate()
            .rev()
            .filter_map(|(index, message)| match &message.kind {
                MessageKind::ToolReturn { content, .. } => Some((index, estimate_tokens(content))),
                _ => None,
            })
            .collect();

        let mut accumulated = 0;
        let mut boundary = None;
        for (pos, (_, tokens)) in tool_returns.iter().enumerate() {
            accumulated += tokens;
            if accumulated > self.protect_tokens {
                boundary = Some(pos);
                break;
            }
        }
        let Some(boundary) = boundary else {
            return 0;
        };

        let prunable = &tool_returns[boundary..];
        let prunable_tokens: usize = prunable.iter().map(|(_, tokens)| tokens).sum();
        if prunable_tokens < self.minimum_savings {
            return 0;
        }

        let placeholder_tokens = estimate_tokens(PRUNE_PLACEHOLDER);
        let mut reclaimed = 0;
        for (index, tokens) in prunable {
            let message = &history[*index];
            if message.text().as_deref() == Some(PRUNE_PLACEHOLDER) {
                continue;
            }
            if let Some(replaced) = message.with_replaced_tool_content(PRUNE_PLACEHOLDER) {
                history[*index] = replaced;
                reclaimed += tokens.saturating_sub(placeholder_tokens);
            }
        }

        tracing::debug!(
            target: "tack.context",
            pruned = prunable.len(),
            reclaimed,
            "Pruned old tool output"
        );
        reclaimed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pruner() -> ToolOutputPruner {
        ToolOutputPruner {
            protect_tokens: 100,
            minimum_savings: 50,
            min_user_turns: 2,
        }
    }

    /// `tokens` worth of output (4 chars per token)
    fn output(id: &str, tokens: usize) -> Message {
        Message::tool_return(id, "read_file", "x".repeat(tokens * 4))
    }

    #[test]
    fn test_prunes_old_outputs_beyond_protection() {
        let mut history = vec![
            Message::user_request("first"),
            output("c1", 80),
            output("c2", 80),
            Message::user_request("second"),
            output("c3", 80),
        ];
        // c3 (80) is protected; c2 crosses the boundary, so c2 and c1 go
        let reclaimed = pruner().prune(&mut history);
        let placeholder = estimate_tokens(PRUNE_PLACEHOLDER);
        assert_eq!(reclaimed, 2 * (80 - placeholder));
        assert_eq!(history[1].text().as_deref(), Some(PRUNE_PLACEHOLDER));
        assert_eq!(history[2].text().as_deref(), Some(PRUNE_PLACEHOLDER));
        assert_ne!(history[4].text().as_deref(), Some(PRUNE_PLACEHOLDER));
    }

    #[test]
    fn test_requires_min_user_turns() {
        let mut history = vec![
            Message::user_request("only"),
            output("c1", 500),
            output("c2", 500),
        ];
        assert_eq!(pruner().prune(&mut history), 0);
    }

    #[test]
    fn test_skips_when_savings_too_small() {
        let mut history = vec![
            Message::user_request("a"),
            Message::user_request("b"),
            output("c1", 10),
            output("c2", 95),
        ];
        // Boundary at c1 (105 > 100) but only 10 tokens prunable
        assert_eq!(pruner().prune(&mut history), 0);
    }

    #[test]
    fn test_already_pruned_is_not_counted_twice() {
        let mut history = vec![
            Message::user_request("a"),
            output("c1", 80),
            Message::user_request("b"),
            output("c2", 80),
            output("c3", 80),
        ];
        assert!(pruner().prune(&mut history) > 0);
        assert_eq!(pruner().prune(&mut history), 0);
    }

    #[test]
    fn test_defaults() {
        let pruner = ToolOutputPruner::default();
        assert_eq!(pruner.protect_tokens, 40_000);
        assert_eq!(pruner.minimum_savings, 20_000);
        assert_eq!(pruner.min_user_turns, 2);
    }
}
