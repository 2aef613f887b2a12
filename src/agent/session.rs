// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Per-request session state
//!
//! Owns the message history, the tool-call registry, the state machine and
//! usage totals. Only the orchestrating task touches a session; worker tasks
//! never see it.

use uuid::Uuid;

use crate::agent::state::StateMachine;
use crate::config::settings::ModelPricing;
use crate::llm::message::Message;
use crate::llm::transport::Usage;
use crate::tools::registry::ToolCallRegistry;

const TURN_PREVIEW_CHARS: usize = 60;

/// Accumulated token usage and cost
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct UsageTotals {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    /// Model calls that reported usage
    pub calls: u32,
    /// Cost in the pricing table's currency; zero without pricing
    pub cost: f64,
}

impl UsageTotals {
    pub fn total_tokens(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// Session for one or more requests against the same history
#[derive(Debug)]
pub struct RequestSession {
    pub id: Uuid,
    model: String,
    history: Vec<Message>,
    registry: ToolCallRegistry,
    state: StateMachine,
    usage: UsageTotals,
    last_usage: Option<Usage>,
    pricing: Option<ModelPricing>,
    task: String,
    turns: Vec<String>,
    resumed: bool,
}

impl RequestSession {
    pub fn new(model: impl Into<String>, pricing: Option<ModelPricing>) -> Self {
        Self {
            id: Uuid::new_v4(),
            model: model.into(),
            history: Vec::new(),
            registry: ToolCallRegistry::new(),
            state: StateMachine::new(),
            usage: UsageTotals::default(),
            last_usage: None,
            pricing,
            task: String::new(),
            turns: Vec::new(),
            resumed: false,
        }
    }

    /// Continue a persisted session. Dangling tool calls are removed when the
    /// next request starts.
    pub fn resume(
        model: impl Into<String>,
        pricing: Option<ModelPricing>,
        history: Vec<Message>,
    ) -> Self {
        let mut session = Self::new(model, pricing);
        session.history = history;
        session.resumed = true;
        session
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn into_history(self) -> Vec<Message> {
        self.history
    }

    pub(crate) fn history_mut(&mut self) -> &mut Vec<Message> {
        &mut self.history
    }

    /// Hand the history to `f` and store what it returns.
    pub(crate) fn replace_history<F>(&mut self, f: F)
    where
        F: FnOnce(Vec<Message>) -> Vec<Message>,
    {
        let history = std::mem::take(&mut self.history);
        self.history = f(history);
    }

    /// Append a message. History is never reordered.
    pub fn push(&mut self, message: Message) {
        self.history.push(message);
    }

    pub fn registry(&self) -> &ToolCallRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ToolCallRegistry {
        &mut self.registry
    }

    pub fn state(&self) -> &StateMachine {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut StateMachine {
        &mut self.state
    }

    /// True once, for a resumed session that has not run a request yet.
    pub(crate) fn take_resumed(&mut self) -> bool {
        std::mem::take(&mut self.resumed)
    }

    /// Add usage reported by one model call.
    pub fn record_usage(&mut self, usage: Usage) {
        self.usage.prompt_tokens += u64::from(usage.prompt_tokens);
        self.usage.completion_tokens += u64::from(usage.completion_tokens);
        self.usage.calls += 1;
        if let Some(pricing) = &self.pricing {
            self.usage.cost += pricing.cost(usage.prompt_tokens, usage.completion_tokens);
        }
        self.last_usage = Some(usage);
    }

    pub fn usage(&self) -> UsageTotals {
        self.usage
    }

    /// Usage of the most recent model call
    pub fn last_usage(&self) -> Option<Usage> {
        self.last_usage
    }

    /// Rough size of the history in tokens.
    pub fn estimated_context_tokens(&self) -> usize {
        self.history.iter().map(Message::estimated_tokens).sum()
    }

    /// Start a new request: append the instruction and reset per-request state.
    pub fn begin_request(&mut self, instruction: impl Into<String>) {
        let instruction = instruction.into();
        self.task = instruction.clone();
        self.turns.clear();
        self.state.reset();
        self.history.push(Message::user_request(instruction));
    }

    /// Instruction of the current request. Guidance messages are not tasks.
    pub fn current_task(&self) -> &str {
        &self.task
    }

    /// One-line summary of a finished turn, kept for error reports.
    pub fn record_turn(&mut self, iteration: u32, tools: &[String], text: &str) {
        let summary = if !tools.is_empty() {
            format!("#{} tools: {}", iteration, tools.join(", "))
        } else if text.trim().is_empty() {
            format!("#{} empty response", iteration)
        } else {
            format!("#{} text: {}", iteration, preview(text))
        };
        self.turns.push(summary);
    }

    /// The last `limit` turn summaries, oldest first.
    pub fn recent_turns(&self, limit: usize) -> Vec<String> {
        let start = self.turns.len().saturating_sub(limit);
        self.turns[start..].to_vec()
    }
}

fn preview(text: &str) -> String {
    let line = text.trim().lines().next().unwrap_or("");
    if line.chars().count() > TURN_PREVIEW_CHARS {
        let head: String = line.chars().take(TURN_PREVIEW_CHARS).collect();
        format!("{}...", head)
    } else {
        line.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::state::AgentState;

    #[test]
    fn test_begin_request_appends_instruction() {
        let mut session = RequestSession::new("test-model", None);
        session.begin_request("fix the build");
        assert_eq!(session.history().len(), 1);
        assert!(session.history()[0].is_user_request());
        assert_eq!(session.current_task(), "fix the build");
        assert_eq!(session.state().current(), AgentState::UserInput);
    }

    #[test]
    fn test_usage_and_cost() {
        let pricing = ModelPricing {
            input_per_1k: 1.0,
            output_per_1k: 2.0,
        };
        let mut session = RequestSession::new("test-model", Some(pricing));
        session.record_usage(Usage {
            prompt_tokens: 1000,
            completion_tokens: 500,
        });
        session.record_usage(Usage {
            prompt_tokens: 2000,
            completion_tokens: 0,
        });

        let usage = session.usage();
        assert_eq!(usage.prompt_tokens, 3000);
        assert_eq!(usage.completion_tokens, 500);
        assert_eq!(usage.total_tokens(), 3500);
        assert_eq!(usage.calls, 2);
        assert!((usage.cost - 4.0).abs() < 1e-9);
        assert_eq!(session.last_usage().map(|u| u.prompt_tokens), Some(2000));
    }

    #[test]
    fn test_usage_without_pricing_costs_nothing() {
        let mut session = RequestSession::new("test-model", None);
        session.record_usage(Usage {
            prompt_tokens: 10,
            completion_tokens: 10,
        });
        assert_eq!(session.usage().cost, 0.0);
    }

    #[test]
    fn test_estimated_context_tokens() {
        let mut session = RequestSession::new("test-model", None);
        session.push(Message::user_request("abcdefgh"));
        session.push(Message::tool_return("c1", "grep", "abcd"));
        assert_eq!(session.estimated_context_tokens(), 3);
    }

    #[test]
    fn test_recent_turns() {
        let mut session = RequestSession::new("test-model", None);
        session.record_turn(1, &["read_file".to_string()], "");
        session.record_turn(2, &[], "");
        session.record_turn(3, &[], &format!("{}\nsecond line", "y".repeat(80)));

        let turns = session.recent_turns(2);
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0], "#2 empty response");
        assert_eq!(turns[1], format!("#3 text: {}...", "y".repeat(60)));
        assert_eq!(session.recent_turns(10)[0], "#1 tools: read_file");
    }

    #[test]
    fn test_resumed_flag_is_taken_once() {
        let mut session =
            RequestSession::resume("test-model", None, vec![Message::user_request("earlier")]);
        assert!(session.take_resumed());
        assert!(!session.take_resumed());
        assert_eq!(session.history().len(), 1);
    }
}
