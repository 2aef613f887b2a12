// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Corrective guidance appended to history when the model stalls

use std::fmt;

use crate::agent::patterns::COMPLETION_MARKER;
use crate::tools::registry::CallRecord;

/// Recent calls listed in guidance text
pub const RECENT_TOOL_LIMIT: usize = 3;

const TASK_PREVIEW_CHARS: usize = 200;

/// Why guidance was injected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuidanceKind {
    /// No text and no tool calls
    EmptyResponse,
    /// Text cut off mid-sentence
    Truncated,
    /// Announced an action without calling a tool
    IntentionWithoutAction,
    /// Too many turns without tool use
    ForceAction,
}

impl GuidanceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            GuidanceKind::EmptyResponse => "empty_response",
            GuidanceKind::Truncated => "truncated",
            GuidanceKind::IntentionWithoutAction => "intention_without_action",
            GuidanceKind::ForceAction => "force_action",
        }
    }
}

impl fmt::Display for GuidanceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// "Recent tools: grep('x'), read_file('a.rs')" or "No tools used yet".
pub fn recent_tools_context(recent: &[CallRecord]) -> String {
    if recent.is_empty() {
        return "No tools used yet".to_string();
    }
    let start = recent.len().saturating_sub(RECENT_TOOL_LIMIT);
    let tools: Vec<String> = recent[start..].iter().map(CallRecord::summary).collect();
    format!("Recent tools: {}", tools.join(", "))
}

fn task_preview(task: &str) -> String {
    if task.chars().count() > TASK_PREVIEW_CHARS {
        let head: String = task.chars().take(TASK_PREVIEW_CHARS).collect();
        format!("{}...", head)
    } else {
        task.to_string()
    }
}

/// Guidance after an empty or intention-only response.
///
/// Wording escalates with `attempt` (1-based).
pub fn empty_response(task: &str, reason: GuidanceKind, recent: &[CallRecord], attempt: u32) -> String {
    let problem = match reason {
        GuidanceKind::IntentionWithoutAction => {
            "Your response described an action but did not call any tool"
        }
        _ => "Your response was empty",
    };
    let urgency = if attempt >= 2 {
        format!(
            "\n\nThis is attempt {}. Another response without a tool call or a final answer will end the request.",
            attempt
        )
    } else {
        String::new()
    };

    format!(
        "{problem}. Let's troubleshoot and try again.\n\n\
         Task: {task}\n\
         {tools}\n\
         Attempt: {attempt}\n\n\
         Please take one of these specific actions:\n\n\
         1. Search yielded no results? Try alternative search terms or broader patterns.\n\
         2. Found what you need? Give your final answer and end with {marker} on its own line.\n\
         3. Encountering a blocker? Explain the specific issue preventing progress.\n\
         4. Need more context? Use list_dir or expand your search scope.\n\n\
         If you say you will do something, do it in the same response by calling the tool.{urgency}",
        problem = problem,
        task = task_preview(task),
        tools = recent_tools_context(recent),
        attempt = attempt,
        marker = COMPLETION_MARKER,
        urgency = urgency,
    )
}

/// Guidance after a response that was cut off.
pub fn truncated() -> String {
    "Your previous response was cut off mid-sentence. Continue exactly where you left off. \
     Do not repeat what you already wrote."
        .to_string()
}

/// Guidance after `streak` turns without tool use.
pub fn force_action(streak: u32, iteration: u32, recent: &[CallRecord]) -> String {
    format!(
        "You have gone {streak} turns without using a tool (iteration {iteration}).\n\
         {tools}\n\n\
         Take a concrete action now: call a tool that moves the task forward. \
         If the task is already done, give your final answer and end with {marker} on its own line.",
        streak = streak,
        iteration = iteration,
        tools = recent_tools_context(recent),
        marker = COMPLETION_MARKER,
    )
}
