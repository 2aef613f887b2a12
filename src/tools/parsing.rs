// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Fallback extraction of tool calls from plain text
//!
//! Some models write tool calls into their text instead of the structured
//! field. The strategies below are tried in order, most specific first, and
//! the first one that yields calls wins. The winning strategy name is always
//! reported; nothing is guessed silently.

use regex::Regex;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::OnceLock;
use uuid::Uuid;

/// A tool call recovered from text
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedToolCall {
    pub id: String,
    pub name: String,
    pub args: Value,
}

impl ParsedToolCall {
    fn new(name: impl Into<String>, args: Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            args,
        }
    }
}

/// A named parsing strategy
#[derive(Clone, Copy)]
pub struct Strategy {
    pub name: &'static str,
    pub try_parse: fn(&str) -> Option<Vec<ParsedToolCall>>,
}

impl fmt::Debug for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Strategy").field("name", &self.name).finish()
    }
}

/// Strategies in the order they are attempted
pub const STRATEGIES: &[Strategy] = &[
    Strategy {
        name: "qwen2_xml",
        try_parse: parse_qwen2_xml,
    },
    Strategy {
        name: "hermes_style",
        try_parse: parse_hermes_style,
    },
    Strategy {
        name: "code_fence",
        try_parse: parse_code_fence,
    },
    Strategy {
        name: "raw_json",
        try_parse: parse_raw_json,
    },
];

/// Substrings that suggest a text-embedded tool call
pub const TOOL_CALL_INDICATORS: &[&str] = &[
    "<tool_call>",
    "</tool_call>",
    "<function=",
    "</function>",
    "\"name\":",
    "\"tool\":",
    "```json",
];

/// Cheap pre-check before running the strategies.
pub fn has_potential_tool_call(text: &str) -> bool {
    if text.is_empty() {
        return false;
    }
    let lower = text.to_lowercase();
    TOOL_CALL_INDICATORS
        .iter()
        .any(|indicator| lower.contains(indicator))
}

/// What happened during one parse
#[derive(Debug, Clone, Default)]
pub struct ParseDiagnostics {
    pub text_length: usize,
    pub detected_indicators: Vec<&'static str>,
    /// (strategy, result) in attempted order
    pub strategies_tried: Vec<(&'static str, String)>,
    pub matched_strategy: Option<&'static str>,
}

/// Successful fallback parse
#[derive(Debug, Clone)]
pub struct FallbackParse {
    pub strategy: &'static str,
    pub calls: Vec<ParsedToolCall>,
}

/// Run the strategies over `text`, returning the first match and diagnostics.
pub fn parse_tool_calls(text: &str) -> (Option<FallbackParse>, ParseDiagnostics) {
    let mut diagnostics = ParseDiagnostics {
        text_length: text.len(),
        ..Default::default()
    };

    if text.trim().is_empty() {
        diagnostics
            .strategies_tried
            .push(("pre-check", "empty_text".to_string()));
        return (None, diagnostics);
    }

    let lower = text.to_lowercase();
    diagnostics.detected_indicators = TOOL_CALL_INDICATORS
        .iter()
        .copied()
        .filter(|indicator| lower.contains(indicator))
        .collect();

    for strategy in STRATEGIES {
        match (strategy.try_parse)(text) {
            Some(calls) if !calls.is_empty() => {
                diagnostics
                    .strategies_tried
                    .push((strategy.name, format!("matched {} calls", calls.len())));
                diagnostics.matched_strategy = Some(strategy.name);
                tracing::debug!(
                    target: "tack.tools.parsing",
                    strategy = strategy.name,
                    calls = calls.len(),
                    indicators = ?diagnostics.detected_indicators,
                    "Recovered tool calls from text"
                );
                return (
                    Some(FallbackParse {
                        strategy: strategy.name,
                        calls,
                    }),
                    diagnostics,
                );
            }
            _ => diagnostics
                .strategies_tried
                .push((strategy.name, "no_match".to_string())),
        }
    }

    tracing::debug!(
        target: "tack.tools.parsing",
        text_len = text.len(),
        indicators = ?diagnostics.detected_indicators,
        "No fallback strategy matched"
    );
    (None, diagnostics)
}

fn cached_regex(cell: &'static OnceLock<Option<Regex>>, pattern: &str) -> Option<&'static Regex> {
    cell.get_or_init(|| Regex::new(pattern).ok()).as_ref()
}

fn qwen2_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    cached_regex(&RE, r"(?s)<tool_call>\s*(\{.*?\})\s*</tool_call>")
}

fn hermes_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    cached_regex(&RE, r"(?s)<function=(\w+)>\s*(\{.*?\})\s*</function>")
}

fn code_fence_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    cached_regex(&RE, r"(?s)```(?:json)?\s*(\{.*?\})\s*```")
}

fn non_empty(calls: Vec<ParsedToolCall>) -> Option<Vec<ParsedToolCall>> {
    if calls.is_empty() {
        None
    } else {
        Some(calls)
    }
}

/// `<tool_call>{"name": ..., "arguments": {...}}</tool_call>`
pub fn parse_qwen2_xml(text: &str) -> Option<Vec<ParsedToolCall>> {
    let calls = qwen2_regex()?
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .filter_map(|json| parse_tool_json(json.as_str()))
        .collect();
    non_empty(calls)
}

/// `<function=read_file>{"filepath": "..."}</function>`
pub fn parse_hermes_style(text: &str) -> Option<Vec<ParsedToolCall>> {
    let calls = hermes_regex()?
        .captures_iter(text)
        .filter_map(|caps| {
            let name = caps.get(1)?.as_str();
            let args: Value = serde_json::from_str(caps.get(2)?.as_str()).ok()?;
            args.is_object().then(|| ParsedToolCall::new(name, args))
        })
        .collect();
    non_empty(calls)
}

/// JSON object inside a (json) code fence
pub fn parse_code_fence(text: &str) -> Option<Vec<ParsedToolCall>> {
    let calls = code_fence_regex()?
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .filter_map(|json| parse_tool_json(json.as_str()))
        .collect();
    non_empty(calls)
}

/// Bare JSON objects anywhere in the text, possibly concatenated
pub fn parse_raw_json(text: &str) -> Option<Vec<ParsedToolCall>> {
    let calls = split_concatenated_json(text)
        .into_iter()
        .filter_map(normalize_tool_object)
        .collect();
    non_empty(calls)
}

fn parse_tool_json(json: &str) -> Option<ParsedToolCall> {
    serde_json::from_str(json).ok().and_then(normalize_tool_object)
}

fn first_present<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| obj.get(*key))
        .find(|value| !value.is_null())
}

/// Accepts `{name, arguments}`, `{tool, args}` and `{function, parameters}`.
fn normalize_tool_object(value: Value) -> Option<ParsedToolCall> {
    let obj = value.as_object()?;
    let name = first_present(obj, &["name", "tool", "function"])?
        .as_str()
        .filter(|name| !name.is_empty())?;

    let args = match first_present(obj, &["arguments", "args", "parameters"]) {
        Some(Value::Object(map)) => Value::Object(map.clone()),
        Some(Value::String(raw)) => match serde_json::from_str::<Value>(raw) {
            Ok(parsed @ Value::Object(_)) => parsed,
            _ => Value::Object(Map::new()),
        },
        _ => Value::Object(Map::new()),
    };

    Some(ParsedToolCall::new(name, args))
}

/// Every top-level JSON object in `text`, in order.
pub fn split_concatenated_json(text: &str) -> Vec<Value> {
    let mut objects = Vec::new();
    let mut pos = 0;

    while let Some(offset) = text[pos..].find('{') {
        let start = pos + offset;
        let mut stream = serde_json::Deserializer::from_str(&text[start..]).into_iter::<Value>();
        match stream.next() {
            Some(Ok(value @ Value::Object(_))) => {
                pos = start + stream.byte_offset();
                objects.push(value);
            }
            _ => pos = start + 1,
        }
    }

    objects
}
