// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Authorization gate for tool calls
//!
//! The executor asks the gate before every invocation. A gate that wants
//! confirmation may suspend on user input; no timeout is applied here.

use async_trait::async_trait;
use crossterm::style::{Color, ResetColor, SetForegroundColor};
use crossterm::ExecutableCommand;
use serde_json::Value;
use std::collections::HashSet;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use crate::config::settings::AuthorizationConfig;
use crate::error::{Result, TackError};

use super::catalog::{readable_description, READ_ONLY_TOOLS};
use super::{ToolCall, ToolCategory};

/// Request shown to whoever confirms a tool call
#[derive(Debug, Clone)]
pub struct ConfirmationRequest {
    pub call_id: String,
    pub tool_name: String,
    pub category: ToolCategory,
    pub args: Value,
    /// Human-readable description of the action
    pub description: String,
    /// Path the call touches, when the args name one
    pub filepath: Option<String>,
}

impl ConfirmationRequest {
    pub fn for_call(call: &ToolCall) -> Self {
        let filepath = ["filepath", "file_path"]
            .iter()
            .find_map(|key| call.args.get(*key).and_then(Value::as_str))
            .map(str::to_string);
        Self {
            call_id: call.id.clone(),
            tool_name: call.name.clone(),
            category: call.category,
            args: call.args.clone(),
            description: readable_description(&call.name, &call.args),
            filepath,
        }
    }
}

/// Answer to a confirmation request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationResponse {
    pub approved: bool,
    /// Optional guidance from the user, typically given on denial
    pub reason: Option<String>,
}

impl ConfirmationResponse {
    pub fn approve() -> Self {
        Self {
            approved: true,
            reason: None,
        }
    }

    pub fn deny(reason: Option<String>) -> Self {
        Self {
            approved: false,
            reason,
        }
    }
}

/// External policy deciding whether a call needs user confirmation
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuthorizationGate: Send + Sync {
    /// Whether `tool_name` must be confirmed before running.
    fn should_confirm(&self, tool_name: &str) -> bool;

    /// Ask for confirmation. May suspend indefinitely on user input.
    async fn confirm(&self, request: &ConfirmationRequest) -> Result<ConfirmationResponse>;
}

/// Result of checking one call against a gate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthDecision {
    Approved,
    /// Denied; `message` is fed back to the model in place of tool output
    Denied { message: String },
}

/// Run `call` through `gate`.
pub async fn authorize(gate: &dyn AuthorizationGate, call: &ToolCall) -> Result<AuthDecision> {
    if !gate.should_confirm(&call.name) {
        return Ok(AuthDecision::Approved);
    }

    let request = ConfirmationRequest::for_call(call);
    let response = gate.confirm(&request).await?;
    if response.approved {
        tracing::debug!(target: "tack.auth", tool = %call.name, "Tool call approved");
        return Ok(AuthDecision::Approved);
    }

    tracing::info!(
        target: "tack.auth",
        tool = %call.name,
        reason = response.reason.as_deref().unwrap_or(""),
        "Tool call denied"
    );
    Ok(AuthDecision::Denied {
        message: rejection_message(&call.name, response.reason.as_deref()),
    })
}

/// Text the model sees for a denied call.
pub fn rejection_message(tool_name: &str, reason: Option<&str>) -> String {
    let guidance = match reason.map(str::trim) {
        Some(reason) if !reason.is_empty() => format!("User guidance:\n{}", reason),
        _ => "User cancelled without additional instructions.".to_string(),
    };
    format!(
        "Tool '{}' execution cancelled before running.\n{}\n\
         Do not assume the operation succeeded; request updated guidance or offer alternatives.",
        tool_name, guidance
    )
}

/// Gate that approves everything
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAllGate;

#[async_trait]
impl AuthorizationGate for AllowAllGate {
    fn should_confirm(&self, _tool_name: &str) -> bool {
        false
    }

    async fn confirm(&self, _request: &ConfirmationRequest) -> Result<ConfirmationResponse> {
        Ok(ConfirmationResponse::approve())
    }
}

/// Answer typed at the terminal prompt
#[derive(Debug, Clone, PartialEq, Eq)]
enum PromptAnswer {
    Allow,
    Deny(Option<String>),
    AllowAll,
}

/// Default rule-based gate with a terminal prompt
///
/// Rules, first match wins: yolo mode, read-only auto-approval, ignore list.
/// Anything else is confirmed on the terminal.
pub struct PolicyGate {
    yolo: bool,
    auto_approve_read_only: bool,
    /// Tools the user chose to stop confirming
    ignored: Arc<Mutex<HashSet<String>>>,
}

impl PolicyGate {
    pub fn new(config: &AuthorizationConfig) -> Self {
        Self {
            yolo: config.yolo,
            auto_approve_read_only: config.auto_approve_read_only,
            ignored: Arc::new(Mutex::new(config.tool_ignore.iter().cloned().collect())),
        }
    }

    /// Gate that never asks
    pub fn yolo() -> Self {
        Self::new(&AuthorizationConfig {
            yolo: true,
            ..AuthorizationConfig::default()
        })
    }

    pub fn is_yolo(&self) -> bool {
        self.yolo
    }

    /// Stop confirming `tool_name` for the rest of the session.
    pub fn ignore_tool(&self, tool_name: impl Into<String>) {
        match self.ignored.lock() {
            Ok(mut ignored) => {
                ignored.insert(tool_name.into());
            }
            Err(poisoned) => {
                poisoned.into_inner().insert(tool_name.into());
            }
        }
    }

    fn is_ignored(&self, tool_name: &str) -> bool {
        match self.ignored.lock() {
            Ok(ignored) => ignored.contains(tool_name),
            Err(poisoned) => poisoned.into_inner().contains(tool_name),
        }
    }
}

#[async_trait]
impl AuthorizationGate for PolicyGate {
    fn should_confirm(&self, tool_name: &str) -> bool {
        if self.yolo {
            return false;
        }
        if self.auto_approve_read_only && READ_ONLY_TOOLS.contains(&tool_name) {
            return false;
        }
        !self.is_ignored(tool_name)
    }

    async fn confirm(&self, request: &ConfirmationRequest) -> Result<ConfirmationResponse> {
        let tool_name = request.tool_name.clone();
        let request = request.clone();
        let answer = tokio::task::spawn_blocking(move || prompt_terminal(&request))
            .await
            .map_err(|e| TackError::Authorization(format!("Prompt task failed: {}", e)))?
            .map_err(|e| TackError::Authorization(format!("Failed to read answer: {}", e)))?;

        match answer {
            PromptAnswer::Allow => Ok(ConfirmationResponse::approve()),
            PromptAnswer::AllowAll => {
                self.ignore_tool(tool_name);
                Ok(ConfirmationResponse::approve())
            }
            PromptAnswer::Deny(reason) => Ok(ConfirmationResponse::deny(reason)),
        }
    }
}

fn parse_answer(input: &str) -> PromptAnswer {
    match input.trim().to_lowercase().as_str() {
        "y" | "yes" => PromptAnswer::Allow,
        "a" | "always" => PromptAnswer::AllowAll,
        _ => PromptAnswer::Deny(None),
    }
}

fn prompt_terminal(request: &ConfirmationRequest) -> io::Result<PromptAnswer> {
    let mut stdout = io::stdout();

    println!();
    stdout.execute(SetForegroundColor(Color::Yellow))?;
    print!("⚠ ");
    stdout.execute(ResetColor)?;
    println!("Tool '{}' wants to:", request.tool_name);
    println!("  {}", request.description);

    if let Some(path) = &request.filepath {
        if request.category.is_mutating() {
            stdout.execute(SetForegroundColor(Color::Red))?;
        }
        println!("  Affected path: {}", path);
        stdout.execute(ResetColor)?;
    }

    println!();
    print!("Allow? [y]es / [n]o / [a]lways allow this tool: ");
    stdout.flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    let answer = parse_answer(&input);

    if answer == PromptAnswer::Deny(None) {
        print!("Reason for the agent (optional): ");
        stdout.flush()?;
        let mut reason = String::new();
        io::stdin().read_line(&mut reason)?;
        let reason = reason.trim();
        println!();
        if !reason.is_empty() {
            return Ok(PromptAnswer::Deny(Some(reason.to_string())));
        }
        return Ok(PromptAnswer::Deny(None));
    }

    println!();
    Ok(answer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn write_call() -> ToolCall {
        ToolCall::new(
            "c1",
            "write_file",
            json!({"filepath": "src/main.rs", "content": "fn main() {}"}),
            ToolCategory::Write,
        )
    }

    #[test]
    fn test_policy_gate_defaults() {
        let gate = PolicyGate::new(&AuthorizationConfig::default());
        assert!(!gate.is_yolo());
        assert!(!gate.should_confirm("read_file"));
        assert!(!gate.should_confirm("grep"));
        assert!(gate.should_confirm("write_file"));
        assert!(gate.should_confirm("bash"));
    }

    #[test]
    fn test_policy_gate_yolo() {
        let gate = PolicyGate::yolo();
        assert!(!gate.should_confirm("bash"));
        assert!(!gate.should_confirm("anything"));
    }

    #[test]
    fn test_policy_gate_ignore_list() {
        let config = AuthorizationConfig {
            tool_ignore: vec!["bash".to_string()],
            ..AuthorizationConfig::default()
        };
        let gate = PolicyGate::new(&config);
        assert!(!gate.should_confirm("bash"));
        assert!(gate.should_confirm("write_file"));

        gate.ignore_tool("write_file");
        assert!(!gate.should_confirm("write_file"));
    }

    #[test]
    fn test_read_only_auto_approval_can_be_disabled() {
        let config = AuthorizationConfig {
            auto_approve_read_only: false,
            ..AuthorizationConfig::default()
        };
        let gate = PolicyGate::new(&config);
        assert!(gate.should_confirm("read_file"));
    }

    #[test]
    fn test_parse_answer() {
        assert_eq!(parse_answer("y\n"), PromptAnswer::Allow);
        assert_eq!(parse_answer("YES"), PromptAnswer::Allow);
        assert_eq!(parse_answer("a"), PromptAnswer::AllowAll);
        assert_eq!(parse_answer("n"), PromptAnswer::Deny(None));
        assert_eq!(parse_answer(""), PromptAnswer::Deny(None));
    }

    #[test]
    fn test_confirmation_request_for_call() {
        let request = ConfirmationRequest::for_call(&write_call());
        assert_eq!(request.tool_name, "write_file");
        assert_eq!(request.filepath.as_deref(), Some("src/main.rs"));
        assert_eq!(request.description, "Executing `write_file`");
    }

    #[test]
    fn test_rejection_message() {
        let msg = rejection_message("write_file", Some("use a branch"));
        assert!(msg.contains("Tool 'write_file' execution cancelled"));
        assert!(msg.contains("User guidance:\nuse a branch"));

        let msg = rejection_message("bash", Some("   "));
        assert!(msg.contains("without additional instructions"));
    }

    #[tokio::test]
    async fn test_authorize_skips_confirm_when_not_needed() {
        let mut gate = MockAuthorizationGate::new();
        gate.expect_should_confirm().return_const(false);
        gate.expect_confirm().never();

        let decision = authorize(&gate, &write_call()).await.unwrap();
        assert_eq!(decision, AuthDecision::Approved);
    }

    #[tokio::test]
    async fn test_authorize_denied_with_reason() {
        let mut gate = MockAuthorizationGate::new();
        gate.expect_should_confirm().return_const(true);
        gate.expect_confirm()
            .times(1)
            .returning(|_| Ok(ConfirmationResponse::deny(Some("not now".into()))));

        match authorize(&gate, &write_call()).await.unwrap() {
            AuthDecision::Denied { message } => assert!(message.contains("not now")),
            other => panic!("Expected denial, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_authorize_propagates_gate_errors() {
        let mut gate = MockAuthorizationGate::new();
        gate.expect_should_confirm().return_const(true);
        gate.expect_confirm()
            .returning(|_| Err(TackError::Authorization("no terminal".into())));

        let err = authorize(&gate, &write_call()).await.unwrap_err();
        assert!(matches!(err, TackError::Authorization(_)));
    }

    #[tokio::test]
    async fn test_allow_all_gate() {
        let gate = AllowAllGate;
        assert!(!gate.should_confirm("bash"));
        let response = gate
            .confirm(&ConfirmationRequest::for_call(&write_call()))
            .await
            .unwrap();
        assert!(response.approved);
    }
}
