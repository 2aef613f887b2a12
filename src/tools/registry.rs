// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Per-request record of tool calls
//!
//! Calls are registered when extracted from a node and leave the pending set
//! once their tool return is in history. Recent calls feed guidance text.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;

use super::catalog::short_description;
use super::{ToolCall, ToolCategory};

/// Lifecycle of a registered call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl CallStatus {
    pub fn is_finished(self) -> bool {
        matches!(
            self,
            CallStatus::Completed | CallStatus::Failed | CallStatus::Cancelled
        )
    }
}

/// One tracked call
#[derive(Debug, Clone)]
pub struct CallRecord {
    pub id: String,
    pub name: String,
    pub args: Value,
    pub category: ToolCategory,
    pub status: CallStatus,
    pub registered_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Output on success, error text on failure
    pub result: Option<String>,
}

impl CallRecord {
    /// Compact description, e.g. `grep('TODO')`
    pub fn summary(&self) -> String {
        short_description(&self.name, &self.args)
    }
}

/// Insertion-ordered call registry
#[derive(Debug, Default)]
pub struct ToolCallRegistry {
    records: Vec<CallRecord>,
    index: HashMap<String, usize>,
}

impl ToolCallRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a newly extracted call. Re-registering an id resets the record.
    pub fn register(&mut self, call: &ToolCall) {
        let record = CallRecord {
            id: call.id.clone(),
            name: call.name.clone(),
            args: call.args.clone(),
            category: call.category,
            status: CallStatus::Pending,
            registered_at: Utc::now(),
            started_at: None,
            finished_at: None,
            result: None,
        };
        match self.index.get(&call.id) {
            Some(&pos) => self.records[pos] = record,
            None => {
                self.index.insert(call.id.clone(), self.records.len());
                self.records.push(record);
            }
        }
    }

    fn record_mut(&mut self, id: &str) -> Option<&mut CallRecord> {
        let pos = *self.index.get(id)?;
        self.records.get_mut(pos)
    }

    /// Mark a call as running. Returns false for unknown ids.
    pub fn start(&mut self, id: &str) -> bool {
        match self.record_mut(id) {
            Some(record) => {
                record.status = CallStatus::Running;
                record.started_at = Some(Utc::now());
                true
            }
            None => false,
        }
    }

    pub fn complete(&mut self, id: &str, output: impl Into<String>) -> bool {
        self.finish(id, CallStatus::Completed, Some(output.into()))
    }

    pub fn fail(&mut self, id: &str, error: impl Into<String>) -> bool {
        self.finish(id, CallStatus::Failed, Some(error.into()))
    }

    pub fn cancel(&mut self, id: &str) -> bool {
        self.finish(id, CallStatus::Cancelled, None)
    }

    fn finish(&mut self, id: &str, status: CallStatus, result: Option<String>) -> bool {
        match self.record_mut(id) {
            Some(record) => {
                record.status = status;
                record.finished_at = Some(Utc::now());
                record.result = result;
                true
            }
            None => false,
        }
    }

    /// Cancel every call that has not finished.
    pub fn cancel_pending(&mut self) -> usize {
        let now = Utc::now();
        let mut cancelled = 0;
        for record in self.records.iter_mut().filter(|r| !r.status.is_finished()) {
            record.status = CallStatus::Cancelled;
            record.finished_at = Some(now);
            cancelled += 1;
        }
        cancelled
    }

    pub fn get(&self, id: &str) -> Option<&CallRecord> {
        self.index.get(id).and_then(|&pos| self.records.get(pos))
    }

    /// Arguments of a call that is still pending or running.
    pub fn args(&self, id: &str) -> Option<&Value> {
        self.get(id)
            .filter(|record| !record.status.is_finished())
            .map(|record| &record.args)
    }

    /// The last `limit` calls, oldest first.
    pub fn recent_calls(&self, limit: usize) -> &[CallRecord] {
        let start = self.records.len().saturating_sub(limit);
        &self.records[start..]
    }

    pub fn pending_count(&self) -> usize {
        self.records
            .iter()
            .filter(|record| !record.status.is_finished())
            .count()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call(id: &str, name: &str, args: Value) -> ToolCall {
        ToolCall::new(id, name, args, ToolCategory::ReadOnly)
    }

    #[test]
    fn test_register_and_lifecycle() {
        let mut registry = ToolCallRegistry::new();
        registry.register(&call("c1", "grep", json!({"pattern": "TODO"})));
        assert_eq!(registry.pending_count(), 1);
        assert_eq!(registry.args("c1"), Some(&json!({"pattern": "TODO"})));

        assert!(registry.start("c1"));
        assert_eq!(registry.get("c1").unwrap().status, CallStatus::Running);

        assert!(registry.complete("c1", "3 matches"));
        let record = registry.get("c1").unwrap();
        assert_eq!(record.status, CallStatus::Completed);
        assert_eq!(record.result.as_deref(), Some("3 matches"));
        assert!(record.finished_at.is_some());

        assert_eq!(registry.pending_count(), 0);
        assert!(registry.args("c1").is_none());
    }

    #[test]
    fn test_unknown_id() {
        let mut registry = ToolCallRegistry::new();
        assert!(!registry.start("missing"));
        assert!(!registry.fail("missing", "boom"));
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn test_fail_and_cancel() {
        let mut registry = ToolCallRegistry::new();
        registry.register(&call("c1", "bash", json!({})));
        registry.register(&call("c2", "bash", json!({})));
        registry.fail("c1", "exit 1");
        registry.cancel("c2");
        assert_eq!(registry.get("c1").unwrap().status, CallStatus::Failed);
        assert_eq!(registry.get("c2").unwrap().status, CallStatus::Cancelled);
        assert!(registry.get("c2").unwrap().result.is_none());
    }

    #[test]
    fn test_cancel_pending() {
        let mut registry = ToolCallRegistry::new();
        registry.register(&call("c1", "grep", json!({})));
        registry.register(&call("c2", "grep", json!({})));
        registry.complete("c1", "ok");
        assert_eq!(registry.cancel_pending(), 1);
        assert_eq!(registry.pending_count(), 0);
    }

    #[test]
    fn test_recent_calls_keeps_order() {
        let mut registry = ToolCallRegistry::new();
        for i in 0..5 {
            registry.register(&call(&format!("c{}", i), "grep", json!({"pattern": i.to_string()})));
        }
        let recent: Vec<String> = registry.recent_calls(2).iter().map(|r| r.summary()).collect();
        assert_eq!(recent, vec!["grep('3')", "grep('4')"]);
        assert_eq!(registry.recent_calls(10).len(), 5);
    }

    #[test]
    fn test_reregister_resets_record() {
        let mut registry = ToolCallRegistry::new();
        registry.register(&call("c1", "grep", json!({})));
        registry.complete("c1", "ok");
        registry.register(&call("c1", "grep", json!({"pattern": "x"})));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("c1").unwrap().status, CallStatus::Pending);
    }
}
