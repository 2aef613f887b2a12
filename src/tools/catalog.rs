// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Tool classification
//!
//! A static allowlist decides whether a call may run in the parallel
//! read-only batch. Anything not listed is treated as `Execute` so it runs
//! sequentially.

use serde_json::Value;
use std::collections::HashMap;

use super::ToolCategory;

pub const TOOL_READ_FILE: &str = "read_file";
pub const TOOL_GREP: &str = "grep";
pub const TOOL_LIST_DIR: &str = "list_dir";
pub const TOOL_GLOB: &str = "glob";
pub const TOOL_WRITE_FILE: &str = "write_file";
pub const TOOL_UPDATE_FILE: &str = "update_file";
pub const TOOL_BASH: &str = "bash";
pub const TOOL_RUN_COMMAND: &str = "run_command";
pub const TOOL_RESEARCH: &str = "research_codebase";

pub const READ_ONLY_TOOLS: &[&str] = &[TOOL_READ_FILE, TOOL_GREP, TOOL_LIST_DIR, TOOL_GLOB];
pub const WRITE_TOOLS: &[&str] = &[TOOL_WRITE_FILE, TOOL_UPDATE_FILE];
pub const EXECUTE_TOOLS: &[&str] = &[TOOL_BASH, TOOL_RUN_COMMAND];
pub const DELEGATED_TOOLS: &[&str] = &[TOOL_RESEARCH];

/// Name used when the model omits one
pub const UNKNOWN_TOOL_NAME: &str = "unknown";

const MAX_TOOL_NAME_LENGTH: usize = 50;
const INVALID_TOOL_NAME_CHARS: &[char] = &['<', '>', '(', ')', '{', '}', '[', ']', '"', '\'', '`'];
const QUERY_DISPLAY_LIMIT: usize = 60;

/// Name -> category table
#[derive(Debug, Clone)]
pub struct ToolCatalog {
    categories: HashMap<String, ToolCategory>,
}

impl Default for ToolCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ToolCatalog {
    /// Catalog with the built-in tool names
    pub fn builtin() -> Self {
        let mut categories = HashMap::new();
        for (names, category) in [
            (READ_ONLY_TOOLS, ToolCategory::ReadOnly),
            (WRITE_TOOLS, ToolCategory::Write),
            (EXECUTE_TOOLS, ToolCategory::Execute),
            (DELEGATED_TOOLS, ToolCategory::Delegated),
        ] {
            for name in names {
                categories.insert((*name).to_string(), category);
            }
        }
        Self { categories }
    }

    /// Register or override a tool's category.
    pub fn with_tool(mut self, name: impl Into<String>, category: ToolCategory) -> Self {
        self.categories.insert(name.into(), category);
        self
    }

    pub fn classify(&self, name: &str) -> ToolCategory {
        self.categories
            .get(name)
            .copied()
            .unwrap_or(ToolCategory::Execute)
    }

    pub fn is_read_only(&self, name: &str) -> bool {
        self.classify(name) == ToolCategory::ReadOnly
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }
}

/// Trim a raw tool name; blank or missing names become `unknown`.
pub fn normalize_tool_name(raw: Option<&str>) -> String {
    match raw.map(str::trim) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => UNKNOWN_TOOL_NAME.to_string(),
    }
}

/// Names with markup characters or absurd length usually mean the model
/// leaked text into the name field.
pub fn is_suspicious_tool_name(name: &str) -> bool {
    name.is_empty()
        || name.len() > MAX_TOOL_NAME_LENGTH
        || name.chars().any(|c| INVALID_TOOL_NAME_CHARS.contains(&c))
}

fn arg_str<'a>(args: &'a Value, keys: &[&str]) -> &'a str {
    keys.iter()
        .find_map(|key| args.get(*key).and_then(Value::as_str))
        .unwrap_or("")
}

/// Compact form used in "Recent tools" context, e.g. `grep('TODO')`.
pub fn short_description(name: &str, args: &Value) -> String {
    match name {
        TOOL_GREP | TOOL_GLOB => format!("{}('{}')", name, arg_str(args, &["pattern"])),
        TOOL_READ_FILE => format!("{}('{}')", name, arg_str(args, &["file_path", "filepath"])),
        _ => name.to_string(),
    }
}

/// Human-readable description for progress events.
pub fn readable_description(name: &str, args: &Value) -> String {
    match name {
        TOOL_READ_FILE => match arg_str(args, &["file_path", "filepath"]) {
            "" => "Reading file".to_string(),
            path => format!("Reading `{}`", path),
        },
        TOOL_LIST_DIR => match arg_str(args, &["directory"]) {
            "" => "Listing directory".to_string(),
            dir => format!("Listing directory `{}`", dir),
        },
        TOOL_GREP => {
            let pattern = arg_str(args, &["pattern"]);
            let include = arg_str(args, &["include_files"]);
            match (pattern, include) {
                ("", _) => "Searching files".to_string(),
                (p, "") => format!("Searching for `{}`", p),
                (p, i) => format!("Searching for `{}` in `{}`", p, i),
            }
        }
        TOOL_GLOB => match arg_str(args, &["pattern"]) {
            "" => "Finding files".to_string(),
            pattern => format!("Finding files matching `{}`", pattern),
        },
        TOOL_RESEARCH => {
            let query = arg_str(args, &["query"]);
            if query.is_empty() {
                "Researching codebase".to_string()
            } else if query.chars().count() > QUERY_DISPLAY_LIMIT {
                let head: String = query.chars().take(QUERY_DISPLAY_LIMIT).collect();
                format!("Researching: {}...", head)
            } else {
                format!("Researching: {}", query)
            }
        }
        _ => format!("Executing `{}`", name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builtin_classification() {
        let catalog = ToolCatalog::builtin();
        assert_eq!(catalog.classify("read_file"), ToolCategory::ReadOnly);
        assert_eq!(catalog.classify("grep"), ToolCategory::ReadOnly);
        assert_eq!(catalog.classify("write_file"), ToolCategory::Write);
        assert_eq!(catalog.classify("update_file"), ToolCategory::Write);
        assert_eq!(catalog.classify("bash"), ToolCategory::Execute);
        assert_eq!(catalog.classify("research_codebase"), ToolCategory::Delegated);
        assert_eq!(catalog.len(), 9);
    }

    #[test]
    fn test_unknown_tool_runs_sequentially() {
        let catalog = ToolCatalog::builtin();
        assert_eq!(catalog.classify("mystery"), ToolCategory::Execute);
        assert!(!catalog.is_read_only("mystery"));
    }

    #[test]
    fn test_with_tool_override() {
        let catalog = ToolCatalog::builtin().with_tool("web_fetch", ToolCategory::ReadOnly);
        assert!(catalog.is_read_only("web_fetch"));
    }

    #[test]
    fn test_normalize_tool_name() {
        assert_eq!(normalize_tool_name(Some("  grep ")), "grep");
        assert_eq!(normalize_tool_name(Some("   ")), UNKNOWN_TOOL_NAME);
        assert_eq!(normalize_tool_name(None), UNKNOWN_TOOL_NAME);
    }

    #[test]
    fn test_suspicious_tool_names() {
        assert!(is_suspicious_tool_name(""));
        assert!(is_suspicious_tool_name("<tool_call>read_file"));
        assert!(is_suspicious_tool_name(&"a".repeat(51)));
        assert!(!is_suspicious_tool_name("read_file"));
    }

    #[test]
    fn test_short_description() {
        assert_eq!(
            short_description("grep", &json!({"pattern": "TODO"})),
            "grep('TODO')"
        );
        assert_eq!(
            short_description("read_file", &json!({"filepath": "src/lib.rs"})),
            "read_file('src/lib.rs')"
        );
        assert_eq!(short_description("bash", &json!({"command": "ls"})), "bash");
    }

    #[test]
    fn test_readable_description() {
        assert_eq!(
            readable_description("read_file", &json!({"file_path": "a.rs"})),
            "Reading `a.rs`"
        );
        assert_eq!(
            readable_description("grep", &json!({"pattern": "fn", "include_files": "*.rs"})),
            "Searching for `fn` in `*.rs`"
        );
        assert_eq!(readable_description("glob", &json!({})), "Finding files");
        assert_eq!(readable_description("bash", &json!({})), "Executing `bash`");

        let long_query = "x".repeat(80);
        let text = readable_description("research_codebase", &json!({"query": long_query}));
        assert!(text.ends_with("..."));
    }
}
