// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Settings management for Tack
//!
//! Handles loading and saving settings from ~/.tack/settings.json

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

mod io;
mod merge;
mod validation;

pub use validation::{ENV_MAX_PARALLEL, ENV_REQUEST_TIMEOUT};

/// Main settings structure, stored in ~/.tack/settings.json
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Settings {
    /// Request loop limits
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    /// Tool execution and retry settings
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Confirmation policy for tool calls
    #[serde(default)]
    pub authorization: AuthorizationConfig,

    /// Old tool output pruning
    #[serde(default)]
    pub compaction: CompactionConfig,

    /// Token prices for cost accounting
    #[serde(default)]
    pub pricing: PricingConfig,
}

/// Iteration loop settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Turns allowed before the budget is extended or the request pauses
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Turns added when the budget runs out the first time
    #[serde(default = "default_iteration_extension")]
    pub iteration_extension: u32,

    /// Consecutive turns without tool use before forcing action
    #[serde(default = "default_unproductive_limit")]
    pub unproductive_limit: u32,

    /// Empty or intention-only responses tolerated in a row
    #[serde(default = "default_max_empty_retries")]
    pub max_empty_retries: u32,

    /// Wall-clock limit for one request in seconds (0 = disabled)
    #[serde(default = "default_global_request_timeout_secs")]
    pub global_request_timeout_secs: f64,

    /// Turns summarized in fatal error reports
    #[serde(default = "default_recent_turns_in_errors")]
    pub recent_turns_in_errors: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            iteration_extension: default_iteration_extension(),
            unproductive_limit: default_unproductive_limit(),
            max_empty_retries: default_max_empty_retries(),
            global_request_timeout_secs: default_global_request_timeout_secs(),
            recent_turns_in_errors: default_recent_turns_in_errors(),
        }
    }
}

impl OrchestratorConfig {
    /// Global timeout, `None` when disabled.
    pub fn request_timeout(&self) -> Option<Duration> {
        if self.global_request_timeout_secs > 0.0 && self.global_request_timeout_secs.is_finite() {
            Some(Duration::from_secs_f64(self.global_request_timeout_secs))
        } else {
            None
        }
    }
}

/// Tool execution settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Read-only calls run at once (None = number of CPU cores)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_parallel: Option<usize>,

    /// Total attempts per call, the first one included
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay in milliseconds for exponential backoff
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Maximum delay in milliseconds (cap for backoff)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Jitter fraction (0.0 to 1.0) added on top of the delay
    #[serde(default = "default_jitter")]
    pub jitter: f64,

    /// Per-invocation timeout in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_timeout_secs: Option<u64>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            max_parallel: None,
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter: default_jitter(),
            tool_timeout_secs: None,
        }
    }
}

impl ToolsConfig {
    /// Configured parallelism, or the CPU core count.
    pub fn effective_max_parallel(&self) -> usize {
        self.max_parallel
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(4)
            })
            .max(1)
    }

    pub fn tool_timeout(&self) -> Option<Duration> {
        self.tool_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

/// Authorization policy settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationConfig {
    /// Skip every confirmation
    #[serde(default)]
    pub yolo: bool,

    /// Tools that never ask for confirmation
    #[serde(default)]
    pub tool_ignore: Vec<String>,

    /// Read-only tools run without confirmation
    #[serde(default = "default_true")]
    pub auto_approve_read_only: bool,
}

impl Default for AuthorizationConfig {
    fn default() -> Self {
        Self {
            yolo: false,
            tool_ignore: Vec::new(),
            auto_approve_read_only: true,
        }
    }
}

/// Tool output pruning settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompactionConfig {
    /// Prune old tool output at request start
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Newest tool output, in tokens, that is never pruned
    #[serde(default = "default_protect_tokens")]
    pub protect_tokens: usize,

    /// Skip pruning unless at least this many tokens would be reclaimed
    #[serde(default = "default_minimum_savings")]
    pub minimum_savings: usize,

    /// User turns required before pruning starts
    #[serde(default = "default_min_user_turns")]
    pub min_user_turns: usize,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            protect_tokens: default_protect_tokens(),
            minimum_savings: default_minimum_savings(),
            min_user_turns: default_min_user_turns(),
        }
    }
}

/// Token prices, keyed by model-name prefix
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PricingConfig {
    #[serde(default)]
    pub models: BTreeMap<String, ModelPricing>,
}

/// Price per 1k tokens
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    pub input_per_1k: f64,
    pub output_per_1k: f64,
}

impl ModelPricing {
    pub fn cost(&self, prompt_tokens: u32, completion_tokens: u32) -> f64 {
        (prompt_tokens as f64 / 1000.0) * self.input_per_1k
            + (completion_tokens as f64 / 1000.0) * self.output_per_1k
    }
}

impl PricingConfig {
    /// Pricing for `model`, by longest matching prefix.
    pub fn for_model(&self, model: &str) -> Option<ModelPricing> {
        self.models
            .iter()
            .filter(|(prefix, _)| model.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, pricing)| *pricing)
    }
}

fn default_true() -> bool {
    true
}

fn default_max_iterations() -> u32 {
    15
}

fn default_iteration_extension() -> u32 {
    5
}

fn default_unproductive_limit() -> u32 {
    3
}

fn default_max_empty_retries() -> u32 {
    3
}

fn default_global_request_timeout_secs() -> f64 {
    90.0
}

fn default_recent_turns_in_errors() -> usize {
    3
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    5000
}

fn default_jitter() -> f64 {
    0.1
}

fn default_protect_tokens() -> usize {
    40_000
}

fn default_minimum_savings() -> usize {
    20_000
}

fn default_min_user_turns() -> usize {
    2
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_orchestrator_config_default() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.max_iterations, 15);
        assert_eq!(config.iteration_extension, 5);
        assert_eq!(config.unproductive_limit, 3);
        assert_eq!(config.max_empty_retries, 3);
        assert_eq!(config.request_timeout(), Some(Duration::from_secs(90)));
    }

    #[test]
    fn test_zero_timeout_disables() {
        let config = OrchestratorConfig {
            global_request_timeout_secs: 0.0,
            ..Default::default()
        };
        assert!(config.request_timeout().is_none());
    }

    #[test]
    fn test_tools_config_default() {
        let config = ToolsConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.base_delay_ms, 500);
        assert_eq!(config.max_delay_ms, 5000);
        assert!(config.effective_max_parallel() >= 1);
        assert!(config.tool_timeout().is_none());
    }

    #[test]
    fn test_tools_config_explicit_parallel() {
        let config = ToolsConfig {
            max_parallel: Some(0),
            tool_timeout_secs: Some(30),
            ..Default::default()
        };
        assert_eq!(config.effective_max_parallel(), 1);
        assert_eq!(config.tool_timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_authorization_config_default() {
        let config = AuthorizationConfig::default();
        assert!(!config.yolo);
        assert!(config.auto_approve_read_only);
        assert!(config.tool_ignore.is_empty());
    }

    #[test]
    fn test_pricing_longest_prefix() {
        let mut pricing = PricingConfig::default();
        pricing.models.insert(
            "gpt-4".into(),
            ModelPricing {
                input_per_1k: 0.03,
                output_per_1k: 0.06,
            },
        );
        pricing.models.insert(
            "gpt-4o".into(),
            ModelPricing {
                input_per_1k: 0.005,
                output_per_1k: 0.015,
            },
        );
        let price = pricing.for_model("gpt-4o-mini").unwrap();
        assert!((price.input_per_1k - 0.005).abs() < f64::EPSILON);
        assert!(pricing.for_model("claude").is_none());
        assert!((price.cost(1000, 2000) - 0.035).abs() < 1e-9);
    }

    #[test]
    fn test_settings_partial_json_uses_defaults() {
        let settings: Settings =
            serde_json::from_str(r#"{"orchestrator": {"max_iterations": 30}}"#).unwrap();
        assert_eq!(settings.orchestrator.max_iterations, 30);
        assert_eq!(settings.orchestrator.iteration_extension, 5);
        assert_eq!(settings.tools, ToolsConfig::default());
    }

    #[test]
    fn test_settings_save_and_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");

        let mut settings = Settings::default();
        settings.authorization.yolo = true;
        settings.tools.max_parallel = Some(2);
        settings.save_to(&path).unwrap();

        let loaded = Settings::load_from(&path).unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_load_missing_file_returns_default() {
        let dir = TempDir::new().unwrap();
        let loaded = Settings::load_from(&dir.path().join("missing.json")).unwrap();
        assert_eq!(loaded, Settings::default());
    }
}
