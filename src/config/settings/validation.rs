// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use sha2::{Digest, Sha256};

use crate::error::{Result, TackError};

use super::Settings;

/// Overrides `tools.max_parallel`
pub const ENV_MAX_PARALLEL: &str = "TACK_MAX_PARALLEL";
/// Overrides `orchestrator.global_request_timeout_secs`
pub const ENV_REQUEST_TIMEOUT: &str = "TACK_REQUEST_TIMEOUT";

impl Settings {
    /// Apply overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_env_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides using `lookup` in place of the environment.
    pub fn apply_env_overrides_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_MAX_PARALLEL) {
            let value: usize = raw.trim().parse().map_err(|_| {
                TackError::Config(format!("{} must be a positive integer, got '{}'", ENV_MAX_PARALLEL, raw))
            })?;
            self.tools.max_parallel = Some(value);
        }

        if let Some(raw) = lookup(ENV_REQUEST_TIMEOUT) {
            let value: f64 = raw.trim().parse().map_err(|_| {
                TackError::Config(format!("{} must be a number of seconds, got '{}'", ENV_REQUEST_TIMEOUT, raw))
            })?;
            self.orchestrator.global_request_timeout_secs = value;
        }

        Ok(())
    }

    /// Reject values the orchestrator cannot work with.
    pub fn validate(&self) -> Result<()> {
        let orchestrator = &self.orchestrator;
        if orchestrator.max_iterations == 0 {
            return Err(TackError::Config(
                "orchestrator.max_iterations must be at least 1".to_string(),
            ));
        }
        if orchestrator.unproductive_limit == 0 {
            return Err(TackError::Config(
                "orchestrator.unproductive_limit must be at least 1".to_string(),
            ));
        }
        let timeout = orchestrator.global_request_timeout_secs;
        if !timeout.is_finite() || timeout < 0.0 {
            return Err(TackError::Config(format!(
                "orchestrator.global_request_timeout_secs must be >= 0, got {}",
                timeout
            )));
        }

        let tools = &self.tools;
        if tools.max_parallel == Some(0) {
            return Err(TackError::Config("tools.max_parallel must be at least 1".to_string()));
        }
        if tools.max_retries == 0 {
            return Err(TackError::Config("tools.max_retries must be at least 1".to_string()));
        }
        if tools.base_delay_ms > tools.max_delay_ms {
            return Err(TackError::Config(format!(
                "tools.base_delay_ms ({}) exceeds tools.max_delay_ms ({})",
                tools.base_delay_ms, tools.max_delay_ms
            )));
        }
        if !(0.0..=1.0).contains(&tools.jitter) {
            return Err(TackError::Config(format!(
                "tools.jitter must be between 0.0 and 1.0, got {}",
                tools.jitter
            )));
        }

        for (model, pricing) in &self.pricing.models {
            if pricing.input_per_1k < 0.0 || pricing.output_per_1k < 0.0 {
                return Err(TackError::Config(format!(
                    "pricing for '{}' must not be negative",
                    model
                )));
            }
        }

        Ok(())
    }

    /// Content hash of the settings, used to invalidate compiled profiles.
    pub fn config_version(&self) -> Result<u64> {
        let canonical = serde_json::to_vec(self)?;
        let digest = Sha256::digest(&canonical);
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        Ok(u64::from_be_bytes(bytes))
    }
}
