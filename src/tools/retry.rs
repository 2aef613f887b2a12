// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Retry policy for tool invocations with exponential backoff

use rand::Rng;
use std::time::Duration;

use crate::config::settings::ToolsConfig;
use crate::error::TackError;

/// Retry configuration for one tool call
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total invocations allowed per call, the first one included
    pub max_attempts: u32,
    /// Base delay in milliseconds (doubled per attempt)
    pub base_delay_ms: u64,
    /// Maximum delay in milliseconds, before jitter
    pub max_delay_ms: u64,
    /// Upper bound of the added jitter, as a fraction of the delay (0.0 to 1.0)
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&ToolsConfig::default())
    }
}

impl From<&ToolsConfig> for RetryPolicy {
    fn from(config: &ToolsConfig) -> Self {
        Self {
            max_attempts: config.max_retries.max(1),
            base_delay_ms: config.base_delay_ms,
            max_delay_ms: config.max_delay_ms,
            jitter: config.jitter.clamp(0.0, 1.0),
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (1-based).
    ///
    /// `min(base * 2^(attempt-1), max) + uniform(0, jitter * capped)`
    pub fn backoff(&self, attempt: u32) -> Duration {
        let capped_ms = self.capped_delay_ms(attempt);

        let jitter_range = (capped_ms as f64 * self.jitter) as u64;
        let jitter_ms = if jitter_range == 0 {
            0
        } else {
            rand::rng().random_range(0..=jitter_range)
        };

        Duration::from_millis(capped_ms.saturating_add(jitter_ms))
    }

    fn capped_delay_ms(&self, attempt: u32) -> u64 {
        let exponent = attempt.saturating_sub(1).min(32);
        self.base_delay_ms
            .saturating_mul(1u64 << exponent)
            .min(self.max_delay_ms)
    }

    /// Whether a failure on invocation number `attempt` should be retried.
    pub fn should_retry(&self, attempt: u32, error: &TackError) -> bool {
        attempt < self.max_attempts && is_retryable(error)
    }
}

/// Determine if a tool error is worth retrying locally
///
/// Aborts, cancellation, self-correction signals and bad input go straight
/// back to the caller.
pub fn is_retryable(error: &TackError) -> bool {
    match error {
        TackError::ToolExecution { .. } => true,
        TackError::ToolTimeout { .. } => true,
        TackError::Io(_) => true,
        TackError::Model(_) => true,

        TackError::UserAbort => false,
        TackError::ModelRetry(_) => false,
        TackError::Cancelled => false,
        TackError::Validation(_) => false,
        TackError::Config(_) => false,
        TackError::Json(_) => false,
        TackError::GlobalRequestTimeout { .. } => false,
        TackError::InvalidStateTransition(_) => false,
        TackError::EmptyResponse { .. } => false,
        TackError::Authorization(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn policy(jitter: f64) -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 5000,
            jitter,
        }
    }

    #[test]
    fn test_retry_policy_default() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.base_delay_ms, 500);
        assert_eq!(policy.max_delay_ms, 5000);
        assert!((policy.jitter - 0.1).abs() < 0.001);
    }

    #[test]
    fn test_backoff_without_jitter() {
        let policy = policy(0.0);
        assert_eq!(policy.backoff(1).as_millis(), 500);
        assert_eq!(policy.backoff(2).as_millis(), 1000);
        assert_eq!(policy.backoff(3).as_millis(), 2000);
        assert_eq!(policy.backoff(4).as_millis(), 4000);
        // Capped
        assert_eq!(policy.backoff(5).as_millis(), 5000);
        assert_eq!(policy.backoff(40).as_millis(), 5000);
    }

    #[test]
    fn test_backoff_attempt_zero_uses_base() {
        assert_eq!(policy(0.0).backoff(0).as_millis(), 500);
    }

    #[test]
    fn test_retryable_errors() {
        assert!(is_retryable(&TackError::tool("bash", "exit 1")));
        assert!(is_retryable(&TackError::ToolTimeout {
            tool: "bash".into(),
            secs: 5
        }));
        assert!(is_retryable(&TackError::Io(std::io::Error::other("disk"))));
    }

    #[test]
    fn test_non_retryable_errors() {
        assert!(!is_retryable(&TackError::UserAbort));
        assert!(!is_retryable(&TackError::ModelRetry("bad path".into())));
        assert!(!is_retryable(&TackError::Cancelled));
        assert!(!is_retryable(&TackError::Validation("missing arg".into())));
        assert!(!is_retryable(&TackError::Config("bad".into())));
    }

    #[test]
    fn test_should_retry_respects_attempt_limit() {
        let policy = policy(0.0);
        let err = TackError::tool("grep", "flaky");
        assert!(policy.should_retry(1, &err));
        assert!(policy.should_retry(2, &err));
        assert!(!policy.should_retry(3, &err));
        assert!(!RetryPolicy::no_retry().should_retry(1, &err));
    }

    #[test]
    fn test_from_tools_config_clamps() {
        let config = ToolsConfig {
            max_retries: 0,
            jitter: 3.0,
            ..ToolsConfig::default()
        };
        let policy = RetryPolicy::from(&config);
        assert_eq!(policy.max_attempts, 1);
        assert!((policy.jitter - 1.0).abs() < f64::EPSILON);
    }

    proptest! {
        #[test]
        fn prop_backoff_within_bounds(attempt in 1u32..64, jitter in 0.0f64..=0.1) {
            let policy = policy(jitter);
            let capped = policy.capped_delay_ms(attempt);
            let delay = policy.backoff(attempt).as_millis() as u64;
            prop_assert!(capped <= 5000);
            prop_assert!(delay >= capped);
            prop_assert!(delay <= capped + (capped as f64 * jitter) as u64);
        }
    }
}
