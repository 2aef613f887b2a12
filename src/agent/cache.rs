// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Compiled agent profiles, cached per model
//!
//! A profile bundles everything the orchestrator derives from settings. The
//! cache is owned by whoever builds orchestrators and is keyed by
//! [`Settings::config_version`]; a different version drops every entry.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use crate::config::settings::{
    AuthorizationConfig, CompactionConfig, ModelPricing, OrchestratorConfig, Settings, ToolsConfig,
};
use crate::error::Result;
use crate::tools::catalog::ToolCatalog;
use crate::tools::retry::RetryPolicy;

/// Everything compiled from settings for one model
#[derive(Debug, Clone)]
pub struct AgentProfile {
    pub model: String,
    pub catalog: ToolCatalog,
    pub policy: RetryPolicy,
    pub limits: OrchestratorConfig,
    pub tools: ToolsConfig,
    pub authorization: AuthorizationConfig,
    pub compaction: CompactionConfig,
    pub pricing: Option<ModelPricing>,
    /// Settings version this profile was compiled from
    pub config_version: u64,
}

impl AgentProfile {
    /// Validate `settings` and compile a profile for `model`.
    pub fn compile(model: &str, settings: &Settings) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            model: model.to_string(),
            catalog: ToolCatalog::builtin(),
            policy: RetryPolicy::from(&settings.tools),
            limits: settings.orchestrator.clone(),
            tools: settings.tools.clone(),
            authorization: settings.authorization.clone(),
            compaction: settings.compaction.clone(),
            pricing: settings.pricing.for_model(model),
            config_version: settings.config_version()?,
        })
    }
}

/// Map whose entries are only valid for one version
#[derive(Debug)]
pub struct VersionedCache<K, V> {
    version: Option<u64>,
    entries: HashMap<K, Arc<V>>,
}

impl<K, V> Default for VersionedCache<K, V> {
    fn default() -> Self {
        Self {
            version: None,
            entries: HashMap::new(),
        }
    }
}

impl<K: Eq + Hash, V> VersionedCache<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Version of the cached entries, if any were built
    pub fn version(&self) -> Option<u64> {
        self.version
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry for `key` at `version`, without building.
    pub fn get(&self, key: &K, version: u64) -> Option<Arc<V>> {
        if self.version != Some(version) {
            return None;
        }
        self.entries.get(key).cloned()
    }

    /// Entry for `key`, building it with `build` on a miss. A version change
    /// clears the whole cache first.
    pub fn get_or_try_insert_with<F>(&mut self, key: K, version: u64, build: F) -> Result<Arc<V>>
    where
        F: FnOnce() -> Result<V>,
    {
        if self.version != Some(version) {
            if !self.entries.is_empty() {
                tracing::debug!(
                    target: "tack.agent.cache",
                    old = ?self.version,
                    new = version,
                    dropped = self.entries.len(),
                    "Config version changed, invalidating cache"
                );
            }
            self.entries.clear();
            self.version = Some(version);
        }

        if let Some(entry) = self.entries.get(&key) {
            return Ok(Arc::clone(entry));
        }
        let entry = Arc::new(build()?);
        self.entries.insert(key, Arc::clone(&entry));
        Ok(entry)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.version = None;
    }
}

/// Profile cache keyed by model name
pub type ProfileCache = VersionedCache<String, AgentProfile>;

impl ProfileCache {
    /// Compiled profile for `model`, rebuilt when `settings` changed.
    pub fn profile_for(&mut self, model: &str, settings: &Settings) -> Result<Arc<AgentProfile>> {
        let version = settings.config_version()?;
        self.get_or_try_insert_with(model.to_string(), version, || {
            AgentProfile::compile(model, settings)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TackError;

    #[test]
    fn test_profile_compiled_once_per_version() {
        let settings = Settings::default();
        let mut cache = ProfileCache::new();

        let first = cache.profile_for("model-a", &settings).unwrap();
        let second = cache.profile_for("model-a", &settings).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);

        cache.profile_for("model-b", &settings).unwrap();
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_settings_change_invalidates() {
        let mut settings = Settings::default();
        let mut cache = ProfileCache::new();
        let before = cache.profile_for("model-a", &settings).unwrap();
        cache.profile_for("model-b", &settings).unwrap();

        settings.orchestrator.max_iterations = 30;
        let after = cache.profile_for("model-a", &settings).unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
        assert_eq!(after.limits.max_iterations, 30);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.version(), Some(settings.config_version().unwrap()));
    }

    #[test]
    fn test_invalid_settings_are_not_cached() {
        let mut settings = Settings::default();
        settings.tools.jitter = 2.0;
        let mut cache = ProfileCache::new();
        let err = cache.profile_for("model-a", &settings).unwrap_err();
        assert!(matches!(err, TackError::Config(_)));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_profile_picks_pricing_by_prefix() {
        let mut settings = Settings::default();
        settings.pricing.models.insert(
            "gpt-4".to_string(),
            ModelPricing {
                input_per_1k: 0.01,
                output_per_1k: 0.03,
            },
        );
        let profile = AgentProfile::compile("gpt-4o-mini", &settings).unwrap();
        assert!(profile.pricing.is_some());
        let profile = AgentProfile::compile("claude", &settings).unwrap();
        assert!(profile.pricing.is_none());
    }

    #[test]
    fn test_get_requires_matching_version() {
        let mut cache: VersionedCache<&str, u32> = VersionedCache::new();
        cache.get_or_try_insert_with("k", 1, || Ok(7)).unwrap();
        assert_eq!(cache.get(&"k", 1).as_deref(), Some(&7));
        assert!(cache.get(&"k", 2).is_none());
    }
}
