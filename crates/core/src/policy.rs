//! Restriction policy: which models may be selected.
//!
//! A `RestrictionPolicy` is an immutable snapshot of the process-wide model
//! restrictions. It is built once (usually from configuration) and passed by
//! reference into model resolution, so resolution stays a pure function.
//!
//! Precedence, highest first:
//! 1. Global block-list (exact, case-insensitive)
//! 2. Block patterns (case-insensitive substring)
//! 3. Per-provider allow-list: when non-empty, every model not on it is
//!    implicitly blocked for that provider

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// The rule that rejected a model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum RestrictionRule {
    /// Model is on the global block-list.
    Blocked,
    /// Model name contains a disabled pattern.
    PatternBlocked { pattern: String },
    /// Provider has an allow-list and the model is not on it.
    NotAllowListed { provider: String },
}

impl std::fmt::Display for RestrictionRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Blocked => write!(f, "on the global block-list"),
            Self::PatternBlocked { pattern } => {
                write!(f, "matches disabled pattern '{pattern}'")
            }
            Self::NotAllowListed { provider } => {
                write!(f, "not on the allow-list for provider '{provider}'")
            }
        }
    }
}

/// Immutable model restriction snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RestrictionPolicy {
    /// Per-provider allow-lists (lowercased).
    #[serde(default)]
    allowed: BTreeMap<String, BTreeSet<String>>,

    /// Globally blocked model names (lowercased).
    #[serde(default)]
    blocked: BTreeSet<String>,

    /// Disabled substrings (lowercased).
    #[serde(default)]
    patterns: Vec<String>,

    /// Model tried once when automatic selection finds nothing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    fallback_model: Option<String>,

    /// Per-provider model priority, highest first.
    #[serde(default)]
    priority: BTreeMap<String, Vec<String>>,

    /// Provider visiting order for automatic selection.
    #[serde(default)]
    provider_order: Vec<String>,
}

fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}

impl RestrictionPolicy {
    /// An unrestricted policy with no fallback.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a model to the global block-list.
    pub fn block(mut self, model: &str) -> Self {
        let model = normalize(model);
        if !model.is_empty() {
            self.blocked.insert(model);
        }
        self
    }

    /// Add a disabled substring pattern.
    pub fn block_pattern(mut self, pattern: &str) -> Self {
        let pattern = normalize(pattern);
        if !pattern.is_empty() && !self.patterns.contains(&pattern) {
            self.patterns.push(pattern);
        }
        self
    }

    /// Restrict a provider to the given models.
    ///
    /// An empty iterator leaves the provider unrestricted.
    pub fn allow<I, S>(mut self, provider: &str, models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let models: BTreeSet<String> = models
            .into_iter()
            .map(|m| normalize(m.as_ref()))
            .filter(|m| !m.is_empty())
            .collect();
        if !models.is_empty() {
            self.allowed
                .entry(normalize(provider))
                .or_default()
                .extend(models);
        }
        self
    }

    /// Set the fallback model.
    pub fn with_fallback(mut self, model: &str) -> Self {
        let model = normalize(model);
        self.fallback_model = (!model.is_empty() && model != "auto").then_some(model);
        self
    }

    /// Set the priority list for a provider (highest first).
    pub fn with_priority<I, S>(mut self, provider: &str, models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let models: Vec<String> = models.into_iter().map(|m| normalize(m.as_ref())).collect();
        self.priority.insert(normalize(provider), models);
        self
    }

    /// Set the provider order used by automatic selection.
    pub fn with_provider_order<I, S>(mut self, providers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.provider_order = providers
            .into_iter()
            .map(|p| normalize(p.as_ref()))
            .collect();
        self
    }

    /// Check a model against every rule for the given provider.
    pub fn check(&self, provider: &str, model: &str) -> Result<(), RestrictionRule> {
        let model = normalize(model);

        if self.blocked.contains(&model) {
            return Err(RestrictionRule::Blocked);
        }

        if let Some(pattern) = self.patterns.iter().find(|p| model.contains(p.as_str())) {
            return Err(RestrictionRule::PatternBlocked {
                pattern: pattern.clone(),
            });
        }

        let provider = normalize(provider);
        if let Some(allowed) = self.allowed.get(&provider) {
            if !allowed.contains(&model) {
                return Err(RestrictionRule::NotAllowListed { provider });
            }
        }

        Ok(())
    }

    pub fn fallback_model(&self) -> Option<&str> {
        self.fallback_model.as_deref()
    }

    /// Priority list for a provider, highest first (empty if unset).
    pub fn priority_for(&self, provider: &str) -> &[String] {
        self.priority
            .get(&normalize(provider))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn provider_order(&self) -> &[String] {
        &self.provider_order
    }

    /// Whether any restriction is configured at all.
    pub fn is_unrestricted(&self) -> bool {
        self.allowed.is_empty() && self.blocked.is_empty() && self.patterns.is_empty()
    }

    /// Human/JSON-friendly summary of the active restrictions.
    pub fn summary(&self) -> RestrictionSummary {
        RestrictionSummary {
            allowed: self
                .allowed
                .iter()
                .map(|(p, models)| (p.clone(), models.iter().cloned().collect()))
                .collect(),
            blocked_models: self.blocked.iter().cloned().collect(),
            disabled_patterns: self.patterns.clone(),
            fallback_model: self.fallback_model.clone(),
        }
    }
}

/// Flattened view of a policy for display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestrictionSummary {
    pub allowed: BTreeMap<String, Vec<String>>,
    pub blocked_models: Vec<String>,
    pub disabled_patterns: Vec<String>,
    pub fallback_model: Option<String>,
}
