//! Configuration loading, validation, and management for Continuum.
//!
//! Loads configuration from `~/.continuum/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use continuum_core::provider::SystemPrompts;
use continuum_core::RestrictionPolicy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The root configuration structure.
///
/// Maps directly to `~/.continuum/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Thread lifetime and size limits
    #[serde(default)]
    pub conversation: ConversationConfig,

    /// Token budget shares and fixed charges
    #[serde(default)]
    pub budget: BudgetConfig,

    /// Model restrictions
    #[serde(default)]
    pub restrictions: RestrictionsConfig,

    /// Model context windows
    #[serde(default)]
    pub models: ModelsConfig,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderConfig>,

    /// System prompts per mode
    #[serde(default)]
    pub prompts: PromptsConfig,

    /// File expansion and size limits
    #[serde(default)]
    pub files: FilesConfig,

    /// Thread persistence
    #[serde(default)]
    pub store: StoreConfig,
}

// --- conversation ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationConfig {
    /// Turn ceiling per thread.
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,

    /// Sliding expiry, in hours.
    #[serde(default = "default_ttl_hours")]
    pub ttl_hours: f64,

    /// Cap on remembered file fingerprints per thread.
    #[serde(default = "default_max_fingerprints")]
    pub max_fingerprints: usize,

    /// Optimistic append attempts before giving up.
    #[serde(default = "default_append_retries")]
    pub append_retries: usize,
}

fn default_max_turns() -> usize {
    continuum_core::thread::DEFAULT_MAX_TURNS
}
fn default_ttl_hours() -> f64 {
    3.0
}
fn default_max_fingerprints() -> usize {
    256
}
fn default_append_retries() -> usize {
    8
}

impl ConversationConfig {
    /// Thread expiry as a `Duration`; rejects values it cannot represent.
    pub fn ttl(&self) -> Result<Duration, ConfigError> {
        Duration::try_from_secs_f64(self.ttl_hours * 3600.0).map_err(|e| {
            ConfigError::ValidationError(format!(
                "conversation.ttl_hours {} is out of range: {e}",
                self.ttl_hours
            ))
        })
    }
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
            ttl_hours: default_ttl_hours(),
            max_fingerprints: default_max_fingerprints(),
            append_retries: default_append_retries(),
        }
    }
}

// --- budget ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    /// Share of the context window kept free for the model's reply.
    #[serde(default = "default_response_reserve")]
    pub response_reserve: f64,

    /// Share of the post-system-prompt budget history may use.
    #[serde(default = "default_history_share")]
    pub history_share: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_history_tokens: Option<usize>,

    /// Fixed charge for a reference line.
    #[serde(default = "default_reference_tokens")]
    pub reference_tokens: usize,

    /// Fixed charge for a summary.
    #[serde(default = "default_summary_tokens")]
    pub summary_tokens: usize,

    #[serde(default = "default_estimate_timeout_ms")]
    pub estimate_timeout_ms: u64,

    #[serde(default = "default_summary_timeout_ms")]
    pub summary_timeout_ms: u64,

    /// Hard cap on the total budget regardless of model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_context_tokens: Option<usize>,
}

fn default_response_reserve() -> f64 {
    0.3
}
fn default_history_share() -> f64 {
    0.5
}
fn default_reference_tokens() -> usize {
    24
}
fn default_summary_tokens() -> usize {
    256
}
fn default_estimate_timeout_ms() -> u64 {
    2_000
}
fn default_summary_timeout_ms() -> u64 {
    5_000
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            response_reserve: default_response_reserve(),
            history_share: default_history_share(),
            max_history_tokens: None,
            reference_tokens: default_reference_tokens(),
            summary_tokens: default_summary_tokens(),
            estimate_timeout_ms: default_estimate_timeout_ms(),
            summary_timeout_ms: default_summary_timeout_ms(),
            max_context_tokens: None,
        }
    }
}

// --- restrictions ---

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RestrictionsConfig {
    #[serde(default)]
    pub blocked_models: Vec<String>,

    /// Case-insensitive substrings; any model containing one is disabled.
    #[serde(default)]
    pub disabled_patterns: Vec<String>,

    /// Provider name → allowed models. Empty or absent means unrestricted.
    #[serde(default)]
    pub allowed_models: BTreeMap<String, Vec<String>>,

    /// Provider name → models in preference order for "auto".
    #[serde(default)]
    pub priority: BTreeMap<String, Vec<String>>,

    #[serde(default)]
    pub provider_order: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_model: Option<String>,
}

impl RestrictionsConfig {
    /// Build the immutable policy snapshot.
    pub fn policy(&self) -> RestrictionPolicy {
        let mut policy = RestrictionPolicy::new();
        for model in &self.blocked_models {
            policy = policy.block(model);
        }
        for pattern in &self.disabled_patterns {
            policy = policy.block_pattern(pattern);
        }
        for (provider, models) in &self.allowed_models {
            policy = policy.allow(provider, models);
        }
        for (provider, models) in &self.priority {
            policy = policy.with_priority(provider, models);
        }
        if let Some(fallback) = &self.fallback_model {
            policy = policy.with_fallback(fallback);
        }
        policy.with_provider_order(&self.provider_order)
    }
}

// --- models ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    /// Model name substring → context window in tokens.
    ///
    /// The longest matching key wins; the `default` key applies otherwise.
    #[serde(default = "default_context_limits")]
    pub context_limits: BTreeMap<String, usize>,
}

const DEFAULT_CONTEXT_LIMIT: usize = 100_000;

fn default_context_limits() -> BTreeMap<String, usize> {
    [
        ("gemini-2.0-flash-exp", 1_000_000),
        ("gemini-2.0-flash-thinking-exp", 32_768),
        ("gemini-1.5-pro", 2_000_000),
        ("gemini-1.5-flash", 1_000_000),
        ("gpt-4o", 128_000),
        ("gpt-4o-mini", 128_000),
        ("o1", 200_000),
        ("o1-mini", 128_000),
        ("o3-mini", 200_000),
        ("claude-3.5-sonnet", 200_000),
        ("default", DEFAULT_CONTEXT_LIMIT),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            context_limits: default_context_limits(),
        }
    }
}

impl ModelsConfig {
    /// Context window for a model, by longest substring match.
    pub fn context_limit(&self, model: &str) -> usize {
        let model = model.to_lowercase();
        self.context_limits
            .iter()
            .filter(|(key, _)| key.as_str() != "default")
            .filter(|(key, _)| model.contains(&key.to_lowercase()))
            .max_by_key(|(key, _)| key.len())
            .map(|(_, limit)| *limit)
            .or_else(|| self.context_limits.get("default").copied())
            .unwrap_or(DEFAULT_CONTEXT_LIMIT)
    }
}

// --- providers ---

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    /// Static model list. When set, no catalog request is made.
    #[serde(default)]
    pub models: Vec<String>,
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("models", &self.models)
            .finish()
    }
}

// --- prompts ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptsConfig {
    /// Used for any mode without its own entry.
    #[serde(default = "default_prompt")]
    pub default: String,

    #[serde(default = "default_mode_prompts")]
    pub modes: BTreeMap<String, String>,
}

fn default_prompt() -> String {
    "You are a senior engineer assisting another AI agent. Be precise and concise.".into()
}

fn default_mode_prompts() -> BTreeMap<String, String> {
    [
        ("chat", "General development discussion and Q&A."),
        ("analyze", "Analyze the code and architecture provided."),
        ("review", "Review the code for bugs, security issues, and quality."),
        ("debug", "Debug the issue and find its root cause."),
        ("plan", "Plan the project and break it into tasks."),
        ("test", "Generate comprehensive tests."),
        ("refactor", "Suggest concrete code improvements."),
        ("think", "Reason deeply about the problem before answering."),
    ]
    .into_iter()
    .map(|(mode, task)| (mode.to_string(), format!("{} {task}", default_prompt())))
    .collect()
}

impl Default for PromptsConfig {
    fn default() -> Self {
        Self {
            default: default_prompt(),
            modes: default_mode_prompts(),
        }
    }
}

impl SystemPrompts for PromptsConfig {
    fn system_prompt(&self, mode: &str) -> String {
        self.modes
            .get(&mode.to_lowercase())
            .cloned()
            .unwrap_or_else(|| self.default.clone())
    }
}

// --- files ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilesConfig {
    /// Bytes; larger files are rejected.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    /// Extensions (without dot) picked up when expanding directories.
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,

    /// Directory names skipped when expanding directories.
    #[serde(default = "default_excluded_dirs")]
    pub excluded_dirs: Vec<String>,
}

fn default_max_file_size() -> u64 {
    10_000_000
}

fn default_allowed_extensions() -> Vec<String> {
    [
        "py", "js", "ts", "jsx", "tsx", "java", "c", "cpp", "h", "cs", "rb", "go", "rs", "swift",
        "kt", "php", "sql", "html", "css", "scss", "json", "xml", "yaml", "yml", "md", "txt",
        "log", "conf", "ini", "toml", "env", "csv", "sh", "bash", "zsh", "fish", "ps1", "bat",
        "cmd",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_excluded_dirs() -> Vec<String> {
    [
        "__pycache__",
        ".git",
        ".svn",
        ".hg",
        "node_modules",
        ".venv",
        "venv",
        ".env",
        "dist",
        "build",
        "target",
        ".pytest_cache",
        ".mypy_cache",
        ".tox",
        "coverage_html_report",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            max_file_size: default_max_file_size(),
            allowed_extensions: default_allowed_extensions(),
            excluded_dirs: default_excluded_dirs(),
        }
    }
}

// --- store ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// `memory`, `file` or `sqlite`.
    #[serde(default = "default_store_backend")]
    pub backend: String,

    /// Directory (file backend) or database file (sqlite backend).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

fn default_store_backend() -> String {
    "file".into()
}

const STORE_BACKENDS: &[&str] = &["memory", "file", "sqlite"];

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            path: None,
        }
    }
}

impl StoreConfig {
    /// The configured path, or the backend's default under the config dir.
    pub fn resolved_path(&self) -> PathBuf {
        match &self.path {
            Some(path) => path.clone(),
            None if self.backend == "sqlite" => AppConfig::config_dir().join("threads.db"),
            None => AppConfig::config_dir().join("threads"),
        }
    }
}

// --- loading ---

/// Environment variable → provider name for allow-list overrides.
const ALLOW_LIST_ENV: &[(&str, &str)] = &[
    ("OPENAI_ALLOWED_MODELS", "openai"),
    ("GOOGLE_ALLOWED_MODELS", "gemini"),
    ("ANTHROPIC_ALLOWED_MODELS", "anthropic"),
];

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

impl AppConfig {
    /// Load configuration from the default path with environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides through `lookup`.
    ///
    /// Empty values are ignored, so an exported-but-blank variable never
    /// clears a configured list.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        for (var, provider) in ALLOW_LIST_ENV {
            if let Some(value) = get(var) {
                self.restrictions
                    .allowed_models
                    .insert(provider.to_string(), split_list(&value));
            }
        }
        if let Some(value) = get("BLOCKED_MODELS") {
            self.restrictions.blocked_models = split_list(&value);
        }
        if let Some(value) = get("DISABLED_MODEL_PATTERNS") {
            self.restrictions.disabled_patterns = split_list(&value);
        }
        if let Some(value) = get("DEFAULT_MODEL") {
            self.restrictions.fallback_model = Some(value.trim().to_string());
        }
        if let Some(value) = get("MAX_CONVERSATION_TURNS") {
            self.conversation.max_turns = parse_env("MAX_CONVERSATION_TURNS", &value)?;
        }
        if let Some(value) = get("CONVERSATION_TIMEOUT_HOURS") {
            self.conversation.ttl_hours = parse_env("CONVERSATION_TIMEOUT_HOURS", &value)?;
        }
        if let Some(value) = get("MAX_FILE_SIZE") {
            self.files.max_file_size = parse_env("MAX_FILE_SIZE", &value)?;
        }
        if let Some(value) = get("CONTINUUM_STORE") {
            self.store.backend = value.trim().to_lowercase();
        }
        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".continuum")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.conversation.max_turns == 0 {
            return Err(ConfigError::ValidationError(
                "conversation.max_turns must be at least 1".into(),
            ));
        }
        if !(self.conversation.ttl_hours.is_finite() && self.conversation.ttl_hours > 0.0) {
            return Err(ConfigError::ValidationError(
                "conversation.ttl_hours must be positive".into(),
            ));
        }
        self.conversation.ttl()?;
        if self.conversation.max_fingerprints == 0 || self.conversation.append_retries == 0 {
            return Err(ConfigError::ValidationError(
                "conversation.max_fingerprints and append_retries must be at least 1".into(),
            ));
        }
        if !(0.0..1.0).contains(&self.budget.response_reserve) {
            return Err(ConfigError::ValidationError(
                "budget.response_reserve must be in [0.0, 1.0)".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.budget.history_share) {
            return Err(ConfigError::ValidationError(
                "budget.history_share must be in [0.0, 1.0]".into(),
            ));
        }
        if !STORE_BACKENDS.contains(&self.store.backend.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "store.backend must be one of {}, got '{}'",
                STORE_BACKENDS.join(", "),
                self.store.backend
            )));
        }
        Ok(())
    }

    /// The restriction policy snapshot for this configuration.
    pub fn restriction_policy(&self) -> RestrictionPolicy {
        self.restrictions.policy()
    }

    /// Context window for a model.
    pub fn context_limit(&self, model: &str) -> usize {
        self.models.context_limit(model)
    }

    /// Total assembly budget for a model: the context window minus the
    /// response reserve, optionally capped.
    pub fn total_budget(&self, model: &str) -> usize {
        let limit = self.context_limit(model) as f64 * (1.0 - self.budget.response_reserve);
        let budget = limit.round() as usize;
        match self.budget.max_context_tokens {
            Some(cap) => budget.min(cap),
            None => budget,
        }
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::ValidationError(format!("{key} has an invalid value: '{value}'")))
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl From<ConfigError> for continuum_core::Error {
    fn from(err: ConfigError) -> Self {
        continuum_core::Error::Config {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use continuum_core::RestrictionRule;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.conversation.max_turns, 20);
        assert_eq!(config.conversation.ttl().unwrap(), Duration::from_secs(3 * 3600));
        assert_eq!(config.budget.reference_tokens, 24);
        assert_eq!(config.store.backend, "file");
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.conversation.max_turns, config.conversation.max_turns);
        assert_eq!(parsed.models.context_limits, config.models.context_limits);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let toml_str = r#"
            [conversation]
            max_turns = 5

            [restrictions]
            blocked_models = ["gpt-4"]
            disabled_patterns = ["legacy"]

            [restrictions.allowed_models]
            openai = ["gpt-4", "gpt-4o-mini"]
        "#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.conversation.max_turns, 5);
        assert_eq!(config.conversation.max_fingerprints, 256);

        let policy = config.restriction_policy();
        assert_eq!(policy.check("openai", "gpt-4"), Err(RestrictionRule::Blocked));
        assert_eq!(policy.check("openai", "gpt-4o-mini"), Ok(()));
        assert!(matches!(
            policy.check("openai", "legacy-model"),
            Err(RestrictionRule::PatternBlocked { .. })
        ));
    }

    #[test]
    fn env_overrides_restrictions() {
        let mut config = AppConfig::default();
        config
            .apply_env(env(&[
                ("GOOGLE_ALLOWED_MODELS", "gemini-1.5-flash, gemini-1.5-pro"),
                ("BLOCKED_MODELS", "o1"),
                ("DEFAULT_MODEL", "gemini-1.5-flash"),
                ("MAX_CONVERSATION_TURNS", "7"),
                ("OPENAI_ALLOWED_MODELS", ""),
            ]))
            .unwrap();

        assert_eq!(
            config.restrictions.allowed_models["gemini"],
            vec!["gemini-1.5-flash", "gemini-1.5-pro"]
        );
        assert!(!config.restrictions.allowed_models.contains_key("openai"));
        assert_eq!(config.restrictions.blocked_models, vec!["o1"]);
        assert_eq!(config.conversation.max_turns, 7);

        let policy = config.restriction_policy();
        assert_eq!(policy.fallback_model(), Some("gemini-1.5-flash"));
        assert!(policy.check("gemini", "gemini-2.0-flash-exp").is_err());
    }

    #[test]
    fn invalid_env_number_rejected() {
        let mut config = AppConfig::default();
        let err = config
            .apply_env(env(&[("CONVERSATION_TIMEOUT_HOURS", "soon")]))
            .unwrap_err();
        assert!(err.to_string().contains("CONVERSATION_TIMEOUT_HOURS"));
    }

    #[test]
    fn invalid_values_rejected() {
        let mut config = AppConfig::default();
        config.conversation.max_turns = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.budget.response_reserve = 1.0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.store.backend = "redis".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn unrepresentable_ttl_rejected() {
        let mut config = AppConfig::default();
        config.conversation.ttl_hours = 1e300;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("conversation.ttl_hours"));
        assert!(config.conversation.ttl().is_err());
    }

    #[test]
    fn context_limit_prefers_longest_match() {
        let models = ModelsConfig::default();
        assert_eq!(models.context_limit("gpt-4o-mini"), 128_000);
        assert_eq!(models.context_limit("gemini-1.5-pro-002"), 2_000_000);
        assert_eq!(models.context_limit("o3-mini"), 200_000);
        assert_eq!(models.context_limit("mystery-model"), 100_000);
    }

    #[test]
    fn total_budget_applies_reserve_and_cap() {
        let mut config = AppConfig::default();
        assert_eq!(config.total_budget("unknown"), 70_000);
        config.budget.max_context_tokens = Some(1_000);
        assert_eq!(config.total_budget("gpt-4o"), 1_000);
    }

    #[test]
    fn prompts_fall_back_to_default() {
        let prompts = PromptsConfig::default();
        assert!(prompts.system_prompt("Review").contains("bugs"));
        assert_eq!(prompts.system_prompt("unknown-mode"), prompts.default);
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.conversation.max_turns, 20);
    }

    #[test]
    fn config_file_is_loaded_and_validated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[budget]\nhistory_share = 2.0\n").unwrap();
        assert!(matches!(
            AppConfig::load_from(&path),
            Err(ConfigError::ValidationError(_))
        ));

        std::fs::write(&path, "[store]\nbackend = \"memory\"\n").unwrap();
        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.store.backend, "memory");
    }

    #[test]
    fn api_keys_are_redacted() {
        let provider = ProviderConfig {
            api_key: Some("sk-secret".into()),
            ..Default::default()
        };
        let debug = format!("{provider:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn store_path_defaults_per_backend() {
        let sqlite = StoreConfig {
            backend: "sqlite".into(),
            path: None,
        };
        assert!(sqlite.resolved_path().ends_with("threads.db"));
        assert!(StoreConfig::default().resolved_path().ends_with("threads"));
    }
}
