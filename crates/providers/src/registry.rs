//! Provider registry: providers by name, and the combined model catalog.
//!
//! Threads record the provider name they were pinned to; the registry is how
//! that name gets back to a live provider.

use crate::catalog::CatalogProvider;
use crate::openai_compat::OpenAiCompatProvider;
use continuum_core::provider::{ModelCatalog, Provider};
use futures::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Registered providers keyed by lowercase name.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<String, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider under its own name.
    pub fn register(&mut self, provider: Arc<dyn Provider>) {
        self.providers
            .insert(provider.name().to_lowercase(), provider);
    }

    /// Get a specific provider by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(&name.to_lowercase()).cloned()
    }

    /// All registered provider names, sorted.
    pub fn list(&self) -> Vec<&str> {
        self.providers.keys().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Ask every provider for its models concurrently.
    ///
    /// A provider that fails or exceeds `timeout` is skipped with a warning;
    /// its models are simply unavailable for this call.
    pub async fn catalog(&self, timeout: Duration) -> ModelCatalog {
        let lookups = self.providers.iter().map(|(name, provider)| async move {
            let result = tokio::time::timeout(timeout, provider.list_models()).await;
            (name, result)
        });

        let mut catalog = ModelCatalog::new();
        for (name, result) in join_all(lookups).await {
            match result {
                Ok(Ok(models)) => {
                    catalog.insert(
                        name.clone(),
                        models.into_iter().map(|m| m.to_lowercase()).collect(),
                    );
                }
                Ok(Err(e)) => {
                    warn!(provider = %name, error = %e, "Catalog: provider failed, skipping");
                }
                Err(_) => {
                    warn!(
                        provider = %name,
                        timeout_ms = timeout.as_millis() as u64,
                        "Catalog: provider timed out, skipping"
                    );
                }
            }
        }
        catalog
    }
}

/// Build providers from configuration.
///
/// Providers with a static `models` list never touch the network.
pub fn build_from_config(config: &continuum_config::AppConfig) -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();

    for (name, provider_config) in &config.providers {
        let provider: Arc<dyn Provider> = if !provider_config.models.is_empty() {
            Arc::new(CatalogProvider::new(
                name.clone(),
                provider_config.models.iter().cloned(),
            ))
        } else {
            let api_key = provider_config
                .api_key
                .clone()
                .or_else(|| std::env::var(api_key_env(name)).ok())
                .unwrap_or_default();

            let base_url = provider_config
                .api_url
                .clone()
                .unwrap_or_else(|| default_base_url(name));

            let mut provider = OpenAiCompatProvider::new(name.clone(), base_url, api_key.clone());
            if name == "anthropic" {
                provider = provider
                    .with_header("x-api-key", api_key)
                    .with_header("anthropic-version", "2023-06-01");
            }
            Arc::new(provider)
        };

        registry.register(provider);
    }

    info!(providers = ?registry.list(), "Provider registry built");
    registry
}

/// Environment variable consulted for a provider's key when the config has none.
fn api_key_env(provider_name: &str) -> String {
    format!(
        "{}_API_KEY",
        provider_name.to_uppercase().replace(['-', '.'], "_")
    )
}

/// Get the default base URL for well-known providers.
fn default_base_url(provider_name: &str) -> String {
    match provider_name {
        "openai" => "https://api.openai.com/v1".into(),
        "gemini" | "google" => "https://generativelanguage.googleapis.com/v1beta/openai".into(),
        "anthropic" => "https://api.anthropic.com/v1".into(),
        "openrouter" => "https://openrouter.ai/api/v1".into(),
        "xai" => "https://api.x.ai/v1".into(),
        "deepseek" => "https://api.deepseek.com/v1".into(),
        "ollama" => "http://localhost:11434/v1".into(),
        "vllm" => "http://localhost:8000/v1".into(),
        "custom" => "http://localhost:8080/v1".into(),
        _ => format!("https://{provider_name}.api.example.com/v1"),
    }
}
