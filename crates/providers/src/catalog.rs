//! Static catalog provider: a fixed model list from configuration.

use async_trait::async_trait;
use continuum_core::error::ProviderError;
use continuum_core::provider::Provider;

/// A provider whose models are known up front.
pub struct CatalogProvider {
    name: String,
    models: Vec<String>,
}

impl CatalogProvider {
    pub fn new<I, S>(name: impl Into<String>, models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            models: models.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl Provider for CatalogProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list_models(&self) -> std::result::Result<Vec<String>, ProviderError> {
        Ok(self.models.clone())
    }
}
