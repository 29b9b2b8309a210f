//! Provider, summarizer and prompt capabilities.
//!
//! The continuity core never generates text itself. It only needs to know
//! which models each provider offers and how many tokens a piece of text
//! costs for that provider. Concrete providers are selected by the name
//! stored on a thread or turn, never by type inspection.

use crate::error::ProviderError;
use crate::token;
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};

/// Models offered per provider name.
pub type ModelCatalog = BTreeMap<String, BTreeSet<String>>;

/// The capability set a provider exposes to the continuity core.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "openai", "gemini").
    fn name(&self) -> &str;

    /// List the models this provider can serve.
    async fn list_models(&self) -> std::result::Result<Vec<String>, ProviderError>;

    /// Estimate the token cost of `text` for this provider's tokenizer.
    ///
    /// Default implementation uses the 4-characters-per-token heuristic.
    async fn estimate_tokens(&self, text: &str) -> std::result::Result<usize, ProviderError> {
        Ok(token::estimate_tokens(text))
    }
}

/// Produces bounded-length summaries of files.
#[async_trait]
pub trait Summarizer: Send + Sync {
    fn name(&self) -> &str;

    /// Summarize `content`, read from `path`, in at most roughly
    /// `max_tokens` tokens.
    async fn summarize(
        &self,
        path: &str,
        content: &str,
        max_tokens: usize,
    ) -> std::result::Result<String, ProviderError>;
}

/// Mode-specific system prompt text.
pub trait SystemPrompts: Send + Sync {
    fn system_prompt(&self, mode: &str) -> String;
}
