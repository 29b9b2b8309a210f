//! Error types for the Continuum domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; `Error` is the umbrella
//! type returned across crate boundaries.

use crate::policy::RestrictionRule;
use thiserror::Error;

/// The top-level error type for all Continuum operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Conversation / assembly errors ---
    #[error("{0}")]
    Context(#[from] ContextError),

    // --- Persistence errors ---
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // --- Provider capability errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- File access errors ---
    #[error("File error: {0}")]
    File(#[from] FileError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// The unknown/expired continuation case, which callers treat as
    /// "start fresh" rather than as a failure.
    pub fn is_thread_not_found(&self) -> bool {
        matches!(self, Self::Context(ContextError::ThreadNotFound { .. }))
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures of the continuity core itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextError {
    #[error("Thread not found or expired: {thread_id}")]
    ThreadNotFound { thread_id: String },

    #[error("Thread {thread_id} reached its limit of {max_turns} turns; start a new thread")]
    ThreadExhausted { thread_id: String, max_turns: usize },

    #[error("Model '{model}' is restricted{}: {rule}", provider.as_deref().map(|p| format!(" for provider '{p}'")).unwrap_or_default())]
    ModelRestricted {
        model: String,
        provider: Option<String>,
        rule: RestrictionRule,
    },

    #[error("Model '{model}' is not offered by any configured provider")]
    ModelUnavailable { model: String },

    #[error(
        "No eligible model (requested: {}, fallback: {})",
        requested.as_deref().unwrap_or("auto"),
        fallback.as_deref().unwrap_or("none")
    )]
    NoEligibleModel {
        requested: Option<String>,
        fallback: Option<String>,
    },

    #[error("System prompt ({system_tokens} tokens) exceeds budget ({budget} tokens)")]
    BudgetExceeded { system_tokens: usize, budget: usize },

    #[error("{capability} did not respond for '{target}' within {timeout_ms}ms")]
    ExternalCapabilityTimeout {
        capability: String,
        target: String,
        timeout_ms: u64,
    },
}

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Storage backend failure: {0}")]
    Backend(String),

    #[error("Corrupted thread record {thread_id}: {reason}")]
    Corrupted { thread_id: String, reason: String },

    #[error("Thread {thread_id} kept changing underneath us ({attempts} attempts)")]
    Conflict { thread_id: String, attempts: usize },

    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Summarization failed: {0}")]
    Summarization(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FileError {
    #[error("File not found: {path}")]
    NotFound { path: String },

    #[error("Path must be absolute: {path}")]
    NotAbsolute { path: String },

    #[error("File too large ({size} bytes, limit {limit}): {path}")]
    TooLarge { path: String, size: u64, limit: u64 },

    #[error("Failed to read {path}: {reason}")]
    Unreadable { path: String, reason: String },
}
