//! Provider implementations for Continuum.
//!
//! All providers implement the `continuum_core::Provider` trait. The
//! registry hands them out by name and merges their model catalogs.

pub mod catalog;
pub mod openai_compat;
pub mod registry;
pub mod summarizer;

pub use catalog::CatalogProvider;
pub use openai_compat::OpenAiCompatProvider;
pub use registry::{build_from_config, ProviderRegistry};
pub use summarizer::OutlineSummarizer;
