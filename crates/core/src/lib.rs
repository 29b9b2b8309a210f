//! # Continuum Core
//!
//! Domain types, capability traits, and error definitions for the Continuum
//! conversation continuity engine. This crate does no I/O and needs no async
//! runtime; its dependencies are limited to serde, thiserror, async-trait,
//! uuid, chrono and tracing. It defines the model that the store, provider
//! and engine crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator is a trait here (`Provider`, `Summarizer`,
//! `SystemPrompts`, `FileSource`, `ThreadBackend`). Implementations live in
//! their respective crates, so tests can swap in scripted doubles.

pub mod error;
pub mod file;
pub mod fingerprint;
pub mod invocation;
pub mod policy;
pub mod provider;
pub mod store;
pub mod thread;
pub mod token;

// Re-export key types at crate root for ergonomics
pub use error::{ContextError, Error, FileError, ProviderError, Result, StoreError};
pub use file::{FileHandlingMode, FileReference, FileSource};
pub use fingerprint::{Fingerprint, FingerprintSet};
pub use invocation::{ThinkingMode, ToolInvocation};
pub use policy::{RestrictionPolicy, RestrictionRule, RestrictionSummary};
pub use provider::{ModelCatalog, Provider, Summarizer, SystemPrompts};
pub use store::{StoredThread, ThreadBackend, WriteOutcome};
pub use thread::{ModelPin, RefTag, Role, Thread, ThreadId, Turn, TurnFileRef};
