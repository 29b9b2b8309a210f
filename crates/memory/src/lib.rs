//! Thread persistence for Continuum.

pub mod file_backend;
pub mod in_memory;
pub mod reference;
pub mod store;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use file_backend::FileBackend;
pub use in_memory::InMemoryBackend;
pub use reference::{ReferenceStore, ReferencedFile};
pub use store::{AppendOutcome, StoreSettings, ThreadStore};

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteBackend;
