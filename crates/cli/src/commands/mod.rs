//! CLI subcommands and the shared runtime they open.

pub mod assemble;
pub mod config_cmd;
pub mod models;
pub mod policy;
pub mod respond;
pub mod sweep;
pub mod thread;

use continuum_config::{AppConfig, ConfigError};
use continuum_core::store::ThreadBackend;
use continuum_engine::ContextAssembler;
use continuum_memory::{FileBackend, InMemoryBackend, StoreSettings, ThreadStore};
use continuum_providers::ProviderRegistry;
use std::sync::Arc;
use std::time::Duration;

pub type CliResult = Result<(), Box<dyn std::error::Error>>;

/// Loaded configuration plus the thread store it selects.
pub struct Runtime {
    pub config: Arc<AppConfig>,
    pub store: ThreadStore,
}

impl Runtime {
    pub async fn load() -> Result<Self, Box<dyn std::error::Error>> {
        let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
        let settings = store_settings(&config)?;
        let backend = open_backend(&config, &settings).await?;
        let store = ThreadStore::new(backend, settings);
        Ok(Self {
            config: Arc::new(config),
            store,
        })
    }

    pub fn registry(&self) -> ProviderRegistry {
        continuum_providers::build_from_config(&self.config)
    }

    pub fn assembler(&self) -> ContextAssembler {
        ContextAssembler::new(self.config.clone(), self.store.clone(), self.registry())
    }
}

pub fn store_settings(config: &AppConfig) -> Result<StoreSettings, ConfigError> {
    Ok(StoreSettings {
        ttl: config.conversation.ttl()?,
        max_turns: config.conversation.max_turns,
        max_fingerprints: config.conversation.max_fingerprints,
        append_retries: config.conversation.append_retries,
    })
}

/// Longest pause between in-memory expiry sweeps.
const MAX_SWEEP_INTERVAL: Duration = Duration::from_secs(300);

async fn open_backend(
    config: &AppConfig,
    settings: &StoreSettings,
) -> Result<Arc<dyn ThreadBackend>, Box<dyn std::error::Error>> {
    let path = config.store.resolved_path();
    match config.store.backend.as_str() {
        "memory" => {
            let backend = Arc::new(InMemoryBackend::new());
            backend.spawn_sweeper(sweep_interval(settings.ttl));
            Ok(backend)
        }
        "file" => Ok(Arc::new(FileBackend::new(path))),
        #[cfg(feature = "sqlite")]
        "sqlite" => Ok(Arc::new(continuum_memory::SqliteBackend::open(&path).await?)),
        other => Err(format!("Unsupported store backend '{other}'").into()),
    }
}

fn sweep_interval(ttl: Duration) -> Duration {
    ttl.clamp(Duration::from_secs(1), MAX_SWEEP_INTERVAL)
}
