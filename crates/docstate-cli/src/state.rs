//! Application state wiring the configured backend to a storage coordinator.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use docstate_core::client::BoxDocumentClient;
use docstate_core::storage::DocumentStorage;
use docstate_infra::backend::build_storage;
use docstate_infra::config::{load_storage_config, resolve_data_dir};
use docstate_types::config::DocstateConfig;

/// Coordinator pinned to the runtime-selected backend.
pub type ConcreteStorage = DocumentStorage<BoxDocumentClient>;

/// State shared by every command handler.
#[derive(Clone)]
pub struct AppState {
    pub data_dir: PathBuf,
    pub config: DocstateConfig,
    pub storage: Arc<ConcreteStorage>,
}

impl AppState {
    /// Resolve the data directory, load `config.toml`, and build the coordinator.
    ///
    /// Nothing touches the database until a command calls into the storage.
    pub async fn init(data_dir: Option<PathBuf>) -> anyhow::Result<Self> {
        let data_dir = data_dir.unwrap_or_else(resolve_data_dir);
        let config = load_storage_config(&data_dir).await;
        let storage = build_storage(&config, &data_dir)
            .with_context(|| format!("invalid configuration in {}", data_dir.display()))?;

        tracing::debug!(
            data_dir = %data_dir.display(),
            backend = ?config.backend.kind,
            database = %config.storage.database_name,
            collection = %config.storage.collection_name,
            "application state ready"
        );

        Ok(Self {
            data_dir,
            config,
            storage: Arc::new(storage),
        })
    }
}
