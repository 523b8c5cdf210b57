//! Backend selection from configuration.

use std::path::Path;

use docstate_core::client::BoxDocumentClient;
use docstate_core::storage::DocumentStorage;
use docstate_types::config::{BackendKind, DocstateConfig};
use docstate_types::error::ConfigError;

use crate::fs::FsDocumentClient;
use crate::memory::InMemoryDocumentClient;

/// Build the document client named by `[backend]`.
pub fn build_client(config: &DocstateConfig, data_dir: &Path) -> BoxDocumentClient {
    match config.backend.kind {
        BackendKind::Memory => {
            tracing::debug!("using in-memory document backend");
            BoxDocumentClient::new(InMemoryDocumentClient::new())
        }
        BackendKind::Fs => {
            let root = config.backend.root_dir(data_dir);
            tracing::debug!(root = %root.display(), "using filesystem document backend");
            BoxDocumentClient::new(FsDocumentClient::new(root))
        }
    }
}

/// Build a storage coordinator over the configured backend.
pub fn build_storage(
    config: &DocstateConfig,
    data_dir: &Path,
) -> Result<DocumentStorage<BoxDocumentClient>, ConfigError> {
    DocumentStorage::new(build_client(config, data_dir), config.storage.clone())
}
