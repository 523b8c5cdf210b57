//! Filesystem-backed document database.
//!
//! Implements the `DocumentClient` trait from `docstate-core` with one JSON
//! file per document.
//!
//! Directory layout under the root:
//! ```text
//! {root}/dbs/{db}/
//!   colls/{coll}/
//!     collection.json
//!     docs/
//!       {base64url(id)}.json
//! ```
//!
//! Document ids may contain characters that are not valid in file names
//! (`:`, `;`, `/`), so file names are the unpadded base64url encoding of the id.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use docstate_core::client::DocumentClient;
use docstate_types::document::{
    CollectionOptions, CollectionSpec, Document, RequestOptions, parse_collection_link,
    parse_database_link, split_document_link,
};
use docstate_types::error::DocumentDbError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::rules;

const COLLECTION_FILE: &str = "collection.json";

/// Contents of `collection.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CollectionRecord {
    spec: CollectionSpec,
    options: CollectionOptions,
    created_at: i64,
}

/// Document database stored in a directory tree.
///
/// All operations go through `tokio::fs` for async I/O. Upserts write to a
/// temporary file and rename it into place, so readers never see a partial
/// document.
#[derive(Debug, Clone)]
pub struct FsDocumentClient {
    root: PathBuf,
}

impl FsDocumentClient {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `{root}/dbs/{db}`
    fn database_dir(&self, database_id: &str) -> PathBuf {
        self.root.join("dbs").join(database_id)
    }

    /// `{root}/dbs/{db}/colls/{coll}`
    fn collection_dir(&self, database_id: &str, collection_id: &str) -> PathBuf {
        self.database_dir(database_id)
            .join("colls")
            .join(collection_id)
    }

    /// `{root}/dbs/{db}/colls/{coll}/docs/{base64url(id)}.json`
    fn document_path(&self, database_id: &str, collection_id: &str, id: &str) -> PathBuf {
        self.collection_dir(database_id, collection_id)
            .join("docs")
            .join(format!("{}.json", encode_id(id)))
    }

    async fn load_collection(&self, collection_link: &str) -> Result<CollectionRecord, DocumentDbError> {
        let (db, coll) = parse_collection_link(collection_link)
            .ok_or_else(|| DocumentDbError::not_found(collection_link))?;
        let path = self.collection_dir(db, coll).join(COLLECTION_FILE);

        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(DocumentDbError::not_found(collection_link));
            }
            Err(e) => return Err(io_error(&path, &e)),
        };
        serde_json::from_str(&content).map_err(|e| {
            DocumentDbError::with_message(format!("corrupt {}: {e}", path.display()))
        })
    }
}

impl DocumentClient for FsDocumentClient {
    async fn read_database(&self, database_link: &str) -> Result<(), DocumentDbError> {
        let db = parse_database_link(database_link)
            .ok_or_else(|| DocumentDbError::not_found(database_link))?;
        match tokio::fs::metadata(self.database_dir(db)).await {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(_) => Err(DocumentDbError::not_found(database_link)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(DocumentDbError::not_found(database_link))
            }
            Err(e) => Err(io_error(&self.database_dir(db), &e)),
        }
    }

    async fn create_database(&self, database_id: &str) -> Result<(), DocumentDbError> {
        let link = format!("dbs/{database_id}");
        if parse_database_link(&link).is_none() {
            return Err(rules::bad_request(format!(
                "invalid database id '{database_id}'"
            )));
        }

        let dbs_dir = self.root.join("dbs");
        tokio::fs::create_dir_all(&dbs_dir)
            .await
            .map_err(|e| io_error(&dbs_dir, &e))?;

        let dir = self.database_dir(database_id);
        match tokio::fs::create_dir(&dir).await {
            Ok(()) => {
                tracing::debug!(path = %dir.display(), "database directory created");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                Err(DocumentDbError::conflict(&link))
            }
            Err(e) => Err(io_error(&dir, &e)),
        }
    }

    async fn read_collection(
        &self,
        collection_link: &str,
    ) -> Result<CollectionSpec, DocumentDbError> {
        Ok(self.load_collection(collection_link).await?.spec)
    }

    async fn create_collection(
        &self,
        database_link: &str,
        spec: &CollectionSpec,
        options: &CollectionOptions,
    ) -> Result<(), DocumentDbError> {
        let db = parse_database_link(database_link)
            .ok_or_else(|| DocumentDbError::not_found(database_link))?;
        let collection_link = format!("{database_link}/colls/{}", spec.id);
        if parse_collection_link(&collection_link).is_none() {
            return Err(rules::bad_request(format!(
                "invalid collection id '{}'",
                spec.id
            )));
        }

        if !tokio::fs::try_exists(self.database_dir(db))
            .await
            .unwrap_or(false)
        {
            return Err(DocumentDbError::not_found(database_link));
        }

        let colls_dir = self.database_dir(db).join("colls");
        tokio::fs::create_dir_all(&colls_dir)
            .await
            .map_err(|e| io_error(&colls_dir, &e))?;

        // `collection.json` is written last, so a directory without it is an
        // interrupted create and gets finished rather than reported as 409.
        let dir = self.collection_dir(db, &spec.id);
        let metadata = dir.join(COLLECTION_FILE);
        match tokio::fs::create_dir(&dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                if tokio::fs::try_exists(&metadata)
                    .await
                    .map_err(|e| io_error(&metadata, &e))?
                {
                    return Err(DocumentDbError::conflict(&collection_link));
                }
                tracing::warn!(
                    path = %dir.display(),
                    "collection directory has no metadata, completing create"
                );
            }
            Err(e) => return Err(io_error(&dir, &e)),
        }

        let docs_dir = dir.join("docs");
        tokio::fs::create_dir_all(&docs_dir)
            .await
            .map_err(|e| io_error(&docs_dir, &e))?;

        let record = CollectionRecord {
            spec: spec.clone(),
            options: *options,
            created_at: Utc::now().timestamp(),
        };
        write_json(&metadata, &record).await?;
        tracing::debug!(
            path = %dir.display(),
            throughput = options.offer_throughput,
            "collection directory created"
        );
        Ok(())
    }

    async fn read_document(
        &self,
        document_link: &str,
        options: &RequestOptions,
    ) -> Result<Document, DocumentDbError> {
        let (collection_link, id) = split_document_link(document_link)
            .ok_or_else(|| rules::bad_request(format!("invalid document link '{document_link}'")))?;
        let collection = self.load_collection(collection_link).await?;
        rules::check_partition_key(&collection.spec, id, options)?;

        let (db, coll) = parse_collection_link(collection_link)
            .ok_or_else(|| DocumentDbError::not_found(collection_link))?;
        let path = self.document_path(db, coll, id);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(DocumentDbError::not_found(document_link));
            }
            Err(e) => return Err(io_error(&path, &e)),
        };
        let document: Document = serde_json::from_str(&content).map_err(|e| {
            DocumentDbError::with_message(format!("corrupt {}: {e}", path.display()))
        })?;

        if rules::is_expired(&collection.spec, document.timestamp, Utc::now().timestamp()) {
            tracing::debug!(path = %path.display(), "document expired");
            return Err(DocumentDbError::not_found(document_link));
        }
        Ok(document)
    }

    async fn upsert_document(
        &self,
        collection_link: &str,
        document: &Document,
        options: &RequestOptions,
    ) -> Result<Document, DocumentDbError> {
        let collection = self.load_collection(collection_link).await?;
        let id = rules::document_id(document, options)?;
        rules::check_partition_key(&collection.spec, &id, options)?;

        let (db, coll) = parse_collection_link(collection_link)
            .ok_or_else(|| DocumentDbError::not_found(collection_link))?;
        let stored = Document {
            id: id.clone(),
            data: document.data.clone(),
            timestamp: Some(Utc::now().timestamp()),
            etag: Some(rules::new_etag()),
        };
        write_json(&self.document_path(db, coll, &id), &stored).await?;
        Ok(stored)
    }
}

fn encode_id(id: &str) -> String {
    URL_SAFE_NO_PAD.encode(id.as_bytes())
}

fn io_error(path: &Path, err: &std::io::Error) -> DocumentDbError {
    DocumentDbError::with_message(format!("{}: {err}", path.display()))
}

/// Serialize to a sibling temp file, then rename over `path`.
async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), DocumentDbError> {
    let content = serde_json::to_vec_pretty(value)
        .map_err(|e| DocumentDbError::with_message(format!("serialize failed: {e}")))?;
    let tmp = path.with_extension(format!("tmp-{}", Uuid::now_v7().simple()));

    tokio::fs::write(&tmp, &content)
        .await
        .map_err(|e| io_error(&tmp, &e))?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(io_error(path, &e));
    }
    Ok(())
}
