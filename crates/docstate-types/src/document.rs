//! Document database resource types.
//!
//! These model what crosses the document client boundary: stored documents,
//! collection definitions, per-request options, and resource links in the
//! `dbs/{db}/colls/{coll}/docs/{id}` layout.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::data::empty_body;

/// A stored document: an id plus an opaque body.
///
/// `_ts` (seconds since epoch of the last write) and `_etag` are maintained by
/// the backend and ignored on upsert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    #[serde(default = "empty_body")]
    pub data: Value,
    #[serde(rename = "_ts", default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    #[serde(rename = "_etag", default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
}

impl Document {
    pub fn new(id: impl Into<String>, data: Value) -> Self {
        Self {
            id: id.into(),
            data,
            timestamp: None,
            etag: None,
        }
    }

    /// Placeholder returned for a document that has never been written.
    pub fn empty(id: impl Into<String>) -> Self {
        Self::new(id, empty_body())
    }
}

/// Partitioning scheme of a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartitionKind {
    Hash,
}

/// Which document paths form the partition key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionKeyDefinition {
    pub paths: Vec<String>,
    pub kind: PartitionKind,
}

impl PartitionKeyDefinition {
    /// Hash partitioning on the document id.
    pub fn hash_on_id() -> Self {
        Self {
            paths: vec!["/id".to_string()],
            kind: PartitionKind::Hash,
        }
    }
}

/// Definition of a collection as created or probed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionSpec {
    pub id: String,
    /// Default time-to-live in seconds. `None` disables expiry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_ttl: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition_key: Option<PartitionKeyDefinition>,
}

/// Options for collection creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionOptions {
    /// Provisioned request units per second.
    pub offer_throughput: u32,
}

/// Per-request options for document reads and upserts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestOptions {
    /// Partition key value; `None` for unpartitioned collections.
    #[serde(default)]
    pub partition_key: Option<String>,
    /// When set, the backend must reject documents without an explicit id.
    #[serde(default)]
    pub disable_automatic_id_generation: bool,
}

/// Resource links for one database/collection pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceLinks {
    database: String,
    collection: String,
}

impl ResourceLinks {
    pub fn new(database_name: &str, collection_name: &str) -> Self {
        let database = format!("dbs/{database_name}");
        let collection = format!("{database}/colls/{collection_name}");
        Self {
            database,
            collection,
        }
    }

    /// `dbs/{db}`
    pub fn database(&self) -> &str {
        &self.database
    }

    /// `dbs/{db}/colls/{coll}`
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// `dbs/{db}/colls/{coll}/docs/{id}`
    pub fn document(&self, id: &str) -> String {
        format!("{}/docs/{id}", self.collection)
    }
}

/// Split a document link into its collection link and document id.
///
/// Returns `None` unless the link has the `dbs/{db}/colls/{coll}/docs/{id}`
/// shape. The id may itself contain `/`.
pub fn split_document_link(link: &str) -> Option<(&str, &str)> {
    let (collection, id) = link.split_once("/docs/")?;
    let mut segments = collection.split('/');
    match (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) {
        (Some("dbs"), Some(db), Some("colls"), Some(coll), None)
            if !db.is_empty() && !coll.is_empty() && !id.is_empty() =>
        {
            Some((collection, id))
        }
        _ => None,
    }
}

/// Database id of a `dbs/{db}` link.
pub fn parse_database_link(link: &str) -> Option<&str> {
    match link.split('/').collect::<Vec<_>>().as_slice() {
        ["dbs", db] if is_valid_segment(db) => Some(*db),
        _ => None,
    }
}

/// Database and collection ids of a `dbs/{db}/colls/{coll}` link.
pub fn parse_collection_link(link: &str) -> Option<(&str, &str)> {
    match link.split('/').collect::<Vec<_>>().as_slice() {
        ["dbs", db, "colls", coll] if is_valid_segment(db) && is_valid_segment(coll) => {
            Some((*db, *coll))
        }
        _ => None,
    }
}

fn is_valid_segment(segment: &str) -> bool {
    !segment.is_empty() && segment != "." && segment != ".."
}
