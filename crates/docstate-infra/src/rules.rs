//! Request checks shared by the in-memory and filesystem backends.
//!
//! Both backends route documents by a hash partition on `/id`, so the only
//! valid partition key for a document is its own id.

use docstate_types::document::{CollectionSpec, Document, RequestOptions};
use docstate_types::error::DocumentDbError;
use uuid::Uuid;

pub(crate) const STATUS_BAD_REQUEST: u16 = 400;

pub(crate) fn bad_request(body: impl Into<String>) -> DocumentDbError {
    DocumentDbError::with_status(STATUS_BAD_REQUEST, body)
}

/// Id to store an upserted document under.
pub(crate) fn document_id(
    document: &Document,
    options: &RequestOptions,
) -> Result<String, DocumentDbError> {
    if !document.id.is_empty() {
        return Ok(document.id.clone());
    }
    if options.disable_automatic_id_generation {
        return Err(bad_request(
            "document id is required when automatic id generation is disabled",
        ));
    }
    Ok(Uuid::now_v7().to_string())
}

pub(crate) fn check_partition_key(
    spec: &CollectionSpec,
    id: &str,
    options: &RequestOptions,
) -> Result<(), DocumentDbError> {
    match (&spec.partition_key, &options.partition_key) {
        (Some(_), None) => Err(bad_request(format!(
            "collection '{}' is partitioned; a partition key is required",
            spec.id
        ))),
        (Some(_), Some(key)) if key != id => Err(bad_request(format!(
            "partition key '{key}' does not match document '{id}'"
        ))),
        (None, Some(_)) => Err(bad_request(format!(
            "collection '{}' is not partitioned; no partition key expected",
            spec.id
        ))),
        _ => Ok(()),
    }
}

/// Whether a document written at `timestamp` has outlived the collection TTL.
pub(crate) fn is_expired(spec: &CollectionSpec, timestamp: Option<i64>, now: i64) -> bool {
    match (spec.default_ttl, timestamp) {
        (Some(ttl), Some(written)) => {
            let ttl = i64::try_from(ttl).unwrap_or(i64::MAX);
            now >= written.saturating_add(ttl)
        }
        _ => false,
    }
}

pub(crate) fn new_etag() -> String {
    Uuid::now_v7().to_string()
}
