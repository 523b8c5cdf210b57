//! In-memory document database.
//!
//! Implements the `DocumentClient` trait from `docstate-core` over `DashMap`s.
//! Besides serving as a process-local backend it records every request and
//! supports fault injection and artificial latency, which is what the
//! coordinator's behavior tests are written against.

use std::sync::atomic::{AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use docstate_core::client::DocumentClient;
use docstate_types::document::{
    CollectionOptions, CollectionSpec, Document, RequestOptions, parse_collection_link,
    parse_database_link, split_document_link,
};
use docstate_types::error::DocumentDbError;

use crate::rules;

/// The six client operations, used to target faults and filter requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    ReadDatabase,
    CreateDatabase,
    ReadCollection,
    CreateCollection,
    ReadDocument,
    UpsertDocument,
}

/// One call received by an [`InMemoryDocumentClient`], in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedRequest {
    ReadDatabase {
        link: String,
    },
    CreateDatabase {
        id: String,
    },
    ReadCollection {
        link: String,
    },
    CreateCollection {
        database_link: String,
        spec: CollectionSpec,
        options: CollectionOptions,
    },
    ReadDocument {
        link: String,
        options: RequestOptions,
    },
    UpsertDocument {
        collection_link: String,
        document: Document,
        options: RequestOptions,
    },
}

impl RecordedRequest {
    pub fn kind(&self) -> OperationKind {
        match self {
            RecordedRequest::ReadDatabase { .. } => OperationKind::ReadDatabase,
            RecordedRequest::CreateDatabase { .. } => OperationKind::CreateDatabase,
            RecordedRequest::ReadCollection { .. } => OperationKind::ReadCollection,
            RecordedRequest::CreateCollection { .. } => OperationKind::CreateCollection,
            RecordedRequest::ReadDocument { .. } => OperationKind::ReadDocument,
            RecordedRequest::UpsertDocument { .. } => OperationKind::UpsertDocument,
        }
    }
}

#[derive(Debug, Clone)]
struct Fault {
    error: DocumentDbError,
    /// `None` fails every call until cleared.
    remaining: Option<usize>,
}

#[derive(Debug, Clone)]
struct StoredCollection {
    spec: CollectionSpec,
    options: CollectionOptions,
}

#[derive(Default)]
struct Inner {
    databases: DashMap<String, ()>,
    /// Keyed by collection link.
    collections: DashMap<String, StoredCollection>,
    /// Keyed by document link.
    documents: DashMap<String, Document>,
    requests: Mutex<Vec<RecordedRequest>>,
    faults: DashMap<OperationKind, Fault>,
    latency_ms: AtomicU64,
    clock_offset_secs: AtomicI64,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

/// Process-local document database.
///
/// Cheap to clone; clones share the same data, request log and faults.
#[derive(Clone, Default)]
pub struct InMemoryDocumentClient {
    inner: Arc<Inner>,
}

impl InMemoryDocumentClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every operation by `latency` before it is applied.
    pub fn with_latency(self, latency: Duration) -> Self {
        self.set_latency(latency);
        self
    }

    pub fn set_latency(&self, latency: Duration) {
        let millis = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.inner.latency_ms.store(millis, Ordering::SeqCst);
    }

    /// Fail every call of `kind` with `error` until [`clear_fault`](Self::clear_fault).
    pub fn fail_always(&self, kind: OperationKind, error: DocumentDbError) {
        self.inner.faults.insert(
            kind,
            Fault {
                error,
                remaining: None,
            },
        );
    }

    /// Fail the next `times` calls of `kind` with `error`.
    pub fn fail_times(&self, kind: OperationKind, error: DocumentDbError, times: usize) {
        if times == 0 {
            self.clear_fault(kind);
            return;
        }
        self.inner.faults.insert(
            kind,
            Fault {
                error,
                remaining: Some(times),
            },
        );
    }

    pub fn clear_fault(&self, kind: OperationKind) {
        self.inner.faults.remove(&kind);
    }

    /// Move the TTL clock forward without sleeping.
    pub fn advance_clock(&self, by: Duration) {
        let secs = i64::try_from(by.as_secs()).unwrap_or(i64::MAX);
        self.inner.clock_offset_secs.fetch_add(secs, Ordering::SeqCst);
    }

    /// Every request received so far, in arrival order.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests_lock().clone()
    }

    pub fn requests_of(&self, kind: OperationKind) -> Vec<RecordedRequest> {
        self.requests_lock()
            .iter()
            .filter(|r| r.kind() == kind)
            .cloned()
            .collect()
    }

    pub fn count(&self, kind: OperationKind) -> usize {
        self.requests_lock().iter().filter(|r| r.kind() == kind).count()
    }

    pub fn clear_requests(&self) {
        self.requests_lock().clear();
    }

    /// Most operations observed inside their latency window at once.
    pub fn peak_in_flight(&self) -> usize {
        self.inner.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn database_exists(&self, id: &str) -> bool {
        self.inner.databases.contains_key(id)
    }

    /// Definition and throughput of a collection, if it exists.
    pub fn collection(&self, collection_link: &str) -> Option<(CollectionSpec, CollectionOptions)> {
        self.inner
            .collections
            .get(collection_link)
            .map(|c| (c.spec.clone(), c.options))
    }

    /// Stored document by link, bypassing TTL and partition checks.
    pub fn document(&self, document_link: &str) -> Option<Document> {
        self.inner
            .documents
            .get(document_link)
            .map(|d| d.value().clone())
    }

    pub fn document_count(&self) -> usize {
        self.inner.documents.len()
    }

    fn requests_lock(&self) -> std::sync::MutexGuard<'_, Vec<RecordedRequest>> {
        self.inner.requests.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn now(&self) -> i64 {
        Utc::now().timestamp() + self.inner.clock_offset_secs.load(Ordering::SeqCst)
    }

    /// Record the request, wait out the latency, then apply any fault.
    async fn begin(&self, request: RecordedRequest) -> Result<(), DocumentDbError> {
        let kind = request.kind();
        self.requests_lock().push(request);

        let latency = self.inner.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            let _in_flight = InFlight::enter(&self.inner);
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        self.take_fault(kind).map_or(Ok(()), Err)
    }

    fn take_fault(&self, kind: OperationKind) -> Option<DocumentDbError> {
        let mut entry = self.inner.faults.get_mut(&kind)?;
        let error = entry.error.clone();
        let exhausted = match entry.remaining.as_mut() {
            Some(remaining) => {
                *remaining = remaining.saturating_sub(1);
                *remaining == 0
            }
            None => false,
        };
        drop(entry);
        if exhausted {
            self.inner.faults.remove(&kind);
        }
        tracing::debug!(?kind, error = %error, "injected fault");
        Some(error)
    }

    fn collection_spec(&self, collection_link: &str) -> Result<CollectionSpec, DocumentDbError> {
        self.inner
            .collections
            .get(collection_link)
            .map(|c| c.spec.clone())
            .ok_or_else(|| DocumentDbError::not_found(collection_link))
    }
}

/// Counts an operation as in flight until dropped.
struct InFlight<'a> {
    inner: &'a Inner,
}

impl<'a> InFlight<'a> {
    fn enter(inner: &'a Inner) -> Self {
        let now = inner.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        inner.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        Self { inner }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.inner.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl DocumentClient for InMemoryDocumentClient {
    async fn read_database(&self, database_link: &str) -> Result<(), DocumentDbError> {
        self.begin(RecordedRequest::ReadDatabase {
            link: database_link.to_string(),
        })
        .await?;

        match parse_database_link(database_link) {
            Some(id) if self.inner.databases.contains_key(id) => Ok(()),
            _ => Err(DocumentDbError::not_found(database_link)),
        }
    }

    async fn create_database(&self, database_id: &str) -> Result<(), DocumentDbError> {
        self.begin(RecordedRequest::CreateDatabase {
            id: database_id.to_string(),
        })
        .await?;

        if database_id.is_empty() || database_id.contains('/') {
            return Err(rules::bad_request(format!(
                "invalid database id '{database_id}'"
            )));
        }
        match self.inner.databases.entry(database_id.to_string()) {
            Entry::Occupied(_) => Err(DocumentDbError::conflict(database_id)),
            Entry::Vacant(slot) => {
                slot.insert(());
                tracing::debug!(database = %database_id, "database created");
                Ok(())
            }
        }
    }

    async fn read_collection(
        &self,
        collection_link: &str,
    ) -> Result<CollectionSpec, DocumentDbError> {
        self.begin(RecordedRequest::ReadCollection {
            link: collection_link.to_string(),
        })
        .await?;

        self.collection_spec(collection_link)
    }

    async fn create_collection(
        &self,
        database_link: &str,
        spec: &CollectionSpec,
        options: &CollectionOptions,
    ) -> Result<(), DocumentDbError> {
        self.begin(RecordedRequest::CreateCollection {
            database_link: database_link.to_string(),
            spec: spec.clone(),
            options: *options,
        })
        .await?;

        match parse_database_link(database_link) {
            Some(id) if self.inner.databases.contains_key(id) => {}
            _ => return Err(DocumentDbError::not_found(database_link)),
        }
        if spec.id.is_empty() || spec.id.contains('/') {
            return Err(rules::bad_request(format!(
                "invalid collection id '{}'",
                spec.id
            )));
        }

        let link = format!("{database_link}/colls/{}", spec.id);
        match self.inner.collections.entry(link) {
            Entry::Occupied(slot) => Err(DocumentDbError::conflict(slot.key())),
            Entry::Vacant(slot) => {
                tracing::debug!(
                    collection = %slot.key(),
                    throughput = options.offer_throughput,
                    "collection created"
                );
                slot.insert(StoredCollection {
                    spec: spec.clone(),
                    options: *options,
                });
                Ok(())
            }
        }
    }

    async fn read_document(
        &self,
        document_link: &str,
        options: &RequestOptions,
    ) -> Result<Document, DocumentDbError> {
        self.begin(RecordedRequest::ReadDocument {
            link: document_link.to_string(),
            options: options.clone(),
        })
        .await?;

        let (collection_link, id) = split_document_link(document_link)
            .ok_or_else(|| rules::bad_request(format!("invalid document link '{document_link}'")))?;
        let spec = self.collection_spec(collection_link)?;
        rules::check_partition_key(&spec, id, options)?;

        let document = self
            .inner
            .documents
            .get(document_link)
            .map(|d| d.value().clone())
            .ok_or_else(|| DocumentDbError::not_found(document_link))?;
        if rules::is_expired(&spec, document.timestamp, self.now()) {
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
        self.begin(RecordedRequest::UpsertDocument {
            collection_link: collection_link.to_string(),
            document: document.clone(),
            options: options.clone(),
        })
        .await?;

        if parse_collection_link(collection_link).is_none() {
            return Err(rules::bad_request(format!(
                "invalid collection link '{collection_link}'"
            )));
        }
        let spec = self.collection_spec(collection_link)?;
        let id = rules::document_id(document, options)?;
        rules::check_partition_key(&spec, &id, options)?;

        let stored = Document {
            id: id.clone(),
            data: document.data.clone(),
            timestamp: Some(self.now()),
            etag: Some(rules::new_etag()),
        };
        self.inner
            .documents
            .insert(format!("{collection_link}/docs/{id}"), stored.clone());
        Ok(stored)
    }
}
