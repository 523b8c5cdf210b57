//! Document database client port.
//!
//! The coordinator talks to the database only through [`DocumentClient`].
//! Implementations (in-memory, filesystem) live in docstate-infra; a remote
//! backend would be a third implementation of the same trait.

pub mod box_client;

use docstate_types::document::{
    CollectionOptions, CollectionSpec, Document, RequestOptions,
};
use docstate_types::error::DocumentDbError;

pub use box_client::{BoxDocumentClient, DocumentClientDyn};

/// Resource operations of a document database, addressed by link.
///
/// Uses RPITIT (native async fn in traits, Rust 2024 edition).
/// Every failure is a [`DocumentDbError`]; a missing resource must carry
/// code 404 and an id collision on create must carry code 409.
pub trait DocumentClient: Send + Sync {
    /// Probe a database by link (`dbs/{db}`).
    fn read_database(
        &self,
        database_link: &str,
    ) -> impl std::future::Future<Output = Result<(), DocumentDbError>> + Send;

    /// Create a database with the given id.
    fn create_database(
        &self,
        database_id: &str,
    ) -> impl std::future::Future<Output = Result<(), DocumentDbError>> + Send;

    /// Probe a collection by link (`dbs/{db}/colls/{coll}`).
    fn read_collection(
        &self,
        collection_link: &str,
    ) -> impl std::future::Future<Output = Result<CollectionSpec, DocumentDbError>> + Send;

    /// Create a collection under a database.
    fn create_collection(
        &self,
        database_link: &str,
        spec: &CollectionSpec,
        options: &CollectionOptions,
    ) -> impl std::future::Future<Output = Result<(), DocumentDbError>> + Send;

    /// Read one document by link (`dbs/{db}/colls/{coll}/docs/{id}`).
    fn read_document(
        &self,
        document_link: &str,
        options: &RequestOptions,
    ) -> impl std::future::Future<Output = Result<Document, DocumentDbError>> + Send;

    /// Create or fully replace a document in a collection.
    fn upsert_document(
        &self,
        collection_link: &str,
        document: &Document,
        options: &RequestOptions,
    ) -> impl std::future::Future<Output = Result<Document, DocumentDbError>> + Send;
}
