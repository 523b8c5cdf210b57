//! BoxDocumentClient -- object-safe dynamic dispatch wrapper for DocumentClient.
//!
//! 1. Define an object-safe `DocumentClientDyn` trait with boxed futures
//! 2. Blanket-impl `DocumentClientDyn` for all `T: DocumentClient`
//! 3. `BoxDocumentClient` wraps `Box<dyn DocumentClientDyn>` and delegates

use std::future::Future;
use std::pin::Pin;

use docstate_types::document::{
    CollectionOptions, CollectionSpec, Document, RequestOptions,
};
use docstate_types::error::DocumentDbError;

use super::DocumentClient;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, DocumentDbError>> + Send + 'a>>;

/// Object-safe version of [`DocumentClient`] with boxed futures.
///
/// A blanket implementation is provided for all types implementing `DocumentClient`.
pub trait DocumentClientDyn: Send + Sync {
    fn read_database_boxed<'a>(&'a self, database_link: &'a str) -> BoxFuture<'a, ()>;

    fn create_database_boxed<'a>(&'a self, database_id: &'a str) -> BoxFuture<'a, ()>;

    fn read_collection_boxed<'a>(&'a self, collection_link: &'a str)
    -> BoxFuture<'a, CollectionSpec>;

    fn create_collection_boxed<'a>(
        &'a self,
        database_link: &'a str,
        spec: &'a CollectionSpec,
        options: &'a CollectionOptions,
    ) -> BoxFuture<'a, ()>;

    fn read_document_boxed<'a>(
        &'a self,
        document_link: &'a str,
        options: &'a RequestOptions,
    ) -> BoxFuture<'a, Document>;

    fn upsert_document_boxed<'a>(
        &'a self,
        collection_link: &'a str,
        document: &'a Document,
        options: &'a RequestOptions,
    ) -> BoxFuture<'a, Document>;
}

impl<T: DocumentClient> DocumentClientDyn for T {
    fn read_database_boxed<'a>(&'a self, database_link: &'a str) -> BoxFuture<'a, ()> {
        Box::pin(self.read_database(database_link))
    }

    fn create_database_boxed<'a>(&'a self, database_id: &'a str) -> BoxFuture<'a, ()> {
        Box::pin(self.create_database(database_id))
    }

    fn read_collection_boxed<'a>(
        &'a self,
        collection_link: &'a str,
    ) -> BoxFuture<'a, CollectionSpec> {
        Box::pin(self.read_collection(collection_link))
    }

    fn create_collection_boxed<'a>(
        &'a self,
        database_link: &'a str,
        spec: &'a CollectionSpec,
        options: &'a CollectionOptions,
    ) -> BoxFuture<'a, ()> {
        Box::pin(self.create_collection(database_link, spec, options))
    }

    fn read_document_boxed<'a>(
        &'a self,
        document_link: &'a str,
        options: &'a RequestOptions,
    ) -> BoxFuture<'a, Document> {
        Box::pin(self.read_document(document_link, options))
    }

    fn upsert_document_boxed<'a>(
        &'a self,
        collection_link: &'a str,
        document: &'a Document,
        options: &'a RequestOptions,
    ) -> BoxFuture<'a, Document> {
        Box::pin(self.upsert_document(collection_link, document, options))
    }
}

/// Type-erased document client for runtime backend selection.
///
/// `DocumentClient` uses RPITIT and cannot be a trait object directly, so
/// the CLI picks a backend from config and wraps it here. `BoxDocumentClient`
/// itself implements `DocumentClient` and can be handed to the coordinator.
pub struct BoxDocumentClient {
    inner: Box<dyn DocumentClientDyn + Send + Sync>,
}

impl BoxDocumentClient {
    pub fn new<T: DocumentClient + 'static>(client: T) -> Self {
        Self {
            inner: Box::new(client),
        }
    }
}

impl DocumentClient for BoxDocumentClient {
    async fn read_database(&self, database_link: &str) -> Result<(), DocumentDbError> {
        self.inner.read_database_boxed(database_link).await
    }

    async fn create_database(&self, database_id: &str) -> Result<(), DocumentDbError> {
        self.inner.create_database_boxed(database_id).await
    }

    async fn read_collection(
        &self,
        collection_link: &str,
    ) -> Result<CollectionSpec, DocumentDbError> {
        self.inner.read_collection_boxed(collection_link).await
    }

    async fn create_collection(
        &self,
        database_link: &str,
        spec: &CollectionSpec,
        options: &CollectionOptions,
    ) -> Result<(), DocumentDbError> {
        self.inner
            .create_collection_boxed(database_link, spec, options)
            .await
    }

    async fn read_document(
        &self,
        document_link: &str,
        options: &RequestOptions,
    ) -> Result<Document, DocumentDbError> {
        self.inner.read_document_boxed(document_link, options).await
    }

    async fn upsert_document(
        &self,
        collection_link: &str,
        document: &Document,
        options: &RequestOptions,
    ) -> Result<Document, DocumentDbError> {
        self.inner
            .upsert_document_boxed(collection_link, document, options)
            .await
    }
}
