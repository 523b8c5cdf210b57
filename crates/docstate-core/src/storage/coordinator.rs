//! DocumentStorage -- bot state on top of a document database.
//!
//! Owns the lazy provisioning of the database and collection, derives the
//! documents a context addresses, and runs bounded read/write fan-out
//! against the [`DocumentClient`].

use docstate_types::config::StorageConfig;
use docstate_types::context::StorageContext;
use docstate_types::data::{StatePartition, StorageData, empty_body};
use docstate_types::document::{
    CollectionOptions, CollectionSpec, Document, PartitionKeyDefinition, RequestOptions,
    ResourceLinks,
};
use docstate_types::error::{ConfigError, StorageError};
use serde_json::Value;

use super::BotStorage;
use super::fan_out::fan_out;
use super::init::{InitGate, InitStatus};
use crate::client::DocumentClient;
use crate::keys::{DocumentKey, derive_keys};

/// Storage coordinator for one database/collection pair.
///
/// Each instance carries its own initialization state; two coordinators over
/// the same client provision independently.
pub struct DocumentStorage<C> {
    client: C,
    config: StorageConfig,
    links: ResourceLinks,
    init: InitGate,
}

impl<C: DocumentClient> DocumentStorage<C> {
    pub fn new(client: C, config: StorageConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let links = ResourceLinks::new(&config.database_name, &config.collection_name);
        let init = InitGate::new(config.init_failure);
        Ok(Self {
            client,
            config,
            links,
            init,
        })
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn links(&self) -> &ResourceLinks {
        &self.links
    }

    pub fn init_status(&self) -> InitStatus {
        self.init.status()
    }

    /// Provision the database and collection if that has not happened yet.
    ///
    /// Concurrent callers share a single provisioning attempt.
    pub async fn ensure_initialized(&self) -> Result<(), StorageError> {
        self.init.ensure(|| self.provision()).await
    }

    /// Collection definition used when the collection has to be created.
    pub fn collection_spec(&self) -> CollectionSpec {
        CollectionSpec {
            id: self.config.collection_name.clone(),
            default_ttl: self.config.default_ttl,
            partition_key: self
                .config
                .is_partitioned()
                .then(PartitionKeyDefinition::hash_on_id),
        }
    }

    fn collection_options(&self) -> CollectionOptions {
        CollectionOptions {
            offer_throughput: self.config.collection_throughput,
        }
    }

    fn read_options(&self, id: &str) -> RequestOptions {
        RequestOptions {
            partition_key: self.config.is_partitioned().then(|| id.to_string()),
            disable_automatic_id_generation: false,
        }
    }

    fn write_options(&self, id: &str) -> RequestOptions {
        RequestOptions {
            disable_automatic_id_generation: true,
            ..self.read_options(id)
        }
    }

    async fn provision(&self) -> Result<(), StorageError> {
        tracing::debug!(
            database = %self.config.database_name,
            collection = %self.config.collection_name,
            "provisioning storage"
        );
        let result = async {
            self.ensure_database().await?;
            self.ensure_collection().await
        }
        .await;

        match &result {
            Ok(()) => tracing::info!(
                database = %self.config.database_name,
                collection = %self.config.collection_name,
                partitioned = self.config.is_partitioned(),
                "storage initialized"
            ),
            Err(e) => tracing::warn!(
                database = %self.config.database_name,
                collection = %self.config.collection_name,
                error = %e,
                "storage initialization failed"
            ),
        }
        result
    }

    async fn ensure_database(&self) -> Result<(), StorageError> {
        match self.client.read_database(self.links.database()).await {
            Ok(()) => return Ok(()),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(StorageError::initialization(&e)),
        }

        match self.client.create_database(&self.config.database_name).await {
            Ok(()) => {
                tracing::info!(database = %self.config.database_name, "created database");
                Ok(())
            }
            Err(e) if e.is_conflict() => {
                tracing::debug!(database = %self.config.database_name, "database already exists");
                Ok(())
            }
            Err(e) => Err(StorageError::initialization(&e)),
        }
    }

    async fn ensure_collection(&self) -> Result<(), StorageError> {
        match self.client.read_collection(self.links.collection()).await {
            Ok(_) => return Ok(()),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(StorageError::initialization(&e)),
        }

        let spec = self.collection_spec();
        let options = self.collection_options();
        match self
            .client
            .create_collection(self.links.database(), &spec, &options)
            .await
        {
            Ok(()) => {
                tracing::info!(
                    collection = %spec.id,
                    throughput = options.offer_throughput,
                    default_ttl = ?spec.default_ttl,
                    "created collection"
                );
                Ok(())
            }
            Err(e) if e.is_conflict() => {
                tracing::debug!(collection = %spec.id, "collection already exists");
                Ok(())
            }
            Err(e) => Err(StorageError::initialization(&e)),
        }
    }

    async fn read_partition(
        &self,
        key: DocumentKey,
    ) -> Result<(StatePartition, Value), StorageError> {
        let link = self.links.document(&key.id);
        match self
            .client
            .read_document(&link, &self.read_options(&key.id))
            .await
        {
            Ok(document) => {
                tracing::debug!(key = %key.id, "read document");
                Ok((key.partition, document.data))
            }
            Err(e) if e.is_not_found() => {
                tracing::debug!(key = %key.id, "document not found, using empty body");
                Ok((key.partition, empty_body()))
            }
            Err(e) => {
                tracing::warn!(key = %key.id, error = %e, "document read failed");
                Err(StorageError::read(&key.id, &e))
            }
        }
    }

    async fn write_document(&self, document: Document) -> Result<(), StorageError> {
        match self
            .client
            .upsert_document(
                self.links.collection(),
                &document,
                &self.write_options(&document.id),
            )
            .await
        {
            Ok(_) => {
                tracing::debug!(key = %document.id, "upserted document");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(key = %document.id, error = %e, "document upsert failed");
                Err(StorageError::write(&document.id, &e))
            }
        }
    }
}

impl<C: DocumentClient> BotStorage for DocumentStorage<C> {
    #[tracing::instrument(
        name = "storage_load",
        skip(self, context),
        fields(
            user_id = ?context.user_id,
            conversation_id = ?context.conversation_id,
        )
    )]
    async fn load(&self, context: &StorageContext) -> Result<StorageData, StorageError> {
        self.ensure_initialized().await?;

        let keys = derive_keys(context);
        let bodies = fan_out(keys, self.config.max_concurrency(), |key| {
            self.read_partition(key)
        })
        .await?;

        let mut data = StorageData::default();
        for (partition, body) in bodies {
            data.set(partition, body);
        }
        Ok(data)
    }

    #[tracing::instrument(
        name = "storage_save",
        skip(self, context, data),
        fields(
            user_id = ?context.user_id,
            conversation_id = ?context.conversation_id,
        )
    )]
    async fn save(&self, context: &StorageContext, data: &StorageData) -> Result<(), StorageError> {
        self.ensure_initialized().await?;

        let documents: Vec<Document> = derive_keys(context)
            .into_iter()
            .map(|key| Document::new(key.id, data.body_or_empty(key.partition)))
            .collect();
        fan_out(documents, self.config.max_concurrency(), |document| {
            self.write_document(document)
        })
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use docstate_types::config::InitFailurePolicy;
    use docstate_types::error::DocumentDbError;
    use serde_json::json;

    use super::*;

    /// Minimal client: one database, one collection, a map of documents, and
    /// a log of every call.
    #[derive(Default)]
    struct MockClient {
        database: Mutex<bool>,
        collection: Mutex<Option<CollectionSpec>>,
        documents: Mutex<HashMap<String, Value>>,
        calls: Mutex<Vec<String>>,
        writes: Mutex<Vec<(String, RequestOptions)>>,
        read_options: Mutex<Vec<RequestOptions>>,
        fail_create_database: Mutex<Option<DocumentDbError>>,
        fail_read_document: Mutex<Option<DocumentDbError>>,
    }

    impl MockClient {
        fn log(&self, call: &str) {
            self.calls.lock().unwrap().push(call.to_string());
        }

        fn count(&self, call: &str) -> usize {
            self.calls.lock().unwrap().iter().filter(|c| *c == call).count()
        }
    }

    impl DocumentClient for MockClient {
        async fn read_database(&self, link: &str) -> Result<(), DocumentDbError> {
            self.log("read_database");
            if *self.database.lock().unwrap() {
                Ok(())
            } else {
                Err(DocumentDbError::not_found(link))
            }
        }

        async fn create_database(&self, id: &str) -> Result<(), DocumentDbError> {
            self.log("create_database");
            if let Some(err) = self.fail_create_database.lock().unwrap().clone() {
                return Err(err);
            }
            let mut exists = self.database.lock().unwrap();
            if *exists {
                return Err(DocumentDbError::conflict(id));
            }
            *exists = true;
            Ok(())
        }

        async fn read_collection(&self, link: &str) -> Result<CollectionSpec, DocumentDbError> {
            self.log("read_collection");
            self.collection
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| DocumentDbError::not_found(link))
        }

        async fn create_collection(
            &self,
            _database_link: &str,
            spec: &CollectionSpec,
            _options: &CollectionOptions,
        ) -> Result<(), DocumentDbError> {
            self.log("create_collection");
            *self.collection.lock().unwrap() = Some(spec.clone());
            Ok(())
        }

        async fn read_document(
            &self,
            link: &str,
            options: &RequestOptions,
        ) -> Result<Document, DocumentDbError> {
            self.log("read_document");
            self.read_options.lock().unwrap().push(options.clone());
            if let Some(err) = self.fail_read_document.lock().unwrap().clone() {
                return Err(err);
            }
            let id = link.rsplit_once("/docs/").map(|(_, id)| id).unwrap_or(link);
            self.documents
                .lock()
                .unwrap()
                .get(id)
                .map(|data| Document::new(id, data.clone()))
                .ok_or_else(|| DocumentDbError::not_found(link))
        }

        async fn upsert_document(
            &self,
            _collection_link: &str,
            document: &Document,
            options: &RequestOptions,
        ) -> Result<Document, DocumentDbError> {
            self.log("upsert_document");
            self.writes
                .lock()
                .unwrap()
                .push((document.id.clone(), options.clone()));
            self.documents
                .lock()
                .unwrap()
                .insert(document.id.clone(), document.data.clone());
            Ok(document.clone())
        }
    }

    fn storage(config: StorageConfig) -> DocumentStorage<MockClient> {
        DocumentStorage::new(MockClient::default(), config).unwrap()
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let result = DocumentStorage::new(MockClient::default(), StorageConfig::new("", "c"));
        assert!(result.is_err());
    }

    #[test]
    fn test_collection_spec_partitioning() {
        let small = storage(StorageConfig::new("db", "c"));
        assert!(small.collection_spec().partition_key.is_none());
        assert_eq!(small.collection_spec().default_ttl, Some(604_800));

        let large = storage(StorageConfig::new("db", "c").with_throughput(20_000));
        assert_eq!(
            large.collection_spec().partition_key,
            Some(PartitionKeyDefinition::hash_on_id())
        );
    }

    #[tokio::test]
    async fn test_provisions_database_then_collection() {
        let storage = storage(StorageConfig::new("db", "c"));
        storage.ensure_initialized().await.unwrap();

        let calls = storage.client().calls.lock().unwrap().clone();
        assert_eq!(
            calls,
            vec![
                "read_database",
                "create_database",
                "read_collection",
                "create_collection"
            ]
        );
        assert_eq!(storage.init_status(), InitStatus::Succeeded);
    }

    #[tokio::test]
    async fn test_existing_resources_are_not_recreated() {
        let client = MockClient::default();
        *client.database.lock().unwrap() = true;
        *client.collection.lock().unwrap() = Some(CollectionSpec {
            id: "c".to_string(),
            default_ttl: None,
            partition_key: None,
        });
        let storage = DocumentStorage::new(client, StorageConfig::new("db", "c")).unwrap();

        storage.ensure_initialized().await.unwrap();
        assert_eq!(storage.client().count("create_database"), 0);
        assert_eq!(storage.client().count("create_collection"), 0);
    }

    #[tokio::test]
    async fn test_database_conflict_is_success() {
        let storage = storage(StorageConfig::new("db", "c"));
        *storage.client().fail_create_database.lock().unwrap() =
            Some(DocumentDbError::conflict("db"));

        storage.ensure_initialized().await.unwrap();
        assert_eq!(storage.client().count("create_collection"), 1);
    }

    #[tokio::test]
    async fn test_init_failure_short_circuits_load() {
        let storage = storage(StorageConfig::new("db", "c"));
        *storage.client().fail_create_database.lock().unwrap() =
            Some(DocumentDbError::with_status(403, "forbidden"));

        let err = storage
            .load(&StorageContext::new("1", "1"))
            .await
            .unwrap_err();
        assert_eq!(err, StorageError::Initialization("403: forbidden".to_string()));
        assert_eq!(storage.client().count("read_document"), 0);
        assert_eq!(storage.init_status(), InitStatus::Unset);
    }

    #[tokio::test]
    async fn test_sticky_failure_is_replayed() {
        let storage =
            storage(StorageConfig::new("db", "c").with_init_failure(InitFailurePolicy::Sticky));
        *storage.client().fail_create_database.lock().unwrap() =
            Some(DocumentDbError::with_message("denied"));

        let ctx = StorageContext::new("1", "1");
        assert!(storage.load(&ctx).await.is_err());
        *storage.client().fail_create_database.lock().unwrap() = None;
        let err = storage.save(&ctx, &StorageData::default()).await.unwrap_err();

        assert_eq!(err.message(), "denied");
        assert_eq!(storage.client().count("create_database"), 1);
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let storage = storage(StorageConfig::new("db", "c"));
        let ctx = StorageContext::new("1", "1");
        let data = StorageData {
            user_data: Some(json!({"foo": {"bar": 123}})),
            conversation_data: Some(json!({"blah": [1, 2, 3]})),
            private_conversation_data: Some(json!({"asdf": 456})),
        };

        storage.save(&ctx, &data).await.unwrap();
        let loaded = storage.load(&ctx).await.unwrap();
        assert_eq!(loaded, data);
    }

    #[tokio::test]
    async fn test_missing_documents_load_as_empty() {
        let storage = storage(StorageConfig::new("db", "c"));
        let loaded = storage
            .load(&StorageContext::new("1", "1").with_persist_user_data(false))
            .await
            .unwrap();

        assert_eq!(loaded.user_data, None);
        assert_eq!(loaded.conversation_data, Some(json!({})));
        assert_eq!(loaded.private_conversation_data, Some(json!({})));
    }

    #[tokio::test]
    async fn test_missing_body_is_written_as_empty_object() {
        let storage = storage(StorageConfig::new("db", "c"));
        let data = StorageData {
            user_data: Some(json!({"a": 1})),
            ..Default::default()
        };
        storage
            .save(&StorageContext::new("u", "c"), &data)
            .await
            .unwrap();

        let documents = storage.client().documents.lock().unwrap().clone();
        assert_eq!(documents.len(), 3);
        assert_eq!(documents["user:u"], json!({"a": 1}));
        assert_eq!(documents["conversation:c"], json!({}));
        assert_eq!(documents["conversation:c;user:u"], json!({}));
    }

    #[tokio::test]
    async fn test_write_options() {
        let storage = storage(StorageConfig::new("db", "c").with_throughput(10_001));
        storage
            .save(&StorageContext::new("1", "1"), &StorageData::default())
            .await
            .unwrap();

        let writes = storage.client().writes.lock().unwrap().clone();
        assert_eq!(writes.len(), 3);
        for (id, options) in writes {
            assert!(options.disable_automatic_id_generation);
            assert_eq!(options.partition_key.as_deref(), Some(id.as_str()));
        }
    }

    #[tokio::test]
    async fn test_read_options_unpartitioned() {
        let storage = storage(StorageConfig::new("db", "c"));
        storage.load(&StorageContext::new("1", "1")).await.unwrap();

        let options = storage.client().read_options.lock().unwrap().clone();
        assert_eq!(options.len(), 3);
        assert!(options.iter().all(|o| o.partition_key.is_none()));
    }

    #[tokio::test]
    async fn test_read_error_is_normalized() {
        let storage = storage(StorageConfig::new("db", "c").with_parallel(false));
        *storage.client().fail_read_document.lock().unwrap() =
            Some(DocumentDbError::with_status(429, "too many requests"));

        let err = storage
            .load(&StorageContext::new("1", "1"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Read { .. }));
        assert_eq!(err.message(), "429: too many requests");
        // Serial fan-out stops after the first failure.
        assert_eq!(storage.client().count("read_document"), 1);
    }
}
