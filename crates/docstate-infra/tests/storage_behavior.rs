//! End-to-end behavior of `DocumentStorage` over the in-memory backend.

use std::sync::Arc;
use std::time::Duration;

use docstate_core::storage::{BotStorage, DocumentStorage, InitStatus};
use docstate_infra::memory::{InMemoryDocumentClient, OperationKind, RecordedRequest};
use docstate_types::config::{InitFailurePolicy, StorageConfig};
use docstate_types::context::StorageContext;
use docstate_types::data::StorageData;
use docstate_types::document::{Document, PartitionKeyDefinition, RequestOptions};
use docstate_types::error::{DocumentDbError, StorageError};
use serde_json::json;

const DB: &str = "testdb";
const COLL: &str = "testcoll";

fn config() -> StorageConfig {
    StorageConfig::new(DB, COLL)
}

fn setup(config: StorageConfig) -> (InMemoryDocumentClient, DocumentStorage<InMemoryDocumentClient>) {
    let client = InMemoryDocumentClient::new();
    let storage = DocumentStorage::new(client.clone(), config).unwrap();
    (client, storage)
}

fn sample_data() -> StorageData {
    StorageData {
        user_data: Some(json!({"foo": {"bar": 123}})),
        conversation_data: Some(json!({"blah": [1, 2, 3]})),
        private_conversation_data: Some(json!({"asdf": 456})),
    }
}

fn doc_link(id: &str) -> String {
    format!("dbs/{DB}/colls/{COLL}/docs/{id}")
}

/// Upserted documents, in arrival order.
fn upserts(client: &InMemoryDocumentClient) -> Vec<(Document, RequestOptions)> {
    client
        .requests_of(OperationKind::UpsertDocument)
        .into_iter()
        .filter_map(|r| match r {
            RecordedRequest::UpsertDocument {
                document, options, ..
            } => Some((document, options)),
            _ => None,
        })
        .collect()
}

fn upserted_ids(client: &InMemoryDocumentClient) -> Vec<String> {
    let mut ids: Vec<String> = upserts(client).into_iter().map(|(d, _)| d.id).collect();
    ids.sort();
    ids
}

fn read_ids(client: &InMemoryDocumentClient) -> Vec<String> {
    let mut ids: Vec<String> = client
        .requests_of(OperationKind::ReadDocument)
        .into_iter()
        .filter_map(|r| match r {
            RecordedRequest::ReadDocument { link, .. } => {
                link.rsplit_once("/docs/").map(|(_, id)| id.to_string())
            }
            _ => None,
        })
        .collect();
    ids.sort();
    ids
}

// ---------------------------------------------------------------------------
// Document set
// ---------------------------------------------------------------------------

#[tokio::test]
async fn save_full_context_writes_three_documents_with_exact_bodies() {
    let (client, storage) = setup(config());
    storage
        .save(&StorageContext::new("1", "1"), &sample_data())
        .await
        .unwrap();

    assert_eq!(
        upserted_ids(&client),
        vec!["conversation:1", "conversation:1;user:1", "user:1"]
    );
    assert_eq!(
        client.document(&doc_link("user:1")).unwrap().data,
        json!({"foo": {"bar": 123}})
    );
    assert_eq!(
        client.document(&doc_link("conversation:1")).unwrap().data,
        json!({"blah": [1, 2, 3]})
    );
    assert_eq!(
        client.document(&doc_link("conversation:1;user:1")).unwrap().data,
        json!({"asdf": 456})
    );
}

#[tokio::test]
async fn save_without_user_persistence_skips_user_document() {
    let (client, storage) = setup(config());
    let ctx = StorageContext::new("1", "1").with_persist_user_data(false);
    storage.save(&ctx, &sample_data()).await.unwrap();

    assert_eq!(
        upserted_ids(&client),
        vec!["conversation:1", "conversation:1;user:1"]
    );
    assert!(client.document(&doc_link("user:1")).is_none());
}

#[tokio::test]
async fn save_without_conversation_touches_only_user_document() {
    let (client, storage) = setup(config());
    let ctx = StorageContext::new("1", "1").without_conversation();
    storage.save(&ctx, &sample_data()).await.unwrap();

    assert_eq!(upserted_ids(&client), vec!["user:1"]);
}

#[tokio::test]
async fn load_without_conversation_never_touches_conversation_documents() {
    let (client, storage) = setup(config());
    let ctx = StorageContext::new("1", "1").without_conversation();
    let loaded = storage.load(&ctx).await.unwrap();

    assert_eq!(read_ids(&client), vec!["user:1"]);
    assert_eq!(loaded.user_data, Some(json!({})));
    assert_eq!(loaded.conversation_data, None);
    assert_eq!(loaded.private_conversation_data, None);
}

#[tokio::test]
async fn load_without_user_never_touches_user_documents() {
    let (client, storage) = setup(config());
    let ctx = StorageContext::new("1", "1").without_user();
    let loaded = storage.load(&ctx).await.unwrap();

    assert_eq!(read_ids(&client), vec!["conversation:1"]);
    assert_eq!(loaded.user_data, None);
    assert_eq!(loaded.private_conversation_data, None);
    assert_eq!(loaded.conversation_data, Some(json!({})));
}

#[tokio::test]
async fn private_document_ignores_persistence_flags() {
    let (client, storage) = setup(config());
    let ctx = StorageContext::new("1", "1")
        .with_persist_user_data(false)
        .with_persist_conversation_data(false);
    storage.save(&ctx, &sample_data()).await.unwrap();
    storage.load(&ctx).await.unwrap();

    assert_eq!(upserted_ids(&client), vec!["conversation:1;user:1"]);
    assert_eq!(read_ids(&client), vec!["conversation:1;user:1"]);
}

#[tokio::test]
async fn load_returns_saved_state_and_empty_defaults() {
    let (_client, storage) = setup(config());
    let ctx = StorageContext::new("1", "1");

    let fresh = storage.load(&ctx).await.unwrap();
    assert_eq!(fresh.user_data, Some(json!({})));
    assert_eq!(fresh.conversation_data, Some(json!({})));
    assert_eq!(fresh.private_conversation_data, Some(json!({})));

    storage.save(&ctx, &sample_data()).await.unwrap();
    assert_eq!(storage.load(&ctx).await.unwrap(), sample_data());

    // Same user in another conversation sees only user data.
    let other = storage.load(&StorageContext::new("1", "2")).await.unwrap();
    assert_eq!(other.user_data, Some(json!({"foo": {"bar": 123}})));
    assert_eq!(other.conversation_data, Some(json!({})));
    assert_eq!(other.private_conversation_data, Some(json!({})));
}

// ---------------------------------------------------------------------------
// Request options
// ---------------------------------------------------------------------------

#[tokio::test]
async fn every_write_disables_automatic_ids() {
    let (client, storage) = setup(config());
    storage
        .save(&StorageContext::new("1", "1"), &StorageData::default())
        .await
        .unwrap();

    let writes = upserts(&client);
    assert_eq!(writes.len(), 3);
    for (document, options) in writes {
        assert!(options.disable_automatic_id_generation);
        assert!(!document.id.is_empty());
        assert_eq!(document.data, json!({}));
    }
}

#[tokio::test]
async fn throughput_above_threshold_partitions_by_id() {
    let (client, storage) = setup(config().with_throughput(10_001));
    let ctx = StorageContext::new("1", "1");
    storage.save(&ctx, &sample_data()).await.unwrap();
    storage.load(&ctx).await.unwrap();

    let (spec, options) = client.collection(&format!("dbs/{DB}/colls/{COLL}")).unwrap();
    assert_eq!(spec.partition_key, Some(PartitionKeyDefinition::hash_on_id()));
    assert_eq!(options.offer_throughput, 10_001);

    for (document, options) in upserts(&client) {
        assert_eq!(options.partition_key.as_deref(), Some(document.id.as_str()));
    }
    for request in client.requests_of(OperationKind::ReadDocument) {
        let RecordedRequest::ReadDocument { link, options } = request else {
            unreachable!()
        };
        let id = link.rsplit_once("/docs/").map(|(_, id)| id).unwrap();
        assert_eq!(options.partition_key.as_deref(), Some(id));
    }
}

#[tokio::test]
async fn throughput_at_threshold_is_unpartitioned() {
    let (client, storage) = setup(config().with_throughput(10_000));
    let ctx = StorageContext::new("1", "1");
    storage.save(&ctx, &sample_data()).await.unwrap();
    storage.load(&ctx).await.unwrap();

    let (spec, _) = client.collection(&format!("dbs/{DB}/colls/{COLL}")).unwrap();
    assert_eq!(spec.partition_key, None);
    assert!(upserts(&client).iter().all(|(_, o)| o.partition_key.is_none()));
    assert!(
        client
            .requests_of(OperationKind::ReadDocument)
            .iter()
            .all(|r| matches!(r, RecordedRequest::ReadDocument { options, .. } if options.partition_key.is_none()))
    );
}

#[tokio::test]
async fn collection_is_created_with_configured_ttl() {
    let (client, storage) = setup(config().with_default_ttl(Some(3_600)));
    storage.ensure_initialized().await.unwrap();
    let (spec, _) = client.collection(&format!("dbs/{DB}/colls/{COLL}")).unwrap();
    assert_eq!(spec.default_ttl, Some(3_600));

    let (client, storage) = setup(config().with_default_ttl(None));
    storage.ensure_initialized().await.unwrap();
    let (spec, _) = client.collection(&format!("dbs/{DB}/colls/{COLL}")).unwrap();
    assert_eq!(spec.default_ttl, None);
}

#[tokio::test]
async fn expired_state_loads_as_empty() {
    let (client, storage) = setup(config().with_default_ttl(Some(60)));
    let ctx = StorageContext::new("1", "1");
    storage.save(&ctx, &sample_data()).await.unwrap();

    client.advance_clock(Duration::from_secs(61));
    let loaded = storage.load(&ctx).await.unwrap();
    assert_eq!(loaded.user_data, Some(json!({})));
}

// ---------------------------------------------------------------------------
// Initialization
// ---------------------------------------------------------------------------

#[tokio::test]
async fn initialization_happens_once_under_concurrent_first_calls() {
    let client = InMemoryDocumentClient::new().with_latency(Duration::from_millis(20));
    let storage = Arc::new(DocumentStorage::new(client.clone(), config()).unwrap());

    let mut handles = Vec::new();
    for i in 0..10 {
        let storage = storage.clone();
        handles.push(tokio::spawn(async move {
            storage
                .load(&StorageContext::new(format!("u{i}"), "c"))
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(client.count(OperationKind::ReadDatabase), 1);
    assert_eq!(client.count(OperationKind::CreateDatabase), 1);
    assert_eq!(client.count(OperationKind::ReadCollection), 1);
    assert_eq!(client.count(OperationKind::CreateCollection), 1);
    assert_eq!(storage.init_status(), InitStatus::Succeeded);
}

#[tokio::test]
async fn no_document_operation_precedes_initialization() {
    let (client, storage) = setup(config());
    storage
        .save(&StorageContext::new("1", "1"), &sample_data())
        .await
        .unwrap();

    let kinds: Vec<OperationKind> = client.requests().iter().map(|r| r.kind()).collect();
    assert_eq!(
        &kinds[..4],
        &[
            OperationKind::ReadDatabase,
            OperationKind::CreateDatabase,
            OperationKind::ReadCollection,
            OperationKind::CreateCollection,
        ]
    );
    assert!(kinds[4..].iter().all(|k| *k == OperationKind::UpsertDocument));
}

#[tokio::test]
async fn concurrent_failure_is_shared_by_all_waiters() {
    let client = InMemoryDocumentClient::new().with_latency(Duration::from_millis(20));
    client.fail_always(
        OperationKind::CreateDatabase,
        DocumentDbError::with_status(403, "forbidden"),
    );
    let storage = Arc::new(
        DocumentStorage::new(
            client.clone(),
            config().with_init_failure(InitFailurePolicy::Sticky),
        )
        .unwrap(),
    );

    let mut handles = Vec::new();
    for _ in 0..5 {
        let storage = storage.clone();
        handles.push(tokio::spawn(async move {
            storage.load(&StorageContext::new("1", "1")).await
        }));
    }
    for handle in handles {
        assert_eq!(
            handle.await.unwrap().unwrap_err(),
            StorageError::Initialization("403: forbidden".to_string())
        );
    }
    assert_eq!(client.count(OperationKind::CreateDatabase), 1);
    assert_eq!(client.count(OperationKind::ReadDocument), 0);
}

#[tokio::test]
async fn create_conflicts_do_not_fail_initialization() {
    let (client, storage) = setup(config());
    client.fail_times(
        OperationKind::CreateDatabase,
        DocumentDbError::conflict("dbs/testdb"),
        1,
    );
    client.fail_times(
        OperationKind::CreateCollection,
        DocumentDbError::conflict("dbs/testdb/colls/testcoll"),
        1,
    );

    storage.ensure_initialized().await.unwrap();
    assert_eq!(storage.init_status(), InitStatus::Succeeded);
}

#[tokio::test]
async fn second_coordinator_tolerates_existing_resources() {
    let client = InMemoryDocumentClient::new();
    let first = DocumentStorage::new(client.clone(), config()).unwrap();
    let second = DocumentStorage::new(client.clone(), config()).unwrap();

    first.ensure_initialized().await.unwrap();
    assert_eq!(second.init_status(), InitStatus::Unset);
    second.ensure_initialized().await.unwrap();

    assert_eq!(client.count(OperationKind::CreateDatabase), 1);
    assert_eq!(client.count(OperationKind::CreateCollection), 1);
    assert_eq!(client.count(OperationKind::ReadDatabase), 2);
}

#[tokio::test]
async fn existence_check_errors_other_than_not_found_fail_initialization() {
    let (client, storage) = setup(config());
    client.fail_always(
        OperationKind::ReadCollection,
        DocumentDbError::with_message("connection reset"),
    );

    let err = storage.ensure_initialized().await.unwrap_err();
    assert_eq!(err, StorageError::Initialization("connection reset".to_string()));
    assert_eq!(client.count(OperationKind::CreateCollection), 0);
}

#[tokio::test]
async fn retry_policy_provisions_again_after_failure() {
    let (client, storage) = setup(config());
    client.fail_times(
        OperationKind::ReadDatabase,
        DocumentDbError::with_status(503, "unavailable"),
        1,
    );
    let ctx = StorageContext::new("1", "1");

    let err = storage.load(&ctx).await.unwrap_err();
    assert_eq!(err.message(), "503: unavailable");
    assert_eq!(storage.init_status(), InitStatus::Unset);

    storage.load(&ctx).await.unwrap();
    assert_eq!(client.count(OperationKind::ReadDatabase), 2);
    assert_eq!(storage.init_status(), InitStatus::Succeeded);
}

#[tokio::test]
async fn sticky_policy_replays_first_failure() {
    let (client, storage) = setup(config().with_init_failure(InitFailurePolicy::Sticky));
    client.fail_times(
        OperationKind::ReadDatabase,
        DocumentDbError::with_status(503, "unavailable"),
        1,
    );
    let ctx = StorageContext::new("1", "1");

    let first = storage.load(&ctx).await.unwrap_err();
    let second = storage.save(&ctx, &sample_data()).await.unwrap_err();

    assert_eq!(first, second);
    assert_eq!(client.count(OperationKind::ReadDatabase), 1);
    assert!(matches!(storage.init_status(), InitStatus::Failed(_)));
    assert_eq!(client.count(OperationKind::UpsertDocument), 0);
}

// ---------------------------------------------------------------------------
// Document operation failures and concurrency
// ---------------------------------------------------------------------------

#[tokio::test]
async fn read_failure_is_normalized_and_reported() {
    let (client, storage) = setup(config());
    storage.ensure_initialized().await.unwrap();
    client.fail_always(
        OperationKind::ReadDocument,
        DocumentDbError::with_status(500, "internal"),
    );

    let err = storage
        .load(&StorageContext::new("1", "1"))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Read { .. }));
    assert_eq!(err.message(), "500: internal");
}

#[tokio::test]
async fn write_failure_stops_new_serial_writes() {
    let (client, storage) = setup(config().with_parallel(false));
    storage.ensure_initialized().await.unwrap();
    client.fail_always(
        OperationKind::UpsertDocument,
        DocumentDbError::with_message("disk full"),
    );

    let err = storage
        .save(&StorageContext::new("1", "1"), &sample_data())
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Write { .. }));
    assert_eq!(err.message(), "disk full");
    assert_eq!(client.count(OperationKind::UpsertDocument), 1);
}

#[tokio::test]
async fn parallel_fan_out_overlaps_reads() {
    let (client, storage) = setup(config());
    storage.ensure_initialized().await.unwrap();
    client.set_latency(Duration::from_millis(20));

    storage.load(&StorageContext::new("1", "1")).await.unwrap();
    assert_eq!(client.count(OperationKind::ReadDocument), 3);
    assert_eq!(client.peak_in_flight(), 3);
}

#[tokio::test]
async fn serial_fan_out_runs_one_at_a_time() {
    let (client, storage) = setup(config().with_parallel(false));
    storage.ensure_initialized().await.unwrap();
    client.set_latency(Duration::from_millis(5));

    storage.load(&StorageContext::new("1", "1")).await.unwrap();
    storage
        .save(&StorageContext::new("1", "1"), &sample_data())
        .await
        .unwrap();
    assert_eq!(client.count(OperationKind::ReadDocument), 3);
    assert_eq!(client.count(OperationKind::UpsertDocument), 3);
    assert_eq!(client.peak_in_flight(), 1);
}
