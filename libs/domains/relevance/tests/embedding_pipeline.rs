//! Embedding pipeline against the in-memory seams: status bookkeeping,
//! idempotency, signature handling, batch and retry behavior.

use std::sync::Arc;

use domain_relevance::embedding::EmbeddingClient;
use domain_relevance::models::{CollectionSpec, EmbeddingStatus};
use domain_relevance::repository::VectorRepository;
use domain_relevance::services::EmbeddingService;
use domain_relevance::store::EntryStore;
use test_utils::{InMemoryEntryStore, InMemoryVectorStore, StaticProvider, TestDataBuilder};

fn spec(model: &str) -> CollectionSpec {
    CollectionSpec {
        provider: "static".to_string(),
        model: model.to_string(),
        dimension: 8,
    }
}

fn service(
    entries: &Arc<InMemoryEntryStore>,
    repo: &Arc<InMemoryVectorStore>,
) -> EmbeddingService {
    let client = EmbeddingClient::new(Arc::new(StaticProvider::new(8)), 0);
    EmbeddingService::new(entries.clone(), repo.clone(), client)
}

#[tokio::test]
async fn ensure_is_idempotent_and_recreates_on_signature_change() {
    let repo = InMemoryVectorStore::new();

    repo.ensure_collections(&spec("model-a")).await.unwrap();
    repo.ensure_collections(&spec("model-a")).await.unwrap();
    assert_eq!(repo.recreate_count().await, 0);
    assert_eq!(
        repo.stored_signature().await.unwrap(),
        "static:model-a:8"
    );

    // Same name, different signature: collections are rebuilt empty
    repo.ensure_collections(&spec("model-b")).await.unwrap();
    assert_eq!(repo.recreate_count().await, 1);
    assert_eq!(
        repo.stored_signature().await.unwrap(),
        "static:model-b:8"
    );
}

#[tokio::test]
async fn generate_marks_done_and_stores_vector() {
    let mut data = TestDataBuilder::new("generate_marks_done");
    let entries = Arc::new(InMemoryEntryStore::new());
    let repo = Arc::new(InMemoryVectorStore::new());

    let feed_id = data.uuid();
    let entry = data.entry(feed_id, "Rust ownership explained");
    let entry_id = entry.id;
    entries.insert(entry).await;

    let ok = service(&entries, &repo)
        .generate_for_entry(entry_id)
        .await
        .unwrap();
    assert!(ok);

    assert_eq!(
        entries.status_of(entry_id).await,
        Some(EmbeddingStatus::Done)
    );
    let stored = repo.get_entry_embedding(entry_id).await.unwrap().unwrap();
    assert_eq!(stored.len(), 8);
    let updated = entries.get(entry_id).await.unwrap();
    assert!(updated.word_count.unwrap() > 0);
    assert!(updated.embedding_at.is_some());
}

#[tokio::test]
async fn regenerating_a_done_entry_is_a_noop() {
    let mut data = TestDataBuilder::new("regenerate_noop");
    let entries = Arc::new(InMemoryEntryStore::new());
    let repo = Arc::new(InMemoryVectorStore::new());

    let feed_id = data.uuid();
    let entry = data.entry(feed_id, "Once only");
    let entry_id = entry.id;
    entries.insert(entry).await;

    let svc = service(&entries, &repo);
    assert!(svc.generate_for_entry(entry_id).await.unwrap());
    assert_eq!(repo.entry_count().await, 1);

    // Second run skips without touching the store
    assert!(svc.generate_for_entry(entry_id).await.unwrap());
    assert_eq!(repo.entry_count().await, 1);
}

#[tokio::test]
async fn entry_without_text_fails_with_reason() {
    let mut data = TestDataBuilder::new("no_text");
    let entries = Arc::new(InMemoryEntryStore::new());
    let repo = Arc::new(InMemoryVectorStore::new());

    let feed_id = data.uuid();
    let mut entry = data.entry(feed_id, "");
    entry.content = None;
    let entry_id = entry.id;
    entries.insert(entry).await;

    let ok = service(&entries, &repo)
        .generate_for_entry(entry_id)
        .await
        .unwrap();
    assert!(!ok);

    let stored = entries.get(entry_id).await.unwrap();
    assert_eq!(stored.embedding_status, EmbeddingStatus::Failed);
    assert_eq!(
        stored.embedding_error.as_deref(),
        Some("no text content to embed")
    );
    assert_eq!(repo.entry_count().await, 0);
}

#[tokio::test]
async fn batch_processes_up_to_limit() {
    let mut data = TestDataBuilder::new("batch_limit");
    let entries = Arc::new(InMemoryEntryStore::new());
    let repo = Arc::new(InMemoryVectorStore::new());
    let feed_id = data.uuid();

    for i in 0..5 {
        entries.insert(data.entry(feed_id, &format!("Entry {i}"))).await;
    }

    let svc = service(&entries, &repo);
    let stats = svc.batch_generate(3).await.unwrap();
    assert_eq!(stats.processed, 3);
    assert_eq!(stats.failed, 0);
    assert_eq!(repo.entry_count().await, 3);

    let stats = svc.batch_generate(10).await.unwrap();
    assert_eq!(stats.processed, 2);
    assert_eq!(repo.entry_count().await, 5);
}

#[tokio::test]
async fn retry_requeues_failed_entries() {
    let mut data = TestDataBuilder::new("retry_failed");
    let entries = Arc::new(InMemoryEntryStore::new());
    let repo = Arc::new(InMemoryVectorStore::new());

    let feed_id = data.uuid();

    // One entry fails (no text), one would succeed but starts failed
    let mut empty = data.entry(feed_id, "");
    empty.content = None;
    let empty_id = empty.id;
    entries.insert(empty).await;

    let entry = data.entry(feed_id, "Recoverable");
    let entry_id = entry.id;
    entries.insert(entry).await;
    entries.mark_failed(entry_id, "transient").await.unwrap();

    let svc = service(&entries, &repo);
    svc.generate_for_entry(empty_id).await.unwrap();
    assert_eq!(
        entries.status_of(empty_id).await,
        Some(EmbeddingStatus::Failed)
    );

    let stats = svc.retry_failed(10).await.unwrap();
    // The text-less entry fails again; the recoverable one goes through
    assert_eq!(stats.processed, 1);
    assert_eq!(stats.failed, 1);
    assert_eq!(
        entries.status_of(entry_id).await,
        Some(EmbeddingStatus::Done)
    );
}

#[tokio::test]
async fn delete_embedding_resets_to_pending() {
    let mut data = TestDataBuilder::new("delete_resets");
    let entries = Arc::new(InMemoryEntryStore::new());
    let repo = Arc::new(InMemoryVectorStore::new());

    let feed_id = data.uuid();
    let entry = data.entry(feed_id, "Ephemeral");
    let entry_id = entry.id;
    entries.insert(entry).await;

    let svc = service(&entries, &repo);
    assert!(svc.generate_for_entry(entry_id).await.unwrap());

    svc.delete_embedding(entry_id).await.unwrap();
    assert_eq!(repo.entry_count().await, 0);
    assert_eq!(
        entries.status_of(entry_id).await,
        Some(EmbeddingStatus::Pending)
    );
}
