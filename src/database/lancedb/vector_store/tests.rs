use super::*;
use crate::config::Config;
use chrono::TimeZone;
use tempfile::TempDir;

fn create_test_config(dimension: u32) -> (Config, TempDir) {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let mut config = Config::with_base_dir(temp_dir.path().to_path_buf());
    config.ollama.embedding_dimension = dimension;
    (config, temp_dir)
}

fn test_timestamp() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 5, 12, 0, 0)
        .single()
        .expect("timestamp is valid")
}

fn record(chunk_id: &str, document_id: &str, vector: Vec<f32>) -> EmbeddingRecord {
    EmbeddingRecord {
        chunk_id: chunk_id.to_string(),
        vector,
        text: format!("content of {}", chunk_id),
        metadata: ChunkMetadata {
            document_id: document_id.to_string(),
            title: format!("Title of {}", document_id),
            url: format!("https://wiki.example.com/{}", document_id),
            last_modified: test_timestamp(),
            chunk_index: 0,
        },
    }
}

#[tokio::test]
async fn store_initialization() {
    let (config, _temp_dir) = create_test_config(4);

    let store = VectorStore::open(&config)
        .await
        .expect("should open vector store");

    assert_eq!(store.dimension(), 4);
    assert!(store.healthy().await);

    let stats = store.stats().await.expect("should read stats");
    assert_eq!(stats.documents, 0);
    assert_eq!(stats.chunks, 0);
}

#[tokio::test]
async fn reopening_with_a_different_dimension_is_rejected() {
    let (config, temp_dir) = create_test_config(4);
    let store = VectorStore::open(&config)
        .await
        .expect("should open vector store");
    drop(store);

    let mut other = Config::with_base_dir(temp_dir.path().to_path_buf());
    other.ollama.embedding_dimension = 8;

    let result = VectorStore::open(&other).await;
    assert!(matches!(result, Err(RagError::Config(_))));
}

#[tokio::test]
async fn upsert_and_stats() {
    let (config, _temp_dir) = create_test_config(4);
    let store = VectorStore::open(&config)
        .await
        .expect("should open vector store");

    store
        .upsert(vec![
            record("a_0", "a", vec![1.0, 0.0, 0.0, 0.0]),
            record("a_1", "a", vec![0.0, 1.0, 0.0, 0.0]),
            record("b_0", "b", vec![0.0, 0.0, 1.0, 0.0]),
        ])
        .await
        .expect("should upsert records");

    let stats = store.stats().await.expect("should read stats");
    assert_eq!(stats.documents, 2);
    assert_eq!(stats.chunks, 3);
}

#[tokio::test]
async fn upsert_overwrites_by_chunk_id() {
    let (config, _temp_dir) = create_test_config(4);
    let store = VectorStore::open(&config)
        .await
        .expect("should open vector store");

    store
        .upsert(vec![record("a_0", "a", vec![1.0, 0.0, 0.0, 0.0])])
        .await
        .expect("should upsert record");

    let mut updated = record("a_0", "a", vec![1.0, 0.0, 0.0, 0.0]);
    updated.text = "updated content".to_string();
    store
        .upsert(vec![updated])
        .await
        .expect("should overwrite record");

    let stats = store.stats().await.expect("should read stats");
    assert_eq!(stats.chunks, 1, "overwrite must not duplicate the chunk id");

    let hits = store
        .search(&[1.0, 0.0, 0.0, 0.0], 10)
        .await
        .expect("search should succeed");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].text, "updated content");
}

#[tokio::test]
async fn upsert_rejects_dimension_mismatch_without_mutating() {
    let (config, _temp_dir) = create_test_config(4);
    let store = VectorStore::open(&config)
        .await
        .expect("should open vector store");

    store
        .upsert(vec![record("a_0", "a", vec![1.0, 0.0, 0.0, 0.0])])
        .await
        .expect("should upsert record");

    let result = store
        .upsert(vec![record("b_0", "b", vec![1.0, 0.0])])
        .await;
    assert!(matches!(result, Err(RagError::Config(_))));

    let stats = store.stats().await.expect("should read stats");
    assert_eq!(stats.chunks, 1, "failed upsert must not write anything");
}

#[tokio::test]
async fn replace_document_removes_stale_chunks() {
    let (config, _temp_dir) = create_test_config(4);
    let store = VectorStore::open(&config)
        .await
        .expect("should open vector store");

    store
        .replace_document(
            "a",
            vec![
                record("a_0", "a", vec![1.0, 0.0, 0.0, 0.0]),
                record("a_1", "a", vec![0.0, 1.0, 0.0, 0.0]),
                record("a_2", "a", vec![0.0, 0.0, 1.0, 0.0]),
            ],
        )
        .await
        .expect("should replace document");

    // The document shrank from three chunks to one.
    store
        .replace_document("a", vec![record("a_0", "a", vec![0.5, 0.5, 0.0, 0.0])])
        .await
        .expect("should replace document again");

    let stats = store.stats().await.expect("should read stats");
    assert_eq!(stats.documents, 1);
    assert_eq!(stats.chunks, 1, "stale chunks must not survive re-ingestion");
}

#[tokio::test]
async fn replace_document_validates_before_deleting() {
    let (config, _temp_dir) = create_test_config(4);
    let store = VectorStore::open(&config)
        .await
        .expect("should open vector store");

    store
        .replace_document("a", vec![record("a_0", "a", vec![1.0, 0.0, 0.0, 0.0])])
        .await
        .expect("should replace document");

    // Invalid replacement: the old version must remain fully intact.
    let result = store
        .replace_document("a", vec![record("a_0", "a", vec![1.0])])
        .await;
    assert!(matches!(result, Err(RagError::Config(_))));

    let stats = store.stats().await.expect("should read stats");
    assert_eq!(stats.chunks, 1);
}

#[tokio::test]
async fn delete_by_owner_only_touches_that_document() {
    let (config, _temp_dir) = create_test_config(4);
    let store = VectorStore::open(&config)
        .await
        .expect("should open vector store");

    store
        .upsert(vec![
            record("a_0", "a", vec![1.0, 0.0, 0.0, 0.0]),
            record("a_1", "a", vec![0.0, 1.0, 0.0, 0.0]),
            record("b_0", "b", vec![0.0, 0.0, 1.0, 0.0]),
        ])
        .await
        .expect("should upsert records");

    store
        .delete_by_owner("a")
        .await
        .expect("should delete owner records");

    let stats = store.stats().await.expect("should read stats");
    assert_eq!(stats.documents, 1);
    assert_eq!(stats.chunks, 1);

    let hits = store
        .search(&[0.0, 0.0, 1.0, 0.0], 10)
        .await
        .expect("search should succeed");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].metadata.document_id, "b");
}

#[tokio::test]
async fn delete_by_owner_with_no_records_is_a_noop() {
    let (config, _temp_dir) = create_test_config(4);
    let store = VectorStore::open(&config)
        .await
        .expect("should open vector store");

    store
        .delete_by_owner("missing")
        .await
        .expect("deleting an absent owner should succeed");
}

#[tokio::test]
async fn search_ranks_by_descending_similarity() {
    let (config, _temp_dir) = create_test_config(4);
    let store = VectorStore::open(&config)
        .await
        .expect("should open vector store");

    store
        .upsert(vec![
            record("far_0", "far", vec![0.0, 1.0, 0.0, 0.0]),
            record("near_0", "near", vec![1.0, 0.0, 0.0, 0.0]),
            record("mid_0", "mid", vec![0.7, 0.7, 0.0, 0.0]),
        ])
        .await
        .expect("should upsert records");

    let hits = store
        .search(&[1.0, 0.0, 0.0, 0.0], 3)
        .await
        .expect("search should succeed");

    assert_eq!(hits.len(), 3);
    assert_eq!(hits[0].chunk_id, "near_0");
    assert_eq!(hits[1].chunk_id, "mid_0");
    assert_eq!(hits[2].chunk_id, "far_0");

    for pair in hits.windows(2) {
        assert!(pair[0].similarity_score >= pair[1].similarity_score);
    }
    for hit in &hits {
        assert!((-1.0..=1.0).contains(&hit.similarity_score));
    }
}

#[tokio::test]
async fn search_breaks_ties_by_chunk_id() {
    let (config, _temp_dir) = create_test_config(4);
    let store = VectorStore::open(&config)
        .await
        .expect("should open vector store");

    // Identical vectors: identical similarity, so ordering falls back to id.
    store
        .upsert(vec![
            record("z_0", "z", vec![1.0, 0.0, 0.0, 0.0]),
            record("a_0", "a", vec![1.0, 0.0, 0.0, 0.0]),
            record("m_0", "m", vec![1.0, 0.0, 0.0, 0.0]),
        ])
        .await
        .expect("should upsert records");

    let hits = store
        .search(&[1.0, 0.0, 0.0, 0.0], 3)
        .await
        .expect("search should succeed");

    let ids: Vec<&str> = hits.iter().map(|h| h.chunk_id.as_str()).collect();
    assert_eq!(ids, vec!["a_0", "m_0", "z_0"]);
}

#[tokio::test]
async fn search_on_empty_collection_returns_no_hits() {
    let (config, _temp_dir) = create_test_config(4);
    let store = VectorStore::open(&config)
        .await
        .expect("should open vector store");

    let hits = store
        .search(&[1.0, 0.0, 0.0, 0.0], 5)
        .await
        .expect("search should succeed on empty collection");

    assert!(hits.is_empty());
}

#[tokio::test]
async fn top_k_larger_than_collection_returns_everything() {
    let (config, _temp_dir) = create_test_config(4);
    let store = VectorStore::open(&config)
        .await
        .expect("should open vector store");

    store
        .upsert(vec![
            record("a_0", "a", vec![1.0, 0.0, 0.0, 0.0]),
            record("b_0", "b", vec![0.0, 1.0, 0.0, 0.0]),
        ])
        .await
        .expect("should upsert records");

    let hits = store
        .search(&[1.0, 0.0, 0.0, 0.0], 50)
        .await
        .expect("search should succeed");

    assert_eq!(hits.len(), 2);
}

#[tokio::test]
async fn search_rejects_query_dimension_mismatch() {
    let (config, _temp_dir) = create_test_config(4);
    let store = VectorStore::open(&config)
        .await
        .expect("should open vector store");

    let result = store.search(&[1.0, 0.0], 5).await;
    assert!(matches!(result, Err(RagError::Config(_))));
}

#[tokio::test]
async fn clear_removes_all_records() {
    let (config, _temp_dir) = create_test_config(4);
    let store = VectorStore::open(&config)
        .await
        .expect("should open vector store");

    store
        .upsert(vec![
            record("a_0", "a", vec![1.0, 0.0, 0.0, 0.0]),
            record("b_0", "b", vec![0.0, 1.0, 0.0, 0.0]),
        ])
        .await
        .expect("should upsert records");

    store.clear().await.expect("should clear collection");

    let stats = store.stats().await.expect("should read stats");
    assert_eq!(stats.documents, 0);
    assert_eq!(stats.chunks, 0);

    let hits = store
        .search(&[1.0, 0.0, 0.0, 0.0], 5)
        .await
        .expect("search should succeed after clear");
    assert!(hits.is_empty());
}

#[tokio::test]
async fn list_documents_summarizes_owners() {
    let (config, _temp_dir) = create_test_config(4);
    let store = VectorStore::open(&config)
        .await
        .expect("should open vector store");

    store
        .upsert(vec![
            record("a_0", "a", vec![1.0, 0.0, 0.0, 0.0]),
            record("a_1", "a", vec![0.0, 1.0, 0.0, 0.0]),
            record("b_0", "b", vec![0.0, 0.0, 1.0, 0.0]),
        ])
        .await
        .expect("should upsert records");

    let documents = store
        .list_documents()
        .await
        .expect("should list documents");

    assert_eq!(documents.len(), 2);
    assert_eq!(documents[0].document_id, "a");
    assert_eq!(documents[0].chunks, 2);
    assert_eq!(documents[0].title, "Title of a");
    assert_eq!(documents[0].last_modified, test_timestamp());
    assert_eq!(documents[1].document_id, "b");
    assert_eq!(documents[1].chunks, 1);
}

#[tokio::test]
async fn empty_upsert_is_a_noop() {
    let (config, _temp_dir) = create_test_config(4);
    let store = VectorStore::open(&config)
        .await
        .expect("should open vector store");

    store
        .upsert(Vec::new())
        .await
        .expect("empty upsert should succeed");

    let stats = store.stats().await.expect("should read stats");
    assert_eq!(stats.chunks, 0);
}
