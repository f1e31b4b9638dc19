#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

//! Integration tests for the vector store's persistence guarantees.

use chrono::{TimeZone, Utc};
use tempfile::TempDir;

use kb_rag::config::Config;
use kb_rag::database::lancedb::{ChunkMetadata, EmbeddingRecord, VectorStore};

const DIMENSION: u32 = 4;

fn test_config(base_dir: &std::path::Path) -> Config {
    let mut config = Config::with_base_dir(base_dir.to_path_buf());
    config.ollama.embedding_dimension = DIMENSION;
    config
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
            last_modified: Utc
                .with_ymd_and_hms(2024, 2, 1, 8, 30, 0)
                .single()
                .expect("timestamp is valid"),
            chunk_index: 0,
        },
    }
}

#[tokio::test]
async fn records_persist_across_reopen() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = test_config(temp_dir.path());

    {
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
    }

    let reopened = VectorStore::open(&config)
        .await
        .expect("should reopen vector store");

    let stats = reopened.stats().await.expect("should read stats");
    assert_eq!(stats.documents, 2);
    assert_eq!(stats.chunks, 2);

    let hits = reopened
        .search(&[1.0, 0.0, 0.0, 0.0], 1)
        .await
        .expect("search should succeed");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].chunk_id, "a_0");
    assert_eq!(hits[0].metadata.title, "Title of a");
}

#[tokio::test]
async fn replace_survives_reopen_without_stale_records() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = test_config(temp_dir.path());

    {
        let store = VectorStore::open(&config)
            .await
            .expect("should open vector store");
        store
            .replace_document(
                "a",
                vec![
                    record("a_0", "a", vec![1.0, 0.0, 0.0, 0.0]),
                    record("a_1", "a", vec![0.0, 1.0, 0.0, 0.0]),
                ],
            )
            .await
            .expect("should replace document");
        store
            .replace_document("a", vec![record("a_0", "a", vec![0.0, 0.0, 1.0, 0.0])])
            .await
            .expect("should replace document again");
    }

    let reopened = VectorStore::open(&config)
        .await
        .expect("should reopen vector store");

    let stats = reopened.stats().await.expect("should read stats");
    assert_eq!(stats.documents, 1);
    assert_eq!(stats.chunks, 1);
}

#[tokio::test]
async fn concurrent_replaces_of_the_same_document_leave_one_version() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = test_config(temp_dir.path());

    let store = std::sync::Arc::new(
        VectorStore::open(&config)
            .await
            .expect("should open vector store"),
    );

    // Two writers race on the same document id; the per-owner lock must
    // serialize them so exactly one complete version remains.
    let first = {
        let store = std::sync::Arc::clone(&store);
        tokio::spawn(async move {
            store
                .replace_document(
                    "a",
                    vec![
                        record("a_0", "a", vec![1.0, 0.0, 0.0, 0.0]),
                        record("a_1", "a", vec![0.0, 1.0, 0.0, 0.0]),
                    ],
                )
                .await
        })
    };
    let second = {
        let store = std::sync::Arc::clone(&store);
        tokio::spawn(async move {
            store
                .replace_document(
                    "a",
                    vec![
                        record("a_0", "a", vec![0.0, 0.0, 1.0, 0.0]),
                        record("a_1", "a", vec![0.0, 0.0, 0.0, 1.0]),
                    ],
                )
                .await
        })
    };

    first
        .await
        .expect("task should not panic")
        .expect("replace should succeed");
    second
        .await
        .expect("task should not panic")
        .expect("replace should succeed");

    let stats = store.stats().await.expect("should read stats");
    assert_eq!(stats.documents, 1);
    assert_eq!(stats.chunks, 2, "interleaved versions must never mix");
}
