// LanceDB vector database module
// Handles vector storage and similarity search for embedded chunks

pub mod vector_store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use vector_store::VectorStore;

/// The unit persisted in the vector store: one embedded chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    /// Deterministic chunk id, unique across the collection
    pub chunk_id: String,
    /// The embedding vector; its length must match the collection dimension
    pub vector: Vec<f32>,
    /// The chunk text
    pub text: String,
    /// Metadata about the document this chunk belongs to
    pub metadata: ChunkMetadata,
}

/// Metadata stored alongside each embedding. Fixed, typed fields so schema
/// drift shows up at compile time rather than at query time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Id of the owning document
    pub document_id: String,
    /// Title of the owning document
    pub title: String,
    /// URL of the owning document
    pub url: String,
    /// When the owning document was last modified
    pub last_modified: DateTime<Utc>,
    /// Position of this chunk within the document
    pub chunk_index: u32,
}

/// A single similarity-search match; transient, never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalHit {
    pub chunk_id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
    /// Cosine similarity in [-1, 1], higher is closer
    pub similarity_score: f32,
}

/// Collection counts, derived from persisted data at call time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub documents: usize,
    pub chunks: usize,
}

/// One indexed document, summarized from its stored chunks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedDocument {
    pub document_id: String,
    pub title: String,
    pub url: String,
    pub last_modified: DateTime<Utc>,
    pub chunks: usize,
}
