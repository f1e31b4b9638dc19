// RAG engine: orchestrates ingestion (fetch -> chunk -> embed -> store)
// and query (embed -> retrieve -> dedupe sources -> generate).


use std::sync::Arc;

use itertools::Itertools;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::database::lancedb::{
    ChunkMetadata, EmbeddingRecord, IndexedDocument, RetrievalHit, StoreStats, VectorStore,
};
use crate::embeddings::chunking::{self, ChunkingConfig};
use crate::embeddings::ollama::OllamaClient;
use crate::generation::GenerationClient;
use crate::wiki::Document;
use crate::{RagError, Result};

const QUERY_EMBED_RETRY_ATTEMPTS: u32 = 2;

/// Answer returned when retrieval finds nothing relevant. A defined
/// response, not an error: callers can distinguish an empty index from a
/// failed pipeline.
pub const NO_MATCH_ANSWER: &str = "I couldn't find relevant information in the indexed wiki pages \
     to answer your question. Try rephrasing, or ask about a related topic.";

/// Document-level attribution entry, aggregated from matching chunks
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Source {
    pub title: String,
    pub url: String,
    pub relevance_score: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResponse {
    pub answer: String,
    /// Deduplicated by document, sorted by descending relevance
    pub sources: Vec<Source>,
    /// Ids of the chunks fed into the prompt, best match first
    pub chunks_used: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestOutcome {
    pub document_id: String,
    pub title: String,
    pub chunks_created: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentIngestReport {
    pub document_id: String,
    pub title: String,
    pub chunks_created: usize,
    pub error: Option<String>,
}

impl DocumentIngestReport {
    #[inline]
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchIngestReport {
    /// Per-document outcomes, in input order
    pub documents: Vec<DocumentIngestReport>,
    pub documents_ingested: usize,
    pub chunks_created: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub documents_indexed: usize,
    pub total_chunks: usize,
    pub store_healthy: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResetReport {
    pub documents_removed: usize,
    pub chunks_removed: usize,
}

/// Orchestrates the retrieval-augmented generation pipeline over an
/// explicit vector store handle.
pub struct RagEngine {
    store: Arc<VectorStore>,
    embedder: OllamaClient,
    query_embedder: OllamaClient,
    generator: GenerationClient,
    chunking: ChunkingConfig,
    max_concurrent_documents: usize,
}

impl RagEngine {
    #[inline]
    pub fn new(
        store: VectorStore,
        embedder: OllamaClient,
        generator: GenerationClient,
        config: &Config,
    ) -> Self {
        // Query-time embedding gets a tighter retry budget than ingestion
        let query_embedder = embedder
            .clone()
            .with_retry_attempts(QUERY_EMBED_RETRY_ATTEMPTS);

        Self {
            store: Arc::new(store),
            embedder,
            query_embedder,
            generator,
            chunking: config.chunking.clone(),
            max_concurrent_documents: config.ingest.max_concurrent_documents.max(1),
        }
    }

    /// Ingest a single document: chunk, embed, and atomically replace any
    /// previously stored version. Re-running with the same document id is
    /// idempotent.
    #[inline]
    pub async fn ingest_document(&self, document: &Document) -> Result<IngestOutcome> {
        let chunks_created =
            ingest_into_store(&self.store, &self.embedder, &self.chunking, document).await?;

        Ok(IngestOutcome {
            document_id: document.id.clone(),
            title: document.title.clone(),
            chunks_created,
        })
    }

    /// Ingest several documents with bounded concurrency. Failures are
    /// collected per document and never abort the rest of the batch.
    #[inline]
    pub async fn ingest_batch(&self, documents: Vec<Document>) -> BatchIngestReport {
        let total = documents.len();
        info!(
            "Ingesting batch of {} documents ({} workers)",
            total, self.max_concurrent_documents
        );

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent_documents));
        let mut join_set = JoinSet::new();

        for (position, document) in documents.into_iter().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            let store = Arc::clone(&self.store);
            let embedder = self.embedder.clone();
            let chunking = self.chunking.clone();

            join_set.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("semaphore is never closed");

                let report = match ingest_into_store(&store, &embedder, &chunking, &document).await
                {
                    Ok(chunks_created) => DocumentIngestReport {
                        document_id: document.id,
                        title: document.title,
                        chunks_created,
                        error: None,
                    },
                    Err(e) => {
                        error!("Failed to ingest document {}: {}", document.id, e);
                        DocumentIngestReport {
                            document_id: document.id,
                            title: document.title,
                            chunks_created: 0,
                            error: Some(e.to_string()),
                        }
                    }
                };

                (position, report)
            });
        }

        let mut slots: Vec<Option<DocumentIngestReport>> = (0..total).map(|_| None).collect();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((position, report)) => slots[position] = Some(report),
                Err(e) => error!("Ingestion worker panicked: {}", e),
            }
        }

        let documents: Vec<DocumentIngestReport> = slots.into_iter().flatten().collect();
        let documents_ingested = documents.iter().filter(|r| r.succeeded()).count();
        let chunks_created = documents.iter().map(|r| r.chunks_created).sum();

        info!(
            "Batch complete: {}/{} documents ingested, {} chunks",
            documents_ingested, total, chunks_created
        );

        BatchIngestReport {
            documents,
            documents_ingested,
            chunks_created,
        }
    }

    /// Answer a question from the indexed corpus.
    ///
    /// An empty index (or no matching chunks) produces the defined
    /// no-information response; a failed generation call surfaces as
    /// [`RagError::Generation`] so callers can tell the two apart.
    #[inline]
    pub async fn query(&self, question: &str, top_k: usize) -> Result<QueryResponse> {
        let question = question.trim();
        if question.is_empty() {
            return Err(RagError::Validation(
                "question cannot be empty".to_string(),
            ));
        }
        if top_k == 0 {
            return Err(RagError::Validation(
                "top_k must be greater than zero".to_string(),
            ));
        }

        debug!("Answering question: {}", question);

        let query_embedding = {
            let embedder = self.query_embedder.clone();
            let text = question.to_string();
            tokio::task::spawn_blocking(move || embedder.embed_query(&text))
                .await
                .map_err(|e| RagError::Embedding(format!("Embedding task failed: {}", e)))?
                .map_err(|e| RagError::Embedding(format!("{:#}", e)))?
        };

        let hits = self.store.search(&query_embedding, top_k).await?;

        if hits.is_empty() {
            info!("No relevant chunks found for question");
            return Ok(QueryResponse {
                answer: NO_MATCH_ANSWER.to_string(),
                sources: Vec::new(),
                chunks_used: Vec::new(),
            });
        }

        let sources = dedupe_sources(&hits);
        let chunks_used: Vec<String> = hits.iter().map(|hit| hit.chunk_id.clone()).collect();

        let prompt = build_prompt(question, &hits);
        let answer = {
            let generator = self.generator.clone();
            tokio::task::spawn_blocking(move || generator.generate(&prompt))
                .await
                .map_err(|e| RagError::Generation(format!("Generation task failed: {}", e)))?
                .map_err(|e| RagError::Generation(format!("{:#}", e)))?
        };

        debug!(
            "Answered question using {} chunks from {} sources",
            chunks_used.len(),
            sources.len()
        );

        Ok(QueryResponse {
            answer,
            sources,
            chunks_used,
        })
    }

    /// Current index counts and store health
    #[inline]
    pub async fn status(&self) -> Result<StatusReport> {
        let store_healthy = self.store.healthy().await;
        let stats = if store_healthy {
            self.store.stats().await?
        } else {
            StoreStats {
                documents: 0,
                chunks: 0,
            }
        };

        Ok(StatusReport {
            documents_indexed: stats.documents,
            total_chunks: stats.chunks,
            store_healthy,
        })
    }

    /// Destructively clear the index, reporting the prior counts
    #[inline]
    pub async fn reset(&self) -> Result<ResetReport> {
        let stats = self.store.stats().await?;
        self.store.clear().await?;

        info!(
            "Cleared vector store ({} documents, {} chunks)",
            stats.documents, stats.chunks
        );

        Ok(ResetReport {
            documents_removed: stats.documents,
            chunks_removed: stats.chunks,
        })
    }

    /// Summaries of the currently indexed documents
    #[inline]
    pub async fn list_documents(&self) -> Result<Vec<IndexedDocument>> {
        self.store.list_documents().await
    }
}

async fn ingest_into_store(
    store: &VectorStore,
    embedder: &OllamaClient,
    chunking: &ChunkingConfig,
    document: &Document,
) -> Result<usize> {
    if document.text.trim().is_empty() {
        return Err(RagError::Validation(format!(
            "document {} has no text content",
            document.id
        )));
    }

    let chunks = chunking::chunk_document(&document.id, &document.text, chunking)?;
    if chunks.is_empty() {
        return Err(RagError::Validation(format!(
            "document {} produced no chunks",
            document.id
        )));
    }

    debug!(
        "Embedding {} chunks for document {}",
        chunks.len(),
        document.id
    );

    let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
    let embeddings = {
        let embedder = embedder.clone();
        tokio::task::spawn_blocking(move || embedder.embed_batch(&texts))
            .await
            .map_err(|e| RagError::Embedding(format!("Embedding task failed: {}", e)))?
            .map_err(|e| RagError::Embedding(format!("{:#}", e)))?
    };

    if embeddings.len() != chunks.len() {
        return Err(RagError::Embedding(format!(
            "Expected {} embeddings but received {}",
            chunks.len(),
            embeddings.len()
        )));
    }

    let records: Vec<EmbeddingRecord> = chunks
        .into_iter()
        .zip(embeddings)
        .map(|(chunk, vector)| EmbeddingRecord {
            chunk_id: chunk.chunk_id,
            vector,
            text: chunk.text,
            metadata: ChunkMetadata {
                document_id: document.id.clone(),
                title: document.title.clone(),
                url: document.url.clone(),
                last_modified: document.last_modified,
                chunk_index: chunk.index as u32,
            },
        })
        .collect();

    let count = records.len();
    store.replace_document(&document.id, records).await?;

    info!("Ingested document {} with {} chunks", document.id, count);
    Ok(count)
}

/// Collapse chunk hits into one source entry per document. Hits arrive
/// sorted by descending similarity, so the first hit per document carries
/// that document's best score, which becomes its relevance.
fn dedupe_sources(hits: &[RetrievalHit]) -> Vec<Source> {
    hits.iter()
        .unique_by(|hit| hit.metadata.document_id.as_str())
        .map(|hit| Source {
            title: hit.metadata.title.clone(),
            url: hit.metadata.url.clone(),
            relevance_score: hit.similarity_score,
        })
        .collect()
}

fn build_prompt(question: &str, hits: &[RetrievalHit]) -> String {
    let context = hits
        .iter()
        .enumerate()
        .map(|(i, hit)| format!("[Source {}: {}]\n{}\n", i + 1, hit.metadata.title, hit.text))
        .join("\n");

    format!(
        "You are a knowledge assistant for an internal wiki.\n\
         Use ONLY the following context to answer the question.\n\
         Provide detailed, step-by-step answers when applicable.\n\
         \n\
         Context from the wiki:\n\
         {}\n\
         \n\
         User Question:\n\
         {}\n\
         \n\
         Instructions:\n\
         - Base your answer ONLY on the provided context\n\
         - If the context doesn't contain enough information, say so clearly\n\
         - Include specific details like commands, URLs, or configuration values when present\n\
         - Use numbered steps for procedural information\n\
         - Cite which wiki page(s) you're referencing\n\
         \n\
         Answer:",
        context, question
    )
}
