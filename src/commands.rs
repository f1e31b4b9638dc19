use anyhow::{Context, Result};
use indicatif::ProgressBar;
use tracing::{info, warn};

use crate::RagError;
use crate::config::{Config, get_config_dir};
use crate::database::lancedb::VectorStore;
use crate::embeddings::ollama::OllamaClient;
use crate::engine::RagEngine;
use crate::generation::GenerationClient;
use crate::wiki::{Document, WikiClient};

/// Show the active configuration, writing a default config file first if
/// none exists yet
#[inline]
pub fn configure(show: bool) -> Result<()> {
    let config_dir = get_config_dir()?;
    let config = Config::load(&config_dir)?;

    if !show {
        if config.config_file_path().exists() {
            println!(
                "Configuration already exists at {}",
                config.config_file_path().display()
            );
        } else {
            config.save()?;
            println!(
                "Wrote default configuration to {}",
                config.config_file_path().display()
            );
        }
    }

    println!("Wiki:");
    println!("  Base URL: {}", config.wiki.base_url);
    println!(
        "  API token: {}",
        if config.wiki.api_token.is_some() {
            "(set)"
        } else {
            "(not set)"
        }
    );
    println!("Ollama:");
    println!(
        "  Server: {}://{}:{}",
        config.ollama.protocol, config.ollama.host, config.ollama.port
    );
    println!("  Embedding model: {}", config.ollama.embedding_model);
    println!("  Generation model: {}", config.ollama.generation_model);
    println!("  Batch size: {}", config.ollama.batch_size);
    println!(
        "  Embedding dimension: {}",
        config.ollama.embedding_dimension
    );
    println!("Chunking:");
    println!("  Chunk size: {}", config.chunking.chunk_size);
    println!("  Overlap: {}", config.chunking.overlap);
    println!("Query:");
    println!("  Top-k: {}", config.query.top_k);
    println!("Ingest:");
    println!(
        "  Max concurrent documents: {}",
        config.ingest.max_concurrent_documents
    );

    Ok(())
}

/// Ingest specific wiki pages by id
#[inline]
pub async fn ingest_pages(page_ids: Vec<String>) -> Result<()> {
    let config = load_config()?;
    let wiki = WikiClient::new(&config.wiki).context("Failed to initialize wiki client")?;
    let engine = build_engine(&config).await?;

    info!("Ingesting {} wiki pages", page_ids.len());

    let (documents, fetch_failures) = fetch_documents(&wiki, page_ids).await?;
    let report = engine.ingest_batch(documents).await;

    println!("Ingestion complete:");
    println!(
        "  Pages ingested: {}/{}",
        report.documents_ingested,
        report.documents.len() + fetch_failures.len()
    );
    println!("  Chunks created: {}", report.chunks_created);

    for (page_id, error) in &fetch_failures {
        println!("  ⚠ Failed to fetch page {}: {}", page_id, error);
    }
    for document in report.documents.iter().filter(|d| !d.succeeded()) {
        println!(
            "  ⚠ Failed to ingest {} ({}): {}",
            document.title,
            document.document_id,
            document.error.as_deref().unwrap_or("unknown error")
        );
    }

    if report.documents_ingested == 0 {
        anyhow::bail!("no pages could be ingested");
    }

    Ok(())
}

/// Ingest pages from a wiki space
#[inline]
pub async fn ingest_space(space_key: String, limit: usize) -> Result<()> {
    let config = load_config()?;
    let wiki = WikiClient::new(&config.wiki).context("Failed to initialize wiki client")?;
    let engine = build_engine(&config).await?;

    info!("Ingesting up to {} pages from space {}", limit, space_key);

    let documents = {
        let wiki = wiki.clone();
        let space_key = space_key.clone();
        tokio::task::spawn_blocking(move || wiki.fetch_space_pages(&space_key, limit))
            .await
            .context("Space fetch task failed")?
            .map_err(|e| RagError::Source(format!("{:#}", e)))?
    };

    if documents.is_empty() {
        println!("No pages found in space {}", space_key);
        return Ok(());
    }

    println!("Fetched {} pages from space {}", documents.len(), space_key);

    let report = engine.ingest_batch(documents).await;

    println!("Ingestion complete:");
    println!(
        "  Pages ingested: {}/{}",
        report.documents_ingested,
        report.documents.len()
    );
    println!("  Chunks created: {}", report.chunks_created);

    for document in report.documents.iter().filter(|d| !d.succeeded()) {
        println!(
            "  ⚠ Failed to ingest {} ({}): {}",
            document.title,
            document.document_id,
            document.error.as_deref().unwrap_or("unknown error")
        );
    }

    if report.documents_ingested == 0 {
        anyhow::bail!("no pages from space {} could be ingested", space_key);
    }

    Ok(())
}

/// Answer a question against the indexed corpus
#[inline]
pub async fn run_query(question: String, top_k: Option<usize>) -> Result<()> {
    let config = load_config()?;
    let engine = build_engine(&config).await?;

    let top_k = top_k.unwrap_or(config.query.top_k);
    let response = engine.query(&question, top_k).await?;

    println!("{}", response.answer);

    if !response.sources.is_empty() {
        println!();
        println!("Sources:");
        for source in &response.sources {
            println!(
                "  {:.2}  {} ({})",
                source.relevance_score, source.title, source.url
            );
        }
        println!();
        println!("Chunks used: {}", response.chunks_used.join(", "));
    }

    Ok(())
}

/// List the documents currently in the index
#[inline]
pub async fn list_pages() -> Result<()> {
    let config = load_config()?;
    let engine = build_engine(&config).await?;

    let documents = engine.list_documents().await?;

    if documents.is_empty() {
        println!("No pages have been ingested yet.");
        println!("Use 'kb-rag ingest <page-id>' to add pages.");
        return Ok(());
    }

    println!("Indexed pages ({} total):", documents.len());
    println!();

    for document in &documents {
        println!("  {} (ID: {})", document.title, document.document_id);
        println!("    URL: {}", document.url);
        println!("    Chunks: {}", document.chunks);
        println!(
            "    Last modified: {}",
            document.last_modified.format("%Y-%m-%d %H:%M:%S")
        );
        println!();
    }

    Ok(())
}

/// Show pipeline status: index counts, store health, upstream connectivity
#[inline]
pub async fn show_status() -> Result<()> {
    let config = load_config()?;
    let wiki = WikiClient::new(&config.wiki).context("Failed to initialize wiki client")?;
    let embedder =
        OllamaClient::new(&config.ollama).context("Failed to initialize embedding client")?;
    let engine = build_engine(&config).await?;

    let status = engine.status().await?;

    println!("Documents indexed: {}", status.documents_indexed);
    println!("Total chunks: {}", status.total_chunks);
    println!(
        "Vector store: {}",
        if status.store_healthy {
            "✓ healthy"
        } else {
            "⚠ unhealthy"
        }
    );

    let wiki_connected = tokio::task::spawn_blocking(move || wiki.test_connection())
        .await
        .context("Wiki connection task failed")?;
    println!(
        "Wiki connection: {}",
        if wiki_connected {
            "✓ connected"
        } else {
            "⚠ unreachable"
        }
    );

    let embedding_health = tokio::task::spawn_blocking(move || embedder.health_check())
        .await
        .context("Embedding health task failed")?;
    match embedding_health {
        Ok(()) => println!("Embedding service: ✓ available"),
        Err(e) => println!("Embedding service: ⚠ {}", e),
    }

    Ok(())
}

/// Destructively clear the index
#[inline]
pub async fn reset_store(confirmed: bool) -> Result<()> {
    if !confirmed {
        println!("This permanently deletes all indexed content.");
        println!("Re-run with --yes to confirm.");
        return Ok(());
    }

    let config = load_config()?;
    let engine = build_engine(&config).await?;

    let report = engine.reset().await?;

    println!(
        "Cleared {} documents and {} chunks.",
        report.documents_removed, report.chunks_removed
    );

    Ok(())
}

fn load_config() -> Result<Config> {
    let config_dir = get_config_dir()?;
    Config::load(config_dir)
}

async fn build_engine(config: &Config) -> Result<RagEngine> {
    let store = VectorStore::open(config)
        .await
        .context("Failed to initialize vector store")?;
    let embedder =
        OllamaClient::new(&config.ollama).context("Failed to initialize embedding client")?;
    let generator =
        GenerationClient::new(&config.ollama).context("Failed to initialize generation client")?;

    Ok(RagEngine::new(store, embedder, generator, config))
}

/// Fetch each requested page, reporting failures per page so one bad id
/// never blocks the rest
async fn fetch_documents(
    wiki: &WikiClient,
    page_ids: Vec<String>,
) -> Result<(Vec<Document>, Vec<(String, String)>)> {
    let wiki = wiki.clone();

    tokio::task::spawn_blocking(move || {
        let progress = ProgressBar::new(page_ids.len() as u64);
        let mut documents = Vec::new();
        let mut failures = Vec::new();

        for page_id in &page_ids {
            match wiki.fetch_page(page_id) {
                Ok(document) => documents.push(document),
                Err(e) => {
                    let error = RagError::Source(format!("{:#}", e));
                    warn!("{}", error);
                    failures.push((page_id.clone(), error.to_string()));
                }
            }
            progress.inc(1);
        }

        progress.finish_and_clear();
        (documents, failures)
    })
    .await
    .context("Page fetch task failed")
}
