#[cfg(test)]
mod tests;

use super::{ChunkMetadata, EmbeddingRecord, IndexedDocument, RetrievalHit, StoreStats};
use crate::{RagError, config::Config};
use arrow::array::{
    Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray, UInt32Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use itertools::Itertools;
use lancedb::{
    Connection, DistanceType,
    query::{ExecutableQuery, QueryBase, Select},
};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const TABLE_NAME: &str = "chunks";

/// Vector collection backed by LanceDB.
///
/// One logical table keyed by `chunk_id`, with the embedding dimension
/// fixed when the collection is created. Writes that touch a single
/// document are serialized per `document_id`; reads run concurrently.
pub struct VectorStore {
    connection: Connection,
    table_name: String,
    dimension: usize,
    owner_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl VectorStore {
    /// Open (or create) the vector collection under the configured base
    /// directory. Opening an existing collection whose stored dimension
    /// differs from the configured one is a configuration error, never an
    /// in-place reshape.
    #[inline]
    pub async fn open(config: &Config) -> Result<Self, RagError> {
        let db_path = config.vector_database_path();
        debug!("Initializing LanceDB at path: {:?}", db_path);

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                RagError::Store(format!("Failed to create vector database directory: {}", e))
            })?;
        }

        let uri = format!("file://{}", db_path.display());
        let connection = lancedb::connect(&uri)
            .execute()
            .await
            .map_err(|e| RagError::Store(format!("Failed to connect to LanceDB: {}", e)))?;

        let configured_dimension = config.ollama.embedding_dimension as usize;

        let store = Self {
            connection,
            table_name: TABLE_NAME.to_string(),
            dimension: configured_dimension,
            owner_locks: Mutex::new(HashMap::new()),
        };

        let table_names = store.table_names().await?;
        if table_names.iter().any(|name| name == &store.table_name) {
            let existing = store.detect_existing_dimension().await?;
            if existing != configured_dimension {
                return Err(RagError::Config(format!(
                    "Embedding dimension mismatch: collection was created with {} but configuration specifies {}",
                    existing, configured_dimension
                )));
            }
        } else {
            store.create_table(configured_dimension).await?;
            info!(
                "Created vector collection with {} dimensions",
                configured_dimension
            );
        }

        info!("Vector store initialized successfully");
        Ok(store)
    }

    /// The embedding dimension this collection was created with
    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Write or overwrite records by `chunk_id`.
    ///
    /// Only used as the second half of [`Self::replace_document`] during
    /// normal operation; upsert alone leaves stale chunks behind when a
    /// document shrinks.
    #[inline]
    pub async fn upsert(&self, records: Vec<EmbeddingRecord>) -> Result<(), RagError> {
        self.validate_dimensions(&records)?;
        self.upsert_unchecked(records).await
    }

    /// Remove every record owned by `document_id`; no-op if none exist
    #[inline]
    pub async fn delete_by_owner(&self, document_id: &str) -> Result<(), RagError> {
        let lock = self.owner_lock(document_id).await;
        let _guard = lock.lock().await;
        self.delete_owner_records(document_id).await
    }

    /// Atomically replace all records owned by `document_id`.
    ///
    /// Records are validated before the old version is deleted, so invalid
    /// input leaves the collection untouched. If the write fails after the
    /// delete, the owner's records are removed again: the document ends up
    /// fully present or fully absent, never a mixture of versions.
    #[inline]
    pub async fn replace_document(
        &self,
        document_id: &str,
        records: Vec<EmbeddingRecord>,
    ) -> Result<(), RagError> {
        self.validate_dimensions(&records)?;

        let lock = self.owner_lock(document_id).await;
        let _guard = lock.lock().await;

        self.delete_owner_records(document_id).await?;

        if records.is_empty() {
            return Ok(());
        }

        let count = records.len();
        if let Err(e) = self.upsert_unchecked(records).await {
            warn!(
                "Write failed while replacing document {}, removing partial records",
                document_id
            );
            if let Err(cleanup) = self.delete_owner_records(document_id).await {
                warn!(
                    "Cleanup after failed replace of {} also failed: {}",
                    document_id, cleanup
                );
            }
            return Err(e);
        }

        debug!("Replaced document {} with {} records", document_id, count);
        Ok(())
    }

    /// Top-k records by descending cosine similarity to `query_vector`,
    /// ties broken by ascending `chunk_id`. An empty collection yields an
    /// empty result, and `top_k` larger than the collection returns all
    /// records.
    #[inline]
    pub async fn search(
        &self,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<RetrievalHit>, RagError> {
        if query_vector.len() != self.dimension {
            return Err(RagError::Config(format!(
                "Embedding dimension mismatch: query vector has {} dimensions but the collection expects {}",
                query_vector.len(),
                self.dimension
            )));
        }
        if top_k == 0 {
            return Ok(Vec::new());
        }

        debug!("Searching for similar vectors with limit: {}", top_k);

        let table = self.open_table().await?;
        let results = table
            .vector_search(query_vector)
            .map_err(|e| RagError::Store(format!("Failed to create vector search: {}", e)))?
            .column("vector")
            .distance_type(DistanceType::Cosine)
            .limit(top_k)
            .execute()
            .await
            .map_err(|e| RagError::Store(format!("Failed to execute search: {}", e)))?;

        let mut hits = Vec::new();
        let mut stream = results;
        while let Some(batch) = stream
            .try_next()
            .await
            .map_err(|e| RagError::Store(format!("Failed to read result stream: {}", e)))?
        {
            hits.extend(parse_search_batch(&batch)?);
        }

        hits.sort_by(|a, b| {
            b.similarity_score
                .partial_cmp(&a.similarity_score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.chunk_id.cmp(&b.chunk_id))
        });
        hits.truncate(top_k);

        debug!("Search returned {} hits", hits.len());
        Ok(hits)
    }

    /// Remove all records from the collection
    #[inline]
    pub async fn clear(&self) -> Result<(), RagError> {
        info!("Clearing vector collection");

        let table_names = self.table_names().await?;
        if table_names.iter().any(|name| name == &self.table_name) {
            self.connection
                .drop_table(&self.table_name)
                .await
                .map_err(|e| RagError::Store(format!("Failed to drop table: {}", e)))?;
        }

        self.create_table(self.dimension).await?;
        Ok(())
    }

    /// Collection counts, derived from persisted data on every call
    #[inline]
    pub async fn stats(&self) -> Result<StoreStats, RagError> {
        let table = self.open_table().await?;
        let chunks = table
            .count_rows(None)
            .await
            .map_err(|e| RagError::Store(format!("Failed to count rows: {}", e)))?;

        let documents = self.scan_document_index().await?.len();

        Ok(StoreStats { documents, chunks })
    }

    /// Distinct indexed documents with per-document chunk counts, ordered
    /// by document id
    #[inline]
    pub async fn list_documents(&self) -> Result<Vec<IndexedDocument>, RagError> {
        Ok(self.scan_document_index().await?.into_values().collect())
    }

    /// Whether the collection exists and its row count is readable
    #[inline]
    pub async fn healthy(&self) -> bool {
        let table_names = match self.connection.table_names().execute().await {
            Ok(names) => names,
            Err(e) => {
                warn!("Failed to list tables during health check: {}", e);
                return false;
            }
        };

        if !table_names.iter().any(|name| name == &self.table_name) {
            warn!("Vector collection missing during health check");
            return false;
        }

        match self.open_table().await {
            Ok(table) => match table.count_rows(None).await {
                Ok(count) => {
                    debug!("Health check passed, {} rows found", count);
                    true
                }
                Err(e) => {
                    warn!("Failed to count rows during health check: {}", e);
                    false
                }
            },
            Err(e) => {
                warn!("Failed to open table during health check: {}", e);
                false
            }
        }
    }

    async fn upsert_unchecked(&self, records: Vec<EmbeddingRecord>) -> Result<(), RagError> {
        if records.is_empty() {
            debug!("No records to upsert");
            return Ok(());
        }

        let table = self.open_table().await?;

        // Overwrite-by-id: drop any records that share a chunk_id with the
        // incoming batch, then append.
        let id_list = records
            .iter()
            .map(|record| format!("'{}'", escape_literal(&record.chunk_id)))
            .join(", ");
        table
            .delete(&format!("chunk_id IN ({})", id_list))
            .await
            .map_err(|e| RagError::Store(format!("Failed to delete existing records: {}", e)))?;

        let batch = create_record_batch(&records, self.dimension)?;
        let schema = batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(batch)), schema);
        table
            .add(reader)
            .execute()
            .await
            .map_err(|e| RagError::Store(format!("Failed to insert records: {}", e)))?;

        debug!("Upserted {} records", records.len());
        Ok(())
    }

    async fn delete_owner_records(&self, document_id: &str) -> Result<(), RagError> {
        let table = self.open_table().await?;
        let predicate = format!("document_id = '{}'", escape_literal(document_id));
        table
            .delete(&predicate)
            .await
            .map_err(|e| RagError::Store(format!("Failed to delete document records: {}", e)))?;

        debug!("Deleted records owned by document {}", document_id);
        Ok(())
    }

    fn validate_dimensions(&self, records: &[EmbeddingRecord]) -> Result<(), RagError> {
        for record in records {
            if record.vector.len() != self.dimension {
                return Err(RagError::Config(format!(
                    "Embedding dimension mismatch: record {} has {} dimensions but the collection expects {}",
                    record.chunk_id,
                    record.vector.len(),
                    self.dimension
                )));
            }
        }
        Ok(())
    }

    async fn owner_lock(&self, document_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.owner_locks.lock().await;
        Arc::clone(
            locks
                .entry(document_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }

    async fn scan_document_index(&self) -> Result<BTreeMap<String, IndexedDocument>, RagError> {
        let table = self.open_table().await?;

        let mut stream = table
            .query()
            .select(Select::columns(&[
                "document_id",
                "title",
                "url",
                "last_modified",
            ]))
            .execute()
            .await
            .map_err(|e| RagError::Store(format!("Failed to scan collection: {}", e)))?;

        let mut documents: BTreeMap<String, IndexedDocument> = BTreeMap::new();

        while let Some(batch) = stream
            .try_next()
            .await
            .map_err(|e| RagError::Store(format!("Failed to read scan stream: {}", e)))?
        {
            let document_ids = string_column(&batch, "document_id")?;
            let titles = string_column(&batch, "title")?;
            let urls = string_column(&batch, "url")?;
            let timestamps = string_column(&batch, "last_modified")?;

            for row in 0..batch.num_rows() {
                let document_id = document_ids.value(row).to_string();
                let entry = documents
                    .entry(document_id.clone())
                    .or_insert_with(|| IndexedDocument {
                        document_id,
                        title: titles.value(row).to_string(),
                        url: urls.value(row).to_string(),
                        last_modified: parse_timestamp(timestamps.value(row))
                            .unwrap_or(DateTime::UNIX_EPOCH),
                        chunks: 0,
                    });
                entry.chunks += 1;
            }
        }

        Ok(documents)
    }

    async fn create_table(&self, dimension: usize) -> Result<(), RagError> {
        let schema = create_schema(dimension);
        self.connection
            .create_empty_table(&self.table_name, schema)
            .execute()
            .await
            .map_err(|e| RagError::Store(format!("Failed to create table: {}", e)))?;
        Ok(())
    }

    async fn detect_existing_dimension(&self) -> Result<usize, RagError> {
        let table = self.open_table().await?;
        let schema = table
            .schema()
            .await
            .map_err(|e| RagError::Store(format!("Failed to get table schema: {}", e)))?;

        for field in schema.fields() {
            if field.name() == "vector" {
                if let DataType::FixedSizeList(_, size) = field.data_type() {
                    return Ok(*size as usize);
                }
            }
        }

        Err(RagError::Store(
            "Could not find vector column or determine dimension".to_string(),
        ))
    }

    async fn open_table(&self) -> Result<lancedb::Table, RagError> {
        self.connection
            .open_table(&self.table_name)
            .execute()
            .await
            .map_err(|e| RagError::Store(format!("Failed to open table: {}", e)))
    }

    async fn table_names(&self) -> Result<Vec<String>, RagError> {
        self.connection
            .table_names()
            .execute()
            .await
            .map_err(|e| RagError::Store(format!("Failed to list tables: {}", e)))
    }
}

fn create_schema(dimension: usize) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("chunk_id", DataType::Utf8, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, false)),
                dimension as i32,
            ),
            false,
        ),
        Field::new("document_id", DataType::Utf8, false),
        Field::new("title", DataType::Utf8, false),
        Field::new("url", DataType::Utf8, false),
        Field::new("last_modified", DataType::Utf8, false),
        Field::new("chunk_index", DataType::UInt32, false),
        Field::new("content", DataType::Utf8, false),
    ]))
}

fn create_record_batch(
    records: &[EmbeddingRecord],
    dimension: usize,
) -> Result<RecordBatch, RagError> {
    let len = records.len();

    let mut chunk_ids = Vec::with_capacity(len);
    let mut document_ids = Vec::with_capacity(len);
    let mut titles = Vec::with_capacity(len);
    let mut urls = Vec::with_capacity(len);
    let mut timestamps = Vec::with_capacity(len);
    let mut chunk_indices = Vec::with_capacity(len);
    let mut contents = Vec::with_capacity(len);
    let mut flat_values = Vec::with_capacity(len * dimension);

    for record in records {
        chunk_ids.push(record.chunk_id.as_str());
        document_ids.push(record.metadata.document_id.as_str());
        titles.push(record.metadata.title.as_str());
        urls.push(record.metadata.url.as_str());
        timestamps.push(record.metadata.last_modified.to_rfc3339());
        chunk_indices.push(record.metadata.chunk_index);
        contents.push(record.text.as_str());
        flat_values.extend_from_slice(&record.vector);
    }
    let values_array = Float32Array::from(flat_values);
    let item_field = Arc::new(Field::new("item", DataType::Float32, false));
    let vector_array =
        FixedSizeListArray::try_new(item_field, dimension as i32, Arc::new(values_array), None)
            .map_err(|e| RagError::Store(format!("Failed to create vector array: {}", e)))?;

    let schema = create_schema(dimension);
    let arrays: Vec<Arc<dyn Array>> = vec![
        Arc::new(StringArray::from(chunk_ids)),
        Arc::new(vector_array),
        Arc::new(StringArray::from(document_ids)),
        Arc::new(StringArray::from(titles)),
        Arc::new(StringArray::from(urls)),
        Arc::new(StringArray::from(timestamps)),
        Arc::new(UInt32Array::from(chunk_indices)),
        Arc::new(StringArray::from(contents)),
    ];

    RecordBatch::try_new(schema, arrays)
        .map_err(|e| RagError::Store(format!("Failed to create record batch: {}", e)))
}

fn parse_search_batch(batch: &RecordBatch) -> Result<Vec<RetrievalHit>, RagError> {
    let chunk_ids = string_column(batch, "chunk_id")?;
    let document_ids = string_column(batch, "document_id")?;
    let titles = string_column(batch, "title")?;
    let urls = string_column(batch, "url")?;
    let timestamps = string_column(batch, "last_modified")?;
    let contents = string_column(batch, "content")?;

    let chunk_indices = batch
        .column_by_name("chunk_index")
        .ok_or_else(|| RagError::Store("Missing chunk_index column".to_string()))?
        .as_any()
        .downcast_ref::<UInt32Array>()
        .ok_or_else(|| RagError::Store("Invalid chunk_index column type".to_string()))?;

    let distances = batch
        .column_by_name("_distance")
        .map(|col| col.as_any().downcast_ref::<Float32Array>());

    let mut hits = Vec::with_capacity(batch.num_rows());
    for row in 0..batch.num_rows() {
        let distance = distances
            .flatten()
            .map_or(0.0, |d| if d.is_null(row) { 0.0 } else { d.value(row) });

        hits.push(RetrievalHit {
            chunk_id: chunk_ids.value(row).to_string(),
            text: contents.value(row).to_string(),
            metadata: ChunkMetadata {
                document_id: document_ids.value(row).to_string(),
                title: titles.value(row).to_string(),
                url: urls.value(row).to_string(),
                last_modified: parse_timestamp(timestamps.value(row))?,
                chunk_index: chunk_indices.value(row),
            },
            // Cosine distance from LanceDB; similarity is its complement
            similarity_score: 1.0 - distance,
        });
    }

    Ok(hits)
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray, RagError> {
    batch
        .column_by_name(name)
        .ok_or_else(|| RagError::Store(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| RagError::Store(format!("Invalid {} column type", name)))
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, RagError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RagError::Store(format!("Invalid last_modified timestamp: {}", e)))
}

fn escape_literal(value: &str) -> String {
    value.replace('\'', "''")
}
