// Retrieval orchestrator
// Sequences chunking, embedding, dimension reconciliation, and vector
// storage, choosing between the remote index and the local fallback store

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{ChunkingConfig, Config, RetrievalConfig};
use crate::database::{
    ChunkMetadata, DocumentInfo, DocumentRegistry, LocalFallbackStore, PineconeClient, VectorIndex,
    VectorRecord,
};
use crate::embeddings::chunking::{Chunk, chunk_document};
use crate::embeddings::{EmbeddingProvider, GeminiClient, reconcile_dimension};
use crate::{RagError, Result};

/// Sentinel returned when a query finds no usable context. A valid answer,
/// not an error.
pub const NO_RELEVANT_INFORMATION: &str = "No relevant information found in the document.";

/// Degraded response returned when the search phase exceeds its deadline
pub const SEARCH_DEGRADED: &str =
    "Error searching the document. Please try again with a more specific question.";

/// Used when the index does not report a configured dimension
const DEFAULT_INDEX_DIMENSION: usize = 1024;

/// Upper bound on the chunk text copy carried in record metadata
const METADATA_TEXT_LIMIT: usize = 1000;

const EMBED_RETRY_ATTEMPTS: u32 = 3;
const EMBED_RETRY_BASE_DELAY_MS: u64 = 1000;
const UPSERT_RETRY_ATTEMPTS: u32 = 3;
const UPSERT_RETRY_BASE_DELAY_MS: u64 = 2000;

/// How many records the zero-vector listing probe samples
const LIST_PROBE_TOP_K: usize = 100;

/// Which backend ended up holding a document's records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stored {
    Remote,
    Local,
}

/// Outcome of a successful ingest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReceipt {
    pub document: DocumentInfo,
    pub backend: Stored,
    pub chunk_count: usize,
    /// Chunks whose embedding permanently failed and were skipped
    pub skipped_chunks: usize,
}

/// Terminal state of the per-chunk embedding state machine
enum EmbedOutcome {
    Embedded(Vec<f32>),
    Skipped,
}

/// Top-level entry points of the retrieval pipeline: `ingest`, `query`,
/// `list`, and `delete`.
///
/// Owns the local fallback store and document registry; both are instance
/// state with no persistence, so a multi-process deployment must accept
/// per-process inconsistency or externalize them.
pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    local: LocalFallbackStore,
    registry: DocumentRegistry,
    chunking: ChunkingConfig,
    retrieval: RetrievalConfig,
    /// Index dimension discovered from the first successful stats call,
    /// cached for the process lifetime
    target_dimension: Option<usize>,
}

impl Retriever {
    #[inline]
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, index: Arc<dyn VectorIndex>) -> Self {
        Self::with_settings(
            embedder,
            index,
            ChunkingConfig::default(),
            RetrievalConfig::default(),
        )
    }

    #[inline]
    pub fn with_settings(
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        chunking: ChunkingConfig,
        retrieval: RetrievalConfig,
    ) -> Self {
        Self {
            embedder,
            index,
            local: LocalFallbackStore::new(),
            registry: DocumentRegistry::new(),
            chunking,
            retrieval,
            target_dimension: None,
        }
    }

    /// Build a retriever against the configured Gemini and Pinecone services
    #[inline]
    pub fn from_config(config: &Config) -> Result<Self> {
        let embedder = GeminiClient::new(&config.embedding)?;
        let index = PineconeClient::new(&config.pinecone)?;
        Ok(Self::with_settings(
            Arc::new(embedder),
            Arc::new(index),
            config.chunking.clone(),
            config.retrieval.clone(),
        ))
    }

    /// Ingest a document: chunk, embed, and store under a fresh identifier.
    ///
    /// Individual chunks whose embedding permanently fails are skipped; the
    /// ingest only fails when there is no text at all or no chunk could be
    /// embedded. A remote upsert failure switches the whole document to the
    /// local fallback store, never a partial split.
    #[inline]
    pub async fn ingest(&mut self, text: &str, name: Option<&str>) -> Result<IngestReceipt> {
        let document_id = Uuid::new_v4().to_string();
        self.ingest_with_id(text, &document_id, name).await
    }

    /// Ingest under a caller-provided identifier
    #[inline]
    pub async fn ingest_with_id(
        &mut self,
        text: &str,
        document_id: &str,
        name: Option<&str>,
    ) -> Result<IngestReceipt> {
        let safe_name = name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map_or_else(|| derived_name(document_id), str::to_string);
        let upload_date = Utc::now();

        let chunks = chunk_document(text, document_id, &safe_name, &self.chunking);
        if chunks.is_empty() {
            return Err(RagError::EmptyDocument);
        }

        info!(
            "Ingesting document {} ({}) as {} chunks",
            safe_name,
            document_id,
            chunks.len()
        );

        let dimension = self.discover_dimension().await;

        let mut records = Vec::with_capacity(chunks.len());
        let mut skipped_chunks = 0;
        let total = chunks.len();

        for (i, chunk) in chunks.iter().enumerate() {
            match self.embed_chunk(chunk).await {
                EmbedOutcome::Embedded(values) => {
                    let values = reconcile_dimension(values, dimension);
                    records.push(VectorRecord {
                        id: format!("{document_id}-chunk-{}", chunk.chunk_index),
                        values,
                        metadata: ChunkMetadata {
                            document_id: document_id.to_string(),
                            file_name: safe_name.clone(),
                            chunk_index: u32::try_from(chunk.chunk_index).unwrap_or(u32::MAX),
                            upload_date,
                            text: Some(truncate_snippet(&chunk.content, METADATA_TEXT_LIMIT)),
                        },
                    });
                }
                EmbedOutcome::Skipped => skipped_chunks += 1,
            }

            // Sequential with a pause: respects the provider's rate limits
            if i + 1 < total && self.retrieval.embed_delay_ms > 0 {
                sleep(Duration::from_millis(self.retrieval.embed_delay_ms)).await;
            }
        }

        if records.is_empty() {
            return Err(RagError::NoEmbeddingsGenerated);
        }

        let backend = match self.upsert_remote(&records).await {
            Ok(()) => {
                info!("Stored document {} in the vector index", document_id);
                Stored::Remote
            }
            Err(e) => {
                warn!(
                    "Vector index unavailable, storing document {} locally: {}",
                    document_id, e
                );
                self.local.insert(document_id, records);
                Stored::Local
            }
        };

        let document = DocumentInfo {
            id: document_id.to_string(),
            name: safe_name,
            upload_date,
        };
        self.registry.put(document.clone());

        Ok(IngestReceipt {
            document,
            backend,
            chunk_count: total,
            skipped_chunks,
        })
    }

    /// Answer a query with ranked context snippets from one document.
    ///
    /// Index outages and deadline overruns degrade the response instead of
    /// failing; the only hard error is a query embedding that cannot be
    /// produced at all.
    #[inline]
    pub async fn query(&mut self, document_id: &str, query_text: &str) -> Result<Vec<String>> {
        debug!("Searching for {:?} in document {}", query_text, document_id);

        let embedder = Arc::clone(&self.embedder);
        let text = query_text.to_string();
        let embedding = with_retry(
            EMBED_RETRY_ATTEMPTS,
            Duration::from_millis(EMBED_RETRY_BASE_DELAY_MS),
            move || {
                let embedder = Arc::clone(&embedder);
                let text = text.clone();
                async move { embedder.embed(&text).await }
            },
        )
        .await
        .map_err(|e| RagError::Embedding(format!("Failed to embed query: {e}")))?;

        let dimension = self.discover_dimension().await;
        let vector = reconcile_dimension(embedding, dimension);

        let deadline = Duration::from_secs(self.retrieval.query_timeout_secs);
        let contexts = match tokio::time::timeout(deadline, self.search(document_id, &vector)).await
        {
            Ok(contexts) => contexts,
            Err(_) => {
                warn!(
                    "Query against document {} exceeded {:?}, returning degraded response",
                    document_id, deadline
                );
                vec![SEARCH_DEGRADED.to_string()]
            }
        };

        if contexts.is_empty() {
            Ok(vec![NO_RELEVANT_INFORMATION.to_string()])
        } else {
            Ok(contexts)
        }
    }

    /// List known documents: registry fast path, then a zero-vector probe of
    /// the index, then the local fallback store
    #[inline]
    pub async fn list(&mut self) -> Result<Vec<DocumentInfo>> {
        if !self.registry.is_empty() {
            debug!("Listing documents from the registry cache");
            return Ok(self.registry.all());
        }

        match self.list_from_index().await {
            Ok(documents) => Ok(documents),
            Err(e) => {
                warn!("Listing from the vector index failed, using local store: {e}");
                let documents = self.local.summaries();
                for document in &documents {
                    self.registry.put(document.clone());
                }
                Ok(self.registry.all())
            }
        }
    }

    /// Remove a document everywhere it might be stored. Remote failures are
    /// logged, never raised; the in-process state is always cleaned up.
    #[inline]
    pub async fn delete(&mut self, document_id: &str) -> bool {
        self.registry.remove(document_id);

        if let Err(e) = self.index.delete_by_document(document_id).await {
            warn!(
                "Failed to delete document {} from the vector index: {}",
                document_id, e
            );
        }

        self.local.remove(document_id);

        info!("Deleted document {}", document_id);
        true
    }

    /// Resolve the target index dimension, caching the first successful
    /// discovery for the process lifetime
    async fn discover_dimension(&mut self) -> usize {
        if let Some(dimension) = self.target_dimension {
            return dimension;
        }

        match self.index.describe_stats().await {
            Ok(stats) => {
                let dimension = stats.dimension.unwrap_or(DEFAULT_INDEX_DIMENSION);
                info!("Discovered index dimension: {}", dimension);
                self.target_dimension = Some(dimension);
                dimension
            }
            Err(e) => {
                warn!(
                    "Could not discover index dimension, assuming {}: {}",
                    DEFAULT_INDEX_DIMENSION, e
                );
                DEFAULT_INDEX_DIMENSION
            }
        }
    }

    /// Per-chunk embedding with bounded retry; a chunk that still fails is
    /// skipped rather than failing the whole ingest
    async fn embed_chunk(&self, chunk: &Chunk) -> EmbedOutcome {
        let embedder = Arc::clone(&self.embedder);
        let text = chunk.content.clone();

        let result = with_retry(
            EMBED_RETRY_ATTEMPTS,
            Duration::from_millis(EMBED_RETRY_BASE_DELAY_MS),
            move || {
                let embedder = Arc::clone(&embedder);
                let text = text.clone();
                async move { embedder.embed(&text).await }
            },
        )
        .await;

        match result {
            Ok(values) => EmbedOutcome::Embedded(values),
            Err(e) => {
                warn!(
                    "Skipping chunk {} of document {}: {}",
                    chunk.chunk_index, chunk.document_id, e
                );
                EmbedOutcome::Skipped
            }
        }
    }

    /// Upsert in bounded sequential batches with retry and inter-batch
    /// pauses. Any batch failure abandons the remote path for this document.
    async fn upsert_remote(&self, records: &[VectorRecord]) -> Result<()> {
        let batch_count = records.len().div_ceil(self.retrieval.upsert_batch_size);

        for (i, batch) in records.chunks(self.retrieval.upsert_batch_size).enumerate() {
            debug!("Upserting batch {}/{}", i + 1, batch_count);

            let index = Arc::clone(&self.index);
            let batch: Vec<VectorRecord> = batch.to_vec();
            with_retry(
                UPSERT_RETRY_ATTEMPTS,
                Duration::from_millis(UPSERT_RETRY_BASE_DELAY_MS),
                move || {
                    let index = Arc::clone(&index);
                    let batch = batch.clone();
                    async move { index.upsert(&batch).await }
                },
            )
            .await?;

            if i + 1 < batch_count && self.retrieval.batch_delay_ms > 0 {
                sleep(Duration::from_millis(self.retrieval.batch_delay_ms)).await;
            }
        }

        Ok(())
    }

    /// Remote-first search with local fallback on failure or on a remote
    /// miss for a document that is held locally
    async fn search(&mut self, document_id: &str, vector: &[f32]) -> Vec<String> {
        match self.search_remote(document_id, vector).await {
            Ok(contexts) if !contexts.is_empty() => contexts,
            Ok(contexts) => {
                if self.local.contains(document_id) {
                    debug!("Remote miss for locally stored document {}", document_id);
                    self.search_local(document_id, vector)
                } else {
                    contexts
                }
            }
            Err(e) => {
                warn!("Vector index query failed, falling back to local store: {e}");
                self.search_local(document_id, vector)
            }
        }
    }

    async fn search_remote(&mut self, document_id: &str, vector: &[f32]) -> Result<Vec<String>> {
        let stats = self.index.describe_stats().await?;
        if stats.record_count == 0 {
            return Err(RagError::Index(
                "Namespace holds no records".to_string(),
            ));
        }

        let matches = self
            .index
            .query(vector, self.retrieval.top_k, Some(document_id))
            .await?;

        debug!(
            "Found {} matches for document {} in the vector index",
            matches.len(),
            document_id
        );

        // Opportunistic registry refresh from whatever metadata came back
        if self.registry.get(document_id).is_none() {
            if let Some(metadata) = matches.iter().find_map(|m| m.metadata.as_ref()) {
                self.registry.put(DocumentInfo {
                    id: metadata.document_id.clone(),
                    name: metadata.file_name.clone(),
                    upload_date: metadata.upload_date,
                });
            }
        }

        Ok(extract_contexts(matches))
    }

    fn search_local(&self, document_id: &str, vector: &[f32]) -> Vec<String> {
        extract_contexts(self.local.query(document_id, vector, self.retrieval.top_k))
    }

    async fn list_from_index(&mut self) -> Result<Vec<DocumentInfo>> {
        let stats = self.index.describe_stats().await?;
        if stats.record_count == 0 {
            return Err(RagError::Index(
                "Namespace holds no records".to_string(),
            ));
        }

        // Zero-vector probe: any records at all rank equally, which is fine
        // since only their metadata matters here
        let dimension = stats.dimension.unwrap_or(DEFAULT_INDEX_DIMENSION);
        let probe = vec![0.0_f32; dimension];
        let matches = self.index.query(&probe, LIST_PROBE_TOP_K, None).await?;

        for m in matches {
            if let Some(metadata) = m.metadata {
                if self.registry.get(&metadata.document_id).is_none() {
                    self.registry.put(DocumentInfo {
                        id: metadata.document_id.clone(),
                        name: metadata.file_name,
                        upload_date: metadata.upload_date,
                    });
                }
            }
        }

        Ok(self.registry.all())
    }
}

/// Placeholder display name derived from the document identifier
fn derived_name(document_id: &str) -> String {
    let prefix: String = document_id.chars().take(8).collect();
    format!("Document-{prefix}")
}

/// Pull the context text out of ranked matches, dropping matches without a
/// usable text field
fn extract_contexts(matches: Vec<crate::database::QueryMatch>) -> Vec<String> {
    matches
        .into_iter()
        .filter_map(|m| m.metadata.and_then(|metadata| metadata.text))
        .collect()
}

/// Char-boundary-safe byte-bounded prefix of a chunk's text
fn truncate_snippet(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text.get(..end).map_or_else(String::new, str::to_string)
}

/// Retry an asynchronous operation with exponential backoff
async fn with_retry<T, F, Fut>(attempts: u32, base_delay: Duration, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_error = None;

    for attempt in 1..=attempts {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                warn!("Attempt {}/{} failed: {}", attempt, attempts, e);
                last_error = Some(e);

                if attempt < attempts {
                    sleep(base_delay * 2_u32.pow(attempt - 1)).await;
                }
            }
        }
    }

    Err(last_error
        .unwrap_or_else(|| RagError::Other(anyhow::anyhow!("Retry called with zero attempts"))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{IndexStats, QueryMatch};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingOp {
        calls: AtomicUsize,
        succeed_on: usize,
    }

    async fn run_counting(op: &CountingOp) -> Result<usize> {
        let call = op.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call >= op.succeed_on {
            Ok(call)
        } else {
            Err(RagError::Index("transient".to_string()))
        }
    }

    #[tokio::test]
    async fn retry_succeeds_after_transient_failures() {
        let op = CountingOp {
            calls: AtomicUsize::new(0),
            succeed_on: 3,
        };
        let result = with_retry(3, Duration::from_millis(1), || run_counting(&op)).await;
        assert_eq!(result.expect("should succeed on third attempt"), 3);
    }

    #[tokio::test]
    async fn retry_gives_up_after_bounded_attempts() {
        let op = CountingOp {
            calls: AtomicUsize::new(0),
            succeed_on: 10,
        };
        let result = with_retry(3, Duration::from_millis(1), || run_counting(&op)).await;
        assert!(result.is_err());
        assert_eq!(op.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn derived_name_uses_id_prefix() {
        assert_eq!(
            derived_name("abcdef12-3456-7890"),
            "Document-abcdef12"
        );
        assert_eq!(derived_name("abc"), "Document-abc");
    }

    #[test]
    fn snippet_truncation_respects_char_boundaries() {
        assert_eq!(truncate_snippet("hello", 10), "hello");
        assert_eq!(truncate_snippet("hello world", 5), "hello");

        // 'é' is two bytes; cutting at byte 1 must back off to the boundary
        let text = "née";
        let snippet = truncate_snippet(text, 2);
        assert!(text.starts_with(&snippet));
        assert!(snippet.len() <= 2);
    }

    struct NullEmbedder;

    #[async_trait]
    impl EmbeddingProvider for NullEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![1.0, 0.0])
        }
    }

    struct EmptyIndex;

    #[async_trait]
    impl VectorIndex for EmptyIndex {
        async fn upsert(&self, _records: &[VectorRecord]) -> Result<()> {
            Ok(())
        }

        async fn query(
            &self,
            _vector: &[f32],
            _top_k: usize,
            _document_id: Option<&str>,
        ) -> Result<Vec<QueryMatch>> {
            Ok(Vec::new())
        }

        async fn delete_by_document(&self, _document_id: &str) -> Result<()> {
            Ok(())
        }

        async fn describe_stats(&self) -> Result<IndexStats> {
            Ok(IndexStats {
                dimension: Some(4),
                record_count: 0,
            })
        }
    }

    fn fast_settings() -> RetrievalConfig {
        RetrievalConfig {
            embed_delay_ms: 0,
            batch_delay_ms: 0,
            ..RetrievalConfig::default()
        }
    }

    #[tokio::test]
    async fn empty_document_is_rejected() {
        let mut retriever = Retriever::with_settings(
            Arc::new(NullEmbedder),
            Arc::new(EmptyIndex),
            ChunkingConfig::default(),
            fast_settings(),
        );

        let result = retriever.ingest("   ", Some("blank.txt")).await;
        assert!(matches!(result, Err(RagError::EmptyDocument)));
    }

    #[tokio::test]
    async fn query_against_empty_namespace_returns_sentinel() {
        let mut retriever = Retriever::with_settings(
            Arc::new(NullEmbedder),
            Arc::new(EmptyIndex),
            ChunkingConfig::default(),
            fast_settings(),
        );

        let contexts = retriever
            .query("missing-doc", "anything")
            .await
            .expect("query should not error");
        assert_eq!(contexts, vec![NO_RELEVANT_INFORMATION.to_string()]);
    }

    #[tokio::test]
    async fn dimension_discovery_is_cached() {
        let mut retriever = Retriever::with_settings(
            Arc::new(NullEmbedder),
            Arc::new(EmptyIndex),
            ChunkingConfig::default(),
            fast_settings(),
        );

        assert_eq!(retriever.discover_dimension().await, 4);
        assert_eq!(retriever.target_dimension, Some(4));
    }

    #[tokio::test]
    async fn ingest_uses_placeholder_name_when_absent() {
        let mut retriever = Retriever::with_settings(
            Arc::new(NullEmbedder),
            Arc::new(EmptyIndex),
            ChunkingConfig::default(),
            fast_settings(),
        );

        let receipt = retriever
            .ingest_with_id("some text", "abcd1234-ef56", None)
            .await
            .expect("ingest should succeed");
        assert_eq!(receipt.document.name, "Document-abcd1234");
        assert_eq!(receipt.backend, Stored::Remote);
        assert_eq!(receipt.chunk_count, 1);
        assert_eq!(receipt.skipped_chunks, 0);
    }
}
