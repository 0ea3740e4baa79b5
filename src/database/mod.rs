// Database module
// The namespaced remote vector index boundary, the in-process fallback
// store, and the document registry cache

pub mod local;
pub mod pinecone;
pub mod registry;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Result;

pub use local::LocalFallbackStore;
pub use pinecone::PineconeClient;
pub use registry::DocumentRegistry;

/// One record per chunk, as stored in the vector index
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VectorRecord {
    /// Record identifier, `{document_id}-chunk-{chunk_index}`
    pub id: String,
    /// Dimension-reconciled embedding vector
    pub values: Vec<f32>,
    pub metadata: ChunkMetadata,
}

/// Typed metadata bag stored alongside each vector.
///
/// Deserialized and validated at the index boundary; responses whose
/// metadata does not carry the required fields are treated as metadata-less.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChunkMetadata {
    pub document_id: String,
    pub file_name: String,
    pub chunk_index: u32,
    pub upload_date: DateTime<Utc>,
    /// Truncated copy of the chunk text, served directly as retrieval context
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// Lightweight per-document summary used for listings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocumentInfo {
    pub id: String,
    pub name: String,
    pub upload_date: DateTime<Utc>,
}

/// One similarity-search hit from the vector index
#[derive(Debug, Clone, PartialEq)]
pub struct QueryMatch {
    pub id: String,
    pub score: f32,
    pub metadata: Option<ChunkMetadata>,
}

/// Namespace-level statistics reported by the vector index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexStats {
    /// Configured index dimension, when the service reports one
    pub dimension: Option<usize>,
    /// Record count within the configured namespace
    pub record_count: u64,
}

/// External namespaced nearest-neighbor service boundary.
///
/// Every operation may fail (network, quota, outage); recovery belongs to
/// the caller, which falls back to [`LocalFallbackStore`] per operation.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn upsert(&self, records: &[VectorRecord]) -> Result<()>;

    /// Similarity query, optionally filtered server-side to one document's
    /// records
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        document_id: Option<&str>,
    ) -> Result<Vec<QueryMatch>>;

    /// Remove every record belonging to a document
    async fn delete_by_document(&self, document_id: &str) -> Result<()>;

    async fn describe_stats(&self) -> Result<IndexStats>;
}
