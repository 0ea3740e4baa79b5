#[cfg(test)]
mod tests;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::config::PineconeConfig;
use crate::database::{ChunkMetadata, IndexStats, QueryMatch, VectorIndex, VectorRecord};
use crate::{RagError, Result};

const DEFAULT_TIMEOUT_SECONDS: u64 = 30;

/// Client for the Pinecone index data plane. All operations are scoped to
/// the configured namespace.
///
/// This client does not retry; retry policy for upserts lives in the
/// orchestrator, and every other failure is answered by falling back to the
/// local store.
#[derive(Debug, Clone)]
pub struct PineconeClient {
    index_url: Url,
    api_key: String,
    namespace: String,
    agent: ureq::Agent,
}

#[derive(Debug, Serialize)]
struct UpsertRequest<'a> {
    vectors: &'a [VectorRecord],
    namespace: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpsertResponse {
    #[serde(default)]
    upserted_count: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: &'a [f32],
    top_k: usize,
    include_metadata: bool,
    namespace: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<WireMatch>,
}

#[derive(Debug, Deserialize)]
struct WireMatch {
    id: String,
    #[serde(default)]
    score: f32,
    #[serde(default)]
    metadata: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct DeleteRequest<'a> {
    filter: serde_json::Value,
    namespace: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatsResponse {
    #[serde(default)]
    dimension: Option<usize>,
    #[serde(default)]
    namespaces: HashMap<String, NamespaceStats>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NamespaceStats {
    #[serde(default, alias = "vectorCount")]
    record_count: u64,
}

impl PineconeClient {
    #[inline]
    pub fn new(config: &PineconeConfig) -> Result<Self> {
        let index_url = config
            .index_url()
            .map_err(|e| RagError::Config(e.to_string()))?;

        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS)))
            .build()
            .into();

        Ok(Self {
            index_url,
            api_key: config.api_key.clone(),
            namespace: config.namespace.clone(),
            agent,
        })
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();
        self
    }

    #[inline]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Upsert a batch of records into the namespace
    #[inline]
    pub fn upsert_records(&self, records: &[VectorRecord]) -> Result<()> {
        if records.is_empty() {
            debug!("No records to upsert");
            return Ok(());
        }

        let request = UpsertRequest {
            vectors: records,
            namespace: &self.namespace,
        };
        let response_text = self.post_json("/vectors/upsert", &request)?;

        let response: UpsertResponse = serde_json::from_str(&response_text)
            .map_err(|e| RagError::Index(format!("Failed to parse upsert response: {e}")))?;

        debug!(
            "Upserted {} records into namespace {}",
            response.upserted_count, self.namespace
        );
        Ok(())
    }

    /// Similarity query within the namespace, optionally filtered to a
    /// single document's records
    #[inline]
    pub fn query_records(
        &self,
        vector: &[f32],
        top_k: usize,
        document_id: Option<&str>,
    ) -> Result<Vec<QueryMatch>> {
        let request = QueryRequest {
            vector,
            top_k,
            include_metadata: true,
            namespace: &self.namespace,
            filter: document_id.map(document_filter),
        };
        let response_text = self.post_json("/query", &request)?;

        let response: QueryResponse = serde_json::from_str(&response_text)
            .map_err(|e| RagError::Index(format!("Failed to parse query response: {e}")))?;

        debug!(
            "Query returned {} matches from namespace {}",
            response.matches.len(),
            self.namespace
        );

        Ok(response
            .matches
            .into_iter()
            .map(|m| QueryMatch {
                metadata: m.metadata.and_then(|value| parse_metadata(&m.id, value)),
                id: m.id,
                score: m.score,
            })
            .collect())
    }

    /// Delete every record for a document from the namespace
    #[inline]
    pub fn delete_document_records(&self, document_id: &str) -> Result<()> {
        let request = DeleteRequest {
            filter: document_filter(document_id),
            namespace: &self.namespace,
        };
        self.post_json("/vectors/delete", &request)?;

        debug!(
            "Deleted records for document {} from namespace {}",
            document_id, self.namespace
        );
        Ok(())
    }

    /// Fetch index statistics: configured dimension plus the record count of
    /// the configured namespace
    #[inline]
    pub fn fetch_stats(&self) -> Result<IndexStats> {
        let response_text = self.post_json("/describe_index_stats", &serde_json::json!({}))?;

        let response: StatsResponse = serde_json::from_str(&response_text)
            .map_err(|e| RagError::Index(format!("Failed to parse stats response: {e}")))?;

        let record_count = response
            .namespaces
            .get(&self.namespace)
            .map_or(0, |ns| ns.record_count);

        Ok(IndexStats {
            dimension: response.dimension,
            record_count,
        })
    }

    fn post_json<T: Serialize>(&self, path: &str, body: &T) -> Result<String> {
        let url = self
            .index_url
            .join(path)
            .map_err(|e| RagError::Index(format!("Failed to build URL for {path}: {e}")))?;

        let request_json = serde_json::to_string(body)
            .map_err(|e| RagError::Index(format!("Failed to serialize request: {e}")))?;

        self.agent
            .post(url.as_str())
            .header("Api-Key", &self.api_key)
            .header("Content-Type", "application/json")
            .send(&request_json)
            .and_then(|mut resp| resp.body_mut().read_to_string())
            .map_err(|e| RagError::Index(format!("Request to {path} failed: {e}")))
    }
}

/// Server-side filter restricting an operation to one document's records
fn document_filter(document_id: &str) -> serde_json::Value {
    serde_json::json!({ "documentId": { "$eq": document_id } })
}

/// Validate a raw metadata bag into the typed form; malformed bags are
/// logged and treated as absent rather than failing the whole query
fn parse_metadata(record_id: &str, value: serde_json::Value) -> Option<ChunkMetadata> {
    match serde_json::from_value::<ChunkMetadata>(value) {
        Ok(metadata) => Some(metadata),
        Err(e) => {
            warn!("Dropping malformed metadata on record {}: {}", record_id, e);
            None
        }
    }
}

#[async_trait]
impl VectorIndex for PineconeClient {
    async fn upsert(&self, records: &[VectorRecord]) -> Result<()> {
        self.upsert_records(records)
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        document_id: Option<&str>,
    ) -> Result<Vec<QueryMatch>> {
        self.query_records(vector, top_k, document_id)
    }

    async fn delete_by_document(&self, document_id: &str) -> Result<()> {
        self.delete_document_records(document_id)
    }

    async fn describe_stats(&self) -> Result<IndexStats> {
        self.fetch_stats()
    }
}
