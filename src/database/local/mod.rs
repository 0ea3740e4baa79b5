
use std::collections::HashMap;
use tracing::debug;

use crate::database::{DocumentInfo, QueryMatch, VectorRecord};

/// In-process substitute for the remote vector index, used while the remote
/// path is unavailable.
///
/// Holds the same records the index would hold, keyed by document
/// identifier, and answers similarity queries by brute-force cosine
/// similarity. Nothing here survives a process restart; the remote index is
/// the durable store and this exists purely for availability.
#[derive(Debug, Default)]
pub struct LocalFallbackStore {
    records: HashMap<String, Vec<VectorRecord>>,
}

impl LocalFallbackStore {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored records for a document
    #[inline]
    pub fn insert(&mut self, document_id: &str, records: Vec<VectorRecord>) {
        debug!(
            "Storing {} records locally for document {}",
            records.len(),
            document_id
        );
        self.records.insert(document_id.to_string(), records);
    }

    /// Brute-force cosine similarity over one document's records, descending
    /// by score with stable insertion-order tie-breaking
    #[inline]
    pub fn query(&self, document_id: &str, vector: &[f32], top_k: usize) -> Vec<QueryMatch> {
        let Some(records) = self.records.get(document_id) else {
            return Vec::new();
        };

        let mut scored: Vec<QueryMatch> = records
            .iter()
            .map(|record| QueryMatch {
                id: record.id.clone(),
                score: cosine_similarity(vector, &record.values),
                metadata: Some(record.metadata.clone()),
            })
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);

        debug!(
            "Local query for document {} returned {} matches",
            document_id,
            scored.len()
        );
        scored
    }

    /// Remove a document's records entirely; returns whether anything was
    /// stored
    #[inline]
    pub fn remove(&mut self, document_id: &str) -> bool {
        self.records.remove(document_id).is_some()
    }

    #[inline]
    pub fn contains(&self, document_id: &str) -> bool {
        self.records.contains_key(document_id)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// One summary entry per stored document, taken from the first record's
    /// metadata
    #[inline]
    pub fn summaries(&self) -> Vec<DocumentInfo> {
        self.records
            .iter()
            .filter_map(|(document_id, records)| {
                records.first().map(|record| DocumentInfo {
                    id: document_id.clone(),
                    name: record.metadata.file_name.clone(),
                    upload_date: record.metadata.upload_date,
                })
            })
            .collect()
    }
}

/// Cosine similarity over the shared prefix of the two vectors, for
/// symmetry with dimension reconciliation when lengths differ. Zero-norm
/// inputs score 0.0 rather than NaN.
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0_f32;
    let mut norm_a = 0.0_f32;
    let mut norm_b = 0.0_f32;

    // zip truncates to the shared prefix when lengths differ
    for (&x, &y) in a.iter().zip(b.iter()) {
        dot = x.mul_add(y, dot);
        norm_a = x.mul_add(x, norm_a);
        norm_b = y.mul_add(y, norm_b);
    }

    let denom = (norm_a * norm_b).sqrt();
    if denom == 0.0 { 0.0 } else { dot / denom }
}
