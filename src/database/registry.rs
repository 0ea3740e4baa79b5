use std::collections::HashMap;

use crate::database::DocumentInfo;

/// In-memory cache of per-document metadata, the fast path for listings.
///
/// Never authoritative: it shadows a subset of the vector index's metadata
/// and is refreshed opportunistically on ingest and whenever a query or
/// listing surfaces metadata for a document not yet cached. When it
/// disagrees with the index, the index wins.
#[derive(Debug, Default)]
pub struct DocumentRegistry {
    entries: HashMap<String, DocumentInfo>,
}

impl DocumentRegistry {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn put(&mut self, info: DocumentInfo) {
        self.entries.insert(info.id.clone(), info);
    }

    #[inline]
    pub fn get(&self, document_id: &str) -> Option<&DocumentInfo> {
        self.entries.get(document_id)
    }

    #[inline]
    pub fn remove(&mut self, document_id: &str) -> Option<DocumentInfo> {
        self.entries.remove(document_id)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All cached entries, newest upload first
    #[inline]
    pub fn all(&self) -> Vec<DocumentInfo> {
        let mut entries: Vec<DocumentInfo> = self.entries.values().cloned().collect();
        entries.sort_by(|a, b| b.upload_date.cmp(&a.upload_date));
        entries
    }
}
