// Embeddings module
// Chunking, the embedding provider boundary, and dimension reconciliation

pub mod chunking;
pub mod gemini;

use async_trait::async_trait;
use tracing::debug;

use crate::Result;

pub use chunking::{Chunk, chunk_document};
pub use gemini::GeminiClient;

/// External embedding provider boundary: maps text to a fixed-length vector.
///
/// Implementations decide their own transport and auth; callers own retry
/// policy beyond whatever the implementation does for transient transport
/// errors.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Force `vector` to exactly `target` entries: truncate when longer,
/// right-pad with zeros when shorter. Never fails.
///
/// Embedding model output dimension and the index's configured dimension are
/// independent external facts that can diverge; the pipeline reconciles
/// silently rather than rejecting, trading similarity fidelity for
/// robustness.
#[inline]
pub fn reconcile_dimension(mut vector: Vec<f32>, target: usize) -> Vec<f32> {
    if vector.len() == target {
        return vector;
    }

    debug!(
        "Reconciling embedding dimension {} to index dimension {}",
        vector.len(),
        target
    );

    if vector.len() > target {
        vector.truncate(target);
    } else {
        vector.resize(target, 0.0);
    }
    vector
}
