//! Document store abstraction.
//!
//! One persisted record per chunk: the embedding vector plus the display
//! fields needed to build source citations without a second lookup.
//! Backends differ in consistency; the trait documents the weakest
//! guarantee callers may rely on.

pub mod memory;

pub use memory::InMemoryDocumentStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::Result;

/// A chunk as persisted in the index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedDocument {
    /// Stable chunk id (`med_{record}_{chunk}`).
    pub id: String,
    /// Medicine title for display.
    pub title: String,
    /// Chunk text.
    pub chunk: String,
    /// Optional link to the original record.
    pub url: Option<String>,
    /// Metadata bag; must include `medicine_id` for per-record dedupe.
    pub meta: serde_json::Value,
    /// Embedding vector.
    pub vector: Vec<f32>,
}

impl IndexedDocument {
    /// The owning medicine record id, read from metadata.
    pub fn medicine_id(&self) -> Option<&str> {
        self.meta.get("medicine_id").and_then(|v| v.as_str())
    }
}

/// A store hit with its relevance score.
#[derive(Debug, Clone)]
pub struct ScoredDocument {
    /// The matching document.
    pub document: IndexedDocument,
    /// Similarity (kNN) or normalized lexical score, higher is better.
    pub score: f32,
}

/// Index statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreStats {
    /// Number of indexed chunks.
    pub document_count: usize,
    /// Approximate index size in bytes.
    pub index_size_bytes: usize,
}

/// Storage backend for indexed chunks.
///
/// Writes are idempotent per document id. Visibility of a completed
/// upsert may be eventually consistent depending on the backend; the
/// in-memory reference backend is strongly consistent. An empty index
/// yields empty search results, never an error; only an unreachable
/// backend produces `StoreUnavailable`.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Backend name for logging.
    fn backend_name(&self) -> &str;

    /// Insert or replace documents by id. Returns the number written.
    async fn upsert_batch(&self, documents: Vec<IndexedDocument>) -> Result<usize>;

    /// Nearest-neighbor search by vector similarity, best first.
    async fn knn_search(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredDocument>>;

    /// kNN restricted to documents whose metadata contains every entry
    /// of `filters`. Backends without native filtering may post-filter.
    async fn knn_search_filtered(
        &self,
        vector: &[f32],
        k: usize,
        filters: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<Vec<ScoredDocument>> {
        let hits = self.knn_search(vector, k.saturating_mul(4)).await?;
        let mut filtered: Vec<ScoredDocument> = hits
            .into_iter()
            .filter(|hit| {
                filters
                    .iter()
                    .all(|(key, value)| hit.document.meta.get(key) == Some(value))
            })
            .collect();
        filtered.truncate(k);
        Ok(filtered)
    }

    /// Lexical full-text search, best first, scores normalized to 0..1.
    async fn text_search(&self, query: &str, k: usize) -> Result<Vec<ScoredDocument>>;

    /// Fetch a single document by id.
    async fn get(&self, id: &str) -> Result<Option<IndexedDocument>>;

    /// Index statistics.
    async fn stats(&self) -> Result<StoreStats>;

    /// Drop every document in the index.
    async fn delete_all(&self) -> Result<()>;
}
