//! Retrieval-only search surface.
//!
//! The thin service the outer search API consumes: semantic or lexical
//! document search plus index administration, with no answer generation
//! involved.

use std::sync::Arc;

use tracing::info;

use crate::llm::EmbeddingClient;
use crate::store::{DocumentStore, IndexedDocument, ScoredDocument, StoreStats};
use crate::types::{AppError, Result, SearchResponse, SearchType, Source};
use crate::utils::RetrievalConfig;

/// Document search and index administration.
pub struct SearchService {
    embedder: Arc<dyn EmbeddingClient>,
    store: Arc<dyn DocumentStore>,
    config: RetrievalConfig,
}

impl SearchService {
    /// Build the service over the given embedder and store.
    pub fn new(
        embedder: Arc<dyn EmbeddingClient>,
        store: Arc<dyn DocumentStore>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            embedder,
            store,
            config,
        }
    }

    /// Search the index without deduplication or context assembly.
    pub async fn search(
        &self,
        query: &str,
        top_k: Option<usize>,
        search_type: SearchType,
    ) -> Result<SearchResponse> {
        let query = query.trim();
        if query.is_empty() {
            return Err(AppError::InvalidQuery(
                "query must not be empty or whitespace-only".into(),
            ));
        }
        let k = top_k.unwrap_or(self.config.top_k);

        let hits = match search_type {
            SearchType::Semantic => {
                let vector = self.embedder.embed(query).await?;
                self.store.knn_search(&vector, k).await?
            }
            SearchType::Text => self.store.text_search(query, k).await?,
        };

        let total_hits = hits.len();
        let documents = hits
            .into_iter()
            .map(|hit| self.to_source(hit))
            .collect();

        Ok(SearchResponse {
            documents,
            query: query.to_string(),
            total_hits,
        })
    }

    /// Index pre-embedded documents directly.
    pub async fn index_documents(&self, documents: Vec<IndexedDocument>) -> Result<usize> {
        let count = self.store.upsert_batch(documents).await?;
        info!(count, backend = self.store.backend_name(), "indexed documents");
        Ok(count)
    }

    /// Index statistics.
    pub async fn stats(&self) -> Result<StoreStats> {
        self.store.stats().await
    }

    /// Drop the entire index.
    pub async fn delete_index(&self) -> Result<()> {
        info!(backend = self.store.backend_name(), "deleting index");
        self.store.delete_all().await
    }

    fn to_source(&self, hit: ScoredDocument) -> Source {
        let mut content = hit.document.chunk;
        if content.chars().count() > self.config.excerpt_chars {
            content = content
                .chars()
                .take(self.config.excerpt_chars)
                .collect::<String>()
                .trim_end()
                .to_string()
                + "...";
        }
        Source {
            content,
            id: hit.document.id,
            title: hit.document.title,
            score: hit.score,
            metadata: hit.document.meta,
            url: hit.document.url,
        }
    }
}
