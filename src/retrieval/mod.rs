//! Retrieval engine.
//!
//! Embeds the query, searches the document store, deduplicates per
//! medicine record, and assembles the grounded context block handed to
//! the answer composer. Running out of signal is a normal outcome here,
//! not an error: the engine reports it through the context marker and an
//! empty source list, and the composer decides what to tell the user.

pub mod search;

pub use search::SearchService;

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::llm::EmbeddingClient;
use crate::store::{DocumentStore, ScoredDocument};
use crate::types::{AppError, Result, Source};
use crate::utils::RetrievalConfig;

/// Context marker produced when retrieval finds nothing usable.
pub const INSUFFICIENT_CONTEXT: &str = "Insufficient data.";

/// Outcome of one retrieval pass.
#[derive(Debug, Clone)]
pub struct RetrievalResult {
    /// Deduplicated sources, best first, at most `top_k`.
    pub sources: Vec<Source>,
    /// Rank-tagged context block, or [`INSUFFICIENT_CONTEXT`].
    pub context: String,
}

impl RetrievalResult {
    /// True when retrieval found no usable sources.
    pub fn is_insufficient(&self) -> bool {
        self.sources.is_empty()
    }

    fn insufficient() -> Self {
        Self {
            sources: Vec::new(),
            context: INSUFFICIENT_CONTEXT.to_string(),
        }
    }
}

/// Query-time retrieval over the document store.
pub struct RetrievalEngine {
    embedder: Arc<dyn EmbeddingClient>,
    store: Arc<dyn DocumentStore>,
    config: RetrievalConfig,
}

impl RetrievalEngine {
    /// Build an engine over the given embedder and store.
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

    /// Retrieve up to `k` sources for `query` (`top_k` when `None`).
    ///
    /// Semantic hits scoring below `score_floor` are discarded before
    /// deduplication; when that leaves nothing and the lexical fallback
    /// is enabled, retrieval degrades to text search.
    ///
    /// # Errors
    ///
    /// `InvalidQuery` for blank queries. Provider failures propagate
    /// unless the lexical fallback is enabled, in which case retrieval
    /// degrades to text search. Store failures always propagate.
    pub async fn retrieve(&self, query: &str, k: Option<usize>) -> Result<RetrievalResult> {
        let query = query.trim();
        if query.is_empty() {
            return Err(AppError::InvalidQuery(
                "query must not be empty or whitespace-only".into(),
            ));
        }
        let k = k.unwrap_or(self.config.top_k);
        if k == 0 {
            return Ok(RetrievalResult::insufficient());
        }
        // Fetch extra so per-record dedupe still fills k slots.
        let fetch_k = k.saturating_mul(self.config.dedup_overfetch);

        let mut hits = match self.embedder.embed(query).await {
            Ok(vector) => {
                let hits = self.store.knn_search(&vector, fetch_k).await?;
                hits.into_iter()
                    .filter(|hit| hit.score >= self.config.score_floor)
                    .collect()
            }
            Err(e @ AppError::Provider(_)) if self.config.text_fallback => {
                warn!(error = %e, "embedding failed, degrading to text search");
                Vec::new()
            }
            Err(e) => return Err(e),
        };

        if hits.is_empty() && self.config.text_fallback {
            hits = self.store.text_search(query, fetch_k).await?;
        }

        let sources = self.dedupe_and_rank(hits, k);
        debug!(query_len = query.len(), sources = sources.len(), "retrieval complete");

        if sources.is_empty() {
            return Ok(RetrievalResult::insufficient());
        }

        let context = format_context(&sources);
        Ok(RetrievalResult { sources, context })
    }

    /// Keep the best-scoring chunk per medicine record, preserving score
    /// order, truncated to `k`.
    fn dedupe_and_rank(&self, hits: Vec<ScoredDocument>, k: usize) -> Vec<Source> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut sources = Vec::with_capacity(k);
        for hit in hits {
            let record_id = hit
                .document
                .medicine_id()
                .unwrap_or(&hit.document.id)
                .to_string();
            if !seen.insert(record_id) {
                continue;
            }
            sources.push(self.to_source(hit));
            if sources.len() == k {
                break;
            }
        }
        sources
    }

    fn to_source(&self, hit: ScoredDocument) -> Source {
        Source {
            content: excerpt(&hit.document.chunk, self.config.excerpt_chars),
            id: hit.document.id,
            title: hit.document.title,
            score: hit.score,
            metadata: hit.document.meta,
            url: hit.document.url,
        }
    }
}

/// Truncate to at most `max_chars`, respecting char boundaries.
fn excerpt(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let truncated: String = text.chars().take(max_chars).collect();
    format!("{}...", truncated.trim_end())
}

/// Rank-tagged context block handed to the model.
fn format_context(sources: &[Source]) -> String {
    sources
        .iter()
        .enumerate()
        .map(|(rank, source)| format!("[{}] {}\n{}", rank + 1, source.title, source.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}
