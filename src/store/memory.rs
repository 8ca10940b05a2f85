//! In-memory reference backend.
//!
//! Brute-force cosine kNN over a `HashMap`, plus a BM25 lexical index for
//! text search. Strongly consistent; suitable for tests, demos, and small
//! corpora. Not persisted.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;

use crate::store::{DocumentStore, IndexedDocument, ScoredDocument, StoreStats};
use crate::types::{AppError, Result};

// ===== BM25 lexical index =====

/// BM25 index over chunk text. Scores from [`search`](Bm25Index::search)
/// are raw; the store normalizes them before returning.
#[derive(Debug, Default)]
struct Bm25Index {
    documents: HashMap<String, Vec<String>>,
    inverted_index: HashMap<String, HashSet<String>>,
    document_frequencies: HashMap<String, usize>,
    avg_doc_length: f32,
    k1: f32,
    b: f32,
}

impl Bm25Index {
    fn new() -> Self {
        Self {
            k1: 1.2,
            b: 0.75,
            ..Default::default()
        }
    }

    fn tokenize(text: &str) -> Vec<String> {
        text.to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|s| !s.is_empty() && s.len() > 1)
            .map(String::from)
            .collect()
    }

    /// Index a document, replacing any previous entry for the id.
    fn add_document(&mut self, id: &str, content: &str) {
        self.remove_document(id);

        let tokens = Self::tokenize(content);
        let unique_terms: HashSet<_> = tokens.iter().cloned().collect();
        for term in &unique_terms {
            *self.document_frequencies.entry(term.clone()).or_insert(0) += 1;
            self.inverted_index
                .entry(term.clone())
                .or_default()
                .insert(id.to_string());
        }

        self.documents.insert(id.to_string(), tokens);
        self.recalculate_avg_length();
    }

    fn remove_document(&mut self, id: &str) {
        if let Some(tokens) = self.documents.remove(id) {
            let unique_terms: HashSet<_> = tokens.into_iter().collect();
            for term in unique_terms {
                if let Some(df) = self.document_frequencies.get_mut(&term) {
                    *df = df.saturating_sub(1);
                    if *df == 0 {
                        self.document_frequencies.remove(&term);
                    }
                }
                if let Some(docs) = self.inverted_index.get_mut(&term) {
                    docs.remove(id);
                    if docs.is_empty() {
                        self.inverted_index.remove(&term);
                    }
                }
            }
            self.recalculate_avg_length();
        }
    }

    fn clear(&mut self) {
        self.documents.clear();
        self.inverted_index.clear();
        self.document_frequencies.clear();
        self.avg_doc_length = 0.0;
    }

    fn recalculate_avg_length(&mut self) {
        if self.documents.is_empty() {
            self.avg_doc_length = 0.0;
        } else {
            let total_tokens: usize = self.documents.values().map(|v| v.len()).sum();
            self.avg_doc_length = total_tokens as f32 / self.documents.len() as f32;
        }
    }

    fn idf(&self, term: &str) -> f32 {
        let df = self.document_frequencies.get(term).copied().unwrap_or(0) as f32;
        let n = self.documents.len() as f32;
        if df == 0.0 || n == 0.0 {
            return 0.0;
        }
        ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
    }

    fn score_document(&self, doc_id: &str, query_terms: &[String]) -> f32 {
        let doc_tokens = match self.documents.get(doc_id) {
            Some(tokens) => tokens,
            None => return 0.0,
        };

        let doc_len = doc_tokens.len() as f32;
        let mut term_freq: HashMap<&str, usize> = HashMap::new();
        for token in doc_tokens {
            *term_freq.entry(token.as_str()).or_insert(0) += 1;
        }

        let mut score = 0.0;
        for term in query_terms {
            let tf = term_freq.get(term.as_str()).copied().unwrap_or(0) as f32;
            let idf = self.idf(term);
            let numerator = tf * (self.k1 + 1.0);
            let denominator =
                tf + self.k1 * (1.0 - self.b + self.b * doc_len / self.avg_doc_length);
            score += idf * numerator / denominator;
        }
        score
    }

    /// Top-k matches with raw BM25 scores, best first.
    fn search(&self, query: &str, top_k: usize) -> Vec<(String, f32)> {
        let query_terms = Self::tokenize(query);
        if query_terms.is_empty() {
            return Vec::new();
        }

        // Candidates: documents containing at least one query term.
        let mut candidates: HashSet<&String> = HashSet::new();
        for term in &query_terms {
            if let Some(docs) = self.inverted_index.get(term) {
                candidates.extend(docs.iter());
            }
        }

        let mut results: Vec<(String, f32)> = candidates
            .into_iter()
            .map(|id| (id.clone(), self.score_document(id, &query_terms)))
            .filter(|(_, score)| *score > 0.0)
            .collect();

        results.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(top_k);
        results
    }
}

// ===== In-memory store =====

#[derive(Default)]
struct Inner {
    docs: HashMap<String, IndexedDocument>,
    bm25: Bm25Index,
}

/// [`DocumentStore`] holding everything in process memory.
pub struct InMemoryDocumentStore {
    inner: RwLock<Inner>,
}

impl InMemoryDocumentStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                docs: HashMap::new(),
                bm25: Bm25Index::new(),
            }),
        }
    }
}

impl Default for InMemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    fn backend_name(&self) -> &str {
        "in-memory"
    }

    async fn upsert_batch(&self, documents: Vec<IndexedDocument>) -> Result<usize> {
        if documents.is_empty() {
            return Ok(0);
        }
        for document in &documents {
            if document.id.is_empty() {
                return Err(AppError::InvalidInput(
                    "document id must not be empty".into(),
                ));
            }
            if document.vector.is_empty() {
                return Err(AppError::InvalidInput(format!(
                    "document '{}' has an empty vector",
                    document.id
                )));
            }
        }

        let count = documents.len();
        let mut inner = self.inner.write();
        for document in documents {
            inner.bm25.add_document(&document.id, &document.chunk);
            inner.docs.insert(document.id.clone(), document);
        }
        debug!(count, total = inner.docs.len(), "upserted documents");
        Ok(count)
    }

    async fn knn_search(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredDocument>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let inner = self.inner.read();
        let mut hits: Vec<ScoredDocument> = inner
            .docs
            .values()
            .map(|document| ScoredDocument {
                score: cosine_similarity(vector, &document.vector),
                document: document.clone(),
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(k);
        Ok(hits)
    }

    async fn text_search(&self, query: &str, k: usize) -> Result<Vec<ScoredDocument>> {
        if k == 0 || query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let inner = self.inner.read();
        let raw = inner.bm25.search(query, k);
        let top_score = raw.first().map(|(_, score)| *score).unwrap_or(0.0);

        // Normalize by the best hit so lexical scores line up with the
        // 0..1 range of cosine similarity.
        let hits = raw
            .into_iter()
            .filter_map(|(id, score)| {
                inner.docs.get(&id).map(|document| ScoredDocument {
                    document: document.clone(),
                    score: if top_score > 0.0 {
                        score / top_score
                    } else {
                        0.0
                    },
                })
            })
            .collect();
        Ok(hits)
    }

    async fn get(&self, id: &str) -> Result<Option<IndexedDocument>> {
        Ok(self.inner.read().docs.get(id).cloned())
    }

    async fn stats(&self) -> Result<StoreStats> {
        let inner = self.inner.read();
        let index_size_bytes = inner
            .docs
            .values()
            .map(|d| {
                d.vector.len() * std::mem::size_of::<f32>()
                    + d.chunk.len()
                    + d.title.len()
                    + d.id.len()
            })
            .sum();
        Ok(StoreStats {
            document_count: inner.docs.len(),
            index_size_bytes,
        })
    }

    async fn delete_all(&self) -> Result<()> {
        let mut inner = self.inner.write();
        inner.docs.clear();
        inner.bm25.clear();
        Ok(())
    }
}
