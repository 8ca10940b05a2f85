//! Medicine corpus ingestion.
//!
//! Records flow through normalize, chunk, embed, upsert. Embedding batches
//! run with bounded parallelism; a failed batch loses only its own records,
//! while an unreachable store aborts the run. Re-running ingestion over the
//! same records is safe because chunk ids are deterministic and upserts are
//! idempotent per id.

pub mod chunker;

pub use chunker::TextChunker;

use std::sync::Arc;
use std::time::Instant;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::llm::EmbeddingClient;
use crate::store::{DocumentStore, IndexedDocument};
use crate::types::{AppError, Result};
use crate::utils::{ChunkingConfig, IngestConfig};

// ===== Record model & normalization =====

/// A raw medicine record as supplied by the dataset loader.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MedicineRecord {
    /// Dataset record id.
    pub id: String,
    /// Medicine name.
    pub name: String,
    /// Chemical class, may carry `NA`-style sentinels.
    #[serde(default)]
    pub chemical_class: Option<String>,
    /// Therapeutic class.
    #[serde(default)]
    pub therapeutic_class: Option<String>,
    /// Action class.
    #[serde(default)]
    pub action_class: Option<String>,
    /// Known uses.
    #[serde(default)]
    pub uses: Vec<String>,
    /// Known side effects.
    #[serde(default)]
    pub side_effects: Vec<String>,
    /// Substitute medicines.
    #[serde(default)]
    pub substitutes: Vec<String>,
    /// Habit forming indication ("Yes"/"No").
    #[serde(default)]
    pub habit_forming: Option<String>,
    /// Manufacturer name. Kept in metadata, not embedded.
    #[serde(default)]
    pub manufacturer: Option<String>,
    /// Dosage description. Kept in metadata, not embedded.
    #[serde(default)]
    pub dosage: Option<String>,
}

/// A record after sentinel cleaning, ready for chunking.
#[derive(Debug, Clone)]
pub struct NormalizedRecord {
    /// Stable document id prefix (`med_{record}`).
    pub doc_id: String,
    /// Display title.
    pub title: String,
    /// Descriptive text block, stable field order.
    pub content: String,
    /// Link to the original record.
    pub url: String,
    /// Metadata persisted with every chunk of this record.
    pub meta: serde_json::Value,
}

/// Drop dataset placeholder values (`NA`, `nan`, empty strings).
fn clean_field(value: Option<&str>) -> Option<String> {
    let trimmed = value?.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("na") || trimmed.eq_ignore_ascii_case("nan")
    {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn clean_list(values: &[String]) -> Vec<String> {
    values
        .iter()
        .filter_map(|v| clean_field(Some(v.as_str())))
        .collect()
}

/// Normalize a raw record into its indexable form.
///
/// The field order of the content block is fixed so that re-ingesting an
/// unchanged record produces byte-identical chunks.
pub fn normalize(record: &MedicineRecord) -> Result<NormalizedRecord> {
    let id = record.id.trim();
    if id.is_empty() {
        return Err(AppError::InvalidInput("record id must not be empty".into()));
    }
    let name = clean_field(Some(record.name.as_str()))
        .ok_or_else(|| AppError::InvalidInput(format!("record '{}' has no name", id)))?;

    let chemical_class = clean_field(record.chemical_class.as_deref());
    let therapeutic_class = clean_field(record.therapeutic_class.as_deref());
    let action_class = clean_field(record.action_class.as_deref());
    let uses = clean_list(&record.uses);
    let side_effects = clean_list(&record.side_effects);
    let substitutes = clean_list(&record.substitutes);
    let habit_forming = clean_field(record.habit_forming.as_deref());

    let mut parts = vec![format!("Medicine Name: {}", name)];
    if let Some(value) = &chemical_class {
        parts.push(format!("Chemical Class: {}", value));
    }
    if let Some(value) = &therapeutic_class {
        parts.push(format!("Therapeutic Class: {}", value));
    }
    if let Some(value) = &action_class {
        parts.push(format!("Action Class: {}", value));
    }
    if !uses.is_empty() {
        parts.push(format!("Uses: {}", uses.join(", ")));
    }
    if !side_effects.is_empty() {
        parts.push(format!("Side Effects: {}", side_effects.join(", ")));
    }
    if !substitutes.is_empty() {
        parts.push(format!("Substitutes: {}", substitutes.join(", ")));
    }
    if let Some(value) = &habit_forming {
        parts.push(format!("Habit Forming: {}", value));
    }

    let doc_id = format!("med_{}", id);
    let title = match &chemical_class {
        Some(class) => format!("{} ({})", name, class),
        None => name.clone(),
    };

    let meta = serde_json::json!({
        "medicine_id": doc_id,
        "name": name,
        "chemical_class": chemical_class,
        "therapeutic_class": therapeutic_class,
        "action_class": action_class,
        "uses": uses,
        "side_effects": side_effects,
        "substitutes": substitutes,
        "habit_forming": habit_forming,
        "manufacturer": clean_field(record.manufacturer.as_deref()),
        "dosage": clean_field(record.dosage.as_deref()),
    });

    Ok(NormalizedRecord {
        url: format!("https://medquery.app/medicine/{}", doc_id),
        doc_id,
        title,
        content: parts.join(". "),
        meta,
    })
}

// ===== Pipeline =====

/// Summary of one ingestion run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestReport {
    /// Records accepted into the run (after the optional limit).
    pub records_total: usize,
    /// Records that were skipped or lost to a failed batch.
    pub records_failed: usize,
    /// Chunks written to the store.
    pub chunks_written: usize,
    /// Embedding batches that failed entirely.
    pub batches_failed: usize,
    /// Sampled documents found by the verify step.
    pub verified_ok: usize,
    /// Wall-clock duration of the run.
    pub duration_ms: u64,
}

struct PendingChunk {
    document: IndexedDocument,
    text: String,
}

/// Normalize, chunk, embed, and upsert medicine records.
pub struct IngestionPipeline {
    embedder: Arc<dyn EmbeddingClient>,
    store: Arc<dyn DocumentStore>,
    chunker: TextChunker,
    config: IngestConfig,
    max_records: Option<usize>,
}

impl IngestionPipeline {
    /// Build a pipeline over the given embedder and store.
    pub fn new(
        embedder: Arc<dyn EmbeddingClient>,
        store: Arc<dyn DocumentStore>,
        chunking: ChunkingConfig,
        config: IngestConfig,
    ) -> Self {
        Self {
            embedder,
            store,
            chunker: TextChunker::new(chunking.chunk_size, chunking.chunk_overlap),
            config,
            max_records: None,
        }
    }

    /// Cap the number of records processed per run.
    pub fn with_max_records(mut self, max_records: usize) -> Self {
        self.max_records = Some(max_records);
        self
    }

    /// Run the pipeline over `records`.
    ///
    /// A batch lost to a provider failure is logged and counted; the run
    /// continues with the remaining batches. An unreachable store aborts
    /// the run after the in-flight batches are dropped.
    pub async fn ingest(&self, mut records: Vec<MedicineRecord>) -> Result<IngestReport> {
        let started = Instant::now();
        if let Some(limit) = self.max_records {
            records.truncate(limit);
        }
        let records_total = records.len();

        let mut records_failed = 0usize;
        let mut batches: Vec<(usize, Vec<PendingChunk>)> = Vec::new();
        let mut current: Vec<PendingChunk> = Vec::new();
        let mut current_records = 0usize;

        for record in &records {
            let normalized = match normalize(record) {
                Ok(normalized) => normalized,
                Err(e) => {
                    warn!(record_id = %record.id, error = %e, "skipping malformed record");
                    records_failed += 1;
                    continue;
                }
            };

            for (index, chunk) in self.chunker.chunk(&normalized.content).into_iter().enumerate() {
                current.push(PendingChunk {
                    document: IndexedDocument {
                        id: format!("{}_{}", normalized.doc_id, index),
                        title: normalized.title.clone(),
                        chunk: chunk.clone(),
                        url: Some(normalized.url.clone()),
                        meta: normalized.meta.clone(),
                        vector: Vec::new(),
                    },
                    text: chunk,
                });
            }

            current_records += 1;
            if current_records >= self.config.batch_size {
                batches.push((current_records, std::mem::take(&mut current)));
                current_records = 0;
            }
        }
        if !current.is_empty() {
            batches.push((current_records, current));
        }

        let batch_count = batches.len();
        info!(
            records = records_total,
            batches = batch_count,
            concurrency = self.config.max_concurrent_batches,
            "starting ingestion"
        );

        let mut results =
            stream::iter(batches.into_iter().enumerate().map(|(index, (records, batch))| {
                let embedder = Arc::clone(&self.embedder);
                let store = Arc::clone(&self.store);
                async move { (index, records, embed_and_upsert(embedder, store, batch).await) }
            }))
            .buffer_unordered(self.config.max_concurrent_batches.max(1));

        let mut chunks_written = 0usize;
        let mut batches_failed = 0usize;
        let mut batches_done = 0usize;
        let mut sample_ids: Vec<String> = Vec::new();

        while let Some((index, records, result)) = results.next().await {
            batches_done += 1;
            match result {
                Ok(written) => {
                    chunks_written += written.count;
                    if sample_ids.len() < self.config.verify_sample {
                        sample_ids.extend(written.sample_id);
                    }
                }
                Err(e @ AppError::StoreUnavailable(_)) => {
                    // Dropping the stream cancels the remaining batches.
                    warn!(batch = index, error = %e, "store unreachable, aborting ingestion");
                    return Err(e);
                }
                Err(e) => {
                    warn!(batch = index, records, error = %e, "batch failed, continuing");
                    batches_failed += 1;
                    records_failed += records;
                }
            }

            let elapsed = started.elapsed().as_secs_f64();
            let rate = chunks_written as f64 / elapsed.max(0.001);
            let eta_s = if rate > 0.0 {
                ((batch_count - batches_done) as f64 * chunks_written as f64
                    / batches_done.max(1) as f64)
                    / rate
            } else {
                0.0
            };
            info!(
                batch = batches_done,
                of = batch_count,
                chunks_written,
                rate_per_s = format!("{:.1}", rate),
                eta_s = format!("{:.0}", eta_s),
                "ingestion progress"
            );
        }

        let verified_ok = self.verify(&sample_ids).await?;

        let report = IngestReport {
            records_total,
            records_failed,
            chunks_written,
            batches_failed,
            verified_ok,
            duration_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            records = report.records_total,
            failed = report.records_failed,
            chunks = report.chunks_written,
            duration_ms = report.duration_ms,
            "ingestion finished"
        );
        Ok(report)
    }

    /// Re-query a sample of ingested ids to confirm index visibility.
    pub async fn verify(&self, sample_ids: &[String]) -> Result<usize> {
        let mut found = 0usize;
        for id in sample_ids {
            match self.store.get(id).await? {
                Some(_) => found += 1,
                None => warn!(doc_id = %id, "ingested document missing from index"),
            }
        }
        Ok(found)
    }
}

struct BatchWritten {
    count: usize,
    sample_id: Option<String>,
}

async fn embed_and_upsert(
    embedder: Arc<dyn EmbeddingClient>,
    store: Arc<dyn DocumentStore>,
    batch: Vec<PendingChunk>,
) -> Result<BatchWritten> {
    let texts: Vec<String> = batch.iter().map(|chunk| chunk.text.clone()).collect();
    let vectors = embedder.embed_batch(&texts).await?;
    if vectors.len() != batch.len() {
        return Err(AppError::Provider(format!(
            "embedder returned {} vectors for {} chunks",
            vectors.len(),
            batch.len()
        )));
    }

    let documents: Vec<IndexedDocument> = batch
        .into_iter()
        .zip(vectors)
        .map(|(chunk, vector)| IndexedDocument {
            vector,
            ..chunk.document
        })
        .collect();

    let sample_id = documents.first().map(|d| d.id.clone());
    let count = store.upsert_batch(documents).await?;
    Ok(BatchWritten { count, sample_id })
}
