//! End-to-end ingestion and retrieval over the in-memory backend.

mod common;

use std::sync::Arc;

use rstest::rstest;

use common::{amoxicillin, ibuprofen, paracetamol, FailingEmbedder, FakeEmbedder};
use medquery::ingest::IngestionPipeline;
use medquery::retrieval::{RetrievalEngine, SearchService, INSUFFICIENT_CONTEXT};
use medquery::store::{DocumentStore, InMemoryDocumentStore};
use medquery::types::{AppError, SearchType};
use medquery::utils::{ChunkingConfig, IngestConfig, RetrievalConfig};

fn small_batches() -> IngestConfig {
    IngestConfig {
        batch_size: 2,
        max_concurrent_batches: 2,
        verify_sample: 5,
    }
}

async fn ingested_store() -> (Arc<InMemoryDocumentStore>, Arc<FakeEmbedder>) {
    let store = Arc::new(InMemoryDocumentStore::new());
    let embedder = Arc::new(FakeEmbedder::new());
    let pipeline = IngestionPipeline::new(
        embedder.clone(),
        store.clone(),
        ChunkingConfig::default(),
        small_batches(),
    );
    let report = pipeline
        .ingest(vec![paracetamol(), ibuprofen(), amoxicillin()])
        .await
        .unwrap();
    assert_eq!(report.records_total, 3);
    assert_eq!(report.records_failed, 0);
    assert_eq!(report.chunks_written, 3);
    assert!(report.verified_ok > 0);
    (store, embedder)
}

fn engine(
    embedder: Arc<FakeEmbedder>,
    store: Arc<InMemoryDocumentStore>,
) -> RetrievalEngine {
    RetrievalEngine::new(embedder, store, RetrievalConfig::default())
}

#[tokio::test]
async fn paracetamol_question_retrieves_paracetamol_first() {
    let (store, embedder) = ingested_store().await;
    let engine = engine(embedder, store);

    let result = engine
        .retrieve("What is Paracetamol used for, and does it help with fever?", None)
        .await
        .unwrap();

    assert!(!result.is_insufficient());
    assert!(result.sources[0].title.contains("Paracetamol"));
    assert!(result.context.starts_with("[1]"));
    assert!(result.context.contains("Paracetamol"));
}

#[test]
fn fixture_embedder_ranks_name_overlap_above_unrelated_text() {
    let embedder = FakeEmbedder::new();
    // Vectors are L2-normalized, so the dot product is the cosine.
    let cos = |a: &[f32], b: &[f32]| a.iter().zip(b).map(|(x, y)| x * y).sum::<f32>();

    let query = embedder.embed_text("What is Paracetamol used for, and does it help with fever?");
    let para = embedder.embed_text("Paracetamol. Aniline analgesic. Pain relief. fever, headache, mild pain");
    let amox = embedder.embed_text("Amoxicillin. Penicillin. Antibiotic. bacterial infections, throat infection");

    assert!(cos(&query, &para) > cos(&query, &amox));
}

#[tokio::test]
async fn sources_are_ordered_and_limited() {
    let (store, embedder) = ingested_store().await;
    let engine = engine(embedder, store);

    let result = engine.retrieve("pain relief medicine", Some(2)).await.unwrap();
    assert!(result.sources.len() <= 2);
    for pair in result.sources.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
}

#[tokio::test]
async fn chunks_of_one_record_collapse_to_one_source() {
    let store = Arc::new(InMemoryDocumentStore::new());
    let embedder = Arc::new(FakeEmbedder::new());

    // Two chunks of the same record, plus one other record.
    let chunk = |id: &str, medicine: &str, text: &str| medquery::IndexedDocument {
        id: id.to_string(),
        title: medicine.to_string(),
        chunk: text.to_string(),
        url: None,
        meta: serde_json::json!({"medicine_id": medicine}),
        vector: embedder.embed_text(text),
    };
    store
        .upsert_batch(vec![
            chunk("med_1_0", "Paracetamol", "paracetamol treats fever and pain"),
            chunk("med_1_1", "Paracetamol", "paracetamol dosage and fever guidance"),
            chunk("med_2_0", "Ibuprofen", "ibuprofen reduces inflammation"),
        ])
        .await
        .unwrap();

    let engine = engine(embedder, store);
    let result = engine.retrieve("paracetamol fever", Some(3)).await.unwrap();

    let paracetamol_sources = result
        .sources
        .iter()
        .filter(|s| s.title == "Paracetamol")
        .count();
    assert_eq!(paracetamol_sources, 1);
}

#[tokio::test]
async fn reingesting_same_records_does_not_duplicate() {
    let store = Arc::new(InMemoryDocumentStore::new());
    let embedder = Arc::new(FakeEmbedder::new());
    let pipeline = IngestionPipeline::new(
        embedder.clone(),
        store.clone(),
        ChunkingConfig::default(),
        small_batches(),
    );

    pipeline.ingest(vec![paracetamol(), ibuprofen()]).await.unwrap();
    let first = store.stats().await.unwrap().document_count;
    pipeline.ingest(vec![paracetamol(), ibuprofen()]).await.unwrap();
    let second = store.stats().await.unwrap().document_count;

    assert_eq!(first, second);
}

#[tokio::test]
async fn max_records_caps_the_run() {
    let store = Arc::new(InMemoryDocumentStore::new());
    let embedder = Arc::new(FakeEmbedder::new());
    let pipeline = IngestionPipeline::new(
        embedder,
        store.clone(),
        ChunkingConfig::default(),
        small_batches(),
    )
    .with_max_records(1);

    let report = pipeline
        .ingest(vec![paracetamol(), ibuprofen(), amoxicillin()])
        .await
        .unwrap();
    assert_eq!(report.records_total, 1);
    assert_eq!(store.stats().await.unwrap().document_count, 1);
}

#[tokio::test]
async fn pipeline_survives_degenerate_chunking_config() {
    let store = Arc::new(InMemoryDocumentStore::new());
    let embedder = Arc::new(FakeEmbedder::new());
    // Overlap wider than the window must clamp, not panic.
    let pipeline = IngestionPipeline::new(
        embedder,
        store.clone(),
        ChunkingConfig {
            chunk_size: 10,
            chunk_overlap: 15,
        },
        small_batches(),
    );

    let report = pipeline.ingest(vec![paracetamol()]).await.unwrap();
    assert_eq!(report.records_failed, 0);
    assert!(report.chunks_written >= 1);
    assert!(store.stats().await.unwrap().document_count >= 1);
}

#[tokio::test]
async fn malformed_records_are_skipped_not_fatal() {
    let store = Arc::new(InMemoryDocumentStore::new());
    let embedder = Arc::new(FakeEmbedder::new());
    let pipeline = IngestionPipeline::new(
        embedder,
        store.clone(),
        ChunkingConfig::default(),
        small_batches(),
    );

    let mut nameless = paracetamol();
    nameless.name = "NA".into();
    let report = pipeline
        .ingest(vec![nameless, ibuprofen()])
        .await
        .unwrap();
    assert_eq!(report.records_failed, 1);
    assert_eq!(report.chunks_written, 1);
}

#[rstest]
#[case("")]
#[case("   ")]
#[case("\n\t")]
#[tokio::test]
async fn blank_queries_are_rejected(#[case] query: &str) {
    let (store, embedder) = ingested_store().await;
    let engine = engine(embedder, store);
    let err = engine.retrieve(query, None).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidQuery(_)));
}

#[tokio::test]
async fn nonsense_query_yields_a_result_not_an_error() {
    let (store, embedder) = ingested_store().await;
    let engine = engine(embedder, store);
    let result = engine.retrieve("xq zzv qwkjhd plomtrix", None).await.unwrap();
    // With no matching tokens anywhere this may come back empty or with
    // weak hits; either way it is a normal outcome.
    if result.is_insufficient() {
        assert_eq!(result.context, INSUFFICIENT_CONTEXT);
    }
}

#[tokio::test]
async fn empty_index_is_insufficient_not_an_error() {
    let store = Arc::new(InMemoryDocumentStore::new());
    let embedder = Arc::new(FakeEmbedder::new());
    let engine = engine(embedder, store);
    let result = engine.retrieve("What is Paracetamol?", None).await.unwrap();
    assert!(result.is_insufficient());
    assert_eq!(result.context, INSUFFICIENT_CONTEXT);
}

#[tokio::test]
async fn score_floor_discards_weak_semantic_hits() {
    let (store, embedder) = ingested_store().await;
    let config = RetrievalConfig {
        score_floor: 0.99,
        text_fallback: false,
        ..RetrievalConfig::default()
    };
    let engine = RetrievalEngine::new(embedder, store, config);

    // Bag-of-words cosine never gets near 0.99, so every hit is dropped.
    let result = engine
        .retrieve("What is Paracetamol used for?", None)
        .await
        .unwrap();
    assert!(result.is_insufficient());
    assert_eq!(result.context, INSUFFICIENT_CONTEXT);
}

#[tokio::test]
async fn score_floor_miss_degrades_to_text_search() {
    let (store, embedder) = ingested_store().await;
    let config = RetrievalConfig {
        score_floor: 0.99,
        ..RetrievalConfig::default()
    };
    let engine = RetrievalEngine::new(embedder, store, config);

    let result = engine.retrieve("Paracetamol fever", None).await.unwrap();
    assert!(!result.is_insufficient());
    assert!(result.sources[0].title.contains("Paracetamol"));
}

#[tokio::test]
async fn embedding_outage_degrades_to_text_search() {
    let (store, embedder) = ingested_store().await;
    drop(embedder);
    let engine = RetrievalEngine::new(
        Arc::new(FailingEmbedder),
        store,
        RetrievalConfig::default(),
    );

    let result = engine.retrieve("Paracetamol fever", None).await.unwrap();
    assert!(!result.is_insufficient());
    assert!(result.sources[0].title.contains("Paracetamol"));
}

#[tokio::test]
async fn embedding_outage_propagates_when_fallback_disabled() {
    let (store, _) = ingested_store().await;
    let config = RetrievalConfig {
        text_fallback: false,
        ..RetrievalConfig::default()
    };
    let engine = RetrievalEngine::new(Arc::new(FailingEmbedder), store, config);

    let err = engine.retrieve("Paracetamol fever", None).await.unwrap_err();
    assert!(matches!(err, AppError::Provider(_)));
}

#[rstest]
#[case(SearchType::Semantic)]
#[case(SearchType::Text)]
#[tokio::test]
async fn search_service_finds_documents(#[case] search_type: SearchType) {
    let (store, embedder) = ingested_store().await;
    let service = SearchService::new(embedder, store, RetrievalConfig::default());

    let response = service
        .search("paracetamol fever", Some(5), search_type)
        .await
        .unwrap();
    assert!(response.total_hits > 0);
    assert_eq!(response.query, "paracetamol fever");
    assert!(response
        .documents
        .iter()
        .any(|d| d.title.contains("Paracetamol")));
}

#[tokio::test]
async fn search_service_admin_surface() {
    let (store, embedder) = ingested_store().await;
    let service = SearchService::new(embedder, store, RetrievalConfig::default());

    assert_eq!(service.stats().await.unwrap().document_count, 3);
    service.delete_index().await.unwrap();
    assert_eq!(service.stats().await.unwrap().document_count, 0);
}
