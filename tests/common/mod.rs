//! Shared test fixtures: a deterministic embedder and corpus builders.

#![allow(dead_code)]

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use async_trait::async_trait;

use medquery::llm::EmbeddingClient;
use medquery::types::{AppError, Result};
use medquery::MedicineRecord;

/// Deterministic bag-of-words embedder: each content token increments a
/// hashed dimension, then the vector is L2-normalized. Cosine similarity
/// then tracks token overlap, which is enough to exercise retrieval end
/// to end without a provider. Stop-words are dropped and the dimension
/// count is kept high so hash collisions cannot outscore a real overlap.
pub struct FakeEmbedder {
    dims: usize,
}

const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "does", "do", "for", "from", "help", "in",
    "is", "it", "of", "on", "or", "the", "to", "used", "what", "which", "with",
];

impl FakeEmbedder {
    pub fn new() -> Self {
        Self { dims: 512 }
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dims];
        for token in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| t.len() > 1 && !STOP_WORDS.contains(t))
        {
            let mut hasher = DefaultHasher::new();
            token.hash(&mut hasher);
            vector[(hasher.finish() as usize) % self.dims] += 1.0;
        }
        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl EmbeddingClient for FakeEmbedder {
    fn dimensions(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(AppError::InvalidInput("empty text".into()));
        }
        Ok(self.embed_text(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }
}

/// Embedder that always fails like an unreachable provider.
pub struct FailingEmbedder;

#[async_trait]
impl EmbeddingClient for FailingEmbedder {
    fn dimensions(&self) -> usize {
        512
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(AppError::Provider("embedding endpoint unreachable".into()))
    }

    async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Err(AppError::Provider("embedding endpoint unreachable".into()))
    }
}

pub fn paracetamol() -> MedicineRecord {
    MedicineRecord {
        id: "1".into(),
        name: "Paracetamol".into(),
        chemical_class: Some("Aniline analgesic".into()),
        therapeutic_class: Some("Pain relief".into()),
        action_class: Some("Analgesic and antipyretic".into()),
        uses: vec!["fever".into(), "headache".into(), "mild pain".into()],
        side_effects: vec!["nausea".into(), "rash".into()],
        substitutes: vec!["Dolo 650".into()],
        habit_forming: Some("No".into()),
        manufacturer: Some("Acme Pharma".into()),
        dosage: Some("500mg".into()),
    }
}

pub fn ibuprofen() -> MedicineRecord {
    MedicineRecord {
        id: "2".into(),
        name: "Ibuprofen".into(),
        chemical_class: Some("Propionic acid derivative".into()),
        therapeutic_class: Some("Pain relief".into()),
        action_class: Some("NSAID".into()),
        uses: vec!["inflammation".into(), "joint pain".into()],
        side_effects: vec!["heartburn".into(), "dizziness".into()],
        substitutes: vec![],
        habit_forming: Some("No".into()),
        manufacturer: None,
        dosage: Some("200mg".into()),
    }
}

pub fn amoxicillin() -> MedicineRecord {
    MedicineRecord {
        id: "3".into(),
        name: "Amoxicillin".into(),
        chemical_class: Some("Penicillin".into()),
        therapeutic_class: Some("Antibiotic".into()),
        action_class: Some("Cell wall synthesis inhibitor".into()),
        uses: vec!["bacterial infections".into(), "throat infection".into()],
        side_effects: vec!["diarrhea".into()],
        substitutes: vec![],
        habit_forming: Some("No".into()),
        manufacturer: None,
        dosage: None,
    }
}
