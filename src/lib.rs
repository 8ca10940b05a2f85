//! MedQuery core: retrieval-augmented generation for medicine knowledge.
//!
//! This crate is the engine behind a medicine information assistant: it
//! embeds queries, searches a chunked medicine corpus, assembles grounded
//! context with ranked source citations, and composes answers in three
//! chat modes (plain ask, grounded RAG, and a two-round tool-calling
//! agent) with optional streaming.
//!
//! # Architecture
//!
//! ```text
//! ChatRequest ──► AnswerComposer ──► ProviderRouter ──► OpenAI / Azure
//!                      │
//!                      ▼
//!               RetrievalEngine ──► EmbeddingClient
//!                      │
//!                      ▼
//!                DocumentStore ◄── IngestionPipeline ◄── MedicineRecord
//! ```
//!
//! The outer service owns HTTP, auth, and persistence of conversations;
//! this crate owns everything between a parsed request and a composed
//! answer.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use medquery::chat::AnswerComposer;
//! use medquery::llm::ProviderRouter;
//! use medquery::retrieval::RetrievalEngine;
//! use medquery::store::InMemoryDocumentStore;
//! use medquery::types::ChatMode;
//! use medquery::utils::CoreConfig;
//!
//! let config = CoreConfig::from_env()?;
//! let router = Arc::new(ProviderRouter::from_config(&config)?);
//! let store = Arc::new(InMemoryDocumentStore::new());
//! let engine = RetrievalEngine::new(router.embedder(), store, config.retrieval.clone());
//! let composer = AnswerComposer::new(router);
//!
//! let retrieval = engine.retrieve("What is paracetamol used for?", None).await?;
//! let answer = composer
//!     .compose(ChatMode::Rag, "What is paracetamol used for?", &[], Some(&retrieval))
//!     .await?;
//! ```

#![warn(missing_docs)]

pub mod chat;
pub mod ingest;
pub mod llm;
pub mod retrieval;
pub mod store;
pub mod types;
pub mod utils;

pub use chat::{AnswerComposer, ToolDispatcher, INSUFFICIENT_ANSWER, MEDICAL_DISCLAIMER};
pub use ingest::{IngestReport, IngestionPipeline, MedicineRecord};
pub use llm::{ChatClient, EmbeddingClient, ProviderRouter};
pub use retrieval::{RetrievalEngine, RetrievalResult, SearchService};
pub use store::{DocumentStore, InMemoryDocumentStore, IndexedDocument};
pub use types::{AppError, ChatMode, ChatRequest, ChatResponse, Result, Source, StreamFrame};
pub use utils::CoreConfig;
