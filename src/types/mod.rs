//! Core types shared across the MedQuery engine.
//!
//! This module defines the request/response contract consumed by the outer
//! HTTP layer, the retrieval data model (sources, indexed documents), the
//! streaming frame protocol, and the crate-wide error taxonomy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============= Chat Request/Response Types =============

/// Chat operating mode.
///
/// A closed set: every mode must be handled explicitly by the answer
/// composer, enforced by exhaustive matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatMode {
    /// General question answering without retrieval.
    Ask,
    /// Retrieval-augmented generation grounded in the medicine corpus.
    Rag,
    /// Tool-using agent mode (two-round tool-call protocol).
    Agent,
}

impl std::fmt::Display for ChatMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Ask => "ask",
            Self::Rag => "rag",
            Self::Agent => "agent",
        };
        write!(f, "{}", name)
    }
}

/// Role of a message in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// System instruction.
    System,
    /// End-user message.
    User,
    /// Model-generated message.
    Assistant,
}

/// A single turn in a conversation.
///
/// Conversation history is supplied by the caller per request and never
/// persisted by this crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Who produced the message.
    pub role: MessageRole,
    /// Message text.
    pub content: String,
    /// Optional client-supplied timestamp.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl ChatMessage {
    /// Build a user message without a timestamp.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
            timestamp: None,
        }
    }

    /// Build an assistant message without a timestamp.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
            timestamp: None,
        }
    }

    /// Build a system message without a timestamp.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
            timestamp: None,
        }
    }
}

/// Chat request consumed from the outer HTTP layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// The user's message.
    pub message: String,
    /// Requested chat mode.
    pub mode: ChatMode,
    /// Prior conversation turns, oldest first.
    #[serde(default)]
    pub conversation_history: Vec<ChatMessage>,
    /// Whether the caller wants a streaming response.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
}

/// Non-streaming chat response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    /// The generated answer text.
    pub response: String,
    /// The mode that produced this response.
    pub mode: ChatMode,
    /// Source citations (RAG mode only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<Source>>,
    /// Tool invocations performed during the request (agent mode only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<AgentAction>>,
}

// ============= Retrieval Types =============

/// A cited source backing a grounded answer.
///
/// A read-only view over an indexed chunk, derived at query time.
/// Lifetime is one request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    /// Chunk document id.
    pub id: String,
    /// Medicine title.
    pub title: String,
    /// Display-safe content excerpt.
    pub content: String,
    /// Relevance score as reported by the document store.
    pub score: f32,
    /// Metadata bag (chemical class, uses, side effects, ...).
    pub metadata: serde_json::Value,
    /// Optional link to the original record.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Result of the retrieval-only search surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    /// Matching documents, ordered by descending score.
    pub documents: Vec<Source>,
    /// The query that was executed.
    pub query: String,
    /// Number of hits before truncation to `top_k`.
    pub total_hits: usize,
}

/// How the retrieval-only search surface should match documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SearchType {
    /// Dense vector similarity over embeddings.
    #[default]
    Semantic,
    /// Lexical full-text matching.
    Text,
}

// ============= Tool Types =============

/// Definition of a tool the model may request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name as exposed to the model.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// JSON Schema of the tool parameters.
    pub parameters: serde_json::Value,
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Provider-assigned call id.
    pub id: String,
    /// Name of the requested tool.
    pub name: String,
    /// Parsed call arguments.
    pub arguments: serde_json::Value,
}

/// Record of one executed tool invocation, returned to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentAction {
    /// Name of the tool that was invoked.
    pub action: String,
    /// Arguments the model supplied.
    pub parameters: serde_json::Value,
    /// Result returned by the external tool collaborator.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Error message if the invocation failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Whether the invocation succeeded.
    pub success: bool,
}

// ============= Streaming Frame Protocol =============

/// One frame of a streaming chat response.
///
/// Frames serialize to the exact wire shapes consumed by the outer layer:
/// `{"content": ...}`, `{"sources": [...]}`, `{"action": {...}}`,
/// `{"done": true}`, `{"error": ...}`. `Done` and `Error` are terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StreamFrame {
    /// Partial answer text.
    Content {
        /// The text delta.
        content: String,
    },
    /// Source citations, emitted once before content in RAG mode.
    Sources {
        /// The cited sources.
        sources: Vec<Source>,
    },
    /// Notice of an agent tool invocation.
    Action {
        /// The executed action.
        action: AgentAction,
    },
    /// Terminal success marker.
    Done {
        /// Always `true`.
        done: bool,
    },
    /// Terminal failure marker.
    Error {
        /// Error description.
        error: String,
    },
}

impl StreamFrame {
    /// Build a content frame.
    pub fn content(text: impl Into<String>) -> Self {
        Self::Content {
            content: text.into(),
        }
    }

    /// The terminal success frame.
    pub fn done() -> Self {
        Self::Done { done: true }
    }

    /// True for the terminal `done` and `error` frames.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error { .. })
    }
}

// ============= Error Types =============

/// Error taxonomy for the MedQuery core.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Malformed or empty input (query, record, or request field).
    /// Reported to the caller, never retried.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Empty or whitespace-only retrieval query.
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Embedding or chat vendor failure. Surfaced as a gateway error by
    /// the caller; transient transport failures are retried once before
    /// reaching this.
    #[error("Provider error: {0}")]
    Provider(String),

    /// The document store is unreachable. Surfaced as service-unavailable.
    #[error("Document store unavailable: {0}")]
    StoreUnavailable(String),

    /// Missing or inconsistent configuration, detected at startup.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Unexpected internal failure.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, AppError>;
