//! LLM provider clients: chat completions, embeddings, and the router
//! that binds them to the configured vendor.

pub mod client;
pub mod embeddings;
pub mod openai;
pub mod router;

pub use client::{ChatClient, LlmResponse, TokenStream};
pub use embeddings::{EmbeddingClient, HttpEmbeddingClient};
pub use openai::{AzureChatClient, CompletionClient, OpenAiChatClient};
pub use router::ProviderRouter;
