//! Provider router.
//!
//! Selects the chat and embedding clients for the configured vendor at
//! construction time and exposes one surface to the rest of the crate.
//! Transient transport failures are retried once with a short backoff;
//! everything else surfaces immediately.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::llm::client::{ChatClient, LlmResponse, TokenStream};
use crate::llm::embeddings::{EmbeddingClient, HttpEmbeddingClient};
use crate::llm::openai::{AzureChatClient, OpenAiChatClient};
use crate::types::{AppError, ChatMessage, Result, ToolDefinition};
use crate::utils::{CoreConfig, VendorConfig};

const RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// Routes chat and embedding calls to the configured vendor.
pub struct ProviderRouter {
    chat: Box<dyn ChatClient>,
    embedder: Arc<dyn EmbeddingClient>,
}

impl ProviderRouter {
    /// Build the router for the vendor selected in `config`.
    ///
    /// Construction is fail-fast: credentials were validated when the
    /// config was built, so this cannot discover missing ones later.
    pub fn from_config(config: &CoreConfig) -> Result<Self> {
        config.validate()?;

        let chat: Box<dyn ChatClient> = match &config.vendor {
            VendorConfig::OpenAi {
                api_key,
                api_base,
                chat_model,
            } => Box::new(OpenAiChatClient::new(
                api_key,
                api_base,
                chat_model,
                config.generation,
            )),
            VendorConfig::Azure {
                endpoint,
                api_key,
                api_version,
                chat_deployment,
                ..
            } => Box::new(AzureChatClient::new(
                endpoint,
                api_key,
                api_version,
                chat_deployment,
                config.generation,
            )),
        };

        let embedder = Arc::new(HttpEmbeddingClient::from_config(
            &config.vendor,
            config.embedding.clone(),
        ));

        info!(
            vendor = config.vendor.name(),
            chat_model = chat.model_name(),
            embedding_model = %config.embedding.model,
            "provider router initialized"
        );

        Ok(Self { chat, embedder })
    }

    /// Assemble a router from explicit clients. Used by tests and by
    /// embedders that bring their own provider implementations.
    pub fn from_parts(chat: Box<dyn ChatClient>, embedder: Arc<dyn EmbeddingClient>) -> Self {
        Self { chat, embedder }
    }

    /// The embedding client, shared with the ingestion pipeline and
    /// retrieval engine.
    pub fn embedder(&self) -> Arc<dyn EmbeddingClient> {
        Arc::clone(&self.embedder)
    }

    /// Chat model or deployment name.
    pub fn model_name(&self) -> &str {
        self.chat.model_name()
    }

    /// Non-streaming chat completion, with the retry policy applied.
    pub async fn chat(&self, messages: &[ChatMessage]) -> Result<String> {
        match self.chat.generate(messages).await {
            Err(e) if is_transient(&e) => {
                warn!(error = %e, "transient chat failure, retrying once");
                tokio::time::sleep(RETRY_BACKOFF).await;
                self.chat.generate(messages).await
            }
            other => other,
        }
    }

    /// Tool-enabled chat completion, with the retry policy applied.
    pub async fn chat_with_tools(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<LlmResponse> {
        match self.chat.generate_with_tools(messages, tools).await {
            Err(e) if is_transient(&e) => {
                warn!(error = %e, "transient chat failure, retrying once");
                tokio::time::sleep(RETRY_BACKOFF).await;
                self.chat.generate_with_tools(messages, tools).await
            }
            other => other,
        }
    }

    /// Streaming chat completion. Only stream establishment is retried;
    /// once tokens flow, a failure terminates the stream.
    pub async fn stream(&self, messages: &[ChatMessage]) -> Result<TokenStream> {
        match self.chat.stream(messages).await {
            Err(e) if is_transient(&e) => {
                warn!(error = %e, "transient chat failure, retrying once");
                tokio::time::sleep(RETRY_BACKOFF).await;
                self.chat.stream(messages).await
            }
            other => other,
        }
    }

    /// Embed a single text.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embedder.embed(text).await
    }

    /// Embed a batch of texts, order-preserving.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.embedder.embed_batch(texts).await
    }
}

/// Transport-level failures worth one retry. Auth and quota errors come
/// back as HTTP statuses and are never retried.
fn is_transient(error: &AppError) -> bool {
    match error {
        AppError::Provider(message) => {
            let message = message.to_lowercase();
            message.contains("connection")
                || message.contains("timed out")
                || message.contains("timeout")
                || message.contains("error sending request")
        }
        _ => false,
    }
}
