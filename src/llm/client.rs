//! Chat provider abstraction.
//!
//! Both supported vendors (OpenAI, Azure OpenAI) sit behind [`ChatClient`],
//! so the composer and router never know which one is configured.

use async_trait::async_trait;

use crate::types::{ChatMessage, Result, ToolCall, ToolDefinition};

/// Boxed token stream produced by a streaming completion.
pub type TokenStream = Box<dyn futures::Stream<Item = Result<String>> + Send + Unpin>;

/// Unified chat completion interface over the configured vendor.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Generate a completion from a full message list.
    async fn generate(&self, messages: &[ChatMessage]) -> Result<String>;

    /// Generate with tool calling enabled. The model may answer directly
    /// or request tool invocations; both are captured in [`LlmResponse`].
    async fn generate_with_tools(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<LlmResponse>;

    /// Stream a completion as text deltas.
    async fn stream(&self, messages: &[ChatMessage]) -> Result<TokenStream>;

    /// The model or deployment name requests are sent to.
    fn model_name(&self) -> &str;
}

/// Response from a tool-enabled generation request.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    /// Text content, empty when the model only requested tools.
    pub content: String,
    /// Tool calls requested by the model.
    pub tool_calls: Vec<ToolCall>,
    /// Why generation stopped ("stop", "tool_calls", "length").
    pub finish_reason: String,
}

impl LlmResponse {
    /// True when the model answered directly without requesting a tool.
    pub fn is_direct_answer(&self) -> bool {
        self.tool_calls.is_empty()
    }
}
