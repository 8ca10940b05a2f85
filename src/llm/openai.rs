//! Chat completion client for OpenAI and Azure OpenAI.
//!
//! A single generic implementation covers both vendors; the difference is
//! entirely in the `async-openai` config type (endpoint shape, auth header,
//! deployment routing), so [`CompletionClient`] is parameterized over it.

use async_openai::{
    config::{AzureConfig, Config, OpenAIConfig},
    types::chat::{
        ChatCompletionMessageToolCalls, ChatCompletionRequestAssistantMessage,
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
        ChatCompletionRequestUserMessage, ChatCompletionTool, ChatCompletionToolChoiceOption,
        ChatCompletionTools, CreateChatCompletionRequestArgs, FunctionObject, ToolChoiceOptions,
    },
    Client,
};
use async_trait::async_trait;
use futures::StreamExt;

use crate::llm::client::{ChatClient, LlmResponse, TokenStream};
use crate::types::{AppError, ChatMessage, MessageRole, Result, ToolCall, ToolDefinition};
use crate::utils::GenerationConfig;

/// Chat completion client over any `async-openai` vendor config.
pub struct CompletionClient<C: Config> {
    client: Client<C>,
    model: String,
    generation: GenerationConfig,
}

/// OpenAI chat client.
pub type OpenAiChatClient = CompletionClient<OpenAIConfig>;

/// Azure OpenAI chat client.
pub type AzureChatClient = CompletionClient<AzureConfig>;

impl OpenAiChatClient {
    /// Build a client against the OpenAI API (or a compatible endpoint).
    pub fn new(api_key: &str, api_base: &str, model: &str, generation: GenerationConfig) -> Self {
        let config = OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(api_base);

        Self {
            client: Client::with_config(config),
            model: model.to_string(),
            generation,
        }
    }
}

impl AzureChatClient {
    /// Build a client against an Azure OpenAI chat deployment.
    pub fn new(
        endpoint: &str,
        api_key: &str,
        api_version: &str,
        deployment: &str,
        generation: GenerationConfig,
    ) -> Self {
        let config = AzureConfig::new()
            .with_api_base(endpoint)
            .with_api_key(api_key)
            .with_api_version(api_version)
            .with_deployment_id(deployment);

        Self {
            client: Client::with_config(config),
            // Azure routes by deployment; the model field is informational.
            model: deployment.to_string(),
            generation,
        }
    }
}

fn to_request_messages(messages: &[ChatMessage]) -> Vec<ChatCompletionRequestMessage> {
    messages
        .iter()
        .map(|message| match message.role {
            MessageRole::System => ChatCompletionRequestMessage::System(
                ChatCompletionRequestSystemMessage::from(message.content.clone()),
            ),
            MessageRole::User => ChatCompletionRequestMessage::User(
                ChatCompletionRequestUserMessage::from(message.content.clone()),
            ),
            MessageRole::Assistant => ChatCompletionRequestMessage::Assistant(
                ChatCompletionRequestAssistantMessage::from(message.content.clone()),
            ),
        })
        .collect()
}

fn to_vendor_tools(tools: &[ToolDefinition]) -> Vec<ChatCompletionTools> {
    tools
        .iter()
        .map(|tool| {
            ChatCompletionTools::Function(ChatCompletionTool {
                function: FunctionObject {
                    name: tool.name.clone(),
                    description: Some(tool.description.clone()),
                    parameters: Some(tool.parameters.clone()),
                    strict: None,
                },
            })
        })
        .collect()
}

impl<C: Config + Send + Sync> CompletionClient<C> {
    fn base_request(&self, messages: &[ChatMessage]) -> CreateChatCompletionRequestArgs {
        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(&self.model)
            .messages(to_request_messages(messages))
            .max_completion_tokens(self.generation.max_tokens)
            .temperature(self.generation.temperature);
        args
    }
}

#[async_trait]
impl<C: Config + Send + Sync> ChatClient for CompletionClient<C> {
    async fn generate(&self, messages: &[ChatMessage]) -> Result<String> {
        let request = self
            .base_request(messages)
            .build()
            .map_err(|e| AppError::Provider(format!("Failed to build request: {}", e)))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| AppError::Provider(format!("Chat completion error: {}", e)))?;

        response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| AppError::Provider("Empty completion response".to_string()))
    }

    async fn generate_with_tools(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<LlmResponse> {
        let request = self
            .base_request(messages)
            .tools(to_vendor_tools(tools))
            .tool_choice(ChatCompletionToolChoiceOption::Mode(ToolChoiceOptions::Auto))
            .build()
            .map_err(|e| AppError::Provider(format!("Failed to build request: {}", e)))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| AppError::Provider(format!("Chat completion error: {}", e)))?;

        let choice = response
            .choices
            .first()
            .ok_or_else(|| AppError::Provider("Empty completion response".to_string()))?;

        let content = choice.message.content.clone().unwrap_or_default();
        let finish_reason = choice
            .finish_reason
            .as_ref()
            .map(|r| format!("{:?}", r).to_lowercase())
            .unwrap_or_else(|| "unknown".to_string());

        let tool_calls = choice
            .message
            .tool_calls
            .as_deref()
            .unwrap_or_default()
            .iter()
            .filter_map(|call| match call {
                ChatCompletionMessageToolCalls::Function(call) => Some(ToolCall {
                    id: call.id.clone(),
                    name: call.function.name.clone(),
                    arguments: serde_json::from_str(&call.function.arguments)
                        .unwrap_or(serde_json::json!({})),
                }),
                _ => None,
            })
            .collect();

        Ok(LlmResponse {
            content,
            tool_calls,
            finish_reason,
        })
    }

    async fn stream(&self, messages: &[ChatMessage]) -> Result<TokenStream> {
        let request = self
            .base_request(messages)
            .build()
            .map_err(|e| AppError::Provider(format!("Failed to build request: {}", e)))?;

        let mut stream = self
            .client
            .chat()
            .create_stream(request)
            .await
            .map_err(|e| AppError::Provider(format!("Chat completion error: {}", e)))?;

        let token_stream = async_stream::stream! {
            while let Some(result) = stream.next().await {
                match result {
                    Ok(response) => {
                        for choice in response.choices {
                            if let Some(content) = choice.delta.content {
                                yield Ok(content);
                            }
                        }
                    }
                    Err(e) => {
                        yield Err(AppError::Provider(format!("Stream error: {}", e)));
                    }
                }
            }
        };

        Ok(Box::new(Box::pin(token_stream)))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_mapping_preserves_roles_and_order() {
        let messages = vec![
            ChatMessage::system("you are helpful"),
            ChatMessage::user("hello"),
            ChatMessage::assistant("hi there"),
            ChatMessage::user("follow-up"),
        ];
        let mapped = to_request_messages(&messages);
        assert_eq!(mapped.len(), 4);
        assert!(matches!(mapped[0], ChatCompletionRequestMessage::System(_)));
        assert!(matches!(mapped[1], ChatCompletionRequestMessage::User(_)));
        assert!(matches!(
            mapped[2],
            ChatCompletionRequestMessage::Assistant(_)
        ));
        assert!(matches!(mapped[3], ChatCompletionRequestMessage::User(_)));
    }

    #[test]
    fn test_tool_definitions_map_to_function_tools() {
        let tools = vec![ToolDefinition {
            name: "search_medicines".into(),
            description: "Search the medicine index".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {"query": {"type": "string"}},
                "required": ["query"],
            }),
        }];
        let mapped = to_vendor_tools(&tools);
        assert_eq!(mapped.len(), 1);
        let ChatCompletionTools::Function(tool) = &mapped[0] else {
            panic!("expected a function tool");
        };
        assert_eq!(tool.function.name, "search_medicines");
        assert_eq!(
            tool.function.description.as_deref(),
            Some("Search the medicine index")
        );
    }

    #[test]
    fn test_direct_answer_detection() {
        let direct = LlmResponse {
            content: "answer".into(),
            tool_calls: vec![],
            finish_reason: "stop".into(),
        };
        assert!(direct.is_direct_answer());

        let tooled = LlmResponse {
            content: String::new(),
            tool_calls: vec![ToolCall {
                id: "call_1".into(),
                name: "search".into(),
                arguments: serde_json::json!({"q": "x"}),
            }],
            finish_reason: "tool_calls".into(),
        };
        assert!(!tooled.is_direct_answer());
    }
}
