//! Answer composer.
//!
//! Turns a chat request plus optional retrieval output into a final
//! answer, in one of three modes: plain question answering, grounded RAG
//! with citations, or the two-round tool-calling agent. The composer owns
//! the answer policy: the insufficient-data short-circuit, the medical
//! disclaimer suffix, and the frame sequence of streaming responses.

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use tracing::{info, warn};

use crate::llm::ProviderRouter;
use crate::retrieval::RetrievalResult;
use crate::types::{
    AgentAction, AppError, ChatMessage, ChatMode, ChatResponse, Result, StreamFrame, ToolCall,
    ToolDefinition,
};

/// Disclaimer appended to every grounded medical answer. Policy, not
/// model output: the model never sees it and cannot omit it.
pub const MEDICAL_DISCLAIMER: &str = "\n\nIMPORTANT: This is not medical advice. Always consult \
     with qualified healthcare professionals for medical decisions.";

/// Canned answer when retrieval found nothing usable.
pub const INSUFFICIENT_ANSWER: &str =
    "Insufficient data in the provided context. Try rephrasing your question.";

const ASK_SYSTEM_PROMPT: &str = "You are MedQuery, a helpful medical information assistant. \
     Answer questions about medicines clearly and concisely. When a question goes beyond \
     general information, recommend consulting a qualified healthcare professional.";

const RAG_SYSTEM_PROMPT: &str = "You are MedQuery, a medical information assistant. Answer the \
     user's question using ONLY the numbered context entries below. Cite entries by their \
     rank, like [1]. If the context does not contain the answer, say that the provided \
     information is insufficient instead of guessing.";

const AGENT_SYSTEM_PROMPT: &str = "You are MedQuery, a medical information assistant with access \
     to tools. Use a tool when it helps answer the question, otherwise answer directly. After \
     a tool result is provided, give the user a final answer.";

/// Boxed frame stream returned by [`AnswerComposer::compose_stream`].
pub type FrameStream = Box<dyn futures::Stream<Item = StreamFrame> + Send + Unpin>;

/// Executes tool calls on behalf of the agent. Implemented by the
/// external tool collaborator; this crate never runs tools itself.
#[async_trait]
pub trait ToolDispatcher: Send + Sync {
    /// Execute one tool call and return its JSON result.
    async fn dispatch(&self, call: &ToolCall) -> Result<serde_json::Value>;
}

/// Composes final answers from chat requests and retrieval output.
pub struct AnswerComposer {
    router: Arc<ProviderRouter>,
    tools: Vec<ToolDefinition>,
    dispatcher: Option<Arc<dyn ToolDispatcher>>,
}

impl AnswerComposer {
    /// Build a composer without agent tooling.
    pub fn new(router: Arc<ProviderRouter>) -> Self {
        Self {
            router,
            tools: Vec::new(),
            dispatcher: None,
        }
    }

    /// Enable agent mode with the given tool definitions and dispatcher.
    pub fn with_tools(
        mut self,
        tools: Vec<ToolDefinition>,
        dispatcher: Arc<dyn ToolDispatcher>,
    ) -> Self {
        self.tools = tools;
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Compose a non-streaming answer.
    ///
    /// RAG mode requires `retrieval`; an insufficient retrieval result
    /// short-circuits to the canned answer without a provider call.
    pub async fn compose(
        &self,
        mode: ChatMode,
        query: &str,
        history: &[ChatMessage],
        retrieval: Option<&RetrievalResult>,
    ) -> Result<ChatResponse> {
        match mode {
            ChatMode::Ask => {
                let messages = build_messages(ASK_SYSTEM_PROMPT, history, query);
                let response = self.router.chat(&messages).await?;
                Ok(ChatResponse {
                    response,
                    mode,
                    sources: None,
                    tool_calls: None,
                })
            }
            ChatMode::Rag => {
                let retrieval = retrieval.ok_or_else(|| {
                    AppError::Internal("rag mode invoked without retrieval output".into())
                })?;
                if retrieval.is_insufficient() {
                    info!("retrieval insufficient, returning canned answer");
                    return Ok(ChatResponse {
                        response: INSUFFICIENT_ANSWER.to_string(),
                        mode,
                        sources: Some(Vec::new()),
                        tool_calls: None,
                    });
                }

                let messages =
                    build_messages(&rag_system_prompt(&retrieval.context), history, query);
                let answer = self.router.chat(&messages).await?;
                Ok(ChatResponse {
                    response: format!("{}{}", answer, MEDICAL_DISCLAIMER),
                    mode,
                    sources: Some(retrieval.sources.clone()),
                    tool_calls: None,
                })
            }
            ChatMode::Agent => self.compose_agent(query, history).await,
        }
    }

    /// Two-round agent protocol: round one may request a single tool
    /// call; round two always terminates in a direct answer because it
    /// runs without tools.
    async fn compose_agent(&self, query: &str, history: &[ChatMessage]) -> Result<ChatResponse> {
        let dispatcher = self.dispatcher.as_ref().ok_or_else(|| {
            AppError::Configuration("agent mode requires a tool dispatcher".into())
        })?;

        let mut messages = build_messages(AGENT_SYSTEM_PROMPT, history, query);
        let first = self.router.chat_with_tools(&messages, &self.tools).await?;

        if first.is_direct_answer() {
            return Ok(ChatResponse {
                response: first.content,
                mode: ChatMode::Agent,
                sources: None,
                tool_calls: None,
            });
        }

        // One tool call per round; extra requests are ignored.
        let call = &first.tool_calls[0];
        info!(tool = %call.name, call_id = %call.id, "dispatching agent tool call");
        let action = match dispatcher.dispatch(call).await {
            Ok(result) => AgentAction {
                action: call.name.clone(),
                parameters: call.arguments.clone(),
                result: Some(result),
                error: None,
                success: true,
            },
            Err(e) => {
                warn!(tool = %call.name, error = %e, "tool call failed");
                AgentAction {
                    action: call.name.clone(),
                    parameters: call.arguments.clone(),
                    result: None,
                    error: Some(e.to_string()),
                    success: false,
                }
            }
        };

        if !first.content.is_empty() {
            messages.push(ChatMessage::assistant(first.content.clone()));
        }
        messages.push(ChatMessage::user(tool_result_prompt(&action)));

        let response = self.router.chat(&messages).await?;
        Ok(ChatResponse {
            response,
            mode: ChatMode::Agent,
            sources: None,
            tool_calls: Some(vec![action]),
        })
    }

    /// Compose a streaming answer as a frame sequence.
    ///
    /// RAG emits `sources` once before content; agent emits an `action`
    /// frame per tool call; every stream ends with `done` or `error`.
    /// Dropping the stream stops production, including upstream token
    /// consumption.
    pub fn compose_stream(
        self: Arc<Self>,
        mode: ChatMode,
        query: &str,
        history: &[ChatMessage],
        retrieval: Option<RetrievalResult>,
    ) -> FrameStream {
        let composer = self;
        let query = query.to_string();
        let history = history.to_vec();

        let frames = async_stream::stream! {
            match mode {
                ChatMode::Ask => {
                    let messages = build_messages(ASK_SYSTEM_PROMPT, &history, &query);
                    for await frame in composer.stream_completion(messages) {
                        yield frame;
                    }
                }
                ChatMode::Rag => {
                    let Some(retrieval) = retrieval else {
                        yield StreamFrame::Error {
                            error: "rag mode invoked without retrieval output".into(),
                        };
                        return;
                    };
                    if retrieval.is_insufficient() {
                        yield StreamFrame::Sources { sources: Vec::new() };
                        yield StreamFrame::content(INSUFFICIENT_ANSWER);
                        yield StreamFrame::done();
                        return;
                    }

                    yield StreamFrame::Sources {
                        sources: retrieval.sources.clone(),
                    };
                    let messages =
                        build_messages(&rag_system_prompt(&retrieval.context), &history, &query);
                    for await frame in composer.clone().stream_completion_body(messages) {
                        let failed = matches!(frame, StreamFrame::Error { .. });
                        yield frame;
                        if failed {
                            return;
                        }
                    }
                    yield StreamFrame::content(MEDICAL_DISCLAIMER);
                    yield StreamFrame::done();
                }
                ChatMode::Agent => {
                    for await frame in composer.clone().stream_agent(query, history) {
                        yield frame;
                    }
                }
            }
        };
        Box::new(Box::pin(frames))
    }

    /// Stream one completion: content frames then a terminal frame.
    fn stream_completion(
        self: Arc<Self>,
        messages: Vec<ChatMessage>,
    ) -> impl futures::Stream<Item = StreamFrame> {
        async_stream::stream! {
            for await frame in self.clone().stream_completion_body(messages) {
                let failed = matches!(frame, StreamFrame::Error { .. });
                yield frame;
                if failed {
                    return;
                }
            }
            yield StreamFrame::done();
        }
    }

    /// Stream completion content without the terminal `done` frame.
    fn stream_completion_body(
        self: Arc<Self>,
        messages: Vec<ChatMessage>,
    ) -> impl futures::Stream<Item = StreamFrame> {
        let composer = self;
        async_stream::stream! {
            let mut tokens = match composer.router.stream(&messages).await {
                Ok(tokens) => tokens,
                Err(e) => {
                    yield StreamFrame::Error { error: e.to_string() };
                    return;
                }
            };
            while let Some(token) = tokens.next().await {
                match token {
                    Ok(delta) => yield StreamFrame::content(delta),
                    Err(e) => {
                        yield StreamFrame::Error { error: e.to_string() };
                        return;
                    }
                }
            }
        }
    }

    /// Streaming agent: round one runs buffered so the tool decision is
    /// complete before any frame is emitted; round two streams.
    fn stream_agent(
        self: Arc<Self>,
        query: String,
        history: Vec<ChatMessage>,
    ) -> impl futures::Stream<Item = StreamFrame> {
        async_stream::stream! {
            let Some(dispatcher) = self.dispatcher.clone() else {
                yield StreamFrame::Error {
                    error: "agent mode requires a tool dispatcher".into(),
                };
                return;
            };

            let mut messages = build_messages(AGENT_SYSTEM_PROMPT, &history, &query);
            let first = match self.router.chat_with_tools(&messages, &self.tools).await {
                Ok(first) => first,
                Err(e) => {
                    yield StreamFrame::Error { error: e.to_string() };
                    return;
                }
            };

            if first.is_direct_answer() {
                yield StreamFrame::content(first.content);
                yield StreamFrame::done();
                return;
            }

            let call = &first.tool_calls[0];
            let action = match dispatcher.dispatch(call).await {
                Ok(result) => AgentAction {
                    action: call.name.clone(),
                    parameters: call.arguments.clone(),
                    result: Some(result),
                    error: None,
                    success: true,
                },
                Err(e) => AgentAction {
                    action: call.name.clone(),
                    parameters: call.arguments.clone(),
                    result: None,
                    error: Some(e.to_string()),
                    success: false,
                },
            };
            yield StreamFrame::Action {
                action: action.clone(),
            };

            if !first.content.is_empty() {
                messages.push(ChatMessage::assistant(first.content.clone()));
            }
            messages.push(ChatMessage::user(tool_result_prompt(&action)));

            for await frame in self.stream_completion(messages) {
                yield frame;
            }
        }
    }
}

fn build_messages(system: &str, history: &[ChatMessage], query: &str) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::system(system));
    messages.extend(history.iter().cloned());
    messages.push(ChatMessage::user(query));
    messages
}

fn rag_system_prompt(context: &str) -> String {
    format!("{}\n\nContext:\n{}", RAG_SYSTEM_PROMPT, context)
}

fn tool_result_prompt(action: &AgentAction) -> String {
    match (&action.result, &action.error) {
        (Some(result), _) => format!(
            "Tool '{}' returned:\n{}\n\nUse this result to answer the original question.",
            action.action, result
        ),
        (None, Some(error)) => format!(
            "Tool '{}' failed with error: {}. Answer the original question as best you can \
             and mention that the tool was unavailable.",
            action.action, error
        ),
        (None, None) => format!(
            "Tool '{}' returned no result. Answer the original question as best you can.",
            action.action
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_assembly_order() {
        let history = vec![
            ChatMessage::user("earlier question"),
            ChatMessage::assistant("earlier answer"),
        ];
        let messages = build_messages(ASK_SYSTEM_PROMPT, &history, "current question");
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].content, ASK_SYSTEM_PROMPT);
        assert_eq!(messages[3].content, "current question");
    }

    #[test]
    fn test_rag_prompt_embeds_context() {
        let prompt = rag_system_prompt("[1] Paracetamol\nrelieves fever");
        assert!(prompt.contains("ONLY the numbered context"));
        assert!(prompt.ends_with("[1] Paracetamol\nrelieves fever"));
    }

    #[test]
    fn test_tool_result_prompt_variants() {
        let ok = AgentAction {
            action: "search_medicines".into(),
            parameters: serde_json::json!({"q": "aspirin"}),
            result: Some(serde_json::json!({"hits": 3})),
            error: None,
            success: true,
        };
        assert!(tool_result_prompt(&ok).contains("returned"));

        let failed = AgentAction {
            action: "search_medicines".into(),
            parameters: serde_json::json!({}),
            result: None,
            error: Some("connection refused".into()),
            success: false,
        };
        assert!(tool_result_prompt(&failed).contains("failed"));
    }
}
