//! OpenAI-compatible Provider Implementation
//!
//! Talks to any endpoint implementing the chat-completions API with function
//! calling (OpenAI, Azure-style gateways, vLLM, Ollama's `/v1`, ...).
//!
//! # Features
//!
//! - Async HTTP communication
//! - Conversation turns mapped onto chat messages, tool calls and tool results
//! - Two tools advertised: `search_reference` and `validate_draft`
//! - Failures classified as transient or permanent, never retried here
//!
//! # Examples
//!
//! ```no_run
//! use stixweave_llm::OpenAiProvider;
//!
//! let provider = OpenAiProvider::new("https://api.openai.com/v1", "gpt-4o-mini")
//!     .unwrap()
//!     .with_api_key("sk-...")
//!     .with_temperature(0.0);
//! ```

use crate::LlmError;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use stixweave_domain::{
    CapabilityError, ConversationState, ReasoningReply, ReasoningService, ToolCall, Turn,
};
use tracing::debug;

/// Default API base URL
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Default HTTP timeout (the extraction loop applies its own per-call timeout too)
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

pub use stixweave_domain::traits::{SEARCH_REFERENCE_TOOL, VALIDATE_DRAFT_TOOL};

const MAX_ERROR_BODY: usize = 512;

/// OpenAI-compatible chat-completions provider
pub struct OpenAiProvider {
    base_url: String,
    model: String,
    api_key: Option<String>,
    temperature: f32,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ChatToolCall>>,
}

#[derive(Deserialize)]
struct ChatToolCall {
    id: String,
    function: ChatFunction,
}

#[derive(Deserialize)]
struct ChatFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

impl OpenAiProvider {
    /// Create a new provider
    ///
    /// # Errors
    ///
    /// Returns `LlmError::Configuration` if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|e| LlmError::Configuration(format!("HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key: None,
            temperature: 0.0,
            client,
        })
    }

    /// Set the bearer token
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Set the sampling temperature
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Model name
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Request one completion for the conversation
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - the endpoint is unreachable or times out (transient)
    /// - the endpoint answers with a non-success status (classified by status)
    /// - the response cannot be decoded (permanent)
    pub async fn complete(
        &self,
        conversation: &ConversationState,
    ) -> Result<ReasoningReply, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": build_messages(conversation),
            "tools": tool_definitions(),
        });

        debug!("POST {} ({} turns)", url, conversation.len());

        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(classify_request_error)?;

        let status = response.status();
        if !status.is_success() {
            let mut text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            if text.len() > MAX_ERROR_BODY {
                let mut cut = MAX_ERROR_BODY;
                while !text.is_char_boundary(cut) {
                    cut -= 1;
                }
                text.truncate(cut);
            }
            return Err(LlmError::HttpStatus {
                status: status.as_u16(),
                body: text,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(format!("Failed to parse response: {}", e)))?;

        parse_reply(parsed)
    }
}

fn classify_request_error(e: reqwest::Error) -> LlmError {
    if e.is_timeout() {
        LlmError::Timeout(e.to_string())
    } else if e.is_decode() {
        LlmError::InvalidResponse(e.to_string())
    } else if e.is_builder() {
        LlmError::Configuration(e.to_string())
    } else {
        LlmError::Communication(format!("Request failed: {}", e))
    }
}

/// Map conversation turns onto chat messages
pub fn build_messages(conversation: &ConversationState) -> Vec<Value> {
    conversation
        .turns()
        .iter()
        .map(|turn| match turn {
            Turn::System { content } => json!({"role": "system", "content": content}),
            Turn::User { content } | Turn::Feedback { content } => {
                json!({"role": "user", "content": content})
            }
            Turn::Answer { content } => json!({"role": "assistant", "content": content}),
            Turn::Action { content, calls } => json!({
                "role": "assistant",
                "content": content,
                "tool_calls": calls.iter().map(|c| json!({
                    "id": c.id,
                    "type": "function",
                    "function": {"name": c.name, "arguments": c.arguments.to_string()},
                })).collect::<Vec<_>>(),
            }),
            Turn::Observation {
                call_id, content, ..
            } => json!({"role": "tool", "tool_call_id": call_id, "content": content}),
        })
        .collect()
}

/// Function definitions for the two tools the extraction loop executes
pub fn tool_definitions() -> Value {
    json!([
        {
            "type": "function",
            "function": {
                "name": SEARCH_REFERENCE_TOOL,
                "description": "Search the STIX 2.1 reference material for object types, required properties and relationship rules.",
                "parameters": {
                    "type": "object",
                    "properties": {"query": {"type": "string"}},
                    "required": ["query"]
                }
            }
        },
        {
            "type": "function",
            "function": {
                "name": VALIDATE_DRAFT_TOOL,
                "description": "Validate a draft list of STIX objects before giving the final answer.",
                "parameters": {
                    "type": "object",
                    "properties": {"objects": {"type": "array", "items": {"type": "object"}}},
                    "required": ["objects"]
                }
            }
        }
    ])
}

fn parse_reply(response: ChatResponse) -> Result<ReasoningReply, LlmError> {
    let message = response
        .choices
        .into_iter()
        .next()
        .map(|c| c.message)
        .ok_or_else(|| LlmError::InvalidResponse("response has no choices".to_string()))?;

    let tool_calls = message.tool_calls.unwrap_or_default();
    if !tool_calls.is_empty() {
        let calls = tool_calls
            .into_iter()
            .map(|c| ToolCall {
                id: c.id,
                name: c.function.name,
                // Unparseable arguments are passed through as a string; the loop
                // answers them with an error observation.
                arguments: serde_json::from_str(&c.function.arguments)
                    .unwrap_or(Value::String(c.function.arguments)),
            })
            .collect();
        return Ok(ReasoningReply::ToolCalls(calls));
    }

    message
        .content
        .map(ReasoningReply::Final)
        .ok_or_else(|| LlmError::InvalidResponse("message has neither content nor tool calls".into()))
}

#[async_trait]
impl ReasoningService for OpenAiProvider {
    async fn invoke(
        &self,
        conversation: &ConversationState,
    ) -> Result<ReasoningReply, CapabilityError> {
        self.complete(conversation).await.map_err(CapabilityError::from)
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conversation() -> ConversationState {
        let mut state = ConversationState::new("instructions", "chunk");
        state.push_action(
            None,
            vec![ToolCall {
                id: "call_1".into(),
                name: SEARCH_REFERENCE_TOOL.into(),
                arguments: json!({"query": "indicator"}),
            }],
        );
        state.push_observation("call_1", SEARCH_REFERENCE_TOOL, "indicator needs pattern");
        state.push_rejected_answer("oops", "answer with JSON");
        state
    }

    #[test]
    fn test_provider_creation() {
        let provider = OpenAiProvider::new("http://localhost:8000/v1/", "local-model").unwrap();
        assert_eq!(provider.base_url, "http://localhost:8000/v1");
        assert_eq!(provider.model(), "local-model");
        assert!(provider.api_key.is_none());
    }

    #[test]
    fn test_build_messages() {
        let messages = build_messages(&conversation());
        assert_eq!(messages.len(), 6);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[1]["role"], "user");
        assert_eq!(messages[2]["role"], "assistant");
        assert_eq!(messages[2]["tool_calls"][0]["id"], "call_1");
        assert_eq!(
            messages[2]["tool_calls"][0]["function"]["arguments"],
            r#"{"query":"indicator"}"#
        );
        assert_eq!(messages[3]["role"], "tool");
        assert_eq!(messages[3]["tool_call_id"], "call_1");
        assert_eq!(messages[4]["role"], "assistant");
        assert_eq!(messages[5]["role"], "user");
    }

    #[test]
    fn test_tool_definitions() {
        let tools = tool_definitions();
        let names: Vec<_> = tools
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["function"]["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec![SEARCH_REFERENCE_TOOL, VALIDATE_DRAFT_TOOL]);
    }

    #[test]
    fn test_parse_reply_tool_calls() {
        let response: ChatResponse = serde_json::from_value(json!({
            "choices": [{"message": {"content": null, "tool_calls": [
                {"id": "a", "type": "function", "function": {"name": "validate_draft", "arguments": "{\"objects\": []}"}},
                {"id": "b", "type": "function", "function": {"name": "search_reference", "arguments": "{broken"}}
            ]}}]
        }))
        .unwrap();
        let ReasoningReply::ToolCalls(calls) = parse_reply(response).unwrap() else {
            panic!("expected tool calls");
        };
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].arguments, json!({"objects": []}));
        assert_eq!(calls[1].arguments, Value::String("{broken".into()));
    }

    #[test]
    fn test_parse_reply_final() {
        let response: ChatResponse = serde_json::from_value(json!({
            "choices": [{"message": {"content": "[]"}}]
        }))
        .unwrap();
        assert_eq!(
            parse_reply(response).unwrap(),
            ReasoningReply::Final("[]".into())
        );
    }

    #[test]
    fn test_parse_reply_null_tool_calls() {
        let response: ChatResponse = serde_json::from_value(json!({
            "choices": [{"message": {"content": "[]", "tool_calls": null}}]
        }))
        .unwrap();
        assert_eq!(
            parse_reply(response).unwrap(),
            ReasoningReply::Final("[]".into())
        );
    }

    #[test]
    fn test_parse_reply_empty() {
        let response: ChatResponse = serde_json::from_value(json!({"choices": []})).unwrap();
        assert!(matches!(
            parse_reply(response),
            Err(LlmError::InvalidResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_transient() {
        // Port 9 (discard) on localhost is almost never listening
        let provider = OpenAiProvider::new("http://127.0.0.1:9/v1", "m").unwrap();
        let err = provider.complete(&conversation()).await.unwrap_err();
        assert!(err.is_transient(), "unexpected error: {:?}", err);
    }

    // Integration test (requires a running endpoint)
    #[tokio::test]
    #[ignore]
    async fn test_openai_integration() {
        let key = std::env::var("STIXWEAVE_API_KEY").unwrap_or_default();
        let provider = OpenAiProvider::new(DEFAULT_BASE_URL, "gpt-4o-mini")
            .unwrap()
            .with_api_key(key);
        let state = ConversationState::new("Reply with []", "nothing here");
        let result = provider.complete(&state).await;
        assert!(result.is_ok());
    }
}
