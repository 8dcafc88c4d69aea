//! Ollama client implementation
//!
//! Async HTTP client for the Ollama chat API with tool calling.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::agent::prompts::render_context;
use crate::core::text::truncate_chars;
use crate::core::{Config, Message, PilotError, Result, TokenUsage, ToolCall, ToolDefinition};
use crate::llm::traits::{ReasoningReply, ReasoningRequest, ReasoningService};

/// Ollama API client
#[derive(Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
    temperature: f32,
}

/// Ollama chat request
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<OllamaMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a [ToolDefinition]>,
    options: OllamaOptions,
    stream: bool,
}

/// Ollama message format
#[derive(Debug, Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    #[serde(default)]
    content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OllamaToolCall>>,
}

/// Ollama tool call format
#[derive(Debug, Clone, Serialize, Deserialize)]
struct OllamaToolCall {
    function: OllamaFunction,
}

/// Ollama function in tool call
#[derive(Debug, Clone, Serialize, Deserialize)]
struct OllamaFunction {
    name: String,
    #[serde(default)]
    arguments: serde_json::Value,
}

/// Ollama generation options
#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
}

/// Ollama chat response (non-streaming)
#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: OllamaMessage,
    #[serde(default)]
    model: String,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

/// Ollama models list response
#[derive(Debug, Deserialize)]
struct ModelsResponse {
    models: Vec<ModelInfo>,
}

/// Model information
#[derive(Debug, Deserialize)]
struct ModelInfo {
    name: String,
}

impl OllamaClient {
    /// Create a new Ollama client from configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.reasoning_timeout())
            .build()?;

        Ok(Self {
            client,
            base_url: config.reasoning_url(),
            model: config.reasoning.model.clone(),
            temperature: config.reasoning.temperature,
        })
    }

    /// Create a client with custom base URL
    pub fn with_base_url(base_url: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(120)).build()?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            model: model.into(),
            temperature: 0.2,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Convert internal Message to Ollama format
    fn to_ollama_message(msg: &Message) -> OllamaMessage {
        OllamaMessage {
            role: msg.role.clone(),
            content: msg.content.clone(),
            tool_calls: msg.tool_calls.as_ref().map(|calls| {
                calls
                    .iter()
                    .map(|tc| OllamaToolCall {
                        function: OllamaFunction {
                            name: tc.name.clone(),
                            arguments: tc.arguments.clone(),
                        },
                    })
                    .collect()
            }),
        }
    }

    /// Convert Ollama response to a reply
    fn to_reply(response: ChatResponse) -> ReasoningReply {
        let tool_calls = response
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| ToolCall {
                name: tc.function.name,
                arguments: tc.function.arguments,
            })
            .collect();

        let usage = match (response.prompt_eval_count, response.eval_count) {
            (Some(prompt), Some(completion)) => Some(TokenUsage {
                prompt_tokens: prompt,
                completion_tokens: completion,
                total_tokens: prompt + completion,
            }),
            _ => None,
        };

        ReasoningReply {
            content: response.message.content,
            tool_calls,
            usage,
            model: response.model,
        }
    }

    fn connection_error(&self, e: reqwest::Error) -> PilotError {
        if e.is_connect() {
            PilotError::reasoning(
                format!("Cannot connect to Ollama at {}. Is it running?", self.base_url),
                true,
            )
        } else if e.is_timeout() {
            PilotError::reasoning("Ollama request timed out", true)
        } else {
            PilotError::reasoning(format!("Ollama request failed: {}", e), true)
        }
    }

    /// POST `/api/chat` with tools and return the raw reply
    pub async fn chat_with_tools(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<ReasoningReply> {
        let request = ChatRequest {
            model: &self.model,
            messages: messages.iter().map(Self::to_ollama_message).collect(),
            tools: if tools.is_empty() { None } else { Some(tools) },
            options: OllamaOptions {
                temperature: self.temperature,
            },
            stream: false,
        };

        debug!(model = %self.model, messages = messages.len(), tools = tools.len(), "Ollama chat request");

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| self.connection_error(e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.connection_error(e))?;
        if !status.is_success() {
            return Err(status_error(status, &body, &self.model));
        }
        debug!(body = %truncate_chars(&body, 500, "..."), "Ollama chat response");

        parse_chat_response(&body)
    }

    /// Check if a model is available
    pub async fn is_model_available(&self, model: &str) -> Result<bool> {
        let models = self.list_models().await?;
        Ok(models
            .iter()
            .any(|m| m == model || m.split(':').next() == model.split(':').next()))
    }

    /// List available models
    pub async fn list_models(&self) -> Result<Vec<String>> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await
            .map_err(|e| self.connection_error(e))?;

        if !response.status().is_success() {
            return Err(PilotError::reasoning("Failed to list models", false));
        }

        let models_response: ModelsResponse = response.json().await?;
        Ok(models_response.models.into_iter().map(|m| m.name).collect())
    }
}

/// Server errors may clear up; client errors will not
fn status_error(status: StatusCode, body: &str, model: &str) -> PilotError {
    let body = truncate_chars(body.trim(), 300, "...");
    if status == StatusCode::NOT_FOUND && body.contains("not found") {
        return PilotError::reasoning(
            format!("Model '{}' not found. Pull it with: ollama pull {}", model, model),
            false,
        );
    }
    let recoverable = status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS;
    PilotError::reasoning(format!("Ollama API error ({}): {}", status, body), recoverable)
}

fn parse_chat_response(body: &str) -> Result<ReasoningReply> {
    let chat_response: ChatResponse = serde_json::from_str(body)
        .map_err(|e| PilotError::reasoning(format!("Failed to parse response: {}", e), false))?;
    Ok(OllamaClient::to_reply(chat_response))
}

#[async_trait]
impl ReasoningService for OllamaClient {
    async fn next_intent(&self, request: &ReasoningRequest) -> Result<ReasoningReply> {
        let messages = vec![
            Message::system(request.system_prompt.clone()),
            Message::user(render_context(&request.context)),
        ];
        self.chat_with_tools(&messages, &request.tools).await
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let mut config = Config::default();
        config.reasoning.host = "localhost".to_string();
        config.reasoning.port = 11434;
        let client = OllamaClient::from_config(&config).unwrap();
        assert_eq!(client.base_url, "http://localhost:11434");
        assert_eq!(client.model(), config.reasoning.model);
    }

    #[test]
    fn test_message_conversion() {
        let msg = Message::user("Hello");
        let ollama_msg = OllamaClient::to_ollama_message(&msg);
        assert_eq!(ollama_msg.role, "user");
        assert_eq!(ollama_msg.content, "Hello");
        assert!(ollama_msg.tool_calls.is_none());
    }

    #[test]
    fn test_parse_tool_call_response() {
        let body = r#"{
            "model": "qwen3:8b",
            "message": {
                "role": "assistant",
                "content": "",
                "tool_calls": [{"function": {"name": "click", "arguments": {"target": "Sign in"}}}]
            },
            "prompt_eval_count": 120,
            "eval_count": 8
        }"#;
        let reply = parse_chat_response(body).unwrap();
        assert_eq!(reply.tool_calls.len(), 1);
        assert_eq!(reply.tool_calls[0].name, "click");
        assert_eq!(reply.tool_calls[0].target().as_deref(), Some("Sign in"));
        assert_eq!(reply.usage.unwrap().total_tokens, 128);
        assert_eq!(reply.model, "qwen3:8b");
    }

    #[test]
    fn test_unparsable_body_is_not_recoverable() {
        let err = parse_chat_response("<html>gateway</html>").unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_status_errors() {
        let err = status_error(StatusCode::SERVICE_UNAVAILABLE, "loading model", "m");
        assert!(matches!(err, PilotError::ReasoningService { recoverable: true, .. }));

        let err = status_error(StatusCode::BAD_REQUEST, "bad tools", "m");
        assert!(err.is_fatal());

        let err = status_error(StatusCode::NOT_FOUND, "model 'm' not found", "m");
        assert!(err.to_string().contains("ollama pull m"));
        assert!(err.is_fatal());
    }
}
