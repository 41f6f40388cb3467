//! Anthropic Messages API provider.
//!
//! Differences from OpenAI-compatible APIs:
//! - Auth via `x-api-key` header (not `Authorization: Bearer`)
//! - Required `anthropic-version` header
//! - System message is a top-level `system` field, not in the messages array
//! - Tool calls use `tool_use` / `tool_result` content block conventions

use crate::brain::LlmProvider;
use crate::config::LlmProviderConfig;
use crate::error::LlmError;
use crate::types::{
    CompletionRequest, CompletionResponse, Content, Message, Role, TokenUsage, ToolDefinition,
};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";

/// The required Anthropic API version header value.
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// `max_tokens` is mandatory for the Messages API.
const DEFAULT_MAX_TOKENS: usize = 4096;

/// Anthropic Messages API provider.
pub struct AnthropicProvider {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    timeout_secs: u64,
}

impl AnthropicProvider {
    /// Create a new Anthropic provider from configuration.
    ///
    /// Returns `LlmError::AuthFailed` if the API key environment variable is not set.
    pub fn new(config: &LlmProviderConfig, timeout_secs: u64) -> Result<Self, LlmError> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| LlmError::AuthFailed {
                provider: format!("Anthropic (env var '{}' not set)", config.api_key_env),
            })?;
        Ok(Self::new_with_key(config, api_key, timeout_secs))
    }

    pub fn new_with_key(config: &LlmProviderConfig, api_key: String, timeout_secs: u64) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key,
            model: config.model.clone(),
            timeout_secs,
        }
    }

    fn build_request_body(&self, request: &CompletionRequest) -> Value {
        let (system_text, conversation) = Self::extract_system_message(&request.messages);

        let mut body = json!({
            "model": request.model.as_deref().unwrap_or(&self.model),
            "max_tokens": request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            "temperature": request.temperature,
            "messages": conversation
                .iter()
                .map(|msg| Self::message_to_anthropic_json(msg))
                .collect::<Vec<_>>(),
        });

        if let Some(system) = system_text {
            body["system"] = Value::String(system);
        }
        if !request.stop_sequences.is_empty() {
            body["stop_sequences"] = json!(request.stop_sequences);
        }
        if let Some(tools) = &request.tools
            && !tools.is_empty()
        {
            body["tools"] = Value::Array(tools.iter().map(Self::tool_definition_to_json).collect());
        }
        body
    }

    /// Split system messages (joined by blank lines) from the conversation.
    fn extract_system_message(messages: &[Message]) -> (Option<String>, Vec<&Message>) {
        let (system, conversation): (Vec<&Message>, Vec<&Message>) =
            messages.iter().partition(|msg| msg.role == Role::System);

        let system_text: Vec<String> = system
            .iter()
            .map(|msg| msg.text())
            .filter(|text| !text.is_empty())
            .collect();

        let system_text = (!system_text.is_empty()).then(|| system_text.join("\n\n"));
        (system_text, conversation)
    }

    fn message_to_anthropic_json(msg: &Message) -> Value {
        let role = match msg.role {
            Role::Assistant => "assistant",
            Role::User | Role::Tool | Role::System => "user",
        };
        json!({
            "role": role,
            "content": Self::content_to_anthropic_json(&msg.content),
        })
    }

    fn content_to_anthropic_json(content: &Content) -> Value {
        match content {
            Content::Text { text } => json!([{"type": "text", "text": text}]),
            Content::ToolCall {
                id,
                name,
                arguments,
            } => {
                // tool_use input must be an object.
                let input = if arguments.is_object() {
                    arguments.clone()
                } else {
                    json!({"queries": [arguments]})
                };
                json!([{"type": "tool_use", "id": id, "name": name, "input": input}])
            }
            Content::ToolResult {
                call_id,
                output,
                is_error,
            } => {
                let mut block = json!({
                    "type": "tool_result",
                    "tool_use_id": call_id,
                    "content": output,
                });
                if *is_error {
                    block["is_error"] = Value::Bool(true);
                }
                json!([block])
            }
            Content::MultiPart { parts } => Value::Array(
                parts
                    .iter()
                    .flat_map(|part| match Self::content_to_anthropic_json(part) {
                        Value::Array(blocks) => blocks,
                        other => vec![other],
                    })
                    .collect(),
            ),
        }
    }

    fn tool_definition_to_json(tool: &ToolDefinition) -> Value {
        json!({
            "name": tool.name,
            "description": tool.description,
            "input_schema": tool.parameters,
        })
    }

    fn parse_response(body: &Value, fallback_model: &str) -> Result<CompletionResponse, LlmError> {
        let blocks = body["content"]
            .as_array()
            .ok_or_else(|| LlmError::ResponseParse {
                message: "Missing 'content' array in response".to_string(),
            })?;

        let mut parts: Vec<Content> = Vec::with_capacity(blocks.len());
        for block in blocks {
            match block["type"].as_str().unwrap_or("text") {
                "text" => parts.push(Content::text(block["text"].as_str().unwrap_or(""))),
                "tool_use" => parts.push(Content::tool_call(
                    block["id"].as_str().unwrap_or(""),
                    block["name"].as_str().unwrap_or(""),
                    block["input"].clone(),
                )),
                other => debug!(block_type = other, "Ignoring unknown content block type"),
            }
        }

        let content = if parts.len() > 1 {
            Content::MultiPart { parts }
        } else {
            parts.pop().unwrap_or_else(|| Content::text(""))
        };

        Ok(CompletionResponse {
            message: Message::new(Role::Assistant, content),
            usage: TokenUsage {
                input_tokens: body["usage"]["input_tokens"].as_u64().unwrap_or(0) as usize,
                output_tokens: body["usage"]["output_tokens"].as_u64().unwrap_or(0) as usize,
            },
            model: body["model"].as_str().unwrap_or(fallback_model).to_string(),
            finish_reason: body["stop_reason"].as_str().map(str::to_string),
        })
    }

    fn map_http_error(status: reqwest::StatusCode, body_text: &str) -> LlmError {
        match status.as_u16() {
            401 => LlmError::AuthFailed {
                provider: "Anthropic".to_string(),
            },
            429 => {
                let retry_after = serde_json::from_str::<Value>(body_text)
                    .ok()
                    .and_then(|v| v["error"]["retry_after_secs"].as_u64())
                    .unwrap_or(30);
                LlmError::RateLimited {
                    retry_after_secs: retry_after,
                }
            }
            status if status >= 500 => LlmError::ApiRequest {
                message: format!("Server error ({}) from Anthropic API: {}", status, body_text),
            },
            _ => LlmError::ApiRequest {
                message: format!("HTTP {} from Anthropic API: {}", status, body_text),
            },
        }
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let body = self.build_request_body(&request);
        let url = format!("{}/messages", self.base_url);

        debug!(
            model = self.model.as_str(),
            url = url.as_str(),
            "Sending Anthropic completion request"
        );

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout {
                        timeout_secs: self.timeout_secs,
                    }
                } else {
                    LlmError::ApiRequest {
                        message: format!("Request to Anthropic API failed: {}", e),
                    }
                }
            })?;

        let status = response.status();
        let body_text = response.text().await.map_err(|e| LlmError::ResponseParse {
            message: format!("Failed to read response body: {}", e),
        })?;

        if !status.is_success() {
            return Err(Self::map_http_error(status, &body_text));
        }

        let response_json: Value =
            serde_json::from_str(&body_text).map_err(|e| LlmError::ResponseParse {
                message: format!("Invalid JSON in response: {}", e),
            })?;

        Self::parse_response(&response_json, &self.model)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
