//! Brain module: chat provider abstraction and rate-limit-aware access.
//!
//! Defines the `LlmProvider` trait for model-agnostic completions, the
//! `Brain` wrapper every pipeline stage talks through, and a scriptable
//! `MockLlmProvider` for tests.

use crate::error::{LlmError, ProviderKind, ProviderRateLimitError, Result};
use crate::providers::failover::is_rate_limit_error;
use crate::types::{
    CompletionRequest, CompletionResponse, Content, Message, Role, TokenUsage, ToolDefinition,
};
use async_trait::async_trait;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};

/// Trait for chat-completion providers.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Perform a full completion and return the response.
    async fn complete(&self, request: CompletionRequest) -> std::result::Result<CompletionResponse, LlmError>;

    /// Return the model name.
    fn model_name(&self) -> &str;

    /// Return whether this provider supports tool/function calling.
    fn supports_tools(&self) -> bool {
        true
    }
}

/// Rate-limit-aware front for one provider.
///
/// Every failure classified as a rate limit is re-raised as
/// [`ProviderRateLimitError`] tagged with this brain's provider id, so the
/// top-level run handler can fail over to another provider.
pub struct Brain {
    provider: Arc<dyn LlmProvider>,
    provider_id: String,
    temperature: f32,
    max_tokens: Option<usize>,
    total_usage: Mutex<TokenUsage>,
}

impl Brain {
    pub fn new(provider: Arc<dyn LlmProvider>, provider_id: impl Into<String>) -> Self {
        Self {
            provider,
            provider_id: provider_id.into(),
            temperature: 0.7,
            max_tokens: None,
            total_usage: Mutex::new(TokenUsage::default()),
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: Option<usize>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Id of the provider this brain talks to.
    pub fn provider_id(&self) -> &str {
        &self.provider_id
    }

    /// Get the model name.
    pub fn model_name(&self) -> &str {
        self.provider.model_name()
    }

    /// Get total token usage across all calls.
    pub fn total_usage(&self) -> TokenUsage {
        *self
            .total_usage
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Send a system prompt plus one user message.
    pub async fn ask(&self, system: &str, user: &str) -> Result<CompletionResponse> {
        self.think(vec![Message::system(system), Message::user(user)], None)
            .await
    }

    /// Send an explicit message list, optionally binding tools.
    pub async fn think(
        &self,
        messages: Vec<Message>,
        tools: Option<Vec<ToolDefinition>>,
    ) -> Result<CompletionResponse> {
        let tools = tools.filter(|defs| !defs.is_empty() && self.provider.supports_tools());

        debug!(
            provider = %self.provider_id,
            model = self.provider.model_name(),
            messages = messages.len(),
            tools = tools.as_ref().map(Vec::len).unwrap_or(0),
            "Sending completion request"
        );

        let request = CompletionRequest {
            messages,
            tools,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            ..Default::default()
        };

        match self.provider.complete(request).await {
            Ok(response) => {
                self.total_usage
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .accumulate(&response.usage);
                Ok(response)
            }
            Err(e) if is_rate_limit_error(&e) => {
                warn!(provider = %self.provider_id, error = %e, "LLM provider is rate limited");
                Err(ProviderRateLimitError::new(ProviderKind::Llm, &self.provider_id, &e).into())
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// A scripted reply for [`MockLlmProvider`].
enum MockReply {
    Response(CompletionResponse),
    Error(LlmError),
}

/// A mock LLM provider for testing.
///
/// Replies are served in FIFO order; once the queue is empty a generic
/// text response is returned.
pub struct MockLlmProvider {
    model: String,
    replies: Mutex<Vec<MockReply>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl MockLlmProvider {
    pub fn new() -> Self {
        Self {
            model: "mock-model".to_string(),
            replies: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Create a MockLlmProvider that always returns the given text.
    ///
    /// Queues multiple copies of the response so it can handle multiple calls.
    pub fn with_response(text: &str) -> Self {
        let provider = Self::new();
        for _ in 0..40 {
            provider.queue_response(Self::text_response(text));
        }
        provider
    }

    /// Rename the mock model.
    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    /// Queue a response to be returned by the next `complete` call.
    pub fn queue_response(&self, response: CompletionResponse) {
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(MockReply::Response(response));
    }

    /// Queue a plain text response.
    pub fn queue_text(&self, text: &str) {
        self.queue_response(Self::text_response(text));
    }

    /// Queue an error to be returned by the next `complete` call.
    pub fn queue_error(&self, error: LlmError) {
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(MockReply::Error(error));
    }

    /// Number of completion requests received so far.
    pub fn call_count(&self) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Copies of every request received so far.
    pub fn recorded_requests(&self) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Create a simple text response for testing.
    pub fn text_response(text: &str) -> CompletionResponse {
        CompletionResponse {
            message: Message::assistant(text),
            usage: TokenUsage {
                input_tokens: 100,
                output_tokens: 50,
            },
            model: "mock-model".to_string(),
            finish_reason: Some("stop".to_string()),
        }
    }

    /// Create a text response that reports the given finish reason.
    pub fn text_response_with_reason(text: &str, finish_reason: &str) -> CompletionResponse {
        CompletionResponse {
            finish_reason: Some(finish_reason.to_string()),
            ..Self::text_response(text)
        }
    }

    /// Create a tool call response for testing.
    pub fn tool_call_response(tool_name: &str, arguments: serde_json::Value) -> CompletionResponse {
        let call_id = format!("call_{}", uuid::Uuid::new_v4());
        CompletionResponse {
            message: Message::new(
                Role::Assistant,
                Content::tool_call(&call_id, tool_name, arguments),
            ),
            usage: TokenUsage {
                input_tokens: 100,
                output_tokens: 30,
            },
            model: "mock-model".to_string(),
            finish_reason: Some("tool_calls".to_string()),
        }
    }
}

impl Default for MockLlmProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    async fn complete(&self, request: CompletionRequest) -> std::result::Result<CompletionResponse, LlmError> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);
        let mut replies = self.replies.lock().unwrap_or_else(PoisonError::into_inner);
        if replies.is_empty() {
            return Ok(MockLlmProvider::text_response(
                "I'm a mock LLM. No queued responses available.",
            ));
        }
        match replies.remove(0) {
            MockReply::Response(response) => Ok(response),
            MockReply::Error(error) => Err(error),
        }
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
