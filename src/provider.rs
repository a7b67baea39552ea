//! Provider abstraction
//!
//! The session talks to an LLM through [`ProviderClient`]. One request carries
//! the whole conversation; one response carries the assistant's output
//! segments and any tool calls it wants made.

mod openai;

pub use openai::OpenAiClient;

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::conversation::{Message, ToolCallRequest};
use crate::error::ProviderError;

/// Common interface for LLM providers
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Make a completion request
    async fn complete(&self, request: &ProviderRequest) -> Result<ProviderResponse, ProviderError>;

    /// Get the model ID
    fn model_id(&self) -> &str;
}

#[async_trait]
impl<T: ProviderClient + ?Sized> ProviderClient for Arc<T> {
    async fn complete(&self, request: &ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        (**self).complete(request).await
    }

    fn model_id(&self) -> &str {
        (**self).model_id()
    }
}

/// A tool the provider may call
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Provider request
#[derive(Debug, Clone, Default)]
pub struct ProviderRequest {
    pub system: Option<String>,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolDefinition>,
}

/// Provider response
#[derive(Debug, Clone, Default)]
pub struct ProviderResponse {
    /// Assistant output, in the order it was produced
    pub segments: Vec<String>,
    /// Tool calls, in the order they should be gated
    pub tool_calls: Vec<ToolCallRequest>,
    pub usage: Usage,
}

impl ProviderResponse {
    /// A plain text reply that ends the turn.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            segments: vec![text.into()],
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_segment(mut self, text: impl Into<String>) -> Self {
        self.segments.push(text.into());
        self
    }

    #[must_use]
    pub fn with_tool_call(mut self, call: ToolCallRequest) -> Self {
        self.tool_calls.push(call);
        self
    }

    /// All segments joined, as recorded in the conversation.
    pub fn joined_text(&self) -> String {
        self.segments.join("\n")
    }
}

/// Usage statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Logging wrapper for providers
pub struct LoggingProvider {
    inner: Arc<dyn ProviderClient>,
    model_id: String,
}

impl LoggingProvider {
    pub fn new(inner: Arc<dyn ProviderClient>) -> Self {
        let model_id = inner.model_id().to_string();
        Self { inner, model_id }
    }
}

#[async_trait]
impl ProviderClient for LoggingProvider {
    async fn complete(&self, request: &ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let start = std::time::Instant::now();
        let result = self.inner.complete(request).await;
        let duration = start.elapsed();

        match &result {
            Ok(response) => {
                tracing::info!(
                    model = %self.model_id,
                    duration_ms = %duration.as_millis(),
                    input_tokens = response.usage.input_tokens,
                    output_tokens = response.usage.output_tokens,
                    tool_calls = response.tool_calls.len(),
                    "Provider request completed"
                );
            }
            Err(e) => {
                tracing::error!(
                    model = %self.model_id,
                    duration_ms = %duration.as_millis(),
                    error = %e.message,
                    retryable = e.kind.is_retryable(),
                    "Provider request failed"
                );
            }
        }

        result
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}
