//! `OpenAI` and `OpenAI`-compatible chat completions client

use super::{ProviderClient, ProviderRequest, ProviderResponse, ToolDefinition, Usage};
use crate::config::SessionConfig;
use crate::conversation::{Message, ToolCallRequest};
use crate::error::{Error, ProviderError};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

/// Argument every tool schema gains so the model explains itself
const JUSTIFICATION_ARG: &str = "justification";

/// OpenAI-compatible provider implementation
pub struct OpenAiClient {
    client: Client,
    api_key: String,
    endpoint: String,
    model: String,
}

impl OpenAiClient {
    /// Client for `config`. Each request is abandoned after `timeout`.
    pub fn new(config: &SessionConfig, timeout: Duration) -> Result<Self, Error> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::HttpClient(e.to_string()))?;

        Ok(Self {
            client,
            api_key: config.api_key().to_string(),
            endpoint: format!("{}/chat/completions", config.base_url().trim_end_matches('/')),
            model: config.model().to_string(),
        })
    }

    fn translate_request(&self, request: &ProviderRequest) -> OpenAiRequest {
        let mut messages = Vec::new();

        if let Some(system) = request.system.as_deref().filter(|s| !s.is_empty()) {
            messages.push(OpenAiMessage {
                role: "system".to_string(),
                content: Some(system.to_string()),
                tool_calls: None,
                tool_call_id: None,
            });
        }

        messages.extend(request.messages.iter().map(translate_message));

        let tools = if request.tools.is_empty() {
            None
        } else {
            Some(request.tools.iter().map(translate_tool).collect())
        };

        OpenAiRequest {
            model: self.model.clone(),
            messages,
            tools,
            stream: false,
        }
    }

    fn normalize_response(resp: OpenAiResponse) -> Result<ProviderResponse, ProviderError> {
        let choice = resp
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::unknown("No choices in response"))?;

        let mut segments = Vec::new();
        if let Some(text) = choice.message.content {
            if !text.is_empty() {
                segments.push(text);
            }
        }

        let mut tool_calls = Vec::new();
        for tc in choice.message.tool_calls.unwrap_or_default() {
            if tc.function.name.is_empty() {
                continue;
            }
            let mut arguments: Value =
                serde_json::from_str(&tc.function.arguments).unwrap_or_else(|_| json!({}));
            let justification = take_justification(&mut arguments);

            tool_calls.push(
                ToolCallRequest::new(tc.id, tc.function.name.clone(), tc.function.name, justification)
                    .with_arguments(arguments),
            );
        }

        if choice.finish_reason.as_deref() == Some("length") {
            tracing::warn!("Provider response truncated at max tokens");
        }

        let usage = resp.usage.map(|u| Usage {
            input_tokens: u64::from(u.prompt_tokens),
            output_tokens: u64::from(u.completion_tokens),
        });

        Ok(ProviderResponse {
            segments,
            tool_calls,
            usage: usage.unwrap_or_default(),
        })
    }
}

#[async_trait]
impl ProviderClient for OpenAiClient {
    async fn complete(&self, request: &ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let openai_request = self.translate_request(request);

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&openai_request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::network(format!("Request timeout: {e}"))
                } else if e.is_connect() {
                    ProviderError::network(format!("Connection failed: {e}"))
                } else {
                    ProviderError::unknown(format!("Request failed: {e}"))
                }
            })?;

        let status = response.status();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs);
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::network(format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            let error = classify_status(status.as_u16(), &body);
            return Err(match retry_after {
                Some(delay) => error.with_retry_after(delay),
                None => error,
            });
        }

        let openai_response: OpenAiResponse = serde_json::from_str(&body).map_err(|e| {
            ProviderError::unknown(format!("Failed to parse response: {e} - body: {body}"))
        })?;

        Self::normalize_response(openai_response)
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

fn classify_status(status: u16, body: &str) -> ProviderError {
    let Ok(error_resp) = serde_json::from_str::<OpenAiErrorResponse>(body) else {
        return match status {
            500..=599 => ProviderError::server_error(format!("HTTP {status} error: {body}")),
            _ => ProviderError::unknown(format!("HTTP {status} error: {body}")),
        };
    };
    let message = error_resp.error.message;
    match status {
        401 | 403 => ProviderError::auth(format!("Authentication failed: {message}")),
        429 => ProviderError::rate_limit(format!("Rate limit exceeded: {message}")),
        400 => ProviderError::invalid_request(format!("Invalid request: {message}")),
        500..=599 => ProviderError::server_error(format!("Server error: {message}")),
        _ => ProviderError::unknown(format!("HTTP {status}: {message}")),
    }
}

/// Translate one conversation message. Tool results use the "tool" role.
fn translate_message(msg: &Message) -> OpenAiMessage {
    match msg {
        Message::User { text } => OpenAiMessage {
            role: "user".to_string(),
            content: Some(text.clone()),
            tool_calls: None,
            tool_call_id: None,
        },
        Message::Assistant { text, tool_calls } => {
            let calls: Vec<OpenAiToolCall> = tool_calls
                .iter()
                .map(|call| OpenAiToolCall {
                    id: call.id.clone(),
                    r#type: "function".to_string(),
                    function: OpenAiFunctionCall {
                        name: call.name.clone(),
                        arguments: serde_json::to_string(&call.arguments)
                            .unwrap_or_else(|_| "{}".to_string()),
                    },
                })
                .collect();
            OpenAiMessage {
                role: "assistant".to_string(),
                content: if text.is_empty() && !calls.is_empty() {
                    None
                } else {
                    Some(text.clone())
                },
                tool_calls: if calls.is_empty() { None } else { Some(calls) },
                tool_call_id: None,
            }
        }
        Message::ToolResult {
            call_id,
            content,
            is_error,
        } => OpenAiMessage {
            role: "tool".to_string(),
            content: Some(if *is_error {
                format!("Error: {content}")
            } else {
                content.clone()
            }),
            tool_calls: None,
            tool_call_id: Some(call_id.clone()),
        },
    }
}

fn translate_tool(tool: &ToolDefinition) -> OpenAiTool {
    OpenAiTool {
        r#type: "function".to_string(),
        function: OpenAiFunction {
            name: tool.name.clone(),
            description: tool.description.clone(),
            parameters: with_justification(tool.input_schema.clone()),
        },
    }
}

/// Add a required `justification` string to an object schema.
fn with_justification(mut schema: Value) -> Value {
    let Some(obj) = schema.as_object_mut() else {
        return schema;
    };
    obj.entry("type").or_insert_with(|| json!("object"));
    if let Some(props) = obj
        .entry("properties")
        .or_insert_with(|| json!({}))
        .as_object_mut()
    {
        props.insert(
            JUSTIFICATION_ARG.to_string(),
            json!({ "type": "string", "description": "Why this call is needed" }),
        );
    }
    if let Some(required) = obj
        .entry("required")
        .or_insert_with(|| json!([]))
        .as_array_mut()
    {
        if !required.iter().any(|r| r == JUSTIFICATION_ARG) {
            required.push(json!(JUSTIFICATION_ARG));
        }
    }
    schema
}

fn take_justification(arguments: &mut Value) -> String {
    arguments
        .as_object_mut()
        .and_then(|obj| obj.remove(JUSTIFICATION_ARG))
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default()
}

// OpenAI API types

#[derive(Debug, Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<OpenAiTool>>,
    stream: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OpenAiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct OpenAiTool {
    r#type: String,
    function: OpenAiFunction,
}

#[derive(Debug, Serialize)]
struct OpenAiFunction {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiToolCall {
    id: String,
    r#type: String,
    function: OpenAiFunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
    #[serde(default)]
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[allow(clippy::struct_field_names)]
struct OpenAiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorResponse {
    error: OpenAiError,
}

#[derive(Debug, Deserialize)]
struct OpenAiError {
    message: String,
}
