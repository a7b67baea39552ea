//! Session configuration
//!
//! A [`SessionConfig`] is captured once by the builder and never changes.

use crate::error::Error;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Supported provider kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    /// `OpenAI` and `OpenAI`-compatible chat completions endpoints
    OpenAi,
}

/// Provider configuration for one session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    provider: ProviderKind,
    api_key: String,
    base_url: String,
    model: String,
}

impl SessionConfig {
    /// Validate and capture an `OpenAI` configuration.
    pub fn openai(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, Error> {
        let api_key = validate_field("api_key", api_key.into())?;
        let base_url = validate_field("base_url", base_url.into())?;
        let model = validate_field("model", model.into())?;
        Ok(Self {
            provider: ProviderKind::OpenAi,
            api_key,
            base_url,
            model,
        })
    }

    /// Build a configuration from the environment.
    ///
    /// Reads `EMBED_AGENT_API_KEY` (or `OPENAI_API_KEY`), `EMBED_AGENT_BASE_URL`
    /// and `EMBED_AGENT_MODEL`.
    pub fn from_env() -> Result<Self, Error> {
        let api_key = std::env::var("EMBED_AGENT_API_KEY")
            .or_else(|_| std::env::var("OPENAI_API_KEY"))
            .unwrap_or_default();
        let base_url =
            std::env::var("EMBED_AGENT_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let model = std::env::var("EMBED_AGENT_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        Self::openai(api_key, base_url, model)
    }

    pub fn provider(&self) -> ProviderKind {
        self.provider
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

fn validate_field(name: &str, value: String) -> Result<String, Error> {
    if value.trim().is_empty() {
        return Err(Error::invalid_argument(format!("{name} must not be empty")));
    }
    if value.contains('\0') {
        return Err(Error::invalid_argument(format!(
            "{name} must not contain NUL bytes"
        )));
    }
    Ok(value)
}

/// Tunables for the agent loop. All fields have defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// Prepended to every provider request
    pub system_prompt: Option<String>,
    /// Provider attempts per exchange, including the first
    pub max_attempts: u32,
    /// Provider exchanges allowed for a single user message
    pub max_turns: u32,
    /// HTTP timeout for provider requests
    pub request_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            system_prompt: None,
            max_attempts: 3,
            max_turns: 50,
            request_timeout: Duration::from_secs(300),
        }
    }
}
