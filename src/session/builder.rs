//! Session construction

use std::sync::Arc;

use super::Session;
use crate::callbacks::{CallbackSet, SessionHandler};
use crate::config::{SessionConfig, SessionOptions};
use crate::error::Error;
use crate::provider::{LoggingProvider, OpenAiClient, ProviderClient};
use crate::runtime;
use crate::tools::{NoTools, ToolExecutor};

/// Collects configuration and callbacks, then starts a [`Session`].
///
/// A handler registered on a builder that is released (or dropped) without
/// building has its teardown run immediately.
pub struct SessionBuilder {
    config: SessionConfig,
    options: SessionOptions,
    handler: Option<Box<dyn SessionHandler>>,
    provider: Option<Arc<dyn ProviderClient>>,
    tools: Arc<dyn ToolExecutor>,
}

impl SessionBuilder {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            options: SessionOptions::default(),
            handler: None,
            provider: None,
            tools: Arc::new(NoTools),
        }
    }

    /// Builder for an `OpenAI`-compatible endpoint. Every argument must be non-empty.
    pub fn openai(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, Error> {
        SessionConfig::openai(api_key, base_url, model).map(Self::new)
    }

    pub fn from_env() -> Result<Self, Error> {
        SessionConfig::from_env().map(Self::new)
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Use `provider` instead of the HTTP client the config describes.
    #[must_use]
    pub fn with_provider(mut self, provider: impl ProviderClient + 'static) -> Self {
        self.provider = Some(Arc::new(provider));
        self
    }

    #[must_use]
    pub fn with_tools(mut self, tools: impl ToolExecutor + 'static) -> Self {
        self.tools = Arc::new(tools);
        self
    }

    #[must_use]
    pub fn with_options(mut self, options: SessionOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.options.system_prompt = Some(prompt.into());
        self
    }

    /// Register the session's handler, replacing any earlier one.
    ///
    /// A replaced handler is torn down right away.
    pub fn set_callbacks(&mut self, handler: impl SessionHandler) {
        if let Some(mut old) = self.handler.replace(Box::new(handler)) {
            tracing::debug!("Replacing session callbacks");
            old.on_teardown();
        }
    }

    #[must_use]
    pub fn callbacks(mut self, handler: impl SessionHandler) -> Self {
        self.set_callbacks(handler);
        self
    }

    /// Discard the builder without building. Equivalent to dropping it.
    pub fn release(self) {
        drop(self);
    }

    /// Start the session.
    ///
    /// Without a registered handler every callback is a no-op and tool calls
    /// are rejected.
    pub fn build(mut self) -> Result<Session, Error> {
        let runtime = runtime::handle()?;

        let provider: Arc<dyn ProviderClient> = match self.provider.take() {
            Some(provider) => provider,
            None => Arc::new(OpenAiClient::new(&self.config, self.options.request_timeout)?),
        };
        let provider = Arc::new(LoggingProvider::new(provider));

        let handler = self
            .handler
            .take()
            .unwrap_or_else(|| Box::new(CallbackSet::new(())));

        Session::start(
            runtime,
            self.config.clone(),
            std::mem::take(&mut self.options),
            provider,
            Arc::clone(&self.tools),
            handler,
        )
    }
}

impl Drop for SessionBuilder {
    fn drop(&mut self) {
        if let Some(mut handler) = self.handler.take() {
            tracing::debug!("Builder released with unused callbacks");
            handler.on_teardown();
        }
    }
}

impl std::fmt::Debug for SessionBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionBuilder")
            .field("model", &self.config.model())
            .field("base_url", &self.config.base_url())
            .field("has_callbacks", &self.handler.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{test_config, GatePolicy, MockProviderClient, Record, RecordingHandler};
    use super::*;
    use crate::provider::ProviderResponse;
    use crate::session::SessionState;
    use std::time::Duration;

    #[test]
    fn rejects_empty_configuration() {
        let err = SessionBuilder::openai("", "https://api.openai.com/v1", "gpt-4o-mini").unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert!(SessionBuilder::openai("key", "", "gpt-4o-mini").is_err());
        assert!(SessionBuilder::openai("key", "https://api.openai.com/v1", "").is_err());
    }

    #[test]
    fn replaced_callbacks_are_torn_down() {
        let (first, first_rec) = RecordingHandler::new(GatePolicy::Hold);
        let (second, second_rec) = RecordingHandler::new(GatePolicy::Hold);

        let mut builder = SessionBuilder::new(test_config());
        builder.set_callbacks(first);
        assert!(first_rec.records().is_empty());
        builder.set_callbacks(second);
        assert_eq!(first_rec.records(), vec![Record::Teardown]);
        assert!(second_rec.records().is_empty());

        builder.release();
        assert_eq!(second_rec.records(), vec![Record::Teardown]);
    }

    #[test]
    fn building_consumes_callbacks_without_teardown() {
        let (handler, recorder) = RecordingHandler::new(GatePolicy::Hold);
        let session = SessionBuilder::new(test_config())
            .with_provider(MockProviderClient::new())
            .callbacks(handler)
            .build()
            .unwrap();
        assert_eq!(session.state(), SessionState::Idle);
        assert!(recorder.records().is_empty());

        session.release_and_wait();
        assert_eq!(recorder.records(), vec![Record::Teardown]);
    }

    #[test]
    fn builds_openai_session_without_network() {
        let session = SessionBuilder::openai("sk-test", "http://127.0.0.1:9/v1", "gpt-4o-mini")
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(session.config().model(), "gpt-4o-mini");
        assert!(!session.id().is_empty());
        session.release();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn default_handler_accepts_messages() {
        let provider = Arc::new(MockProviderClient::new());
        provider.queue_response(ProviderResponse::text("hi"));
        let session = SessionBuilder::new(test_config())
            .with_provider(Arc::clone(&provider))
            .build()
            .unwrap();

        session.send_message("hello").unwrap();
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while session.state() != SessionState::Idle || provider.recorded_requests().is_empty() {
            assert!(tokio::time::Instant::now() < deadline, "session never went idle");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(session.conversation().len(), 2);
    }
}
