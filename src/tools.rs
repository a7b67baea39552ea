//! Tool execution
//!
//! The session runs approved tool calls through a [`ToolExecutor`]. Hosts can
//! implement the trait directly or collect [`Tool`]s in a [`ToolRegistry`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::conversation::ToolCallRequest;
use crate::error::ToolError;
use crate::provider::ToolDefinition;

/// Result from tool execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolOutput {
    pub success: bool,
    pub output: String,
}

impl ToolOutput {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            output: message.into(),
        }
    }
}

/// Per-call context handed to a tool.
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// Fires when the session is released mid-call
    pub cancel: CancellationToken,
    pub session_id: String,
}

impl ToolContext {
    pub fn new(cancel: CancellationToken, session_id: impl Into<String>) -> Self {
        Self {
            cancel,
            session_id: session_id.into(),
        }
    }
}

/// Runs approved tool calls for a session.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Execute an approved call.
    async fn execute(&self, call: &ToolCallRequest, ctx: ToolContext) -> Result<ToolOutput, ToolError>;

    /// Tools advertised to the provider.
    fn definitions(&self) -> Vec<ToolDefinition>;

    /// Human-readable description of what `call` will do, if the executor
    /// can phrase it better than the provider did.
    fn describe(&self, _call: &ToolCallRequest) -> Option<String> {
        None
    }
}

#[async_trait]
impl<T: ToolExecutor + ?Sized> ToolExecutor for Arc<T> {
    async fn execute(&self, call: &ToolCallRequest, ctx: ToolContext) -> Result<ToolOutput, ToolError> {
        (**self).execute(call, ctx).await
    }

    fn definitions(&self) -> Vec<ToolDefinition> {
        (**self).definitions()
    }

    fn describe(&self, call: &ToolCallRequest) -> Option<String> {
        (**self).describe(call)
    }
}

/// Executor with no tools. Every call is answered with a not-found error.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTools;

#[async_trait]
impl ToolExecutor for NoTools {
    async fn execute(&self, call: &ToolCallRequest, _ctx: ToolContext) -> Result<ToolOutput, ToolError> {
        Err(ToolError::not_found(&call.name))
    }

    fn definitions(&self) -> Vec<ToolDefinition> {
        Vec::new()
    }
}

/// A single named tool
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name
    fn name(&self) -> &str;

    /// Tool description for the provider
    fn description(&self) -> String;

    /// JSON schema for tool input
    fn input_schema(&self) -> Value;

    /// Approval prompt for a call with `input`.
    fn describe(&self, _input: &Value) -> String {
        self.name().to_string()
    }

    /// Tools that run long should watch `ctx.cancel`.
    async fn run(&self, input: Value, ctx: ToolContext) -> ToolOutput;
}

/// Collection of tools available to a session
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool. Duplicate names are ignored.
    #[must_use]
    pub fn with_tool(mut self, tool: impl Tool + 'static) -> Self {
        self.register(Arc::new(tool));
        self
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        if self.get(tool.name()).is_some() {
            tracing::warn!(tool = %tool.name(), "Tool already registered, ignoring duplicate");
            return;
        }
        self.tools.push(tool);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[async_trait]
impl ToolExecutor for ToolRegistry {
    async fn execute(&self, call: &ToolCallRequest, ctx: ToolContext) -> Result<ToolOutput, ToolError> {
        let tool = self.get(&call.name).ok_or_else(|| ToolError::not_found(&call.name))?;
        Ok(tool.run(call.arguments.clone(), ctx).await)
    }

    fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description(),
                input_schema: t.input_schema(),
            })
            .collect()
    }

    fn describe(&self, call: &ToolCallRequest) -> Option<String> {
        self.get(&call.name).map(|t| t.describe(&call.arguments))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ToolErrorKind;
    use serde_json::json;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &'static str {
            "echo"
        }

        fn description(&self) -> String {
            "Echo the input text".to_string()
        }

        fn input_schema(&self) -> Value {
            json!({
                "type": "object",
                "required": ["text"],
                "properties": { "text": { "type": "string" } }
            })
        }

        fn describe(&self, input: &Value) -> String {
            format!("echo {}", input["text"].as_str().unwrap_or_default())
        }

        async fn run(&self, input: Value, _ctx: ToolContext) -> ToolOutput {
            match input["text"].as_str() {
                Some(text) => ToolOutput::success(text),
                None => ToolOutput::error("missing text"),
            }
        }
    }

    fn ctx() -> ToolContext {
        ToolContext::new(CancellationToken::new(), "test-session")
    }

    #[tokio::test]
    async fn registry_runs_named_tool() {
        let registry = ToolRegistry::new().with_tool(EchoTool);
        let call = ToolCallRequest::new("c1", "echo", "echo", "testing")
            .with_arguments(json!({ "text": "hi" }));

        assert_eq!(registry.describe(&call).as_deref(), Some("echo hi"));
        let output = registry.execute(&call, ctx()).await.unwrap();
        assert_eq!(output, ToolOutput::success("hi"));
    }

    #[tokio::test]
    async fn unknown_tool_is_not_found() {
        let registry = ToolRegistry::new().with_tool(EchoTool);
        let call = ToolCallRequest::new("c1", "rm", "rm", "testing");
        let err = registry.execute(&call, ctx()).await.unwrap_err();
        assert_eq!(err.kind, ToolErrorKind::NotFound);
        assert_eq!(err.reason, "unknown tool: rm");

        let err = NoTools.execute(&call, ctx()).await.unwrap_err();
        assert_eq!(err.kind, ToolErrorKind::NotFound);
    }

    #[test]
    fn duplicate_registration_is_ignored() {
        let registry = ToolRegistry::new().with_tool(EchoTool).with_tool(EchoTool);
        assert_eq!(registry.names(), vec!["echo"]);
        let defs = registry.definitions();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].description, "Echo the input text");
    }
}
