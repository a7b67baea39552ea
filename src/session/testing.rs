//! Test doubles for driving a full session

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{Session, SessionBuilder};
use crate::approval::ToolApprovalGate;
use crate::callbacks::SessionHandler;
use crate::config::SessionConfig;
use crate::conversation::{ToolCallRequest, TranscriptSource};
use crate::error::{FailureKind, ProviderError, SessionFailure, ToolError};
use crate::provider::{ProviderClient, ProviderRequest, ProviderResponse, ToolDefinition};
use crate::tools::{ToolContext, ToolExecutor, ToolOutput};

/// Build a session against mocks, bypassing the HTTP provider.
pub fn session_with(
    provider: impl ProviderClient + 'static,
    tools: impl ToolExecutor + 'static,
    handler: RecordingHandler,
) -> Session {
    SessionBuilder::new(test_config())
        .with_provider(provider)
        .with_tools(tools)
        .callbacks(handler)
        .build()
        .unwrap()
}

pub fn test_config() -> SessionConfig {
    SessionConfig::openai("test-key", "https://llm.invalid/v1", "mock-model").unwrap()
}

// ============================================================================
// Provider
// ============================================================================

/// Provider that replays queued results and records every request
#[derive(Default)]
pub struct MockProviderClient {
    queue: Mutex<VecDeque<Result<ProviderResponse, ProviderError>>>,
    requests: Mutex<Vec<ProviderRequest>>,
    delay: Option<Duration>,
}

impl MockProviderClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn queue_response(&self, response: ProviderResponse) {
        self.queue.lock().unwrap().push_back(Ok(response));
    }

    pub fn queue_error(&self, error: ProviderError) {
        self.queue.lock().unwrap().push_back(Err(error));
    }

    pub fn recorded_requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProviderClient for MockProviderClient {
    async fn complete(&self, request: &ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.queue.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Err(ProviderError::unknown("no queued response")))
    }

    fn model_id(&self) -> &str {
        "mock-model"
    }
}

// ============================================================================
// Tools
// ============================================================================

/// Tool executor with canned outputs per tool name
#[derive(Default)]
pub struct MockToolExecutor {
    outputs: BTreeMap<String, ToolOutput>,
    executions: Mutex<Vec<(String, Value)>>,
}

impl MockToolExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tool(mut self, name: &str, output: ToolOutput) -> Self {
        self.outputs.insert(name.to_string(), output);
        self
    }

    pub fn recorded_executions(&self) -> Vec<(String, Value)> {
        self.executions.lock().unwrap().clone()
    }
}

#[async_trait]
impl ToolExecutor for MockToolExecutor {
    async fn execute(&self, call: &ToolCallRequest, _ctx: ToolContext) -> Result<ToolOutput, ToolError> {
        let output = self
            .outputs
            .get(&call.name)
            .cloned()
            .ok_or_else(|| ToolError::not_found(&call.name))?;
        self.executions
            .lock()
            .unwrap()
            .push((call.name.clone(), call.arguments.clone()));
        Ok(output)
    }

    fn definitions(&self) -> Vec<ToolDefinition> {
        self.outputs
            .keys()
            .map(|name| ToolDefinition {
                name: name.clone(),
                description: format!("mock {name}"),
                input_schema: json!({ "type": "object", "properties": {} }),
            })
            .collect()
    }
}

// ============================================================================
// Handler
// ============================================================================

/// What the handler saw, in delivery order
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Transcript(TranscriptSource, String),
    ToolRequest {
        description: String,
        justification: String,
    },
    Error(FailureKind),
    Idle,
    Teardown,
}

/// How the handler answers approval gates
#[derive(Debug, Clone, Copy)]
pub enum GatePolicy {
    Approve,
    Reject,
    /// Keep the gate for the test to resolve
    Hold,
    /// Drop the gate unresolved
    Drop,
}

#[derive(Default)]
struct Shared {
    records: Mutex<Vec<Record>>,
    gates: Mutex<Vec<ToolApprovalGate>>,
    in_callback: AtomicBool,
    overlapped: AtomicBool,
}

pub struct RecordingHandler {
    shared: Arc<Shared>,
    policy: GatePolicy,
    delay: Option<Duration>,
}

impl RecordingHandler {
    pub fn new(policy: GatePolicy) -> (Self, Recorder) {
        let shared = Arc::new(Shared::default());
        let handler = Self {
            shared: Arc::clone(&shared),
            policy,
            delay: None,
        };
        (handler, Recorder { shared })
    }

    /// Sleep inside every callback to widen any overlap window.
    pub fn with_callback_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn record(&self, record: Record) {
        if self.shared.in_callback.swap(true, Ordering::SeqCst) {
            self.shared.overlapped.store(true, Ordering::SeqCst);
        }
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        self.shared.records.lock().unwrap().push(record);
        self.shared.in_callback.store(false, Ordering::SeqCst);
    }
}

impl SessionHandler for RecordingHandler {
    fn on_idle(&mut self) {
        self.record(Record::Idle);
    }

    fn on_transcript(&mut self, text: &str, source: TranscriptSource) {
        self.record(Record::Transcript(source, text.to_string()));
    }

    fn on_tool_call_request(&mut self, gate: ToolApprovalGate) {
        self.record(Record::ToolRequest {
            description: gate.description().to_string(),
            justification: gate.justification().to_string(),
        });
        match self.policy {
            GatePolicy::Approve => gate.approve(),
            GatePolicy::Reject => gate.reject(),
            GatePolicy::Hold => self.shared.gates.lock().unwrap().push(gate),
            GatePolicy::Drop => drop(gate),
        }
    }

    fn on_error(&mut self, failure: &SessionFailure) {
        self.record(Record::Error(failure.kind));
    }

    fn on_teardown(&mut self) {
        self.record(Record::Teardown);
    }
}

/// Test-side view of a [`RecordingHandler`]
#[derive(Clone)]
pub struct Recorder {
    shared: Arc<Shared>,
}

impl Recorder {
    pub fn records(&self) -> Vec<Record> {
        self.shared.records.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&Record) -> bool) -> usize {
        self.shared.records.lock().unwrap().iter().filter(|r| pred(r)).count()
    }

    /// Poll until `pred` holds over the records, or `timeout` passes.
    pub async fn wait_until(&self, timeout: Duration, pred: impl Fn(&[Record]) -> bool) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if pred(&self.shared.records.lock().unwrap()) {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    pub async fn wait_for_idle(&self, count: usize, timeout: Duration) -> bool {
        self.wait_until(timeout, |records| {
            records.iter().filter(|r| **r == Record::Idle).count() >= count
        })
        .await
    }

    /// Oldest gate held under [`GatePolicy::Hold`].
    pub fn take_gate(&self) -> Option<ToolApprovalGate> {
        let mut gates = self.shared.gates.lock().unwrap();
        if gates.is_empty() {
            None
        } else {
            Some(gates.remove(0))
        }
    }

    pub fn overlapped(&self) -> bool {
        self.shared.overlapped.load(Ordering::SeqCst)
    }
}
