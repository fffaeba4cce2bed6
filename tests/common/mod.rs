// Shared scenario-test helpers — not every item is used by every test binary.
#![allow(unused)]

use async_trait::async_trait;
use buckley_core::agent::subagent::SubAgentContext;
use buckley_core::agent::tools::{ExecutionContext, Tool, ToolRegistry, ToolResult};
use buckley_core::bus::MessageBus;
use buckley_core::conflict::ConflictDetector;
use buckley_core::config::{CircuitConfigDecl, DispatcherConfig, SubAgentConfig};
use buckley_core::dispatcher::Dispatcher;
use buckley_core::model_selector::ModelSelector;
use buckley_core::providers::base::{ChatRequest, LLMProvider, LLMResponse, ToolCallRequest};
use buckley_core::safety::tool_policy::{AuthContext, ToolApprover, ToolPolicy};
use buckley_core::scratchpad::{Scratchpad, ScratchpadConfig};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// A scripted provider: pops queued responses in order, falling back to a
/// plain text reply once the queue is drained.
pub struct ScriptedProvider {
    responses: Mutex<VecDeque<LLMResponse>>,
}

impl ScriptedProvider {
    pub fn new(responses: Vec<LLMResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
        }
    }
}

#[async_trait]
impl LLMProvider for ScriptedProvider {
    async fn chat(&self, _req: ChatRequest<'_>) -> anyhow::Result<LLMResponse> {
        let mut guard = self.responses.lock().unwrap();
        Ok(guard.pop_front().unwrap_or_else(|| text_response("done")))
    }

    fn default_model(&self) -> &str {
        "mock"
    }
}

pub fn text_response(content: &str) -> LLMResponse {
    LLMResponse {
        content: Some(content.to_string()),
        tool_calls: vec![],
        reasoning_content: None,
        input_tokens: Some(10),
        output_tokens: Some(5),
        cache_creation_input_tokens: None,
        cache_read_input_tokens: None,
    }
}

pub fn tool_call_response(name: &str, arguments: Value) -> LLMResponse {
    LLMResponse {
        content: None,
        tool_calls: vec![ToolCallRequest {
            id: format!("call-{name}"),
            name: name.to_string(),
            arguments,
        }],
        reasoning_content: None,
        input_tokens: Some(20),
        output_tokens: Some(10),
        cache_creation_input_tokens: None,
        cache_read_input_tokens: None,
    }
}

pub fn fast_circuit() -> CircuitConfigDecl {
    CircuitConfigDecl {
        max_failures: 3,
        timeout_secs: 1,
        success_threshold: 2,
        max_recent_errors: 5,
    }
}

/// A `Dispatcher` wired against an in-memory scratchpad and an empty tool
/// registry, backed by `provider` for every sub-agent call it spawns.
pub fn make_dispatcher(provider: impl LLMProvider + 'static, bus: Arc<MessageBus>) -> Arc<Dispatcher> {
    make_dispatcher_with_registry(provider, bus, ToolRegistry::new())
}

/// Same as `make_dispatcher`, but lets the caller populate the tool registry
/// the spawned sub-agents see — for scenarios that need real tool names to
/// assert an allowlist override actually restricts access.
pub fn make_dispatcher_with_registry(
    provider: impl LLMProvider + 'static,
    bus: Arc<MessageBus>,
    registry: ToolRegistry,
) -> Arc<Dispatcher> {
    let sub_agent_ctx = Arc::new(SubAgentContext {
        provider: Arc::new(provider),
        registry: Arc::new(registry),
        approver: Arc::new(ToolApprover::new(ToolPolicy::new())),
        conflicts: Arc::new(ConflictDetector::new()),
        scratchpad: Arc::new(Scratchpad::new(ScratchpadConfig::default())),
        config: SubAgentConfig::default(),
    });
    Arc::new(Dispatcher::new(
        sub_agent_ctx,
        ModelSelector::new(vec!["mock-model".to_string()]),
        bus,
        &DispatcherConfig {
            circuit: fast_circuit(),
            ..DispatcherConfig::default()
        },
    ))
}

/// A tool that just echoes its `text` argument — used to populate a registry
/// with a named, harmless, callable tool in scenario tests.
pub struct NamedEchoTool {
    name: String,
}

impl NamedEchoTool {
    pub fn new(name: &str) -> Self {
        Self { name: name.to_string() }
    }
}

#[async_trait]
impl Tool for NamedEchoTool {
    fn name(&self) -> &str {
        &self.name
    }
    fn description(&self) -> &str {
        "Echoes back its input."
    }
    fn parameters(&self) -> Value {
        serde_json::json!({"type": "object", "properties": {"text": {"type": "string"}}})
    }
    async fn execute(&self, params: Value, _ctx: &ExecutionContext) -> anyhow::Result<ToolResult> {
        Ok(ToolResult::new(params["text"].as_str().unwrap_or("").to_string()))
    }
}

pub fn admin_auth() -> AuthContext {
    AuthContext {
        capabilities: vec!["admin".to_string()],
    }
}
