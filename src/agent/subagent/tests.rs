use super::*;
use crate::agent::tools::base::Tool;
use crate::config::SubAgentConfig;
use crate::providers::base::{ChatRequest, LLMResponse, ToolCallRequest};
use crate::safety::tool_policy::{ToolApprover, ToolPolicy};
use crate::scratchpad::ScratchpadConfig;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex as StdMutex;

struct MockProvider {
    responses: StdMutex<VecDeque<LLMResponse>>,
}

fn text_response(content: &str) -> LLMResponse {
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

fn tool_call_response(name: &str, args: serde_json::Value) -> LLMResponse {
    LLMResponse {
        content: None,
        tool_calls: vec![ToolCallRequest {
            id: "call-1".to_string(),
            name: name.to_string(),
            arguments: args,
        }],
        reasoning_content: None,
        input_tokens: Some(10),
        output_tokens: Some(5),
        cache_creation_input_tokens: None,
        cache_read_input_tokens: None,
    }
}

impl MockProvider {
    fn with_responses(responses: Vec<LLMResponse>) -> Self {
        Self {
            responses: StdMutex::new(VecDeque::from(responses)),
        }
    }
}

#[async_trait]
impl LLMProvider for MockProvider {
    async fn chat(&self, _req: ChatRequest<'_>) -> anyhow::Result<LLMResponse> {
        let mut guard = self.responses.lock().unwrap();
        Ok(guard.pop_front().unwrap_or_else(|| text_response("default")))
    }

    fn default_model(&self) -> &str {
        "mock"
    }
}

struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
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

struct WriteFileStubTool;

#[async_trait]
impl Tool for WriteFileStubTool {
    fn name(&self) -> &str {
        "write_file"
    }
    fn description(&self) -> &str {
        "Pretends to write a file."
    }
    fn parameters(&self) -> Value {
        serde_json::json!({"type": "object", "properties": {"path": {"type": "string"}}})
    }
    async fn execute(&self, params: Value, _ctx: &ExecutionContext) -> anyhow::Result<ToolResult> {
        Ok(ToolResult::new(format!("wrote {}", params["path"].as_str().unwrap_or(""))))
    }
}

fn make_context(provider: Arc<dyn LLMProvider>, config: SubAgentConfig) -> SubAgentContext {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(EchoTool));
    registry.register(Arc::new(WriteFileStubTool));

    SubAgentContext {
        provider,
        registry: Arc::new(registry),
        approver: Arc::new(ToolApprover::new(ToolPolicy::new())),
        conflicts: Arc::new(ConflictDetector::new()),
        scratchpad: Arc::new(Scratchpad::new(ScratchpadConfig::default())),
        config,
    }
}

fn admin_auth() -> AuthContext {
    AuthContext {
        capabilities: vec!["admin".to_string()],
    }
}

#[tokio::test]
async fn run_returns_final_text_when_no_tool_calls() {
    let provider = Arc::new(MockProvider::with_responses(vec![text_response("all done")]));
    let ctx = make_context(provider, SubAgentConfig::default());

    let result = run(
        &ctx,
        "say hi",
        "mock-model",
        "test",
        "chat-1",
        &admin_auth(),
        &SubAgentOverrides::default(),
    )
    .await
    .unwrap();

    assert_eq!(result.raw, "all done");
    assert_eq!(result.tool_calls, 0);
    assert_eq!(result.model, "mock-model");
    assert!(ctx.scratchpad.inspect(&result.raw_key).is_some());
}

#[tokio::test]
async fn run_executes_allowed_tool_then_returns_final_text() {
    let provider = Arc::new(MockProvider::with_responses(vec![
        tool_call_response("echo", serde_json::json!({"text": "ping"})),
        text_response("finished using echo"),
    ]));
    let ctx = make_context(provider, SubAgentConfig::default());

    let result = run(
        &ctx,
        "use echo",
        "mock-model",
        "test",
        "chat-1",
        &admin_auth(),
        &SubAgentOverrides::default(),
    )
    .await
    .unwrap();

    assert_eq!(result.tool_calls, 1);
    assert_eq!(result.raw, "finished using echo");
}

#[tokio::test]
async fn run_rejects_tool_outside_config_allowlist() {
    let provider = Arc::new(MockProvider::with_responses(vec![
        tool_call_response("write_file", serde_json::json!({"path": "/tmp/x"})),
        text_response("acknowledged the rejection"),
    ]));
    let mut config = SubAgentConfig::default();
    config.allowed_tools = vec!["echo".to_string()];
    let ctx = make_context(provider, config);

    let result = run(
        &ctx,
        "try to write",
        "mock-model",
        "test",
        "chat-1",
        &admin_auth(),
        &SubAgentOverrides::default(),
    )
    .await
    .unwrap();

    assert_eq!(result.raw, "acknowledged the rejection");
}

#[tokio::test]
async fn run_rejects_tool_outside_task_override_allowlist() {
    let provider = Arc::new(MockProvider::with_responses(vec![
        tool_call_response("write_file", serde_json::json!({"path": "/tmp/x"})),
        text_response("acknowledged the rejection"),
    ]));
    let ctx = make_context(provider, SubAgentConfig::default());
    let overrides = SubAgentOverrides {
        tools: Some(vec!["echo".to_string()]),
        ..Default::default()
    };

    let result = run(
        &ctx,
        "try to write",
        "mock-model",
        "test",
        "chat-1",
        &admin_auth(),
        &overrides,
    )
    .await
    .unwrap();

    assert_eq!(result.raw, "acknowledged the rejection");
}

#[tokio::test]
async fn run_honors_system_prompt_and_max_iterations_overrides() {
    let responses: Vec<LLMResponse> = (0..5)
        .map(|_| tool_call_response("echo", serde_json::json!({"text": "again"})))
        .collect();
    let provider = Arc::new(MockProvider::with_responses(responses));
    let ctx = make_context(provider, SubAgentConfig::default());
    let overrides = SubAgentOverrides {
        system_prompt: Some("You only ever say no.".to_string()),
        max_iterations: Some(1),
        ..Default::default()
    };

    let result = run(
        &ctx,
        "loop",
        "mock-model",
        "test",
        "chat-1",
        &admin_auth(),
        &overrides,
    )
    .await
    .unwrap();

    assert_eq!(result.raw, "Task did not complete within the iteration budget.");
}

#[tokio::test]
async fn run_stops_at_max_iterations_when_tools_loop_forever() {
    let responses: Vec<LLMResponse> = (0..5)
        .map(|_| tool_call_response("echo", serde_json::json!({"text": "again"})))
        .collect();
    let provider = Arc::new(MockProvider::with_responses(responses));
    let mut config = SubAgentConfig::default();
    config.max_iterations = 3;
    let ctx = make_context(provider, config);

    let result = run(
        &ctx,
        "loop",
        "mock-model",
        "test",
        "chat-1",
        &admin_auth(),
        &SubAgentOverrides::default(),
    )
    .await
    .unwrap();

    assert_eq!(result.raw, "Task did not complete within the iteration budget.");
}

#[test]
fn allowed_tool_names_excludes_tools_outside_config_allowlist() {
    let provider = Arc::new(MockProvider::with_responses(vec![]));
    let mut config = SubAgentConfig::default();
    config.allowed_tools = vec!["echo".to_string()];
    let ctx = make_context(provider, config);

    let allowed = allowed_tool_names(&ctx, &admin_auth(), &SubAgentOverrides::default());
    assert!(allowed.contains("echo"));
    assert!(!allowed.contains("write_file"));
}

#[test]
fn allowed_tool_names_denies_everything_without_capability_grant() {
    let provider = Arc::new(MockProvider::with_responses(vec![]));
    let ctx = make_context(provider, SubAgentConfig::default());
    let no_caps = AuthContext { capabilities: vec![] };

    let allowed = allowed_tool_names(&ctx, &no_caps, &SubAgentOverrides::default());
    assert!(allowed.is_empty());
}

#[test]
fn allowed_tool_names_narrows_with_task_override_but_never_expands() {
    let provider = Arc::new(MockProvider::with_responses(vec![]));
    let ctx = make_context(provider, SubAgentConfig::default());

    let narrowing = SubAgentOverrides {
        tools: Some(vec!["echo".to_string()]),
        ..Default::default()
    };
    let allowed = allowed_tool_names(&ctx, &admin_auth(), &narrowing);
    assert!(allowed.contains("echo"));
    assert!(!allowed.contains("write_file"));

    let mut config = SubAgentConfig::default();
    config.allowed_tools = vec!["echo".to_string()];
    let provider = Arc::new(MockProvider::with_responses(vec![]));
    let ctx = make_context(provider, config);
    let widening_attempt = SubAgentOverrides {
        tools: Some(vec!["echo".to_string(), "write_file".to_string()]),
        ..Default::default()
    };
    let allowed = allowed_tool_names(&ctx, &admin_auth(), &widening_attempt);
    assert!(allowed.contains("echo"));
    assert!(!allowed.contains("write_file"));
}

#[test]
fn build_system_prompt_includes_the_task() {
    let prompt = build_system_prompt("investigate the failing build");
    assert!(prompt.contains("investigate the failing build"));
}
