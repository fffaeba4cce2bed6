//! Coordinator Runtime (§4.10): the top-level loop that decomposes a task,
//! delegates sub-tasks through the `Dispatcher`, and accumulates a final
//! answer from the scratchpad the sub-agents populate.

use crate::config::CoordinatorConfig;
use crate::agent::subagent::SubAgentOverrides;
use crate::dispatcher::{BatchResult, DispatchTask, Dispatcher};
use crate::providers::base::{ChatRequest, LLMProvider, Message, ToolDefinition};
use crate::rag::ScratchpadRag;
use crate::safety::tool_policy::AuthContext;
use crate::scratchpad::{EntryType, Scratchpad, SummaryView, WriteRequest};
use crate::bus::MessageBus;
use anyhow::Result;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

const COORDINATOR_MAX_TOKENS: u32 = 4096;
const COORDINATOR_TEMPERATURE: f32 = 0.2;
const SCRATCHPAD_CONTEXT_TOP_K: usize = 8;

/// Shared, immutable wiring the coordinator loop is built from.
pub struct CoordinatorContext {
    pub provider: Arc<dyn LLMProvider>,
    pub dispatcher: Arc<Dispatcher>,
    pub scratchpad: Arc<Scratchpad>,
    /// Semantic search is optional: without an `EmbeddingService` configured,
    /// `search_scratchpad` degrades to an explicit error rather than a silent
    /// fallback to keyword listing.
    pub rag: Option<Arc<ScratchpadRag>>,
    pub bus: Arc<MessageBus>,
    pub config: CoordinatorConfig,
}

/// The coordinator's accumulated answer, updated in-loop by `set_answer`.
#[derive(Debug, Clone, Default)]
pub struct Answer {
    pub content: String,
    pub ready: bool,
    pub confidence: f32,
    pub artifacts: Vec<String>,
    pub next_steps: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// `set_answer` marked the answer ready and confidence cleared the threshold.
    Ready,
    MaxIterations,
    TokenBudget,
    WallTime,
    /// The model stopped calling tools without ever calling `set_answer`.
    NoToolCalls,
    /// The model call itself failed (after `RetryStrategy` exhausted its
    /// retries). `CoordinatorResult.error` carries the cause; `answer`
    /// still reflects whatever progress was made before the failure.
    ProviderError,
}

#[derive(Debug, Clone)]
pub struct CoordinatorResult {
    pub answer: Answer,
    pub iterations: usize,
    pub tokens_used: u64,
    pub duration: Duration,
    pub stop_reason: StopReason,
    pub error: Option<String>,
}

/// Run the coordinator loop to completion against one top-level task.
///
/// Errors from the model provider do not propagate out of this function:
/// per the crate's error-handling design, the top-level run always returns
/// the partial `Answer` alongside any error so callers can surface progress
/// instead of losing it to a hard failure.
pub async fn run(
    ctx: &CoordinatorContext,
    task: &str,
    origin_channel: &str,
    origin_chat_id: &str,
    auth: &AuthContext,
) -> Result<CoordinatorResult> {
    let started = Instant::now();
    let deadline = started + ctx.config.max_wall_time();
    let tool_defs = tool_definitions();

    let mut messages = vec![
        Message::system(build_system_prompt(task)),
        Message::user(task.to_string()),
    ];
    let mut answer = Answer::default();
    let mut tokens_used = 0u64;
    let mut iteration = 0usize;
    let mut error: Option<String> = None;

    let stop_reason = loop {
        if iteration >= ctx.config.max_iterations {
            break StopReason::MaxIterations;
        }
        if Instant::now() >= deadline {
            break StopReason::WallTime;
        }
        iteration += 1;

        let response = match ctx
            .provider
            .chat_with_retry(
                ChatRequest {
                    messages: messages.clone(),
                    tools: Some(tool_defs.clone()),
                    model: Some(&ctx.config.model),
                    max_tokens: COORDINATOR_MAX_TOKENS,
                    temperature: COORDINATOR_TEMPERATURE,
                    tool_choice: Some("auto".to_string()),
                    response_format: None,
                },
                None,
            )
            .await
        {
            Ok(response) => response,
            Err(e) => {
                error = Some(e.to_string());
                break StopReason::ProviderError;
            }
        };

        tokens_used += response.input_tokens.unwrap_or(0) + response.output_tokens.unwrap_or(0);

        if !response.has_tool_calls() {
            if let Some(content) = response.content {
                answer.content = content;
                answer.ready = true;
            }
            break StopReason::NoToolCalls;
        }

        messages.push(Message::assistant_with_thinking(
            response.content.clone().unwrap_or_default(),
            Some(response.tool_calls.clone()),
            response.reasoning_content.clone(),
        ));

        for tc in &response.tool_calls {
            let (content, is_error) = dispatch_tool(
                ctx,
                &tc.name,
                &tc.arguments,
                origin_channel,
                origin_chat_id,
                auth,
                &mut answer,
            )
            .await;
            messages.push(Message::tool_result(tc.id.clone(), content, is_error));
        }

        publish_iteration_event(ctx, iteration, &answer, tokens_used);

        if answer.ready && answer.confidence >= ctx.config.confidence_threshold {
            break StopReason::Ready;
        }

        // The tool calls for this iteration always run to completion even if
        // they push tokens_used past budget; only once the iteration is done
        // do we force the answer closed rather than spend another model call.
        if ctx.config.max_tokens_budget > 0 && tokens_used >= ctx.config.max_tokens_budget {
            answer.ready = true;
            break StopReason::TokenBudget;
        }

        messages.push(Message::user(scratchpad_context_note(ctx, task)));
    };

    answer.confidence = answer.confidence.clamp(0.0, 1.0);

    Ok(CoordinatorResult {
        answer,
        iterations: iteration,
        tokens_used,
        duration: started.elapsed(),
        stop_reason,
        error,
    })
}

/// Dispatch one coordinator tool call. These are handled directly rather
/// than through the `ToolRegistry`: they operate on coordinator-level state
/// (the scratchpad, the dispatcher, the in-loop answer) instead of the
/// workspace sub-agents touch, so they carry no lock requirement.
async fn dispatch_tool(
    ctx: &CoordinatorContext,
    name: &str,
    args: &Value,
    origin_channel: &str,
    origin_chat_id: &str,
    auth: &AuthContext,
    answer: &mut Answer,
) -> (String, bool) {
    match name {
        "delegate" => {
            let Some(task) = args.get("task").and_then(Value::as_str) else {
                return (missing_arg("task"), true);
            };
            let batch = vec![DispatchTask {
                id: None,
                task: task.to_string(),
                origin_channel: origin_channel.to_string(),
                origin_chat_id: origin_chat_id.to_string(),
                auth: auth.clone(),
                overrides: overrides_from_args(args),
            }];
            let (mut results, error) = ctx.dispatcher.execute(batch, false).await;
            match results.pop() {
                Some(result) => batch_result_to_tool_output(&result),
                None => (
                    error.unwrap_or_else(|| "sub-agent produced no result".to_string()),
                    true,
                ),
            }
        }
        "delegate_batch" => {
            let Some(tasks) = args.get("tasks").and_then(Value::as_array) else {
                return (missing_arg("tasks"), true);
            };
            let parallel = args.get("parallel").and_then(Value::as_bool).unwrap_or(true);
            let batch: Vec<DispatchTask> = tasks
                .iter()
                .filter_map(|entry| {
                    // Each entry is either a bare task string or a SubTask dict
                    // carrying its own tools/system_prompt/max_iterations overrides.
                    let (task_text, overrides) = match entry {
                        Value::String(s) => (s.clone(), SubAgentOverrides::default()),
                        Value::Object(_) => (
                            entry.get("task").and_then(Value::as_str)?.to_string(),
                            overrides_from_args(entry),
                        ),
                        _ => return None,
                    };
                    Some(DispatchTask {
                        id: None,
                        task: task_text,
                        origin_channel: origin_channel.to_string(),
                        origin_chat_id: origin_chat_id.to_string(),
                        auth: auth.clone(),
                        overrides,
                    })
                })
                .collect();
            if batch.is_empty() {
                return ("\"tasks\" must contain at least one task".to_string(), true);
            }
            let (results, error) = ctx.dispatcher.execute(batch, parallel).await;
            let items: Vec<Value> = results.iter().map(batch_result_to_json).collect();
            (json!({ "results": items }).to_string(), error.is_some())
        }
        "inspect" => {
            let Some(key) = args.get("key").and_then(Value::as_str) else {
                return (missing_arg("key"), true);
            };
            match ctx.scratchpad.inspect(key) {
                Some(view) => (summary_view_to_json(&view).to_string(), false),
                None => (format!("no scratchpad entry for key '{}'", key), true),
            }
        }
        "inspect_raw" => {
            let Some(key) = args.get("key").and_then(Value::as_str) else {
                return (missing_arg("key"), true);
            };
            let max_length = args
                .get("max_length")
                .and_then(Value::as_u64)
                .unwrap_or(10_000) as usize;
            match ctx.scratchpad.inspect_raw(key) {
                Some(view) => {
                    let text = String::from_utf8_lossy(&view.raw);
                    let truncated = crate::utils::truncate_chars(&text, max_length, "...");
                    (
                        json!({
                            "key": view.key,
                            "entry_type": view.entry_type.as_str(),
                            "summary": view.summary,
                            "raw": truncated,
                        })
                        .to_string(),
                        false,
                    )
                }
                None => (format!("no scratchpad entry for key '{}'", key), true),
            }
        }
        "list_scratchpad" => {
            let limit = args.get("limit").and_then(Value::as_u64).unwrap_or(20) as usize;
            let entry_type = args
                .get("type")
                .and_then(Value::as_str)
                .and_then(EntryType::parse);
            let views = match entry_type {
                Some(t) => ctx.scratchpad.list_summaries_by_type(t, limit),
                None => ctx.scratchpad.list_summaries(limit),
            };
            let items: Vec<Value> = views.iter().map(summary_view_to_json).collect();
            (json!({ "entries": items }).to_string(), false)
        }
        "search_scratchpad" => {
            let Some(query) = args.get("query").and_then(Value::as_str) else {
                return (missing_arg("query"), true);
            };
            let Some(rag) = &ctx.rag else {
                return (
                    "semantic search is not configured for this runtime".to_string(),
                    true,
                );
            };
            let entry_type = args
                .get("type")
                .and_then(Value::as_str)
                .and_then(EntryType::parse);
            let limit = args.get("limit").and_then(Value::as_u64).unwrap_or(5) as usize;
            let hits = rag.search(&ctx.scratchpad, query, entry_type, limit);
            let items: Vec<Value> = hits
                .iter()
                .map(|(view, score)| {
                    let mut v = summary_view_to_json(view);
                    v["score"] = json!(score);
                    v
                })
                .collect();
            (json!({ "results": items }).to_string(), false)
        }
        "record_strategy" => {
            let (Some(category), Some(summary)) = (
                args.get("category").and_then(Value::as_str),
                args.get("summary").and_then(Value::as_str),
            ) else {
                return (missing_arg("category/summary"), true);
            };
            let details = args.get("details").and_then(Value::as_str).unwrap_or_default();
            let rationale = args
                .get("rationale")
                .and_then(Value::as_str)
                .unwrap_or_default();
            let mut metadata: HashMap<String, Value> = HashMap::new();
            metadata.insert("category".to_string(), json!(category));
            if !rationale.is_empty() {
                metadata.insert("rationale".to_string(), json!(rationale));
            }
            let raw = if details.is_empty() {
                summary.to_string()
            } else {
                format!("{}\n\n{}", summary, details)
            };
            match ctx.scratchpad.write(WriteRequest {
                key: None,
                entry_type: EntryType::Strategy,
                raw: raw.into_bytes(),
                summary: Some(summary.to_string()),
                metadata,
                created_by: "coordinator".to_string(),
            }) {
                Ok(key) => (json!({ "key": key }).to_string(), false),
                Err(e) => (e.to_string(), true),
            }
        }
        "set_answer" => {
            let Some(content) = args.get("content").and_then(Value::as_str) else {
                return (missing_arg("content"), true);
            };
            answer.content = content.to_string();
            answer.ready = args.get("ready").and_then(Value::as_bool).unwrap_or(false);
            if let Some(c) = args.get("confidence").and_then(Value::as_f64) {
                answer.confidence = c as f32;
            }
            if let Some(a) = args.get("artifacts").and_then(Value::as_array) {
                answer.artifacts = a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect();
            }
            if let Some(n) = args.get("next_steps").and_then(Value::as_array) {
                answer.next_steps = n.iter().filter_map(|v| v.as_str().map(str::to_string)).collect();
            }
            (json!({ "ok": true, "ready": answer.ready }).to_string(), false)
        }
        other => (format!("unknown coordinator tool '{}'", other), true),
    }
}

/// Read `delegate`'s optional `tools`/`system_prompt`/`max_iterations`
/// arguments into the override carrier `DispatchTask` forwards to the
/// sub-agent. These narrow the sub-agent's defaults; they are never
/// advisory-only (§4.10).
fn overrides_from_args(args: &Value) -> SubAgentOverrides {
    SubAgentOverrides {
        tools: args.get("tools").and_then(Value::as_array).map(|a| {
            a.iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        }),
        system_prompt: args
            .get("system_prompt")
            .and_then(Value::as_str)
            .map(str::to_string),
        max_iterations: args
            .get("max_iterations")
            .and_then(Value::as_u64)
            .map(|n| n as usize),
    }
}

fn missing_arg(name: &str) -> String {
    format!("missing required argument '{}'", name)
}

fn summary_view_to_json(view: &SummaryView) -> Value {
    json!({
        "key": view.key,
        "entry_type": view.entry_type.as_str(),
        "summary": view.summary,
        "created_by": view.created_by,
        "created_at": view.created_at.to_rfc3339(),
    })
}

fn batch_result_to_json(result: &BatchResult) -> Value {
    json!({
        "task_id": result.task_id,
        "agent_id": result.agent_id,
        "model": result.model,
        "summary": result.summary,
        "raw_key": result.raw_key,
        "tokens_used": result.tokens_used,
        "error": result.error,
    })
}

fn batch_result_to_tool_output(result: &BatchResult) -> (String, bool) {
    match &result.error {
        Some(e) => (e.clone(), true),
        None => (batch_result_to_json(result).to_string(), false),
    }
}

/// Top-`SCRATCHPAD_CONTEXT_TOP_K` summaries to remind the model of shared
/// state before its next turn: ranked by `ScratchpadRag` when configured,
/// otherwise the most recent entries.
fn scratchpad_context_note(ctx: &CoordinatorContext, task: &str) -> String {
    let top: Vec<SummaryView> = match &ctx.rag {
        Some(rag) => rag
            .search(&ctx.scratchpad, task, None, SCRATCHPAD_CONTEXT_TOP_K)
            .into_iter()
            .map(|(view, _)| view)
            .collect(),
        None => ctx.scratchpad.list_summaries(SCRATCHPAD_CONTEXT_TOP_K),
    };

    if top.is_empty() {
        return "Continue working toward the final answer. Call set_answer when ready.".to_string();
    }

    let mut note = String::from("Relevant scratchpad entries so far:\n");
    for view in &top {
        note.push_str(&format!(
            "- [{}] {}: {}\n",
            view.key,
            view.entry_type.as_str(),
            view.summary
        ));
    }
    note.push_str("\nContinue working toward the final answer. Call set_answer when ready.");
    note
}

fn publish_iteration_event(ctx: &CoordinatorContext, iteration: usize, answer: &Answer, tokens_used: u64) {
    let scratchpad: Vec<Value> = ctx
        .scratchpad
        .list_summaries(SCRATCHPAD_CONTEXT_TOP_K)
        .iter()
        .map(summary_view_to_json)
        .collect();
    let payload = json!({
        "iteration": iteration,
        "max_iterations": ctx.config.max_iterations,
        "ready": answer.ready,
        "tokens_used": tokens_used,
        "summary": answer.content,
        "scratchpad": scratchpad,
    });
    let _ = ctx
        .bus
        .publish("buckley.rlm.coordinator.iteration", payload.to_string().into_bytes());
}

fn build_system_prompt(task: &str) -> String {
    format!(
        r"# Coordinator

You are the coordinator of a multi-agent system. Break the task below into
focused sub-tasks, delegate them to sub-agents, and synthesize their
results into a final answer.

## Task
{}

## Rules
1. Use `delegate`/`delegate_batch` for anything that touches the workspace or needs a tool — never attempt it yourself.
2. Use `record_strategy` to leave a trail of your reasoning for other agents to build on.
3. Use `inspect`, `inspect_raw`, `list_scratchpad`, `search_scratchpad` to read what sub-agents have already produced before delegating overlapping work.
4. Call `set_answer` with `ready=true` once you have a complete, confident answer. Leave `ready=false` while still working.",
        task
    )
}

/// The coordinator's own tool surface, exposed to its model independent of
/// the `ToolRegistry` sub-agents use.
fn tool_definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: "delegate".into(),
            description: "Dispatch one focused sub-task to a sub-agent and wait for its result.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "task": { "type": "string", "description": "The sub-task for the sub-agent to complete." },
                    "tools": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Optional override: restricts the sub-agent to exactly this tool set for this task, never widening its configured allowlist."
                    },
                    "system_prompt": { "type": "string", "description": "Optional override replacing the sub-agent's default system prompt for this task." },
                    "max_iterations": { "type": "integer", "description": "Optional override replacing the sub-agent's default iteration budget for this task." }
                },
                "required": ["task"]
            }),
        },
        ToolDefinition {
            name: "delegate_batch".into(),
            description: "Dispatch several sub-tasks at once, in parallel by default. Each entry may be a bare task string or a SubTask object with its own tools/system_prompt/max_iterations overrides.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "tasks": {
                        "type": "array",
                        "items": {
                            "oneOf": [
                                { "type": "string" },
                                {
                                    "type": "object",
                                    "properties": {
                                        "task": { "type": "string" },
                                        "tools": { "type": "array", "items": { "type": "string" } },
                                        "system_prompt": { "type": "string" },
                                        "max_iterations": { "type": "integer" }
                                    },
                                    "required": ["task"]
                                }
                            ]
                        }
                    },
                    "parallel": { "type": "boolean", "default": true }
                },
                "required": ["tasks"]
            }),
        },
        ToolDefinition {
            name: "inspect".into(),
            description: "Fetch a scratchpad entry's summary by key.".into(),
            parameters: json!({
                "type": "object",
                "properties": { "key": { "type": "string" } },
                "required": ["key"]
            }),
        },
        ToolDefinition {
            name: "inspect_raw".into(),
            description: "Fetch a scratchpad entry's raw content by key, truncated.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "key": { "type": "string" },
                    "max_length": { "type": "integer", "default": 10000 }
                },
                "required": ["key"]
            }),
        },
        ToolDefinition {
            name: "list_scratchpad".into(),
            description: "List recent scratchpad summaries, optionally filtered by entry type.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "limit": { "type": "integer", "default": 20 },
                    "type": {
                        "type": "string",
                        "enum": ["file", "command", "analysis", "decision", "artifact", "strategy"]
                    }
                }
            }),
        },
        ToolDefinition {
            name: "search_scratchpad".into(),
            description: "Semantic search over scratchpad summaries.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string" },
                    "type": {
                        "type": "string",
                        "enum": ["file", "command", "analysis", "decision", "artifact", "strategy"]
                    },
                    "limit": { "type": "integer", "default": 5 }
                },
                "required": ["query"]
            }),
        },
        ToolDefinition {
            name: "record_strategy".into(),
            description: "Record a reasoning decision or lesson into the scratchpad for other agents to find.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "category": {
                        "type": "string",
                        "enum": [
                            "decomposition", "approach", "retry_approach", "lesson_learned",
                            "architecture", "optimization", "error_handling", "decision"
                        ]
                    },
                    "summary": { "type": "string" },
                    "details": { "type": "string" },
                    "rationale": { "type": "string" }
                },
                "required": ["category", "summary"]
            }),
        },
        ToolDefinition {
            name: "set_answer".into(),
            description: "Update the accumulated final answer. Set ready=true once it is complete.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "content": { "type": "string" },
                    "ready": { "type": "boolean" },
                    "confidence": { "type": "number" },
                    "artifacts": { "type": "array", "items": { "type": "string" } },
                    "next_steps": { "type": "array", "items": { "type": "string" } }
                },
                "required": ["content", "ready"]
            }),
        },
    ]
}
