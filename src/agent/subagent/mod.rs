//! SubAgent (§4.8): an isolated LLM tool-use loop executing one dispatcher
//! task, guarded by `ConflictDetector` locks and `ToolApprover` policy,
//! reporting its result into a shared `Scratchpad`.

mod activity_log;

use crate::agent::tools::{ExecutionContext, ToolRegistry, ToolResult};
use crate::config::SubAgentConfig;
use crate::conflict::{ConflictDetector, LockRequirement, lock_requirement_for};
use crate::providers::base::{ChatRequest, LLMProvider, Message};
use crate::safety::tool_policy::{AuthContext, ToolApprover};
use crate::scratchpad::{EntryType, Scratchpad, WriteRequest};
use activity_log::ActivityLog;
use anyhow::Result;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;
use uuid::Uuid;

const EMPTY_RESPONSE_RETRIES: usize = 2;
const SUBAGENT_MAX_TOKENS: u32 = 4096;
const SUBAGENT_TEMPERATURE: f32 = 0.2;

/// Shared, immutable wiring every sub-agent run is built from. Owned by the
/// Dispatcher and handed to each `run()` call by reference.
pub struct SubAgentContext {
    pub provider: Arc<dyn LLMProvider>,
    pub registry: Arc<ToolRegistry>,
    pub approver: Arc<ToolApprover>,
    pub conflicts: Arc<ConflictDetector>,
    pub scratchpad: Arc<Scratchpad>,
    pub config: SubAgentConfig,
}

/// Per-task overrides a dispatch caller (the coordinator's `delegate`) may
/// supply, narrowing this run's defaults from `SubAgentConfig`.
#[derive(Debug, Clone, Default)]
pub struct SubAgentOverrides {
    /// Further restricts the effective tool set below the registry/approver/
    /// config intersection; never grants a tool that intersection excludes.
    pub tools: Option<Vec<String>>,
    pub system_prompt: Option<String>,
    pub max_iterations: Option<usize>,
}

/// One tool invocation during a sub-agent run, for Dispatcher transparency.
#[derive(Debug, Clone)]
pub struct ToolCallEvent {
    pub tool: String,
    pub arguments: String,
    pub success: bool,
    pub error: Option<String>,
    pub duration: Duration,
}

/// Outcome of a completed sub-agent run, returned to the Dispatcher.
#[derive(Debug, Clone)]
pub struct SubAgentResult {
    pub agent_id: String,
    pub model: String,
    pub summary: String,
    pub raw_key: String,
    pub raw: String,
    pub tokens_used: u64,
    pub duration: Duration,
    pub tool_calls: usize,
    pub tool_events: Vec<ToolCallEvent>,
}

/// Run one task to completion: tool-use loop against `model`, reporting
/// into the scratchpad as an `analysis` entry on exit (success or not).
pub async fn run(
    ctx: &SubAgentContext,
    task: &str,
    model: &str,
    origin_channel: &str,
    origin_chat_id: &str,
    auth: &AuthContext,
    overrides: &SubAgentOverrides,
) -> Result<SubAgentResult> {
    let agent_id = Uuid::new_v4().to_string()[..8].to_string();
    let started = Instant::now();
    let mut log = ActivityLog::new(&agent_id);
    if let Some(l) = log.as_mut() {
        l.log_start(task);
    }

    let allowed_tools = allowed_tool_names(ctx, auth, overrides);
    if let Some(l) = log.as_mut() {
        let names: Vec<String> = allowed_tools.iter().cloned().collect();
        l.log_tools(&names, &[]);
    }

    let tool_defs: Vec<_> = ctx
        .registry
        .get_tool_definitions()
        .into_iter()
        .filter(|d| allowed_tools.contains(&d.name))
        .collect();

    let exec_ctx = ExecutionContext {
        channel: origin_channel.to_string(),
        chat_id: origin_chat_id.to_string(),
        context_summary: None,
        metadata: Default::default(),
    };

    let system_prompt = overrides
        .system_prompt
        .clone()
        .unwrap_or_else(|| build_system_prompt(task));
    let max_iterations = overrides.max_iterations.unwrap_or(ctx.config.max_iterations);

    let mut messages = vec![Message::system(system_prompt), Message::user(task)];
    let mut iteration = 0usize;
    let mut empty_retries_left = EMPTY_RESPONSE_RETRIES;
    let mut tool_events: Vec<ToolCallEvent> = Vec::new();
    let mut tokens_used = 0u64;

    let final_text = loop {
        if iteration >= max_iterations {
            warn!(
                "subagent [{}] reached max iterations ({})",
                agent_id, max_iterations
            );
            if let Some(l) = log.as_mut() {
                l.log_max_iterations(max_iterations);
            }
            break "Task did not complete within the iteration budget.".to_string();
        }
        iteration += 1;

        let response = ctx
            .provider
            .chat_with_retry(
                ChatRequest {
                    messages: messages.clone(),
                    tools: Some(tool_defs.clone()),
                    model: Some(model),
                    max_tokens: SUBAGENT_MAX_TOKENS,
                    temperature: SUBAGENT_TEMPERATURE,
                    tool_choice: None,
                    response_format: None,
                },
                None,
            )
            .await?;

        tokens_used += response.input_tokens.unwrap_or(0) + response.output_tokens.unwrap_or(0);

        if response.has_tool_calls() {
            if let Some(l) = log.as_mut() {
                l.log_iteration_tool_calls(iteration, response.tool_calls.len());
            }
            messages.push(Message::assistant_with_thinking(
                response.content.clone().unwrap_or_default(),
                Some(response.tool_calls.clone()),
                response.reasoning_content.clone(),
            ));

            for tc in &response.tool_calls {
                if let Some(l) = log.as_mut() {
                    l.log_tool_call(&tc.name, &tc.arguments);
                }
                let call_started = Instant::now();
                if !allowed_tools.contains(&tc.name) {
                    let msg = format!("tool '{}' is not allowed for this task", tc.name);
                    if let Some(l) = log.as_mut() {
                        l.log_tool_result(&tc.name, &msg, true);
                    }
                    tool_events.push(ToolCallEvent {
                        tool: tc.name.clone(),
                        arguments: tc.arguments.to_string(),
                        success: false,
                        error: Some(msg.clone()),
                        duration: call_started.elapsed(),
                    });
                    messages.push(Message::tool_result(tc.id.clone(), msg, true));
                    continue;
                }
                let (content, is_error) =
                    execute_locked(ctx, &agent_id, &tc.name, &tc.arguments, &exec_ctx).await;
                if let Some(l) = log.as_mut() {
                    l.log_tool_result(&tc.name, &content, is_error);
                }
                tool_events.push(ToolCallEvent {
                    tool: tc.name.clone(),
                    arguments: tc.arguments.to_string(),
                    success: !is_error,
                    error: is_error.then(|| content.clone()),
                    duration: call_started.elapsed(),
                });
                messages.push(Message::tool_result(tc.id.clone(), content, is_error));
            }
        } else if let Some(content) = response.content {
            if let Some(l) = log.as_mut() {
                l.log_iteration_text(iteration, content.len());
            }
            break content;
        } else if empty_retries_left > 0 {
            empty_retries_left -= 1;
            let retry_num = EMPTY_RESPONSE_RETRIES - empty_retries_left;
            let delay = (2_u64.pow(retry_num as u32) as f64 + fastrand::f64()).min(10.0);
            if let Some(l) = log.as_mut() {
                l.log_iteration_empty(iteration, empty_retries_left);
            }
            tokio::time::sleep(Duration::from_secs_f64(delay)).await;
        } else {
            break "Task completed but no final response was generated.".to_string();
        }
    };

    ctx.conflicts.release_all(&agent_id);
    if let Some(l) = log.as_mut() {
        l.log_end("ok");
    }

    let raw_key = ctx.scratchpad.write(WriteRequest {
        key: None,
        entry_type: EntryType::Analysis,
        raw: final_text.clone().into_bytes(),
        summary: None,
        metadata: Default::default(),
        created_by: agent_id.clone(),
    })?;
    let summary = ctx
        .scratchpad
        .inspect(&raw_key)
        .map(|v| v.summary)
        .unwrap_or_default();

    Ok(SubAgentResult {
        agent_id,
        model: model.to_string(),
        summary,
        raw_key,
        raw: final_text,
        tokens_used,
        duration: started.elapsed(),
        tool_calls: tool_events.len(),
        tool_events,
    })
}

/// Intersection of: the registry's actual tools, the `ToolApprover` policy
/// for this caller's capabilities, the config's static allowlist (empty
/// allowlist means "no additional restriction"), and the task's own
/// `overrides.tools` allowlist, if supplied. The override can only narrow
/// this set further, never grant a tool the other three exclude.
fn allowed_tool_names(
    ctx: &SubAgentContext,
    auth: &AuthContext,
    overrides: &SubAgentOverrides,
) -> HashSet<String> {
    let registry_names: HashSet<String> = ctx.registry.tool_names().into_iter().collect();
    let policy_allowed = ctx.approver.get_allowed_tools_for_agent(auth);
    let wildcard = policy_allowed.contains("*");

    let config_allowed: HashSet<String> = if ctx.config.allowed_tools.is_empty() {
        registry_names.clone()
    } else {
        ctx.config.allowed_tools.iter().cloned().collect()
    };

    let task_allowed: Option<HashSet<String>> = overrides
        .tools
        .as_ref()
        .map(|names| names.iter().cloned().collect());

    registry_names
        .into_iter()
        .filter(|n| {
            (wildcard || policy_allowed.contains(n))
                && config_allowed.contains(n)
                && task_allowed.as_ref().map_or(true, |t| t.contains(n))
        })
        .collect()
}

/// Execute one tool call, acquiring/releasing the read or write lock its
/// name and `path` argument require (§4.7 mapping via `conflict`).
async fn execute_locked(
    ctx: &SubAgentContext,
    agent_id: &str,
    tool_name: &str,
    args: &Value,
    exec_ctx: &ExecutionContext,
) -> (String, bool) {
    match lock_requirement_for(tool_name, args) {
        LockRequirement::Read(path) => {
            if let Err(e) = ctx.conflicts.acquire_read(agent_id, &path).await {
                return (format!("lock error: {}", e), true);
            }
            let result = ctx.registry.execute(tool_name, args.clone(), exec_ctx).await;
            ctx.conflicts.release_read(agent_id, &path);
            finish(result)
        }
        LockRequirement::Write(path) => {
            if let Err(e) = ctx.conflicts.acquire_write(agent_id, &path).await {
                return (format!("lock error: {}", e), true);
            }
            let result = ctx.registry.execute(tool_name, args.clone(), exec_ctx).await;
            ctx.conflicts.release_write(agent_id, &path);
            finish(result)
        }
        LockRequirement::None => finish(ctx.registry.execute(tool_name, args.clone(), exec_ctx).await),
    }
}

fn finish(result: Result<ToolResult>) -> (String, bool) {
    match result {
        Ok(r) => (r.content, r.is_error),
        Err(e) => (format!("tool execution failed: {}", e), true),
    }
}

fn build_system_prompt(task: &str) -> String {
    format!(
        r"# Sub-agent

You are a sub-agent dispatched by a coordinator to complete one focused
task, using only the tools made available to you.

## Task
{}

## Rules
1. Stay focused: complete only the assigned task, nothing else.
2. Work autonomously — there is no user available to ask for clarification.
3. When finished, respond with plain text summarizing what you found or did.
4. Do not call a tool once you already have your final answer.",
        task
    )
}

#[cfg(test)]
mod tests;
