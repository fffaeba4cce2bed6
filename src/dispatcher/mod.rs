//! Dispatcher (§4.9): runs a batch of sub-agent tasks, sequentially or
//! bounded-parallel, behind a circuit breaker and a `governor` rate limiter,
//! with adaptive per-task timeouts and bus event publication.

use crate::agent::subagent::{self, SubAgentContext, SubAgentOverrides, ToolCallEvent};
use crate::bus::MessageBus;
use crate::circuit::{CircuitBreaker, CircuitCallbacks, CircuitConfig};
use crate::config::DispatcherConfig;
use crate::model_selector::ModelSelector;
use crate::safety::tool_policy::AuthContext;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::warn;

/// One unit of work for the dispatcher to hand to a sub-agent.
pub struct DispatchTask {
    pub id: Option<String>,
    pub task: String,
    pub origin_channel: String,
    pub origin_chat_id: String,
    pub auth: AuthContext,
    /// Per-task overrides of the sub-agent's tool allowlist, system prompt,
    /// and iteration budget (`delegate`'s optional arguments, §4.10).
    pub overrides: SubAgentOverrides,
}

/// Outcome of one dispatched task, in the same order the batch was submitted.
#[derive(Debug, Clone)]
pub struct BatchResult {
    pub task_id: String,
    pub agent_id: Option<String>,
    pub model: Option<String>,
    pub summary: Option<String>,
    pub raw_key: Option<String>,
    pub tokens_used: u64,
    pub duration: Duration,
    pub error: Option<String>,
    pub tool_events: Vec<ToolCallEvent>,
}

/// Publishes circuit state transitions onto the bus for observers.
struct BusCallbacks {
    bus: Arc<MessageBus>,
}

impl CircuitCallbacks for BusCallbacks {
    fn on_failure(&self, error: &str) {
        let payload = serde_json::json!({ "error": error }).to_string();
        let _ = self.bus.publish("buckley.rlm.circuit.failure", payload.into_bytes());
    }

    fn on_state_change(&self, from: &str, to: &str) {
        let payload = serde_json::json!({ "from": from, "to": to }).to_string();
        let _ = self.bus.publish("buckley.rlm.circuit.state_change", payload.into_bytes());
    }
}

/// Executes `DispatchTask` batches against a shared `SubAgentContext`.
pub struct Dispatcher {
    sub_agent_ctx: Arc<SubAgentContext>,
    selector: ModelSelector,
    bus: Arc<MessageBus>,
    breaker: CircuitBreaker<BusCallbacks>,
    limiter: Option<DefaultDirectRateLimiter>,
    max_concurrent: usize,
    base_timeout: Duration,
    last_duration: Mutex<Option<Duration>>,
}

impl Dispatcher {
    pub fn new(
        sub_agent_ctx: Arc<SubAgentContext>,
        selector: ModelSelector,
        bus: Arc<MessageBus>,
        config: &DispatcherConfig,
    ) -> Self {
        let limiter = NonZeroU32::new(config.rate_limit).map(|rate| {
            let burst = NonZeroU32::new(config.burst).unwrap_or(rate);
            RateLimiter::direct(Quota::per_second(rate).allow_burst(burst))
        });
        let breaker = CircuitBreaker::with_callbacks(
            CircuitConfig::from(&config.circuit),
            BusCallbacks { bus: bus.clone() },
        );

        Self {
            sub_agent_ctx,
            selector,
            bus,
            breaker,
            limiter,
            max_concurrent: config.max_concurrent.max(1),
            base_timeout: config.base_timeout(),
            last_duration: Mutex::new(None),
        }
    }

    /// Run a batch of tasks. Empty input yields an empty result. A single
    /// task, or `parallel = false`, runs sequentially; otherwise tasks run
    /// concurrently bounded by `max_concurrent`. Results come back in input
    /// order, alongside a joined error message if any task failed.
    pub async fn execute(
        &self,
        batch: Vec<DispatchTask>,
        parallel: bool,
    ) -> (Vec<BatchResult>, Option<String>) {
        if batch.is_empty() {
            return (Vec::new(), None);
        }

        let results = if batch.len() == 1 || !parallel {
            let mut out = Vec::with_capacity(batch.len());
            for task in batch {
                out.push(self.execute_one(task).await);
            }
            out
        } else {
            let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
            let futs = batch.into_iter().map(|task| {
                let semaphore = semaphore.clone();
                async move {
                    let _permit = semaphore
                        .acquire_owned()
                        .await
                        .expect("semaphore is never closed");
                    self.execute_one(task).await
                }
            });
            futures_util::future::join_all(futs).await
        };

        let errors: Vec<String> = results.iter().filter_map(|r| r.error.clone()).collect();
        let joined_error = (!errors.is_empty()).then(|| errors.join("; "));
        (results, joined_error)
    }

    async fn execute_one(&self, task: DispatchTask) -> BatchResult {
        let task_id = task.id.clone().unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let Some(model) = self.selector.select() else {
            return BatchResult {
                task_id,
                agent_id: None,
                model: None,
                summary: None,
                raw_key: None,
                tokens_used: 0,
                duration: Duration::ZERO,
                error: Some("no model available".to_string()),
                tool_events: Vec::new(),
            };
        };

        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }

        let timeout = self.next_timeout();
        self.publish_event(
            "buckley.rlm.task.started",
            serde_json::json!({ "task_id": task_id, "model": model }),
        );

        let started = Instant::now();
        let ctx = &self.sub_agent_ctx;
        let run_result = self
            .breaker
            .call(|| async {
                tokio::time::timeout(
                    timeout,
                    subagent::run(
                        ctx,
                        &task.task,
                        &model,
                        &task.origin_channel,
                        &task.origin_chat_id,
                        &task.auth,
                        &task.overrides,
                    ),
                )
                .await
                .map_err(|_| anyhow::anyhow!("sub-agent timed out after {:?}", timeout))
                .and_then(|inner| inner)
            })
            .await;

        let elapsed = started.elapsed();
        let result = match run_result {
            Ok(outcome) => {
                *self.last_duration.lock().expect("dispatcher mutex poisoned") = Some(elapsed);
                BatchResult {
                    task_id: task_id.clone(),
                    agent_id: Some(outcome.agent_id),
                    model: Some(outcome.model),
                    summary: Some(outcome.summary),
                    raw_key: Some(outcome.raw_key),
                    tokens_used: outcome.tokens_used,
                    duration: outcome.duration,
                    error: None,
                    tool_events: outcome.tool_events,
                }
            }
            Err(e) => {
                warn!("dispatcher: task '{}' failed: {}", task_id, e);
                BatchResult {
                    task_id: task_id.clone(),
                    agent_id: None,
                    model: Some(model),
                    summary: None,
                    raw_key: None,
                    tokens_used: 0,
                    duration: elapsed,
                    error: Some(e.to_string()),
                    tool_events: Vec::new(),
                }
            }
        };

        self.publish_event(
            "buckley.rlm.task.completed",
            serde_json::json!({ "task_id": task_id, "ok": result.error.is_none() }),
        );
        result
    }

    fn publish_event(&self, subject: &str, payload: serde_json::Value) {
        let _ = self.bus.publish(subject, payload.to_string().into_bytes());
    }

    /// `clip(last_duration * 1.5, base/2, base*2)`; the first call for a
    /// dispatcher always uses `base_timeout`.
    fn next_timeout(&self) -> Duration {
        let last = *self.last_duration.lock().expect("dispatcher mutex poisoned");
        match last {
            None => self.base_timeout,
            Some(last) => last
                .mul_f64(1.5)
                .clamp(self.base_timeout / 2, self.base_timeout * 2),
        }
    }
}
