//! WorkerPool (§4.11): N workers draining a `TaskQueue`, each running a
//! sub-agent-equivalent executor against the popped `QueuedTask`, publishing
//! progress/failure events onto the bus.

use crate::agent::subagent::{self, SubAgentContext, SubAgentOverrides};
use crate::bus::{MessageBus, TaskQueue};
use crate::config::SubAgentConfig;
use crate::safety::tool_policy::AuthContext;
use crate::utils::task_tracker::TaskTracker;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::warn;

/// Durable-queue payload: `{id, description, priority, metadata, created_at}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedTask {
    pub id: String,
    pub description: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub workers: usize,
    pub queue_name: String,
    pub role: String,
    /// Baseline config the pool's shared `SubAgentContext` is built from
    /// (model, tool allowlist, iteration budget).
    pub agent_config: SubAgentConfig,
    /// Per-task overrides the TaskExecutor applies uniformly to every
    /// `QueuedTask` this pool pulls — distinct from `agent_config`, which
    /// configures the executor's underlying sub-agent itself. A queue with
    /// no need to narrow individual runs leaves this at its `Default`.
    pub executor_config: SubAgentOverrides,
    pub pull_timeout: Duration,
}

/// Immutable snapshot of the pool's atomic counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct PoolStats {
    pub completed: u64,
    pub failed: u64,
    pub processing: u64,
    pub total_duration_ns: u64,
    pub total_tokens: u64,
}

#[derive(Default)]
struct Counters {
    completed: AtomicU64,
    failed: AtomicU64,
    processing: AtomicU64,
    total_duration_ns: AtomicU64,
    total_tokens: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> PoolStats {
        PoolStats {
            completed: self.completed.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            processing: self.processing.load(Ordering::SeqCst),
            total_duration_ns: self.total_duration_ns.load(Ordering::SeqCst),
            total_tokens: self.total_tokens.load(Ordering::SeqCst),
        }
    }
}

/// N workers pulling `QueuedTask`s from a `TaskQueue` and running them
/// through a sub-agent executor, publishing progress onto the bus.
pub struct WorkerPool {
    bus: Arc<MessageBus>,
    queue: Arc<TaskQueue>,
    sub_agent_ctx: Arc<SubAgentContext>,
    config: PoolConfig,
    started: AtomicBool,
    stats: Arc<Counters>,
    worker_stops: Mutex<Vec<Arc<AtomicBool>>>,
    tracker: TaskTracker,
}

impl WorkerPool {
    pub fn new(
        bus: Arc<MessageBus>,
        queue: Arc<TaskQueue>,
        sub_agent_ctx: Arc<SubAgentContext>,
        config: PoolConfig,
    ) -> Self {
        Self {
            bus,
            queue,
            sub_agent_ctx,
            config,
            started: AtomicBool::new(false),
            stats: Arc::new(Counters::default()),
            worker_stops: Mutex::new(Vec::new()),
            tracker: TaskTracker::new(),
        }
    }

    /// Idempotent: spawns `config.workers` pullers and publishes
    /// `pool_started`. Returns `false` if the pool was already running.
    pub async fn start(&self) -> bool {
        if self.started.swap(true, Ordering::SeqCst) {
            return false;
        }
        for idx in 0..self.config.workers {
            self.spawn_worker(idx).await;
        }
        self.publish_pool_event("pool_started", serde_json::json!({ "workers": self.config.workers }));
        true
    }

    /// Grow to `n` workers, or signal the excess to stop at their next
    /// iteration boundary.
    pub async fn scale_workers(&self, n: usize) {
        let current = self.worker_stops.lock().expect("worker pool mutex poisoned").len();
        if n > current {
            for idx in current..n {
                self.spawn_worker(idx).await;
            }
        } else if n < current {
            let mut stops = self.worker_stops.lock().expect("worker pool mutex poisoned");
            for stop in stops.split_off(n) {
                stop.store(true, Ordering::SeqCst);
            }
        }
    }

    /// Signal every worker to stop, then wait up to 30s for in-flight tasks
    /// to drain. Returns `false` if the pool was not running.
    pub async fn stop(&self) -> bool {
        if !self.started.swap(false, Ordering::SeqCst) {
            return false;
        }
        {
            let stops = self.worker_stops.lock().expect("worker pool mutex poisoned");
            for stop in stops.iter() {
                stop.store(true, Ordering::SeqCst);
            }
        }
        let deadline = Instant::now() + Duration::from_secs(30);
        while self.stats.processing.load(Ordering::SeqCst) > 0 && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        self.tracker.cancel_all().await;
        self.worker_stops.lock().expect("worker pool mutex poisoned").clear();
        true
    }

    pub fn stats(&self) -> PoolStats {
        self.stats.snapshot()
    }

    async fn spawn_worker(&self, idx: usize) {
        let stop = Arc::new(AtomicBool::new(false));
        self.worker_stops
            .lock()
            .expect("worker pool mutex poisoned")
            .push(stop.clone());

        let bus = self.bus.clone();
        let queue = self.queue.clone();
        let ctx = self.sub_agent_ctx.clone();
        let model = self.config.agent_config.model.clone();
        let executor_config = self.config.executor_config.clone();
        let pull_timeout = self.config.pull_timeout;
        let stats = self.stats.clone();
        let queue_name = self.config.queue_name.clone();
        let name = format!("worker_pool:{}:{}", queue_name, idx);

        self.tracker
            .spawn_auto_cleanup(name, async move {
                worker_loop(
                    bus,
                    queue,
                    ctx,
                    model,
                    executor_config,
                    pull_timeout,
                    stats,
                    queue_name,
                    stop,
                )
                .await;
            })
            .await;
    }

    fn publish_pool_event(&self, event: &str, extra: serde_json::Value) {
        let mut payload = serde_json::json!({ "event": event, "queue": self.config.queue_name });
        merge_json(&mut payload, extra);
        let _ = self.bus.publish(
            &format!("buckley.pool.{}.events", self.config.queue_name),
            payload.to_string().into_bytes(),
        );
    }
}

fn merge_json(base: &mut serde_json::Value, extra: serde_json::Value) {
    if let (Some(base_obj), serde_json::Value::Object(extra_obj)) = (base.as_object_mut(), extra) {
        base_obj.extend(extra_obj);
    }
}

fn publish_task_event(bus: &MessageBus, task_id: &str, event: &str, extra: serde_json::Value) {
    let mut payload = serde_json::json!({ "event": event, "task_id": task_id });
    merge_json(&mut payload, extra);
    let _ = bus.publish(
        &format!("buckley.task.{}.events", task_id),
        payload.to_string().into_bytes(),
    );
}

async fn worker_loop(
    bus: Arc<MessageBus>,
    queue: Arc<TaskQueue>,
    ctx: Arc<SubAgentContext>,
    model: String,
    executor_config: SubAgentOverrides,
    pull_timeout: Duration,
    stats: Arc<Counters>,
    queue_name: String,
    stop: Arc<AtomicBool>,
) {
    let auth = AuthContext {
        capabilities: vec!["admin".to_string()],
    };

    while !stop.load(Ordering::SeqCst) {
        let task = match queue.pull(pull_timeout).await {
            Ok(task) => task,
            Err(_) => continue,
        };

        stats.processing.fetch_add(1, Ordering::SeqCst);

        let queued: QueuedTask = match serde_json::from_slice(&task.bytes) {
            Ok(q) => q,
            Err(e) => {
                warn!("worker pool '{}': malformed queued task {}: {}", queue_name, task.id, e);
                queue.ack(&task.id);
                stats.failed.fetch_add(1, Ordering::SeqCst);
                stats.processing.fetch_sub(1, Ordering::SeqCst);
                publish_task_event(&bus, &task.id, "task_failed", serde_json::json!({ "error": e.to_string() }));
                continue;
            }
        };

        let result = subagent::run(
            &ctx,
            &queued.description,
            &model,
            "worker_pool",
            &queued.id,
            &auth,
            &executor_config,
        )
        .await;
        match result {
            Ok(outcome) => {
                stats.completed.fetch_add(1, Ordering::SeqCst);
                stats
                    .total_duration_ns
                    .fetch_add(outcome.duration.as_nanos() as u64, Ordering::SeqCst);
                stats.total_tokens.fetch_add(outcome.tokens_used, Ordering::SeqCst);
                queue.ack(&task.id);
                publish_task_event(
                    &bus,
                    &queued.id,
                    "task_completed",
                    serde_json::json!({ "summary": outcome.summary, "tokens_used": outcome.tokens_used }),
                );
            }
            Err(e) => {
                warn!("worker pool '{}': task {} failed: {}", queue_name, queued.id, e);
                stats.failed.fetch_add(1, Ordering::SeqCst);
                queue.nack(&task.id);
                publish_task_event(&bus, &queued.id, "task_failed", serde_json::json!({ "error": e.to_string() }));
            }
        }

        stats.processing.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests;
