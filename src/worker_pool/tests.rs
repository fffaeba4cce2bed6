use super::*;
use crate::agent::tools::ToolRegistry;
use crate::conflict::ConflictDetector;
use crate::providers::base::{ChatRequest, LLMProvider, LLMResponse};
use crate::safety::tool_policy::{ToolApprover, ToolPolicy};
use crate::scratchpad::{Scratchpad, ScratchpadConfig};
use async_trait::async_trait;

struct MockProvider;

#[async_trait]
impl LLMProvider for MockProvider {
    async fn chat(&self, _req: ChatRequest<'_>) -> anyhow::Result<LLMResponse> {
        Ok(LLMResponse {
            content: Some("done".to_string()),
            tool_calls: vec![],
            reasoning_content: None,
            input_tokens: Some(3),
            output_tokens: Some(2),
            cache_creation_input_tokens: None,
            cache_read_input_tokens: None,
        })
    }

    fn default_model(&self) -> &str {
        "mock"
    }
}

fn make_pool(queue_name: &str, workers: usize) -> (Arc<WorkerPool>, Arc<TaskQueue>) {
    let bus = Arc::new(MessageBus::new());
    let queue = Arc::new(TaskQueue::new(queue_name));
    let ctx = Arc::new(SubAgentContext {
        provider: Arc::new(MockProvider),
        registry: Arc::new(ToolRegistry::new()),
        approver: Arc::new(ToolApprover::new(ToolPolicy::new())),
        conflicts: Arc::new(ConflictDetector::new()),
        scratchpad: Arc::new(Scratchpad::new(ScratchpadConfig::default())),
        config: SubAgentConfig::default(),
    });

    let pool = Arc::new(WorkerPool::new(
        bus,
        queue.clone(),
        ctx,
        PoolConfig {
            workers,
            queue_name: queue_name.to_string(),
            role: "test".to_string(),
            agent_config: SubAgentConfig::default(),
            executor_config: SubAgentOverrides::default(),
            pull_timeout: Duration::from_millis(50),
        },
    ));
    (pool, queue)
}

fn push_task(queue: &TaskQueue, id: &str, description: &str) {
    let queued = QueuedTask {
        id: id.to_string(),
        description: description.to_string(),
        priority: 0,
        metadata: HashMap::new(),
        created_at: Utc::now(),
    };
    queue.push(serde_json::to_vec(&queued).unwrap());
}

async fn wait_until(mut pred: impl FnMut() -> bool, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if pred() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    pred()
}

#[tokio::test]
async fn start_is_idempotent() {
    let (pool, _queue) = make_pool("idempotent", 1);
    assert!(pool.start().await);
    assert!(!pool.start().await);
    pool.stop().await;
}

#[tokio::test]
async fn worker_processes_queued_task_end_to_end() {
    let (pool, queue) = make_pool("process", 2);
    push_task(&queue, "task-1", "do the thing");
    pool.start().await;

    let done = wait_until(|| pool.stats().completed == 1, Duration::from_secs(2)).await;
    assert!(done, "expected task to complete, stats: {:?}", pool.stats());
    assert_eq!(pool.stats().failed, 0);
    assert!(pool.stats().total_tokens > 0);

    pool.stop().await;
}

#[tokio::test]
async fn worker_acks_and_counts_malformed_payload_as_failed() {
    let (pool, queue) = make_pool("malformed", 1);
    queue.push(b"not valid json".to_vec());
    pool.start().await;

    let done = wait_until(|| pool.stats().failed == 1, Duration::from_secs(2)).await;
    assert!(done, "expected malformed payload to be counted as failed");
    assert_eq!(pool.stats().completed, 0);
    assert!(queue.is_empty());

    pool.stop().await;
}

#[tokio::test]
async fn stop_waits_for_in_flight_processing_to_drain() {
    let (pool, queue) = make_pool("drain", 1);
    push_task(&queue, "task-1", "one");
    pool.start().await;

    wait_until(|| pool.stats().completed == 1, Duration::from_secs(2)).await;
    assert!(pool.stop().await);
    assert_eq!(pool.stats().processing, 0);
}

#[tokio::test]
async fn scale_workers_down_reduces_active_worker_count() {
    let (pool, _queue) = make_pool("scale", 3);
    pool.start().await;
    assert_eq!(pool.worker_stops.lock().unwrap().len(), 3);

    pool.scale_workers(1).await;
    assert_eq!(pool.worker_stops.lock().unwrap().len(), 1);

    pool.stop().await;
}
