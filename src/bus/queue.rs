//! Durable work queue (§4.2): at-least-once delivery with explicit ack/nack.
//!
//! The in-memory implementation tracks pending tasks in a deque and
//! in-flight (pulled, not yet acked) tasks in a map; `nack` and worker
//! crash both cause redelivery by reinserting into the pending deque.

use crate::errors::BuckleyError;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct Task {
    pub id: String,
    pub bytes: Vec<u8>,
}

struct QueueState {
    pending: VecDeque<Task>,
    in_flight: HashMap<String, Task>,
}

pub struct TaskQueue {
    name: String,
    state: Mutex<QueueState>,
    notify: Notify,
}

impl TaskQueue {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: Mutex::new(QueueState {
                pending: VecDeque::new(),
                in_flight: HashMap::new(),
            }),
            notify: Notify::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn push(&self, bytes: Vec<u8>) -> String {
        let id = Uuid::new_v4().to_string();
        let mut state = self.state.lock().expect("queue mutex poisoned");
        state.pending.push_back(Task {
            id: id.clone(),
            bytes,
        });
        drop(state);
        self.notify.notify_one();
        id
    }

    /// Blocks until a task is available or `timeout` elapses, in which case
    /// it returns `QueueEmpty`.
    pub async fn pull(&self, timeout: Duration) -> Result<Task, BuckleyError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            {
                let mut state = self.state.lock().expect("queue mutex poisoned");
                if let Some(task) = state.pending.pop_front() {
                    state.in_flight.insert(task.id.clone(), task.clone());
                    return Ok(task);
                }
            }
            let now = tokio::time::Instant::now();
            if now >= deadline {
                return Err(BuckleyError::QueueEmpty);
            }
            tokio::select! {
                _ = self.notify.notified() => {}
                _ = tokio::time::sleep_until(deadline) => return Err(BuckleyError::QueueEmpty),
            }
        }
    }

    /// Acknowledge successful processing, removing the task permanently.
    pub fn ack(&self, id: &str) {
        let mut state = self.state.lock().expect("queue mutex poisoned");
        if state.in_flight.remove(id).is_some() {
            debug!("queue '{}': acked task {}", self.name, id);
        }
    }

    /// Return the task to the pending set for redelivery with identical
    /// payload.
    pub fn nack(&self, id: &str) {
        let mut state = self.state.lock().expect("queue mutex poisoned");
        if let Some(task) = state.in_flight.remove(id) {
            state.pending.push_back(task);
            drop(state);
            self.notify.notify_one();
            debug!("queue '{}': nacked task {}, redelivering", self.name, id);
        }
    }

    /// Outstanding work: pending plus in-flight (unacked) tasks.
    pub fn len(&self) -> usize {
        let state = self.state.lock().expect("queue mutex poisoned");
        state.pending.len() + state.in_flight.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
