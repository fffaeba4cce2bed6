//! Subject-based pub/sub bus with wildcard routing, request/reply, and a
//! durable-work-queue factory (§4.1).
//!
//! Delivery is per-subscription best-effort: each subscription owns a
//! bounded buffer and a dedicated worker task. A full buffer drops the
//! message rather than blocking the publisher.

pub mod queue;

pub use queue::{Task, TaskQueue};

use futures_util::future::BoxFuture;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::errors::BuckleyError;

/// Bounded per-subscription delivery buffer size.
const SUBSCRIPTION_BUFFER: usize = 256;

pub type Handler = Arc<dyn Fn(Vec<u8>) -> BoxFuture<'static, ()> + Send + Sync>;

/// Returns true iff `subject` matches the dotted-token `pattern`.
///
/// `*` matches exactly one token; `>` matches one or more trailing tokens
/// and must be the last token in the pattern. Literal tokens must match
/// exactly.
pub fn subject_matches(pattern: &str, subject: &str) -> bool {
    let pattern_tokens: Vec<&str> = pattern.split('.').collect();
    let subject_tokens: Vec<&str> = subject.split('.').collect();

    let mut p = 0;
    let mut s = 0;
    while p < pattern_tokens.len() {
        if pattern_tokens[p] == ">" {
            // '>' must be the last token and covers one-or-more trailing tokens.
            return p + 1 == pattern_tokens.len() && s < subject_tokens.len();
        }
        if s >= subject_tokens.len() {
            return false;
        }
        if pattern_tokens[p] != "*" && pattern_tokens[p] != subject_tokens[s] {
            return false;
        }
        p += 1;
        s += 1;
    }
    s == subject_tokens.len()
}

struct Subscription {
    id: u64,
    pattern: String,
    group: Option<String>,
    tx: mpsc::Sender<Vec<u8>>,
}

/// Handle returned by `subscribe`/`queue_subscribe`. `unsubscribe()` is
/// idempotent: it prunes this subscription's entry out of the bus's table
/// (so `publish` stops iterating and testing it) and drops its sender,
/// which wakes the delivery worker's in-flight `recv().await` immediately
/// rather than leaving it to notice on the next message.
pub struct SubscriptionHandle {
    state: Arc<Mutex<BusState>>,
    id: u64,
    active: Arc<AtomicBool>,
}

impl SubscriptionHandle {
    pub fn unsubscribe(&self) {
        if self.active.swap(false, Ordering::SeqCst) {
            let mut state = self.state.lock().expect("bus mutex poisoned");
            state.subscriptions.retain(|s| s.id != self.id);
        }
    }
}

struct BusState {
    subscriptions: Vec<Subscription>,
    queues: HashMap<String, Arc<TaskQueue>>,
    pending_replies: HashMap<String, oneshot::Sender<Vec<u8>>>,
    next_sub_id: u64,
    next_reply_id: AtomicU64,
}

pub struct MessageBus {
    state: Arc<Mutex<BusState>>,
    closed: AtomicBool,
}

impl MessageBus {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(BusState {
                subscriptions: Vec::new(),
                queues: HashMap::new(),
                pending_replies: HashMap::new(),
                next_sub_id: 0,
                next_reply_id: AtomicU64::new(0),
            })),
            closed: AtomicBool::new(false),
        }
    }

    fn ensure_open(&self) -> Result<(), BuckleyError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(BuckleyError::Closed)
        } else {
            Ok(())
        }
    }

    /// Best-effort delivery to every matching subscription. Never blocks on
    /// a full subscriber buffer — drops instead.
    pub fn publish(&self, subject: &str, bytes: Vec<u8>) -> Result<(), BuckleyError> {
        self.ensure_open()?;

        // Reply-subject fast path.
        {
            let mut state = self.state.lock().expect("bus mutex poisoned");
            if let Some(tx) = state.pending_replies.remove(subject) {
                let _ = tx.send(bytes.clone());
            }
        }

        let state = self.state.lock().expect("bus mutex poisoned");
        let mut delivered_groups: Vec<&str> = Vec::new();
        for sub in &state.subscriptions {
            if !subject_matches(&sub.pattern, subject) {
                continue;
            }
            if let Some(group) = sub.group.as_deref() {
                // Fan-out across queue groups: deliver once per distinct group name
                // seen so far this publish (documented degradation from real
                // load-balanced queue_subscribe; see DESIGN.md).
                if delivered_groups.contains(&group) {
                    continue;
                }
                delivered_groups.push(group);
            }
            match sub.tx.try_send(bytes.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(
                        "bus: subscriber buffer full for pattern '{}', dropping message on subject '{}'",
                        sub.pattern, subject
                    );
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {}
            }
        }
        Ok(())
    }

    /// Subscribe a handler to `subject_pattern`. The handler runs on a
    /// dedicated worker task per subscription.
    pub fn subscribe(
        &self,
        subject_pattern: &str,
        handler: Handler,
    ) -> Result<SubscriptionHandle, BuckleyError> {
        self.ensure_open()?;
        self.subscribe_inner(subject_pattern, None, handler)
    }

    /// Subscribe as part of a queue group. In this in-memory bus this
    /// degrades to fan-out: every group member still receives every
    /// message (see DESIGN.md Open Question (b)) rather than true
    /// load-balanced delivery.
    pub fn queue_subscribe(
        &self,
        subject_pattern: &str,
        group: &str,
        handler: Handler,
    ) -> Result<SubscriptionHandle, BuckleyError> {
        self.ensure_open()?;
        self.subscribe_inner(subject_pattern, Some(group.to_string()), handler)
    }

    fn subscribe_inner(
        &self,
        subject_pattern: &str,
        group: Option<String>,
        handler: Handler,
    ) -> Result<SubscriptionHandle, BuckleyError> {
        let (tx, mut rx) = mpsc::channel::<Vec<u8>>(SUBSCRIPTION_BUFFER);
        let active = Arc::new(AtomicBool::new(true));

        let mut state = self.state.lock().expect("bus mutex poisoned");
        let id = state.next_sub_id;
        state.next_sub_id += 1;
        state.subscriptions.push(Subscription {
            id,
            pattern: subject_pattern.to_string(),
            group,
            tx,
        });
        drop(state);

        let worker_active = active.clone();
        tokio::spawn(async move {
            while worker_active.load(Ordering::SeqCst) {
                match rx.recv().await {
                    Some(bytes) => handler(bytes).await,
                    None => break,
                }
            }
        });

        debug!("bus: subscribed pattern '{}' (id={})", subject_pattern, id);
        Ok(SubscriptionHandle {
            state: self.state.clone(),
            id,
            active,
        })
    }

    /// Publish `bytes` on `subject` with a private reply subject, and await
    /// the first reply or `timeout`.
    pub async fn request(
        &self,
        subject: &str,
        bytes: Vec<u8>,
        timeout: std::time::Duration,
    ) -> Result<Vec<u8>, BuckleyError> {
        self.ensure_open()?;

        let has_responder = {
            let state = self.state.lock().expect("bus mutex poisoned");
            state
                .subscriptions
                .iter()
                .any(|s| subject_matches(&s.pattern, subject))
        };
        if !has_responder {
            return Err(BuckleyError::NoResponders);
        }

        let reply_subject = {
            let state = self.state.lock().expect("bus mutex poisoned");
            let n = state.next_reply_id.fetch_add(1, Ordering::SeqCst);
            format!("_reply.{n}")
        };

        let (tx, rx) = oneshot::channel();
        {
            let mut state = self.state.lock().expect("bus mutex poisoned");
            state.pending_replies.insert(reply_subject.clone(), tx);
        }

        self.publish(subject, bytes)?;

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(BuckleyError::Closed),
            Err(_) => {
                let mut state = self.state.lock().expect("bus mutex poisoned");
                state.pending_replies.remove(&reply_subject);
                Err(BuckleyError::Timeout)
            }
        }
    }

    /// Returns the same `TaskQueue` handle for a given name within the
    /// bus's lifetime (created lazily on first use).
    pub fn queue(&self, name: &str) -> Arc<TaskQueue> {
        let mut state = self.state.lock().expect("bus mutex poisoned");
        state
            .queues
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(TaskQueue::new(name)))
            .clone()
    }

    /// Idempotent teardown. After close, every operation fails with `Closed`.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let mut state = self.state.lock().expect("bus mutex poisoned");
        state.subscriptions.clear();
        state.pending_replies.clear();
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}
