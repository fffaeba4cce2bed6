//! Generic circuit breaker: Closed/Open/HalfOpen fault isolator around any
//! fallible async callable, used by the Dispatcher to guard sub-agent
//! execution.

use crate::errors::BuckleyError;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct CircuitConfig {
    pub max_failures: u32,
    pub timeout: Duration,
    pub success_threshold: u32,
    pub max_recent_errors: usize,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            max_failures: 5,
            timeout: Duration::from_secs(30),
            success_threshold: 2,
            max_recent_errors: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum State {
    Closed,
    Open,
    HalfOpen,
}

struct Inner {
    state: State,
    consecutive_failures: u32,
    consecutive_successes: u32,
    opened_at: Option<Instant>,
    recent_errors: VecDeque<String>,
}

/// Called outside the lock on every state change or failure, so callers can
/// publish bus events (`circuit.failure`, `circuit.state_change`) without
/// risking deadlock against the breaker's own mutex.
pub trait CircuitCallbacks: Send + Sync {
    fn on_failure(&self, _error: &str) {}
    fn on_state_change(&self, _from: &str, _to: &str) {}
}

/// A no-op callback set for callers that don't need event publication.
pub struct NoopCallbacks;
impl CircuitCallbacks for NoopCallbacks {}

pub struct CircuitBreaker<C: CircuitCallbacks = NoopCallbacks> {
    config: CircuitConfig,
    inner: Mutex<Inner>,
    callbacks: C,
}

impl CircuitBreaker<NoopCallbacks> {
    pub fn new(config: CircuitConfig) -> Self {
        Self::with_callbacks(config, NoopCallbacks)
    }
}

impl<C: CircuitCallbacks> CircuitBreaker<C> {
    pub fn with_callbacks(config: CircuitConfig, callbacks: C) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                state: State::Closed,
                consecutive_failures: 0,
                consecutive_successes: 0,
                opened_at: None,
                recent_errors: VecDeque::new(),
            }),
            callbacks,
        }
    }

    /// Run `f` if the breaker admits the call; otherwise fail fast with
    /// `BuckleyError::CircuitOpen`.
    pub async fn call<T, E, F, Fut>(&self, f: F) -> Result<T, BuckleyError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        self.admit()?;
        match f().await {
            Ok(v) => {
                self.record_success();
                Ok(v)
            }
            Err(e) => {
                let msg = e.to_string();
                self.record_failure(&msg);
                Err(BuckleyError::Transient(msg))
            }
        }
    }

    fn admit(&self) -> Result<(), BuckleyError> {
        let mut inner = self.inner.lock().expect("circuit breaker mutex poisoned");
        match inner.state {
            State::Closed => Ok(()),
            State::HalfOpen => Ok(()),
            State::Open => {
                let opened_at = inner.opened_at.expect("Open implies opened_at set");
                let elapsed = opened_at.elapsed();
                if elapsed >= self.config.timeout {
                    let from = "Open".to_string();
                    inner.state = State::HalfOpen;
                    inner.consecutive_successes = 0;
                    drop(inner);
                    info!("circuit breaker Open -> HalfOpen after {:?}", elapsed);
                    self.callbacks.on_state_change(&from, "HalfOpen");
                    Ok(())
                } else {
                    let retry_after_secs = (self.config.timeout - elapsed).as_secs();
                    Err(BuckleyError::CircuitOpen {
                        failures: inner.consecutive_failures,
                        last_error: inner
                            .recent_errors
                            .back()
                            .cloned()
                            .unwrap_or_default(),
                        retry_after_secs,
                        recent_errors: inner.recent_errors.iter().cloned().collect(),
                    })
                }
            }
        }
    }

    fn record_success(&self) {
        let mut inner = self.inner.lock().expect("circuit breaker mutex poisoned");
        inner.consecutive_failures = 0;
        let transitioned = match inner.state {
            State::Closed => None,
            State::HalfOpen => {
                inner.consecutive_successes += 1;
                if inner.consecutive_successes >= self.config.success_threshold {
                    inner.state = State::Closed;
                    inner.consecutive_successes = 0;
                    inner.opened_at = None;
                    Some(("HalfOpen".to_string(), "Closed".to_string()))
                } else {
                    None
                }
            }
            State::Open => None,
        };
        drop(inner);
        if let Some((from, to)) = transitioned {
            info!("circuit breaker {} -> {}", from, to);
            self.callbacks.on_state_change(&from, &to);
        }
    }

    fn record_failure(&self, error: &str) {
        self.callbacks.on_failure(error);
        let mut inner = self.inner.lock().expect("circuit breaker mutex poisoned");
        inner.consecutive_failures += 1;
        if inner.recent_errors.len() >= self.config.max_recent_errors {
            inner.recent_errors.pop_front();
        }
        inner.recent_errors.push_back(error.to_string());

        let transitioned = match inner.state {
            State::Closed => {
                if inner.consecutive_failures >= self.config.max_failures {
                    inner.state = State::Open;
                    inner.opened_at = Some(Instant::now());
                    Some(("Closed".to_string(), "Open".to_string()))
                } else {
                    None
                }
            }
            State::HalfOpen => {
                inner.state = State::Open;
                inner.opened_at = Some(Instant::now());
                inner.consecutive_successes = 0;
                Some(("HalfOpen".to_string(), "Open".to_string()))
            }
            State::Open => None,
        };
        drop(inner);
        if let Some((from, to)) = transitioned {
            warn!("circuit breaker {} -> {}", from, to);
            self.callbacks.on_state_change(&from, &to);
        }
    }

    #[cfg(test)]
    fn is_closed(&self) -> bool {
        self.inner.lock().expect("mutex poisoned").state == State::Closed
    }

    #[cfg(test)]
    fn is_open(&self) -> bool {
        self.inner.lock().expect("mutex poisoned").state == State::Open
    }
}
