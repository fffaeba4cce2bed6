use thiserror::Error;

/// Lock mode a `LockConflict` was raised against, for structured handling
/// by callers that want to distinguish a blocked reader from a blocked
/// writer rather than parsing `Display` text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Read,
    Write,
}

impl std::fmt::Display for LockMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Read => write!(f, "read"),
            Self::Write => write!(f, "write"),
        }
    }
}

/// Typed error hierarchy for the orchestration runtime.
///
/// Use at module/component boundaries (bus, queue, circuit breaker, conflict
/// detector, tool policy, scratchpad). Internal/leaf functions can continue
/// using `anyhow::Result` — the `Internal` variant allows seamless conversion
/// via the `?` operator.
#[derive(Debug, Error, Clone)]
pub enum BuckleyError {
    #[error("operation timed out")]
    Timeout,

    #[error("operation canceled")]
    Canceled,

    #[error("bus or subscription closed")]
    Closed,

    #[error("no responders for request")]
    NoResponders,

    #[error("queue is empty")]
    QueueEmpty,

    #[error("lock conflict on {path:?}: held by '{holder}' ({mode}), timeout={timeout}")]
    LockConflict {
        path: String,
        holder: String,
        mode: LockMode,
        timeout: bool,
    },

    #[error("circuit open: {failures} consecutive failures, retry after {retry_after_secs}s")]
    CircuitOpen {
        failures: u32,
        last_error: String,
        retry_after_secs: u64,
        recent_errors: Vec<String>,
    },

    #[error("tool not allowed: {0}")]
    ToolNotAllowed(String),

    #[error("insufficient authorization: {0}")]
    InsufficientAuth(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("transient error: {0}")]
    Transient(String),

    #[error("fatal error: {0}")]
    Fatal(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl BuckleyError {
    /// Whether this error is transient and the operation should be retried.
    ///
    /// Only `Transient` and `CircuitOpen` (which already carries a retry
    /// hint) are retryable; every other variant, including `Internal`,
    /// is treated as non-retryable since we cannot classify an opaque
    /// `anyhow::Error` as safely retriable without more context.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::CircuitOpen { .. })
    }
}
