use super::*;
use std::sync::atomic::{AtomicUsize, Ordering};

#[tokio::test]
async fn retry_consults_buckley_error_is_retryable() {
    // `retry` defers to `BuckleyError::is_retryable()` rather than its own
    // classifier — `Timeout` is not retryable per that taxonomy, so a
    // timeout on the first attempt must not be retried.
    let policy = RetryPolicy {
        max_retries: 5,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(2),
        multiplier: 2.0,
    };
    let calls = AtomicUsize::new(0);
    let result: Result<(), BuckleyError> = retry(&policy, || {
        calls.fetch_add(1, Ordering::SeqCst);
        async { Err(BuckleyError::Timeout) }
    })
    .await;
    assert!(result.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn retry_succeeds_after_transient_failures() {
    let policy = RetryPolicy {
        max_retries: 3,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        multiplier: 2.0,
    };
    let calls = AtomicUsize::new(0);
    let result = retry(&policy, || {
        let n = calls.fetch_add(1, Ordering::SeqCst);
        async move {
            if n < 2 {
                Err(BuckleyError::Transient("not yet".into()))
            } else {
                Ok(42)
            }
        }
    })
    .await;
    assert_eq!(result.unwrap(), 42);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn retry_gives_up_on_non_retriable_error() {
    let policy = RetryPolicy {
        max_retries: 5,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        multiplier: 2.0,
    };
    let calls = AtomicUsize::new(0);
    let result: Result<(), BuckleyError> = retry(&policy, || {
        calls.fetch_add(1, Ordering::SeqCst);
        async { Err(BuckleyError::InvalidArgument("nope".into())) }
    })
    .await;
    assert!(result.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn retry_exhausts_all_attempts() {
    let policy = RetryPolicy {
        max_retries: 2,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(2),
        multiplier: 2.0,
    };
    let calls = AtomicUsize::new(0);
    let result: Result<(), BuckleyError> = retry(&policy, || {
        calls.fetch_add(1, Ordering::SeqCst);
        async { Err(BuckleyError::Transient("always".into())) }
    })
    .await;
    assert!(result.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}
