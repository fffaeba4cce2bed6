//! Scenario S3: two tasks contend for a write lock on the same path. The
//! second acquisition times out while the first holds it, then succeeds
//! once the first releases.

use buckley_core::conflict::ConflictDetector;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn contended_write_lock_times_out_then_succeeds_after_release() {
    let detector = Arc::new(ConflictDetector::new());

    detector.acquire_write("task-a", "src/main.rs").await.unwrap();

    let waiter = {
        let detector = detector.clone();
        tokio::spawn(async move {
            let started = tokio::time::Instant::now();
            let result = detector
                .acquire_write_timeout("task-b", "src/main.rs", Duration::from_millis(50))
                .await;
            (result, started.elapsed())
        })
    };

    let (result, elapsed) = waiter.await.unwrap();
    assert!(elapsed >= Duration::from_millis(45));
    let err = result.expect_err("lock should still be held by task-a");
    let message = err.to_string();
    assert!(message.contains("src/main.rs"), "unexpected lock error: {message}");
    assert!(message.contains("held by 'task-a'"), "unexpected lock error: {message}");
    assert!(message.contains("(write)"), "unexpected lock error: {message}");
    assert!(message.contains("timeout=true"), "unexpected lock error: {message}");

    detector.release_write("task-a", "src/main.rs");

    // The path is free now; a fresh acquisition succeeds immediately.
    detector
        .acquire_write_timeout("task-b", "src/main.rs", Duration::from_millis(50))
        .await
        .unwrap();
}
