//! Scenario S4: three consecutive failures open the breaker; calls then
//! fail fast until the timeout elapses, and two consecutive successes in
//! the half-open state close it again.

use buckley_core::circuit::{CircuitBreaker, CircuitConfig};
use std::time::Duration;

#[tokio::test]
async fn three_failures_open_then_two_successes_recover() {
    let breaker = CircuitBreaker::new(CircuitConfig {
        max_failures: 3,
        timeout: Duration::from_millis(100),
        success_threshold: 2,
        max_recent_errors: 5,
    });

    for _ in 0..3 {
        let _: Result<(), _> = breaker.call(|| async { Err::<(), &str>("boom") }).await;
    }

    // After 3 failures the breaker must reject new calls without invoking `f`.
    let mut invoked = false;
    let fast_fail = breaker
        .call(|| async {
            invoked = true;
            Ok::<(), &str>(())
        })
        .await;
    assert!(fast_fail.is_err(), "breaker should be open after 3 failures");
    assert!(!invoked, "open breaker must fail fast without calling f");

    tokio::time::sleep(Duration::from_millis(120)).await;

    // First call after the timeout is admitted (half-open) and succeeds.
    breaker.call(|| async { Ok::<(), &str>(()) }).await.unwrap();
    // Breaker is still half-open after one success (success_threshold=2).
    let still_half_open_probe_allowed = breaker.call(|| async { Ok::<(), &str>(()) }).await;
    assert!(still_half_open_probe_allowed.is_ok());

    // Two consecutive successes closed the breaker; further calls are admitted freely.
    breaker.call(|| async { Ok::<(), &str>(()) }).await.unwrap();
}
