/// Integration tests for resilience library
use resilience::{
    retry::{with_retry, RetryConfig, RetryError},
    timeout::{with_timeout_result, TimeoutError},
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn no_jitter(max_retries: u32) -> RetryConfig {
    RetryConfig {
        max_retries,
        initial_backoff: Duration::from_millis(5),
        jitter: false,
        ..Default::default()
    }
}

// ==================== Retry + Timeout ====================

#[tokio::test]
async fn test_slow_first_attempt_times_out_then_succeeds() {
    let counter = Arc::new(AtomicU32::new(0));
    let counter_clone = counter.clone();

    let result = with_retry(no_jitter(2), move || {
        let attempt = counter_clone.fetch_add(1, Ordering::SeqCst);
        with_timeout_result(Duration::from_millis(20), async move {
            if attempt == 0 {
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
            Ok::<_, String>(attempt)
        })
    })
    .await;

    assert_eq!(result.unwrap(), 1);
    assert_eq!(counter.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_exhausted_reports_last_timeout() {
    let result = with_retry(no_jitter(1), || {
        with_timeout_result(Duration::from_millis(5), async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok::<_, String>(())
        })
    })
    .await;

    match result {
        Err(RetryError::Exhausted {
            attempts,
            last_error,
        }) => {
            assert_eq!(attempts, 2);
            assert!(matches!(last_error, TimeoutError::Elapsed(_)));
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[tokio::test]
async fn test_operation_error_passes_through_both_layers() {
    let result = with_retry(no_jitter(0), || {
        with_timeout_result(Duration::from_secs(1), async { Err::<(), _>("rejected") })
    })
    .await;

    let err = result.unwrap_err();
    assert_eq!(err.attempts(), 1);
    assert_eq!(err.into_inner().into_inner(), Some("rejected"));
}

#[test]
fn test_retry_outside_async_context() {
    let result = tokio_test::block_on(with_retry(no_jitter(1), || async { Ok::<_, String>("ok") }));
    assert_eq!(result.unwrap(), "ok");
}

#[test]
fn test_config_helpers() {
    let config = RetryConfig::with_max_retries(4);
    assert_eq!(config.max_attempts(), 5);
    assert!(config.jitter);
}
