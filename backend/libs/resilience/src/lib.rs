/// Retry and timeout combinators for calls to external collaborators
///
/// - **Retry**: exponential backoff with optional jitter, bounded attempts;
///   the last failure is kept for the caller
/// - **Timeout**: bound a future by a duration
///
/// The two compose: wrap each attempt in a timeout and retry the whole.
///
/// # Example: bounded, retried write
///
/// ```rust,no_run
/// use resilience::{with_retry, with_timeout_result, RetryConfig};
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() {
///     let result = with_retry(RetryConfig::default(), || {
///         with_timeout_result(Duration::from_secs(30), async {
///             // Your write here
///             Ok::<_, String>(())
///         })
///     })
///     .await;
/// }
/// ```

pub mod retry;
pub mod timeout;

pub use retry::{with_retry, with_retry_if, RetryConfig, RetryError};
pub use timeout::{with_timeout, with_timeout_result, TimeoutConfig, TimeoutError};
