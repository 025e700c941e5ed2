use std::future::Future;
use std::time::Duration;

use super::classification::ErrorClassification;
use super::types::BlindsightError;
use tracing::warn;

const MAX_RETRY_DELAY: Duration = Duration::from_secs(10);

impl ErrorClassification {
    /// Delay before the next attempt (0-indexed) given the configured base delay.
    ///
    /// - NetworkError: linear backoff `base * (attempt + 1)`, capped at 10s
    /// - Default: the base delay unchanged
    pub fn retry_delay(&self, attempt: u32, base: Duration) -> Duration {
        match self.error_type {
            "NetworkError" => base.saturating_mul(attempt + 1).min(MAX_RETRY_DELAY),
            _ => base,
        }
    }
}

/// Retry configuration for transport operations.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            delay: Duration::ZERO,
        }
    }
}

/// Execute an async operation with retry logic.
///
/// Retries only if the error is classified as retryable and we haven't
/// exceeded max_retries.
pub async fn with_retry<F, Fut, T>(
    operation_name: &str,
    config: &RetryConfig,
    mut factory: F,
) -> Result<T, BlindsightError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, BlindsightError>>,
{
    let max_attempts = config.max_retries + 1;
    let mut last_error = None;

    for attempt in 0..max_attempts {
        match factory().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                let classification = e.classify();

                if !classification.retryable || attempt + 1 >= max_attempts {
                    if classification.retryable {
                        warn!(
                            operation = operation_name,
                            attempt = attempt + 1,
                            max = max_attempts,
                            "Max retries exhausted"
                        );
                    }
                    return Err(e);
                }

                let delay = classification.retry_delay(attempt, config.delay);
                warn!(
                    operation = operation_name,
                    attempt = attempt + 1,
                    max = max_attempts,
                    error_type = classification.error_type,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Retrying after error"
                );

                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| BlindsightError::Internal("Retry loop exited unexpectedly".into())))
}
