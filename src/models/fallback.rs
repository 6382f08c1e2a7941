use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::models::provider::{ChatRequest, ChatResponse, ModelProvider};

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Additional attempts after the first; 1 means at most 2 calls total.
    pub max_retries: usize,
    pub retry_delay: Duration,
    /// Per-attempt deadline. An attempt that outlives it is abandoned and
    /// counted as a transient failure.
    pub request_timeout: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 1,
            retry_delay: Duration::from_millis(500),
            request_timeout: Duration::from_secs(20),
        }
    }
}

/// Audit record for a single provider call, kept per request so operators
/// can see what happened without digging through logs.
#[derive(Debug, Clone)]
pub struct ProviderAttempt {
    pub attempt_number: usize,
    pub error: Option<String>,
    pub response_time_ms: u64,
    pub success: bool,
}

/// Runs a provider call under a per-attempt timeout, retrying only
/// transient failures ([`Error::is_transient`]). Auth errors and other 4xx
/// responses abort immediately.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub async fn run(
        &self,
        provider: &dyn ModelProvider,
        request: &ChatRequest,
    ) -> (Result<ChatResponse>, Vec<ProviderAttempt>) {
        let max_attempts = self.config.max_retries + 1;
        let mut attempts = Vec::with_capacity(max_attempts);
        let mut last_error = None;

        for attempt_num in 1..=max_attempts {
            let start_time = Instant::now();

            let result = match timeout(
                self.config.request_timeout,
                provider.send_message(request.clone()),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(Error::unavailable(format!(
                    "Request timeout after {}ms",
                    self.config.request_timeout.as_millis()
                ))),
            };

            let elapsed_ms = start_time.elapsed().as_millis() as u64;

            match result {
                Ok(response) => {
                    attempts.push(ProviderAttempt {
                        attempt_number: attempt_num,
                        error: None,
                        response_time_ms: elapsed_ms,
                        success: true,
                    });
                    debug!(
                        "Provider call succeeded on attempt {}/{} in {}ms",
                        attempt_num, max_attempts, elapsed_ms
                    );
                    return (Ok(response), attempts);
                }
                Err(e) => {
                    attempts.push(ProviderAttempt {
                        attempt_number: attempt_num,
                        error: Some(e.to_string()),
                        response_time_ms: elapsed_ms,
                        success: false,
                    });
                    warn!(
                        "Provider call failed on attempt {}/{}: {}",
                        attempt_num, max_attempts, e
                    );

                    let transient = e.is_transient();
                    last_error = Some(e);

                    if !transient {
                        break;
                    }
                    if attempt_num < max_attempts && !self.config.retry_delay.is_zero() {
                        tokio::time::sleep(self.config.retry_delay).await;
                    }
                }
            }
        }

        let error = last_error.unwrap_or_else(|| Error::unavailable("No attempts were made"));
        (Err(error), attempts)
    }
}
