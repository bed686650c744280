//! Method-scoped retry for transient transport failures
//!
//! Only network-level failures (connect errors, timeouts) are retried, and
//! only for methods in the configured retry-eligible set. Application-level
//! error responses are never retried here - the refresh coordinator is the
//! only layer that treats a status (401) specially.

use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use reqwest::Method;
use tracing::warn;

use crate::error::{Error, Result};

/// Retry policy configuration
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retries after the initial attempt
    pub limit: u32,
    /// Methods eligible for automatic retry
    pub methods: Vec<Method>,
    /// Base delay for exponential backoff
    pub initial_delay: Duration,
    /// Cap on the delay between attempts
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            limit: 3,
            methods: vec![Method::GET, Method::POST],
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Create a policy with a custom retry limit
    pub fn new(limit: u32) -> Self {
        Self { limit, ..Default::default() }
    }

    /// Replace the set of retry-eligible methods
    pub fn with_methods(mut self, methods: Vec<Method>) -> Self {
        self.methods = methods;
        self
    }

    /// Set the base backoff delay
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Check whether a method is in the retry-eligible set
    pub fn is_eligible(&self, method: &Method) -> bool {
        self.methods.contains(method)
    }

    /// Decide whether to retry after `failures` failed attempts
    pub fn should_retry(&self, method: &Method, error: &Error, failures: u32) -> RetryDecision {
        if failures > self.limit {
            return RetryDecision::NoRetry;
        }

        if !self.is_eligible(method) {
            return RetryDecision::NoRetry;
        }

        if !error.is_transient() {
            return RetryDecision::NoRetry;
        }

        RetryDecision::Retry
    }

    /// Create the backoff schedule for one request (jittered exponential)
    pub(crate) fn create_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.initial_delay,
            max_interval: self.max_delay,
            max_elapsed_time: None, // attempts are bounded by `limit`
            ..Default::default()
        }
    }
}

/// Decision on whether to retry an attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry,
    NoRetry,
}

/// Execute an attempt closure with the policy's retry behavior.
///
/// The closure is invoked once per attempt; it must build a fresh transport
/// request each time (descriptors are cloneable for exactly this reason).
pub(crate) async fn execute_with_retry<F, Fut, T>(
    method: &Method,
    policy: &RetryPolicy,
    mut attempt: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut backoff = policy.create_backoff();
    let mut failures: u32 = 0;

    loop {
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                failures += 1;
                match policy.should_retry(method, &error, failures) {
                    RetryDecision::Retry => {
                        let delay = backoff.next_backoff().unwrap_or(policy.max_delay);
                        warn!(
                            %method,
                            attempt = failures,
                            ?delay,
                            "transient failure, retrying: {}",
                            error
                        );
                        tokio::time::sleep(delay).await;
                    }
                    RetryDecision::NoRetry => return Err(error),
                }
            }
        }
    }
}
