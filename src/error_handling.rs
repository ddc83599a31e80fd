use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::error::ClientError;
use crate::metrics::{ErrorType, MetricsCollector};

#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub backoff_multiplier: f64,
    pub max_retry_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_millis(1000),
            backoff_multiplier: 2.0,
            max_retry_delay: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    /// Delay before retry number `attempt` (0-based), capped at `max_retry_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let secs = self.retry_delay.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32);
        Duration::from_secs_f64(secs.min(self.max_retry_delay.as_secs_f64()))
    }
}

/// Whether an error is worth another attempt.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for ClientError {
    fn is_retryable(&self) -> bool {
        match self {
            ClientError::Http(e) => !e.is_decode() && !e.is_builder(),
            ClientError::Status { status, .. } => *status == 429 || *status >= 500,
            ClientError::Problem(_) => false,
        }
    }
}

pub struct ErrorHandler {
    retry_config: RetryConfig,
    metrics: Option<Arc<MetricsCollector>>,
}

impl ErrorHandler {
    pub fn new(retry_config: RetryConfig) -> Self {
        Self {
            retry_config,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry_config
    }

    /// Run `operation`, retrying retryable failures with exponential backoff.
    pub async fn execute_with_retry<F, Fut, T, E>(&self, what: &str, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + Display,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(error) => {
                    if let Some(metrics) = &self.metrics {
                        metrics.record_error(ErrorType::Network);
                    }
                    if attempt >= self.retry_config.max_retries || !error.is_retryable() {
                        return Err(error);
                    }
                    let delay = self.retry_config.delay_for(attempt);
                    warn!(
                        target: "mini_miner::retry",
                        operation = what,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        %error,
                        "retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
