//! Retry handler for managing retry logic across operations

use std::future::Future;
use tokio::time::{sleep, Duration};

use crate::config::IndexerConfig;
use crate::utils::logging;

/// Handles retry logic for operations that may fail temporarily
#[derive(Debug, Clone)]
pub struct RetryHandler {
    max_retries: u32,
    base_delay_ms: u64,
    max_delay_ms: u64,
}

impl RetryHandler {
    pub fn with_config(max_retries: u32, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_retries,
            base_delay_ms,
            max_delay_ms,
        }
    }

    /// Backoff of the indexer config; `max_retries` bounds persistence failures
    pub fn from_indexer_config(config: &IndexerConfig) -> Self {
        Self::with_config(
            config.persistence_retry_budget,
            config.retry_base_delay_ms,
            config.retry_max_delay_ms,
        )
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Execute an operation with retry logic and custom error handling
    pub async fn execute_with_retry_and_logging<F, Fut, T, E>(
        &self,
        operation: F,
        operation_name: &str,
        component: &str,
    ) -> Result<T, E>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut retry_count = 0;

        loop {
            match operation().await {
                Ok(result) => {
                    if retry_count > 0 {
                        logging::log_info(&format!(
                            "[{}] {} succeeded after {} retries",
                            component, operation_name, retry_count
                        ));
                    }
                    return Ok(result);
                }
                Err(e) => {
                    retry_count += 1;

                    if retry_count >= self.max_retries {
                        logging::log_error(&format!(
                            "[{}] {} failed after {} attempts: {}",
                            component, operation_name, self.max_retries, e
                        ));
                        return Err(e);
                    }

                    let delay = self.calculate_delay(retry_count);
                    logging::log_error(&format!(
                        "[{}] {} failed (attempt {}/{}): {}. Retrying in {}ms",
                        component, operation_name, retry_count, self.max_retries, e, delay
                    ));

                    sleep(Duration::from_millis(delay)).await;
                }
            }
        }
    }

    /// Exponential backoff delay, capped at the configured maximum
    pub fn calculate_delay(&self, retry_count: u32) -> u64 {
        let factor = 2_u64.saturating_pow(retry_count.saturating_sub(1));
        self.base_delay_ms
            .saturating_mul(factor)
            .min(self.max_delay_ms)
    }
}
