//! Retry scheduling.
//!
//! The pipeline never loops on failure; the runner hands a retryable failure
//! to a [`RetryScheduler`] with the next attempt number. [`BackoffScheduler`]
//! waits an exponentially growing, jittered delay and then submits the
//! invocation back onto the worker's queue.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use scribe_core::config::WorkerConfig;
use tokio::sync::mpsc;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use uuid::Uuid;

use crate::subsystems::runner::Invocation;

#[async_trait]
pub trait RetryScheduler: Send + Sync {
    /// Arrange for `attempt` of `capture_id` to run later.
    async fn schedule(&self, capture_id: Uuid, attempt: u32) -> Result<()>;
}

pub struct BackoffScheduler {
    queue: mpsc::Sender<Invocation>,
    base_ms: u64,
    max_delay: Duration,
}

impl BackoffScheduler {
    pub fn new(queue: mpsc::Sender<Invocation>, base_ms: u64, max_delay: Duration) -> Self {
        Self {
            queue,
            base_ms,
            max_delay,
        }
    }

    pub fn from_config(queue: mpsc::Sender<Invocation>, config: &WorkerConfig) -> Self {
        Self::new(
            queue,
            config.retry_base_ms,
            Duration::from_secs(config.retry_max_delay_seconds),
        )
    }

    /// Un-jittered delay before `attempt` (attempt 2 is the first retry).
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let retry_index = attempt.saturating_sub(2) as usize;
        ExponentialBackoff::from_millis(self.base_ms.max(1))
            .max_delay(self.max_delay)
            .nth(retry_index)
            .unwrap_or(self.max_delay)
    }
}

#[async_trait]
impl RetryScheduler for BackoffScheduler {
    async fn schedule(&self, capture_id: Uuid, attempt: u32) -> Result<()> {
        if self.queue.is_closed() {
            anyhow::bail!("invocation queue closed");
        }

        let delay = jitter(self.base_delay(attempt));
        tracing::info!(
            capture_id = %capture_id,
            attempt,
            delay_ms = delay.as_millis() as u64,
            "Scheduling retry"
        );

        let queue = self.queue.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if queue.send(Invocation { capture_id, attempt }).await.is_err() {
                tracing::warn!(capture_id = %capture_id, attempt, "Worker stopped before retry could run");
            }
        });

        Ok(())
    }
}
