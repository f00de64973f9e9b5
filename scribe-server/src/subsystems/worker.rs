//! Background capture worker.
//!
//! Two sources feed the worker: a periodic poll for `pending` captures (first
//! attempts) and the invocation queue (HTTP triggers and scheduled retries).
//! Each invocation runs in its own task, bounded by `max_concurrent`.

use std::sync::Arc;

use scribe_core::config::WorkerConfig;
use scribe_core::CaptureStore;
use tokio::sync::{broadcast, mpsc, Semaphore};
use tokio::time::{interval, Duration, MissedTickBehavior};

use crate::subsystems::runner::{Invocation, InvocationOutcome, JobRunner};

/// Capacity of the invocation queue shared by triggers and retries.
pub const QUEUE_CAPACITY: usize = 256;

pub fn invocation_queue() -> (mpsc::Sender<Invocation>, mpsc::Receiver<Invocation>) {
    mpsc::channel(QUEUE_CAPACITY)
}

/// Run the worker until `shutdown` fires.
pub async fn run_worker(
    store: Arc<dyn CaptureStore>,
    runner: Arc<JobRunner>,
    config: WorkerConfig,
    mut queue: mpsc::Receiver<Invocation>,
    mut shutdown: broadcast::Receiver<()>,
) {
    if !config.enabled {
        tracing::info!("Capture worker disabled via config");
        return;
    }

    let permits = Arc::new(Semaphore::new(config.max_concurrent.max(1)));
    let mut ticker = interval(Duration::from_secs(config.poll_interval_seconds.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(
        poll_interval_s = config.poll_interval_seconds,
        max_concurrent = config.max_concurrent,
        max_attempts = config.max_attempts,
        "Capture worker started"
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match poll_pending(store.as_ref(), config.batch_size).await {
                    Ok(invocations) => {
                        for invocation in invocations {
                            dispatch(&runner, &permits, invocation).await;
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "Pending capture poll failed"),
                }
            }
            Some(invocation) = queue.recv() => {
                dispatch(&runner, &permits, invocation).await;
            }
            _ = shutdown.recv() => {
                tracing::info!("Shutting down capture worker...");
                break;
            }
        }
    }

    // Let in-flight attempts finish.
    let _ = permits.acquire_many(config.max_concurrent.max(1) as u32).await;
    tracing::info!("Capture worker stopped");
}

/// First attempts for the oldest pending captures.
pub async fn poll_pending(
    store: &dyn CaptureStore,
    batch_size: usize,
) -> scribe_core::error::Result<Vec<Invocation>> {
    let ids = store.pending_captures(batch_size).await?;
    if !ids.is_empty() {
        tracing::debug!(count = ids.len(), "Found pending captures");
    }
    Ok(ids.into_iter().map(Invocation::first).collect())
}

async fn dispatch(runner: &Arc<JobRunner>, permits: &Arc<Semaphore>, invocation: Invocation) {
    let Ok(permit) = Arc::clone(permits).acquire_owned().await else {
        return;
    };

    let runner = Arc::clone(runner);
    tokio::spawn(async move {
        let _permit = permit;
        log_outcome(invocation, &runner.invoke(invocation).await);
    });
}

fn log_outcome(invocation: Invocation, outcome: &InvocationOutcome) {
    match outcome {
        InvocationOutcome::Published(note) => tracing::info!(
            capture_id = %invocation.capture_id,
            attempt = invocation.attempt,
            path = %note.file_path,
            "Invocation published capture"
        ),
        InvocationOutcome::Busy => tracing::debug!(
            capture_id = %invocation.capture_id,
            "Invocation skipped, capture busy"
        ),
        InvocationOutcome::Failed {
            error,
            retry_scheduled,
        } => tracing::warn!(
            capture_id = %invocation.capture_id,
            attempt = invocation.attempt,
            retry_scheduled = *retry_scheduled,
            error = %error,
            "Invocation failed"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subsystems::pipeline::{Pipeline, PipelineSettings};
    use crate::subsystems::runner::InProcessLocks;
    use crate::subsystems::scheduler::BackoffScheduler;
    use scribe_core::mock::MockGenerator;
    use scribe_core::{Capture, CaptureStatus, MemoryCaptureStore};
    use tempfile::TempDir;
    use uuid::Uuid;

    const RESPONSE: &str = "# Worker Note\n\n## Summary\nDone.\n";

    fn worker_config() -> WorkerConfig {
        WorkerConfig {
            enabled: true,
            poll_interval_seconds: 1,
            batch_size: 10,
            max_concurrent: 2,
            max_attempts: 3,
            retry_base_ms: 1,
            retry_max_delay_seconds: 1,
        }
    }

    async fn wait_for_status(store: &MemoryCaptureStore, id: Uuid, status: CaptureStatus) -> bool {
        for _ in 0..200 {
            if store.get(id).map(|c| c.status) == Some(status) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_poll_pending_builds_first_attempts() {
        let store = MemoryCaptureStore::new();
        let capture = Capture::new(Uuid::new_v4(), "c", "note");
        let id = capture.id;
        store.insert_capture(capture);

        let invocations = poll_pending(&store, 5).await.unwrap();
        assert_eq!(invocations, vec![Invocation::first(id)]);
    }

    #[tokio::test]
    async fn test_worker_retries_until_published() {
        let vault = TempDir::new().unwrap();
        let store = Arc::new(MemoryCaptureStore::new());
        let capture = Capture::new(Uuid::new_v4(), "content", "article");
        let id = capture.id;
        store.set_vault_root(capture.user_id, vault.path().to_string_lossy());
        store.insert_capture(capture);

        let generator = MockGenerator::new()
            .with_fixed_response(RESPONSE)
            .then_fail("overloaded");
        let config = worker_config();

        let (tx, rx) = invocation_queue();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let pipeline = Arc::new(Pipeline::new(
            store.clone(),
            Arc::new(generator.clone()),
            PipelineSettings::default(),
        ));
        let runner = Arc::new(JobRunner::new(
            pipeline,
            Arc::new(BackoffScheduler::from_config(tx.clone(), &config)),
            Arc::new(InProcessLocks::new()),
            config.max_attempts,
        ));

        let handle = tokio::spawn(run_worker(store.clone(), runner, config, rx, shutdown_rx));

        assert!(
            wait_for_status(&store, id, CaptureStatus::Published).await,
            "capture should be published after a retry"
        );
        assert_eq!(generator.call_count(), 2);
        assert!(vault.path().join("Captures/Worker Note.md").is_file());

        shutdown_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("worker did not stop")
            .unwrap();
    }

    #[tokio::test]
    async fn test_disabled_worker_returns_immediately() {
        let store = Arc::new(MemoryCaptureStore::new());
        let mut config = worker_config();
        config.enabled = false;

        let (tx, rx) = invocation_queue();
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let pipeline = Arc::new(Pipeline::new(
            store.clone(),
            Arc::new(MockGenerator::new()),
            PipelineSettings::default(),
        ));
        let runner = Arc::new(JobRunner::new(
            pipeline,
            Arc::new(BackoffScheduler::from_config(tx, &config)),
            Arc::new(InProcessLocks::new()),
            3,
        ));

        tokio::time::timeout(
            Duration::from_secs(1),
            run_worker(store, runner, config, rx, shutdown_rx),
        )
        .await
        .expect("disabled worker should return");
    }
}
