//! Job invocation: one attempt at one capture.
//!
//! The runner wraps [`Pipeline::process`] with the pieces the pipeline leaves
//! to its caller: a per-capture lease so two attempts never overlap, the
//! reset that precedes a retry, and the hand-off of retryable failures to a
//! [`RetryScheduler`].

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use scribe_core::{CaptureStatus, GeneratedNote, ScribeError, TransitionError};
use uuid::Uuid;

use crate::subsystems::pipeline::Pipeline;
use crate::subsystems::scheduler::RetryScheduler;

/// One attempt at processing a capture. Attempts are numbered from 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Invocation {
    pub capture_id: Uuid,
    pub attempt: u32,
}

impl Invocation {
    pub fn first(capture_id: Uuid) -> Self {
        Self {
            capture_id,
            attempt: 1,
        }
    }

    pub fn next(self) -> Self {
        Self {
            capture_id: self.capture_id,
            attempt: self.attempt + 1,
        }
    }
}

#[derive(Debug)]
pub enum InvocationOutcome {
    Published(GeneratedNote),
    /// Another attempt holds the lease for this capture.
    Busy,
    Failed {
        error: ScribeError,
        retry_scheduled: bool,
    },
}

impl InvocationOutcome {
    pub fn is_published(&self) -> bool {
        matches!(self, Self::Published(_))
    }
}

// ============================================================================
// Per-capture exclusion
// ============================================================================

/// Guarantees at most one active pipeline per capture id.
pub trait CaptureLocks: Send + Sync {
    /// `None` when the capture is already leased.
    fn try_acquire(&self, capture_id: Uuid) -> Option<CaptureLease>;
}

/// Held for the duration of an attempt; releases on drop.
pub struct CaptureLease {
    capture_id: Uuid,
    release: Box<dyn FnOnce(Uuid) + Send>,
}

impl CaptureLease {
    pub fn new(capture_id: Uuid, release: impl FnOnce(Uuid) + Send + 'static) -> Self {
        Self {
            capture_id,
            release: Box::new(release),
        }
    }

    pub fn capture_id(&self) -> Uuid {
        self.capture_id
    }
}

impl Drop for CaptureLease {
    fn drop(&mut self) {
        let release = std::mem::replace(&mut self.release, Box::new(|_| {}));
        release(self.capture_id);
    }
}

/// Leases tracked in process memory. Sufficient for a single worker process.
#[derive(Default, Clone)]
pub struct InProcessLocks {
    active: Arc<Mutex<HashSet<Uuid>>>,
}

impl InProcessLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active_count(&self) -> usize {
        self.active.lock().map(|set| set.len()).unwrap_or(0)
    }
}

impl CaptureLocks for InProcessLocks {
    fn try_acquire(&self, capture_id: Uuid) -> Option<CaptureLease> {
        let mut active = self.active.lock().ok()?;
        if !active.insert(capture_id) {
            return None;
        }

        let set = Arc::clone(&self.active);
        Some(CaptureLease::new(capture_id, move |id| {
            if let Ok(mut active) = set.lock() {
                active.remove(&id);
            }
        }))
    }
}

// ============================================================================
// Runner
// ============================================================================

pub struct JobRunner {
    pipeline: Arc<Pipeline>,
    scheduler: Arc<dyn RetryScheduler>,
    locks: Arc<dyn CaptureLocks>,
    max_attempts: u32,
}

impl JobRunner {
    pub fn new(
        pipeline: Arc<Pipeline>,
        scheduler: Arc<dyn RetryScheduler>,
        locks: Arc<dyn CaptureLocks>,
        max_attempts: u32,
    ) -> Self {
        Self {
            pipeline,
            scheduler,
            locks,
            max_attempts,
        }
    }

    pub async fn invoke(&self, invocation: Invocation) -> InvocationOutcome {
        let Invocation { capture_id, attempt } = invocation;

        let Some(_lease) = self.locks.try_acquire(capture_id) else {
            tracing::debug!(capture_id = %capture_id, attempt, "Capture already in flight, skipping");
            return InvocationOutcome::Busy;
        };

        tracing::info!(capture_id = %capture_id, attempt, "Processing capture");

        let result = match self.prepare_retry(invocation).await {
            Ok(()) => self.pipeline.process(capture_id).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(note) => InvocationOutcome::Published(note),
            Err(error) => {
                let retry_scheduled = self.schedule_retry(invocation, &error).await;
                InvocationOutcome::Failed {
                    error,
                    retry_scheduled,
                }
            }
        }
    }

    /// Later attempts start from a clean `pending` record. A capture that was
    /// published in the meantime is left alone and the attempt ends as a
    /// non-retryable failure.
    async fn prepare_retry(&self, invocation: Invocation) -> Result<(), ScribeError> {
        if invocation.attempt <= 1 {
            return Ok(());
        }
        if self.pipeline.store().requeue(invocation.capture_id).await? {
            return Ok(());
        }

        tracing::warn!(
            capture_id = %invocation.capture_id,
            attempt = invocation.attempt,
            "Stale retry for a published capture, skipping"
        );
        Err(ScribeError::InvalidTransition(TransitionError {
            from: CaptureStatus::Published,
            to: CaptureStatus::Pending,
        }))
    }

    async fn schedule_retry(&self, invocation: Invocation, error: &ScribeError) -> bool {
        if !error.is_retryable() {
            tracing::warn!(capture_id = %invocation.capture_id, error = %error, "Failure is not retryable");
            return false;
        }
        if invocation.attempt >= self.max_attempts {
            tracing::error!(
                capture_id = %invocation.capture_id,
                attempts = invocation.attempt,
                "Retry attempts exhausted"
            );
            return false;
        }

        let next = invocation.next();
        match self.scheduler.schedule(next.capture_id, next.attempt).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(capture_id = %next.capture_id, error = %e, "Failed to schedule retry");
                false
            }
        }
    }
}
