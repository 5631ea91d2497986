//! Required and optional work for one leaf evaluation

use crate::error::AppError;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, error};

/// Tasks split into work that must finish and best-effort work.
///
/// Required tasks are awaited in full. Optional tasks run under a child
/// token that a timer cancels `grace` after `start`, or once the required
/// tasks are done, whichever is later. Dropping the scope cancels and aborts
/// everything still running.
pub struct WorkScope {
    required: JoinSet<()>,
    optional: JoinSet<()>,
    optional_cancel: CancellationToken,
    start: Instant,
    grace: Duration,
    _guard: DropGuard,
}

impl WorkScope {
    pub fn new(parent: &CancellationToken, start: Instant, grace: Duration) -> Self {
        let optional_cancel = parent.child_token();
        let guard = optional_cancel.clone().drop_guard();
        Self {
            required: JoinSet::new(),
            optional: JoinSet::new(),
            optional_cancel,
            start,
            grace,
            _guard: guard,
        }
    }

    pub fn spawn_required<F>(&mut self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.required.spawn(task);
    }

    /// Optional work stops as soon as the grace timer fires
    pub fn spawn_optional<F>(&mut self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let cancel = self.optional_cancel.clone();
        self.optional.spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = task => {}
            }
        });
    }

    pub fn optional_token(&self) -> CancellationToken {
        self.optional_cancel.clone()
    }

    /// Wait for required work, then give optional work what is left of the grace period.
    ///
    /// Returns one error per required task that panicked or was aborted.
    /// Optional task failures are only logged.
    pub async fn wait(mut self) -> Vec<AppError> {
        let mut failures = Vec::new();
        while let Some(joined) = self.required.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Required search task failed");
                failures.push(AppError::Internal(format!("required search task failed: {}", e)));
            }
        }

        if self.optional.is_empty() {
            return failures;
        }

        let deadline = tokio::time::Instant::from_std(self.start + self.grace);
        let cancel = self.optional_cancel.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            cancel.cancel();
        });

        while let Some(joined) = self.optional.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Optional search task failed");
            }
        }
        timer.abort();

        if self.optional_cancel.is_cancelled() {
            debug!(
                grace_ms = self.grace.as_millis() as u64,
                "Optional searches cut off after grace period"
            );
        }
        failures
    }
}
