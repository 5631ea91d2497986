//! Resizable concurrency limiter for backend requests

use super::client::RepoSearchError;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

#[derive(Debug)]
struct LimiterState {
    limit: usize,
    in_use: usize,
}

/// Bounded permit pool whose size can change while permits are held.
///
/// Shrinking never revokes permits already handed out; new acquisitions
/// wait until usage drops below the new limit.
#[derive(Debug)]
pub struct MutableLimiter {
    state: Mutex<LimiterState>,
    notify: Notify,
}

impl MutableLimiter {
    pub fn new(limit: usize) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(LimiterState {
                limit: limit.max(1),
                in_use: 0,
            }),
            notify: Notify::new(),
        })
    }

    pub fn limit(&self) -> usize {
        self.state.lock().limit
    }

    pub fn in_use(&self) -> usize {
        self.state.lock().in_use
    }

    pub fn set_limit(&self, limit: usize) {
        let limit = limit.max(1);
        let grew = {
            let mut state = self.state.lock();
            let grew = limit > state.limit;
            state.limit = limit;
            grew
        };
        if grew {
            self.notify.notify_waiters();
        }
    }

    /// Wait for a permit, giving up when `cancel` fires
    pub async fn acquire(
        self: &Arc<Self>,
        cancel: &CancellationToken,
    ) -> Result<LimiterPermit, RepoSearchError> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register interest before checking so a release in between is not lost
            notified.as_mut().enable();

            {
                let mut state = self.state.lock();
                if state.in_use < state.limit {
                    state.in_use += 1;
                    return Ok(LimiterPermit {
                        limiter: Arc::clone(self),
                    });
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(RepoSearchError::Cancelled),
                _ = &mut notified => {}
            }
        }
    }

    fn release(&self) {
        {
            let mut state = self.state.lock();
            state.in_use = state.in_use.saturating_sub(1);
        }
        self.notify.notify_waiters();
    }
}

/// Returned to the pool on drop
#[derive(Debug)]
pub struct LimiterPermit {
    limiter: Arc<MutableLimiter>,
}

impl Drop for LimiterPermit {
    fn drop(&mut self) {
        self.limiter.release();
    }
}
