//! Minimum spacing between dispatches to one backend.

use std::future::Future;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};

/// Serializes tasks through one queue, spacing dispatches at least
/// `min_interval` apart.
///
/// The queue is the mutex itself: tokio's mutex hands out the lock in the
/// order callers asked for it, and the holder is the single active drain.
/// A caller that drops its future while waiting simply leaves the queue.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    last_dispatch: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_dispatch: Mutex::new(None),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Run `task` once its turn comes and the interval since the previous
    /// dispatch has elapsed. The task's output, including an error, goes
    /// back to this caller only.
    pub async fn schedule<F, Fut, T>(&self, task: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let mut last = self.last_dispatch.lock().await;
        if let Some(previous) = *last {
            sleep_until(previous + self.min_interval).await;
        }
        let output = task().await;
        *last = Some(Instant::now());
        output
    }
}
