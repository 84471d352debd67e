//! Client-side sliding-window rate limiter for generative-text requests.
//!
//! Proactively throttles calls so that no rolling 60-second window ever holds
//! more than the configured number of admissions, instead of relying on 429
//! backpressure from the service.

use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Sliding window duration (1 minute).
pub const WINDOW: Duration = Duration::from_secs(60);

/// A sliding-window admission gate shared by every caller of one service.
///
/// Admissions are serialized: a caller that has to wait holds the window lock
/// while it sleeps, so concurrent callers are admitted in arrival order.
pub struct RateLimiter {
    max_per_minute: usize,
    /// Timestamps of admissions within the window, oldest first.
    window: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// Create a limiter admitting `max_per_minute` calls per rolling minute.
    /// A limit of 0 disables throttling; admissions are still recorded.
    pub fn new(max_per_minute: usize) -> Self {
        Self {
            max_per_minute,
            window: Mutex::new(VecDeque::with_capacity(max_per_minute)),
        }
    }

    pub fn max_per_minute(&self) -> usize {
        self.max_per_minute
    }

    /// Block until one more call fits in the window, record it, and return
    /// the admission time.
    pub async fn admit(&self) -> Instant {
        let mut window = self.window.lock().await;
        loop {
            let now = Instant::now();
            prune(&mut window, now);

            if self.max_per_minute == 0 || window.len() < self.max_per_minute {
                window.push_back(now);
                return now;
            }

            let Some(&oldest) = window.front() else {
                continue;
            };
            let wait = WINDOW.saturating_sub(now.duration_since(oldest));
            debug!(
                wait_ms = wait.as_millis() as u64,
                in_window = window.len(),
                limit = self.max_per_minute,
                "Rate limit reached, waiting for window to slide"
            );
            tokio::time::sleep(wait).await;
        }
    }

    /// Number of admissions currently inside the window.
    pub async fn in_window(&self) -> usize {
        let mut window = self.window.lock().await;
        prune(&mut window, Instant::now());
        window.len()
    }
}

/// Remove admissions whose age has reached the window length.
fn prune(window: &mut VecDeque<Instant>, now: Instant) {
    while window
        .front()
        .is_some_and(|t| now.duration_since(*t) >= WINDOW)
    {
        window.pop_front();
    }
}
