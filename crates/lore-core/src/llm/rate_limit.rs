//! Client-side rate limiting for provider calls.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};
use tracing::debug;

use crate::config::RateLimitConfig;

const WINDOW: Duration = Duration::from_secs(60);

/// Sliding one-minute limiter on requests and tokens.
///
/// Cloning shares the window, so every batch of a run draws from the same
/// budget.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    window: Arc<Mutex<VecDeque<(Instant, u64)>>>,
    max_requests_per_minute: u32,
    max_tokens_per_minute: u64,
}

impl RateLimiter {
    pub fn new(max_requests_per_minute: u32, max_tokens_per_minute: u64) -> Self {
        Self {
            window: Arc::new(Mutex::new(VecDeque::new())),
            max_requests_per_minute: max_requests_per_minute.max(1),
            max_tokens_per_minute: max_tokens_per_minute.max(1),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.requests_per_minute, config.tokens_per_minute)
    }

    /// Wait until one request of `tokens` fits in the window, then record it.
    ///
    /// A request larger than the token limit is admitted once the window is
    /// empty.
    pub async fn acquire(&self, tokens: u64) {
        loop {
            let wait_until = {
                let mut window = self.window.lock().await;
                let now = Instant::now();
                while window
                    .front()
                    .is_some_and(|(at, _)| now.duration_since(*at) >= WINDOW)
                {
                    window.pop_front();
                }

                let used: u64 = window.iter().map(|(_, t)| t).sum();
                let requests_ok = window.len() < self.max_requests_per_minute as usize;
                let tokens_ok = used.saturating_add(tokens) <= self.max_tokens_per_minute;

                if window.is_empty() || (requests_ok && tokens_ok) {
                    window.push_back((now, tokens));
                    return;
                }

                match window.front() {
                    Some((oldest, _)) => *oldest + WINDOW,
                    None => now,
                }
            };

            debug!(tokens, "Rate limit reached, waiting for window");
            sleep_until(wait_until).await;
        }
    }

    /// Requests recorded in the current window.
    pub async fn in_flight(&self) -> usize {
        let window = self.window.lock().await;
        let now = Instant::now();
        window
            .iter()
            .filter(|(at, _)| now.duration_since(*at) < WINDOW)
            .count()
    }
}
