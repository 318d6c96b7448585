//! Timeout and bounded retry around pipeline activities.

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use super::PipelineError;
use crate::config::PipelineConfig;

/// How one activity (a store query, an LLM call) is attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivityPolicy {
    pub max_attempts: u32,
    /// Per attempt.
    pub timeout: Duration,
    /// Doubles after every failed attempt.
    pub initial_backoff: Duration,
}

impl Default for ActivityPolicy {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}

impl ActivityPolicy {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            timeout: config.activity_timeout(),
            initial_backoff: config.initial_backoff(),
        }
    }

    /// Run `op` until it succeeds or the attempts are used up.
    ///
    /// The error of the last attempt is kept verbatim in the returned error.
    pub async fn run<T, F, Fut>(&self, activity: &str, op: F) -> Result<T, PipelineError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, PipelineError>>,
    {
        self.run_gated(activity, || async {}, op).await
    }

    /// Like [`run`](Self::run), but awaits `gate` before every attempt.
    ///
    /// Time spent in the gate (a rate limiter permit) does not count
    /// against the attempt timeout.
    pub async fn run_gated<T, G, GFut, F, Fut>(&self, activity: &str, gate: G, op: F) -> Result<T, PipelineError>
    where
        G: Fn() -> GFut,
        GFut: Future<Output = ()>,
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, PipelineError>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut backoff = self.initial_backoff;
        let mut last_error = String::new();
        let mut timed_out = false;

        for attempt in 1..=attempts {
            gate().await;
            debug!(activity, attempt, "Activity heartbeat");

            match timeout(self.timeout, op()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) => {
                    timed_out = false;
                    last_error = e.to_string();
                }
                Err(_) => {
                    timed_out = true;
                    last_error = format!("timed out after {:?}", self.timeout);
                }
            }

            if attempt < attempts {
                warn!(
                    activity,
                    attempt,
                    error = %last_error,
                    backoff_ms = backoff.as_millis() as u64,
                    "Activity failed, retrying"
                );
                sleep(backoff).await;
                backoff = backoff.saturating_mul(2);
            }
        }

        if timed_out {
            Err(PipelineError::Timeout {
                activity: activity.to_string(),
                after: self.timeout,
            })
        } else {
            Err(PipelineError::ActivityExhausted {
                activity: activity.to_string(),
                attempts,
                last_error,
            })
        }
    }
}
