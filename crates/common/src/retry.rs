//! Exponential backoff for startup connections.
//!
//! Used only while the process is coming up: once the broker and database
//! connections exist, failures are handled by whoever owns them.

use std::fmt::Display;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// When to give up and how long to wait between attempts.
///
/// The delay before retry `n` (1-based) is
/// `initial_delay * multiplier^(n-1)`, capped at `max_delay`, then spread by
/// `jitter` (a fraction in `0.0..=1.0`) in both directions.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first; `None` means no limit
    pub max_attempts: Option<u32>,
    /// Give up once this much time has passed; `None` means no limit
    pub max_elapsed: Option<Duration>,
    pub initial_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: None,
            max_elapsed: Some(Duration::from_secs(15 * 60)),
            initial_delay: Duration::from_millis(500),
            multiplier: 1.5,
            max_delay: Duration::from_secs(60),
            jitter: 0.5,
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(mut self, attempts: Option<u32>) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_max_elapsed(mut self, elapsed: Option<Duration>) -> Self {
        self.max_elapsed = elapsed;
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Delay to wait after the given failed attempt (1-based)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let base = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = base.min(self.max_delay.as_secs_f64());

        let delay = if self.jitter > 0.0 {
            let spread = capped * self.jitter;
            capped - spread + rand::random::<f64>() * 2.0 * spread
        } else {
            capped
        };

        // NaN and negative values collapse to zero
        Duration::from_secs_f64(delay.max(0.0))
    }

    fn exhausted(&self, attempt: u32, elapsed: Duration, next_delay: Duration) -> bool {
        if self.max_attempts.is_some_and(|max| attempt >= max) {
            return true;
        }
        self.max_elapsed
            .is_some_and(|max| elapsed + next_delay > max)
    }
}

/// Run `operation` until it succeeds or the policy gives up, returning the
/// last error in the latter case.
pub async fn retry_with_backoff<F, Fut, T, E>(
    policy: &RetryPolicy,
    name: &str,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let start = Instant::now();
    let mut attempt = 0u32;

    loop {
        attempt = attempt.saturating_add(1);

        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    info!(operation = %name, attempts = attempt, "succeeded after retrying");
                }
                return Ok(value);
            }
            Err(e) => {
                let delay = policy.delay_for_attempt(attempt);
                if policy.exhausted(attempt, start.elapsed(), delay) {
                    warn!(
                        operation = %name,
                        attempts = attempt,
                        elapsed_ms = start.elapsed().as_millis(),
                        error = %e,
                        "giving up"
                    );
                    return Err(e);
                }

                warn!(
                    operation = %name,
                    attempt,
                    delay_ms = delay.as_millis(),
                    error = %e,
                    "attempt failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
