use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use super::ForgeError;

pub const DEFAULT_MAX_RETRIES: u32 = 3;
const BASE_DELAY: Duration = Duration::from_secs(60);
/// Backoff ceiling for direct API calls.
pub const API_BACKOFF_CAP: Duration = Duration::from_secs(900);
/// Backoff ceiling for `gh` subprocess calls.
pub const CLI_BACKOFF_CAP: Duration = Duration::from_secs(300);

/// Suspends the caller between attempts.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, delay: Duration);
}

pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }
}

/// Exponential backoff around calls that may hit a rate limit.
///
/// Only [`ForgeError::RateLimited`] and [`ForgeError::Forbidden`] are retried.
/// Any other failure is returned unchanged after the first attempt. Running out
/// of attempts yields [`ForgeError::RateLimitExhausted`], unless every attempt
/// was a bare `Forbidden`; that last error is returned instead, so callers treat
/// it as a permission problem scoped to the resource.
#[derive(Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    cap: Duration,
    sleeper: Arc<dyn Sleeper>,
}

impl RetryPolicy {
    /// `max_retries` is the total number of attempts, not the number of re-tries.
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries: max_retries.max(1),
            cap: API_BACKOFF_CAP,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    pub fn with_cap(mut self, cap: Duration) -> Self {
        self.cap = cap;
        self
    }

    pub fn with_sleeper(mut self, sleeper: impl Sleeper + 'static) -> Self {
        self.sleeper = Arc::new(sleeper);
        self
    }

    /// Delay after the failed attempt numbered `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        BASE_DELAY.saturating_mul(factor).min(self.cap)
    }

    pub async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T, ForgeError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ForgeError>>,
    {
        let mut attempt = 0;
        let mut throttled = false;
        loop {
            match call().await {
                Err(err) if err.is_rate_limited() => {
                    attempt += 1;
                    throttled |= matches!(err, ForgeError::RateLimited(_));
                    if attempt >= self.max_retries {
                        if !throttled {
                            warn!(operation, error = %err, attempts = attempt, "still forbidden, giving up on this call");
                            return Err(err);
                        }
                        return Err(ForgeError::RateLimitExhausted {
                            operation: operation.to_string(),
                            attempts: attempt,
                        });
                    }
                    let delay = self.delay_for(attempt - 1);
                    warn!(
                        operation,
                        error = %err,
                        wait_secs = delay.as_secs(),
                        "rate limit hit (attempt {attempt}/{max})",
                        max = self.max_retries
                    );
                    self.sleeper.sleep(delay).await;
                }
                other => return other,
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRIES)
    }
}
