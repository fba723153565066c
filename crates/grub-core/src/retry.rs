//! Retry of units of work that lost an optimistic concurrency race.

use std::thread;
use std::time::Duration;

use tracing::debug;

/// Backoff strategy between conflicting attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// Uses a fixed delay between retries.
    Fixed {
        /// Delay between retries.
        delay: Duration,
    },
    /// Uses an exponential delay between retries.
    ///
    /// The delay is calculated as `base * (factor ^ attempt)`.
    Exponential {
        /// The initial backoff duration.
        base: Duration,
        /// The multiplicative factor for each subsequent retry.
        factor: f64,
        /// The maximum duration to wait between retries.
        max: Duration,
        /// Whether to apply random jitter (+/- 50%) to the delay.
        jitter: bool,
    },
}

impl Default for Backoff {
    fn default() -> Self {
        Self::Exponential {
            base: Duration::from_millis(10),
            factor: 2.0,
            max: Duration::from_millis(250),
            jitter: true,
        }
    }
}

impl Backoff {
    /// Delay before retry number `attempt` (0-based).
    pub fn delay(self, attempt: u32) -> Duration {
        match self {
            Self::Fixed { delay } => delay,
            Self::Exponential {
                base,
                factor,
                max,
                jitter,
            } => {
                let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
                let seconds = base.as_secs_f64() * factor.powi(exponent);
                let capped = Duration::from_secs_f64(seconds.min(max.as_secs_f64()));
                if jitter {
                    with_jitter(capped)
                } else {
                    capped
                }
            }
        }
    }
}

/// Spread `delay` uniformly over +/- 50% so racing writers do not retry in lockstep.
fn with_jitter(delay: Duration) -> Duration {
    let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
    let half = millis / 2;
    let offset = fastrand::u64(0..=half.saturating_mul(2));
    Duration::from_millis((millis - half).saturating_add(offset))
}

/// How many times a conflicting unit of work is re-run.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Total attempts = `max_retries + 1`.
    pub max_retries: u32,
    pub backoff: Backoff,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            backoff: Backoff::default(),
        }
    }
}

impl RetryConfig {
    /// Create a new retry configuration with exponential backoff.
    pub fn exponential(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    /// Create a new retry configuration with fixed backoff.
    pub fn fixed(delay: Duration, max_retries: u32) -> Self {
        Self {
            max_retries,
            backoff: Backoff::Fixed { delay },
        }
    }

    /// Run each unit of work exactly once.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.backoff.delay(attempt)
    }

    /// Run `work` until it succeeds, fails with a non-retryable error, or runs
    /// out of attempts. Sleeps the calling thread between attempts.
    pub fn run<T, E, F, R>(&self, mut work: F, retryable: R) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Result<T, E>,
        R: Fn(&E) -> bool,
    {
        let mut attempt = 0;
        loop {
            match work() {
                Ok(value) => return Ok(value),
                Err(error) if !retryable(&error) => return Err(RetryError::Fatal(error)),
                Err(error) if attempt >= self.max_retries => {
                    return Err(RetryError::Exhausted {
                        attempts: attempt + 1,
                        last: error,
                    })
                }
                Err(_) => {
                    let delay = self.delay_for_attempt(attempt);
                    attempt += 1;
                    debug!(attempt, delay_ms = delay.as_millis() as u64, "retrying after conflict");
                    thread::sleep(delay);
                }
            }
        }
    }
}

/// Failure of a retried unit of work.
#[derive(Debug)]
pub enum RetryError<E> {
    /// Every attempt conflicted.
    Exhausted { attempts: u32, last: E },
    /// A non-retryable error ended the loop.
    Fatal(E),
}

impl<E> RetryError<E> {
    pub fn into_inner(self) -> E {
        match self {
            Self::Exhausted { last, .. } | Self::Fatal(last) => last,
        }
    }
}
