use std::fmt;
use std::str::FromStr;
use std::time;

/// How long to wait between two login attempts.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Backoff {
    /// Retry immediately.
    None,
    /// Wait the same interval before every retry.
    Fixed(time::Duration),
    /// Multiply `initial_interval` by `coefficient` for every past retry, capped at `maximum_interval`.
    Exponential {
        initial_interval: time::Duration,
        coefficient: u32,
        maximum_interval: Option<time::Duration>,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
/// The retry policy used by `LoginClient` when a login attempt fails with a transport error.
pub struct RetryPolicy {
    /// Retries after the first attempt. A policy with `max_retries = 3` makes at most 4 attempts.
    pub max_retries: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff: Backoff) -> Self {
        Self {
            max_retries,
            backoff,
        }
    }

    /// Give up after the first failure.
    pub fn no_retry() -> Self {
        Self::new(0, Backoff::None)
    }

    pub fn fixed(max_retries: u32, interval: time::Duration) -> Self {
        Self::new(max_retries, Backoff::Fixed(interval))
    }

    pub fn exponential(
        max_retries: u32,
        initial_interval: time::Duration,
        maximum_interval: Option<time::Duration>,
    ) -> Self {
        Self::new(
            max_retries,
            Backoff::Exponential {
                initial_interval,
                coefficient: 2,
                maximum_interval,
            },
        )
    }

    /// Total number of attempts, including the first one.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Whether another attempt is allowed after `attempt` (1-based) failed.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt <= self.max_retries
    }

    /// Calculate the time to wait before retrying, after `attempt` (1-based) failed.
    pub fn retry_interval(&self, attempt: u32) -> time::Duration {
        match self.backoff {
            Backoff::None => time::Duration::ZERO,
            Backoff::Fixed(interval) => interval,
            Backoff::Exponential {
                initial_interval,
                coefficient,
                maximum_interval,
            } => {
                let exponent = attempt.saturating_sub(1);
                let candidate_interval = coefficient
                    .checked_pow(exponent)
                    .and_then(|factor| initial_interval.checked_mul(factor))
                    .unwrap_or(time::Duration::MAX);

                match maximum_interval {
                    Some(max_interval) => std::cmp::min(candidate_interval, max_interval),
                    None => candidate_interval,
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::exponential(3, time::Duration::from_secs(1), None)
    }
}

/// Backoff strategy as named in configuration.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BackoffKind {
    None,
    Fixed,
    Exponential,
}

#[derive(Debug, PartialEq, Eq)]
pub struct ParseBackoffKindError(String);

impl fmt::Display for ParseBackoffKindError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} is not a valid backoff, expected none, fixed or exponential",
            self.0
        )
    }
}

impl FromStr for BackoffKind {
    type Err = ParseBackoffKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_ref() {
            "none" => Ok(BackoffKind::None),
            "fixed" => Ok(BackoffKind::Fixed),
            "exponential" => Ok(BackoffKind::Exponential),
            invalid => Err(ParseBackoffKindError(invalid.to_owned())),
        }
    }
}
