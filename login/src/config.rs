use collector::config::EnvMsDuration;
use envconfig::Envconfig;

use crate::retry::{Backoff, BackoffKind, RetryPolicy};

#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(from = "LOGIN_API_URL", default = "http://localhost:8000/api/login")]
    pub login_api_url: String,

    /// Upper bound for a single login attempt.
    #[envconfig(from = "LOGIN_TIMEOUT", default = "5000")]
    pub timeout: EnvMsDuration,

    #[envconfig(from = "LOGIN_MAX_RETRIES", default = "3")]
    pub max_retries: u32,

    #[envconfig(from = "LOGIN_BACKOFF", default = "exponential")]
    pub backoff: BackoffKind,

    #[envconfig(from = "LOGIN_RETRY_INTERVAL", default = "1000")]
    pub retry_interval: EnvMsDuration,

    #[envconfig(from = "LOGIN_MAX_RETRY_INTERVAL", default = "10000")]
    pub max_retry_interval: EnvMsDuration,

    #[envconfig(from = "LOGIN_MIN_PASSWORD_LENGTH", default = "8")]
    pub min_password_length: usize,

    #[envconfig(from = "LOGIN_DEBOUNCE", default = "300")]
    pub debounce: EnvMsDuration,

    #[envconfig(from = "PAGE_URL", default = "http://localhost:3000/login")]
    pub page_url: String,

    #[envconfig(from = "PAGE_TITLE", default = "Sign in")]
    pub page_title: String,

    #[envconfig(nested = true)]
    pub collector: collector::Config,
}

impl Config {
    pub fn retry_policy(&self) -> RetryPolicy {
        let backoff = match self.backoff {
            BackoffKind::None => Backoff::None,
            BackoffKind::Fixed => Backoff::Fixed(self.retry_interval.0),
            BackoffKind::Exponential => Backoff::Exponential {
                initial_interval: self.retry_interval.0,
                coefficient: 2,
                maximum_interval: Some(self.max_retry_interval.0),
            },
        };

        RetryPolicy::new(self.max_retries, backoff)
    }
}
