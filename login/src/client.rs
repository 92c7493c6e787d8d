use std::time;

use collector::{Collector, Properties};
use metrics::counter;
use reqwest::header;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};
use url::Url;

use crate::error::LoginError;
use crate::retry::RetryPolicy;
use crate::validation::Credentials;

/// Body returned by the login endpoint.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct LoginResponse {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

/// Submits credentials to the login endpoint, retrying transport failures according to a
/// `RetryPolicy`. Every attempt and outcome is tracked through the injected `Collector`.
pub struct LoginClient {
    client: reqwest::Client,
    url: Url,
    timeout: time::Duration,
    retry_policy: RetryPolicy,
    collector: Collector,
}

impl LoginClient {
    pub fn new(
        url: &str,
        timeout: time::Duration,
        retry_policy: RetryPolicy,
        collector: Collector,
    ) -> Result<Self, LoginError> {
        let url = Url::parse(url)?;

        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(concat!("arguxai-login/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(LoginError::ClientError)?;

        Ok(Self {
            client,
            url,
            timeout,
            retry_policy,
            collector,
        })
    }

    pub fn collector(&self) -> &Collector {
        &self.collector
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    /// Log in with already validated credentials.
    ///
    /// Timeouts, connection failures, 429 and 5XX responses are retried until the retry policy
    /// runs out of attempts. Any other non-2XX response and a `success: false` body end the
    /// attempt sequence immediately.
    pub async fn login(&self, credentials: &Credentials) -> Result<LoginResponse, LoginError> {
        let max_attempts = self.retry_policy.max_attempts();
        let mut attempt = 1;

        loop {
            counter!("login_attempts_total").increment(1);
            self.collector.track(
                "login_attempt",
                Properties::from([
                    ("attempt".to_owned(), json!(attempt)),
                    ("max_attempts".to_owned(), json!(max_attempts)),
                ]),
            );

            let started = tokio::time::Instant::now();
            let result = self.send(credentials, attempt).await;
            let duration_ms = started.elapsed().as_millis() as u64;

            match result {
                Ok(response) => {
                    counter!("login_outcomes_total", "outcome" => "success").increment(1);
                    info!(attempt, duration_ms, "login succeeded");
                    self.collector.track(
                        "login_success",
                        Properties::from([
                            ("attempt".to_owned(), json!(attempt)),
                            ("duration_ms".to_owned(), json!(duration_ms)),
                        ]),
                    );

                    return Ok(response);
                }
                Err(error) if error.is_retryable() && self.retry_policy.should_retry(attempt) => {
                    let delay = self.retry_policy.retry_interval(attempt);
                    warn!(
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "login attempt failed, retrying: {}",
                        error
                    );
                    self.collector.track(
                        "login_retry",
                        Properties::from([
                            ("attempt".to_owned(), json!(attempt)),
                            ("error_type".to_owned(), json!(error.kind())),
                            ("delay_ms".to_owned(), json!(delay.as_millis() as u64)),
                        ]),
                    );

                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => {
                    self.record_failure(&error, attempt, duration_ms);
                    return Err(error);
                }
            }
        }
    }

    async fn send(
        &self,
        credentials: &Credentials,
        attempt: u32,
    ) -> Result<LoginResponse, LoginError> {
        let response = self
            .client
            .post(self.url.clone())
            .timeout(self.timeout)
            .json(credentials)
            .send()
            .await
            .map_err(|error| classify_request_error(error, attempt))?;

        let status = response.status();
        if !status.is_success() {
            // Error bodies are best effort: keep the server's message if there is one.
            let message = response
                .json::<LoginResponse>()
                .await
                .ok()
                .and_then(|body| body.message);

            return Err(LoginError::Status {
                attempt,
                status,
                message,
            });
        }

        let body = response
            .json::<LoginResponse>()
            .await
            .map_err(|error| {
                if error.is_timeout() {
                    LoginError::Timeout { attempt }
                } else {
                    LoginError::InvalidResponse(error)
                }
            })?;

        if !body.success {
            return Err(LoginError::Rejected(
                body.message
                    .unwrap_or_else(|| "Invalid email or password.".to_owned()),
            ));
        }

        Ok(body)
    }

    fn record_failure(&self, error: &LoginError, attempt: u32, duration_ms: u64) {
        counter!("login_outcomes_total", "outcome" => error.kind()).increment(1);

        match error {
            LoginError::Rejected(message) => {
                info!(attempt, "login rejected: {}", message);
                self.collector.track(
                    "login_failed",
                    Properties::from([
                        ("attempt".to_owned(), json!(attempt)),
                        ("reason".to_owned(), json!(message)),
                    ]),
                );
            }
            _ => {
                warn!(attempt, duration_ms, "login failed: {}", error);
                self.collector.track_error(
                    error.kind(),
                    &error.to_string(),
                    Properties::from([
                        ("attempts".to_owned(), json!(attempt)),
                        ("endpoint".to_owned(), json!(self.url.as_str())),
                        ("user_message".to_owned(), json!(error.user_message())),
                    ]),
                );
            }
        }
    }
}

fn classify_request_error(error: reqwest::Error, attempt: u32) -> LoginError {
    if error.is_timeout() {
        LoginError::Timeout { attempt }
    } else {
        LoginError::Network { attempt, error }
    }
}
