use std::sync::Arc;
use std::time::Duration;

use collector::config::EnvMsDuration;
use collector::identity::MemoryIdentityStore;
use collector::sink::PrintSink;
use collector::{Collector, Config as CollectorConfig, Event};
use httpmock::{Method, MockServer};
use serde_json::json;

use login::client::{LoginClient, LoginResponse};
use login::error::LoginError;
use login::retry::RetryPolicy;
use login::submission::{LoginForm, SubmitError, DEFAULT_DEBOUNCE};
use login::validation::{ValidationError, DEFAULT_MIN_PASSWORD_LENGTH};

const LOGIN_PATH: &str = "/api/login";

/// A collector that never flushes on its own, so tests can inspect what was tracked.
fn test_collector() -> Collector {
    let config = CollectorConfig {
        flush_interval: EnvMsDuration(Duration::ZERO),
        batch_size: 1000,
        ..CollectorConfig::default()
    };

    Collector::new(
        &config,
        Arc::new(PrintSink {}),
        Arc::new(MemoryIdentityStore::with_user_id("anonymous")),
    )
    .expect("failed to create collector")
}

fn login_form(server: &MockServer, timeout: Duration, retry_policy: RetryPolicy) -> LoginForm {
    let client = LoginClient::new(&server.url(LOGIN_PATH), timeout, retry_policy, test_collector())
        .expect("failed to create login client");

    LoginForm::new(client, DEFAULT_MIN_PASSWORD_LENGTH, Duration::ZERO)
}

fn tracked(form: &LoginForm, name: &str) -> Vec<Event> {
    form.collector()
        .queued()
        .into_iter()
        .filter(|event| event.name == name)
        .collect()
}

#[tokio::test]
async fn it_logs_in_and_identifies_the_user() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(Method::POST)
                .path(LOGIN_PATH)
                .header("Content-Type", "application/json")
                .json_body(json!({"email": "user@example.com", "password": "correct horse"}));
            then.status(200)
                .json_body(json!({"success": true, "message": "Welcome back, user!"}));
        })
        .await;

    let form = login_form(&server, Duration::from_secs(5), RetryPolicy::no_retry());
    let response = form
        .submit(" user@example.com ", "correct horse")
        .await
        .expect("login should succeed");

    assert_eq!(
        response,
        LoginResponse {
            success: true,
            message: Some("Welcome back, user!".to_owned()),
        }
    );
    mock.assert_async().await;
    assert!(!form.is_submitting());
    assert_eq!(form.collector().user_id(), "user@example.com");

    let names: Vec<String> = form
        .collector()
        .queued()
        .into_iter()
        .map(|event| event.name)
        .collect();
    assert_eq!(names, vec!["login_submit", "login_attempt", "login_success"]);
}

#[tokio::test]
async fn it_rejects_invalid_email_without_a_request() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(Method::POST).path(LOGIN_PATH);
            then.status(200).json_body(json!({"success": true}));
        })
        .await;

    let form = login_form(&server, Duration::from_secs(5), RetryPolicy::default());
    let result = form.submit("not-an-email", "correct horse").await;

    assert!(matches!(
        result,
        Err(SubmitError::Validation(ValidationError::InvalidEmail))
    ));
    mock.assert_hits_async(0).await;
    assert!(!form.is_submitting());

    let failures = tracked(&form, "login_validation_failed");
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].properties["field"], json!("email"));
    assert!(tracked(&form, "login_attempt").is_empty());
}

#[tokio::test]
async fn it_rejects_short_password_without_a_request() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(Method::POST).path(LOGIN_PATH);
            then.status(200).json_body(json!({"success": true}));
        })
        .await;

    let form = login_form(&server, Duration::from_secs(5), RetryPolicy::default());
    let result = form.submit("user@example.com", "short").await;

    match result {
        Err(SubmitError::Validation(error)) => {
            assert_eq!(
                error,
                ValidationError::PasswordTooShort {
                    min_length: DEFAULT_MIN_PASSWORD_LENGTH
                }
            );
        }
        other => panic!("expected a validation error, got {other:?}"),
    }
    mock.assert_hits_async(0).await;
}

async fn assert_timeout_attempts(retry_policy: RetryPolicy, expected_attempts: usize) {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(Method::POST).path(LOGIN_PATH);
            then.status(200)
                .json_body(json!({"success": true}))
                .delay(Duration::from_millis(1000));
        })
        .await;

    let form = login_form(&server, Duration::from_millis(100), retry_policy);
    let error = form
        .submit("user@example.com", "correct horse")
        .await
        .expect_err("login should time out");

    match &error {
        SubmitError::Login(LoginError::Timeout { attempt }) => {
            assert_eq!(*attempt as usize, expected_attempts)
        }
        other => panic!("expected a timeout, got {other:?}"),
    }
    assert!(error.user_message().contains("took too long"));
    mock.assert_hits_async(expected_attempts).await;

    assert_eq!(tracked(&form, "login_attempt").len(), expected_attempts);
    assert_eq!(tracked(&form, "login_retry").len(), expected_attempts - 1);
    let errors = tracked(&form, "error");
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].properties["error_type"], json!("timeout"));
    assert_eq!(errors[0].properties["attempts"], json!(expected_attempts));
    assert!(!form.is_submitting());
}

#[tokio::test]
async fn it_gives_up_after_one_attempt_without_retries() {
    assert_timeout_attempts(RetryPolicy::no_retry(), 1).await;
}

#[tokio::test]
async fn it_retries_timeouts_with_fixed_delay() {
    assert_timeout_attempts(RetryPolicy::fixed(3, Duration::from_millis(10)), 4).await;
}

#[tokio::test]
async fn it_retries_timeouts_with_exponential_backoff() {
    let policy = RetryPolicy::exponential(
        3,
        Duration::from_millis(10),
        Some(Duration::from_millis(40)),
    );
    assert_timeout_attempts(policy, 4).await;
}

#[tokio::test]
async fn it_retries_server_errors_then_succeeds() {
    let server = MockServer::start_async().await;
    let mut failing = server
        .mock_async(|when, then| {
            when.method(Method::POST).path(LOGIN_PATH);
            then.status(503).json_body(json!({"success": false, "message": "db down"}));
        })
        .await;

    let form = login_form(
        &server,
        Duration::from_secs(5),
        RetryPolicy::fixed(3, Duration::from_millis(300)),
    );

    let submitting = form.submit("user@example.com", "correct horse");
    let recover = async {
        // Swap in a healthy endpoint while the client waits between attempts.
        tokio::time::sleep(Duration::from_millis(150)).await;
        failing.assert_hits_async(1).await;
        failing.delete_async().await;
        server
            .mock_async(|when, then| {
                when.method(Method::POST).path(LOGIN_PATH);
                then.status(200).json_body(json!({"success": true}));
            })
            .await
    };
    let (result, healthy) = tokio::join!(submitting, recover);

    assert!(result.is_ok());
    healthy.assert_hits_async(1).await;
    assert_eq!(tracked(&form, "login_retry").len(), 1);
    assert_eq!(tracked(&form, "login_success").len(), 1);
}

#[tokio::test]
async fn it_does_not_retry_rejected_credentials() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(Method::POST).path(LOGIN_PATH);
            then.status(200)
                .json_body(json!({"success": false, "message": "Wrong email or password."}));
        })
        .await;

    let form = login_form(&server, Duration::from_secs(5), RetryPolicy::default());
    let error = form
        .submit("user@example.com", "correct horse")
        .await
        .expect_err("login should be rejected");

    assert!(matches!(error, SubmitError::Login(LoginError::Rejected(_))));
    assert_eq!(error.user_message(), "Wrong email or password.");
    mock.assert_hits_async(1).await;
    assert_eq!(tracked(&form, "login_failed").len(), 1);
    assert!(tracked(&form, "error").is_empty());
}

#[tokio::test]
async fn it_does_not_retry_client_errors() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(Method::POST).path(LOGIN_PATH);
            then.status(401).body("unauthorized");
        })
        .await;

    let form = login_form(&server, Duration::from_secs(5), RetryPolicy::default());
    let error = form
        .submit("user@example.com", "correct horse")
        .await
        .expect_err("login should fail");

    assert_eq!(error.user_message(), "Invalid email or password.");
    mock.assert_hits_async(1).await;
    let errors = tracked(&form, "error");
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].properties["error_type"], json!("http_status"));
}

#[tokio::test]
async fn it_rejects_overlapping_and_rapid_submissions() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(Method::POST).path(LOGIN_PATH);
            then.status(200)
                .json_body(json!({"success": true}))
                .delay(Duration::from_millis(100));
        })
        .await;

    let form = login_form(&server, Duration::from_secs(5), RetryPolicy::no_retry());
    let (first, second) = tokio::join!(
        form.submit("user@example.com", "correct horse"),
        form.submit("user@example.com", "correct horse"),
    );
    assert!(first.is_ok());
    assert!(matches!(second, Err(SubmitError::Busy)));

    let client = LoginClient::new(
        &server.url(LOGIN_PATH),
        Duration::from_secs(5),
        RetryPolicy::no_retry(),
        test_collector(),
    )
    .expect("failed to create login client");
    let debounced = LoginForm::new(client, DEFAULT_MIN_PASSWORD_LENGTH, DEFAULT_DEBOUNCE);

    assert!(matches!(
        debounced.submit("not-an-email", "correct horse").await,
        Err(SubmitError::Validation(_))
    ));
    assert!(matches!(
        debounced.submit("user@example.com", "correct horse").await,
        Err(SubmitError::Debounced)
    ));

    tokio::time::sleep(DEFAULT_DEBOUNCE).await;
    assert!(debounced
        .submit("user@example.com", "correct horse")
        .await
        .is_ok());
}
