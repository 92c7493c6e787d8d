use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time;

use collector::{Collector, Properties};
use serde_json::json;
use thiserror::Error;
use tokio::time::Instant;
use tracing::debug;

use crate::client::{LoginClient, LoginResponse};
use crate::error::LoginError;
use crate::validation::{Credentials, ValidationError};

pub const DEFAULT_DEBOUNCE: time::Duration = time::Duration::from_millis(300);

/// Why a submission did not produce a successful login.
#[derive(Error, Debug)]
pub enum SubmitError {
    #[error("a login is already in progress")]
    Busy,
    #[error("submitted again within the debounce window")]
    Debounced,
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Login(#[from] LoginError),
}

impl SubmitError {
    /// The message shown to the user.
    pub fn user_message(&self) -> String {
        match self {
            SubmitError::Busy => "Signing you in, please wait.".to_owned(),
            SubmitError::Debounced => "Please wait a moment before trying again.".to_owned(),
            SubmitError::Validation(error) => error.to_string(),
            SubmitError::Login(error) => error.user_message(),
        }
    }
}

#[derive(Default)]
struct FormState {
    submitting: bool,
    last_submit: Option<Instant>,
}

/// The login form: validates input, then hands it to the `LoginClient`.
///
/// Only one submission runs at a time, and a submission arriving within `debounce` of the
/// previous one is dropped. The form is ready for the next submission whichever way the
/// current one ends.
pub struct LoginForm {
    client: LoginClient,
    min_password_length: usize,
    debounce: time::Duration,
    state: Mutex<FormState>,
}

/// Marks the form as submitting until dropped.
struct Submitting<'a> {
    state: &'a Mutex<FormState>,
}

impl Drop for Submitting<'_> {
    fn drop(&mut self) {
        lock(self.state).submitting = false;
    }
}

fn lock(state: &Mutex<FormState>) -> MutexGuard<'_, FormState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl LoginForm {
    pub fn new(client: LoginClient, min_password_length: usize, debounce: time::Duration) -> Self {
        Self {
            client,
            min_password_length,
            debounce,
            state: Mutex::new(FormState::default()),
        }
    }

    pub fn collector(&self) -> &Collector {
        self.client.collector()
    }

    pub fn is_submitting(&self) -> bool {
        lock(&self.state).submitting
    }

    pub async fn submit(&self, email: &str, password: &str) -> Result<LoginResponse, SubmitError> {
        let _submitting = self.begin()?;

        self.collector().track("login_submit", Properties::new());

        let credentials = match Credentials::parse(email, password, self.min_password_length) {
            Ok(credentials) => credentials,
            Err(error) => {
                debug!(field = error.field(), "rejected login form: {}", error);
                self.collector().track(
                    "login_validation_failed",
                    Properties::from([
                        ("field".to_owned(), json!(error.field())),
                        ("reason".to_owned(), json!(error.to_string())),
                    ]),
                );
                return Err(error.into());
            }
        };

        let response = self.client.login(&credentials).await?;
        self.collector().identify(
            credentials.email.clone(),
            Properties::from([("email".to_owned(), json!(credentials.email))]),
        );

        Ok(response)
    }

    fn begin(&self) -> Result<Submitting<'_>, SubmitError> {
        let mut state = lock(&self.state);
        if state.submitting {
            return Err(SubmitError::Busy);
        }

        let now = Instant::now();
        if let Some(last) = state.last_submit {
            if now.duration_since(last) < self.debounce {
                return Err(SubmitError::Debounced);
            }
        }

        state.submitting = true;
        state.last_submit = Some(now);

        Ok(Submitting { state: &self.state })
    }
}
