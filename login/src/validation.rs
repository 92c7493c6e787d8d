//! Local checks run before any credentials leave the process.
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

pub const DEFAULT_MIN_PASSWORD_LENGTH: usize = 8;

static EMAIL_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email regex is valid"));

/// Reasons a submission is rejected without contacting the login endpoint.
/// The `Display` output is meant to be shown to the user as is.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Please enter your email address.")]
    MissingEmail,
    #[error("Please enter a valid email address, like name@example.com.")]
    InvalidEmail,
    #[error("Please enter your password.")]
    MissingPassword,
    #[error("Your password must be at least {min_length} characters long.")]
    PasswordTooShort { min_length: usize },
}

impl ValidationError {
    /// The form field the error applies to.
    pub fn field(&self) -> &'static str {
        match self {
            ValidationError::MissingEmail | ValidationError::InvalidEmail => "email",
            ValidationError::MissingPassword | ValidationError::PasswordTooShort { .. } => {
                "password"
            }
        }
    }
}

/// Credentials that passed validation, ready to submit.
#[derive(Clone, PartialEq, Eq, serde::Serialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    pub fn parse(
        email: &str,
        password: &str,
        min_password_length: usize,
    ) -> Result<Self, ValidationError> {
        let email = validate_email(email)?;
        validate_password(password, min_password_length)?;

        Ok(Self {
            email,
            password: password.to_owned(),
        })
    }
}

/// Returns the trimmed email if it looks like `local@domain.tld`.
pub fn validate_email(email: &str) -> Result<String, ValidationError> {
    let email = email.trim();
    if email.is_empty() {
        return Err(ValidationError::MissingEmail);
    }
    if !EMAIL_REGEX.is_match(email) {
        return Err(ValidationError::InvalidEmail);
    }

    Ok(email.to_owned())
}

pub fn validate_password(password: &str, min_length: usize) -> Result<(), ValidationError> {
    if password.is_empty() {
        return Err(ValidationError::MissingPassword);
    }
    if password.chars().count() < min_length {
        return Err(ValidationError::PasswordTooShort { min_length });
    }

    Ok(())
}
