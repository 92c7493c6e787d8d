use reqwest::StatusCode;
use thiserror::Error;

/// Enumeration of errors related to submitting credentials to the login endpoint.
#[derive(Error, Debug)]
pub enum LoginError {
    #[error("invalid login url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("failed to construct http client: {0}")]
    ClientError(reqwest::Error),
    #[error("login request timed out on attempt {attempt}")]
    Timeout { attempt: u32 },
    #[error("login request failed on attempt {attempt}: {error}")]
    Network { attempt: u32, error: reqwest::Error },
    #[error("login endpoint responded with status {status} on attempt {attempt}")]
    Status {
        attempt: u32,
        status: StatusCode,
        message: Option<String>,
    },
    #[error("login was rejected: {0}")]
    Rejected(String),
    #[error("login endpoint returned an invalid response: {0}")]
    InvalidResponse(reqwest::Error),
}

impl LoginError {
    /// Whether trying again later could succeed: timeouts, connection failures, 429 and any 5XX.
    pub fn is_retryable(&self) -> bool {
        match self {
            LoginError::Timeout { .. } | LoginError::Network { .. } => true,
            LoginError::Status { status, .. } => is_retryable_status(*status),
            _ => false,
        }
    }

    /// A short, stable name for the kind of error, used when tracking it.
    pub fn kind(&self) -> &'static str {
        match self {
            LoginError::InvalidUrl(_) | LoginError::ClientError(_) => "configuration",
            LoginError::Timeout { .. } => "timeout",
            LoginError::Network { .. } => "network",
            LoginError::Status { .. } => "http_status",
            LoginError::Rejected(_) => "rejected",
            LoginError::InvalidResponse(_) => "invalid_response",
        }
    }

    /// The message shown to the user.
    pub fn user_message(&self) -> String {
        match self {
            LoginError::Timeout { .. } => {
                "The server took too long to respond. Please check your connection and try again."
                    .to_owned()
            }
            LoginError::Network { .. } => {
                "We couldn't reach the server. Please check your internet connection and try again."
                    .to_owned()
            }
            LoginError::Status { status, .. } if *status == StatusCode::TOO_MANY_REQUESTS => {
                "Too many login attempts. Please wait a moment and try again.".to_owned()
            }
            LoginError::Status { status, .. } if status.is_server_error() => {
                "The server is having trouble right now. Please try again in a few minutes."
                    .to_owned()
            }
            LoginError::Status {
                message: Some(message),
                ..
            } => message.clone(),
            LoginError::Status { status, .. }
                if *status == StatusCode::UNAUTHORIZED || *status == StatusCode::FORBIDDEN =>
            {
                "Invalid email or password.".to_owned()
            }
            LoginError::Status { status, .. } => format!(
                "Something went wrong (error {}). Please try again.",
                status.as_u16()
            ),
            LoginError::Rejected(message) => message.clone(),
            LoginError::InvalidUrl(_)
            | LoginError::ClientError(_)
            | LoginError::InvalidResponse(_) => "Something went wrong. Please try again.".to_owned(),
        }
    }
}

pub fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_error(status: StatusCode, message: Option<&str>) -> LoginError {
        LoginError::Status {
            attempt: 1,
            status,
            message: message.map(String::from),
        }
    }

    #[test]
    fn test_is_retryable_status() {
        assert!(!is_retryable_status(StatusCode::FORBIDDEN));
        assert!(!is_retryable_status(StatusCode::BAD_REQUEST));
        assert!(is_retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable_status(StatusCode::INTERNAL_SERVER_ERROR));
    }

    #[test]
    fn test_retryable_errors() {
        assert!(LoginError::Timeout { attempt: 1 }.is_retryable());
        assert!(status_error(StatusCode::BAD_GATEWAY, None).is_retryable());
        assert!(!status_error(StatusCode::UNAUTHORIZED, None).is_retryable());
        assert!(!LoginError::Rejected("nope".to_owned()).is_retryable());
    }

    #[test]
    fn test_user_messages() {
        assert_eq!(
            status_error(StatusCode::UNAUTHORIZED, None).user_message(),
            "Invalid email or password."
        );
        assert_eq!(
            status_error(StatusCode::UNAUTHORIZED, Some("Account locked.")).user_message(),
            "Account locked."
        );
        assert_eq!(
            status_error(StatusCode::IM_A_TEAPOT, None).user_message(),
            "Something went wrong (error 418). Please try again."
        );
        assert!(status_error(StatusCode::SERVICE_UNAVAILABLE, Some("db down"))
            .user_message()
            .starts_with("The server is having trouble"));
        assert!(LoginError::Timeout { attempt: 4 }
            .user_message()
            .contains("too long to respond"));
    }
}
