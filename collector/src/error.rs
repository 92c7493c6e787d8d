use reqwest::StatusCode;
use thiserror::Error;

/// Enumeration of errors that can occur while delivering a batch of events.
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("invalid ingestion url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("api key cannot be used as a header value")]
    InvalidApiKey,
    #[error("failed to construct http client: {0}")]
    ClientError(reqwest::Error),
    #[error("a batch could not be delivered but it can be retried later: {0}")]
    RequestError(reqwest::Error),
    #[error("ingestion endpoint responded with status {0}")]
    UnexpectedStatus(StatusCode),
    #[error("ingestion endpoint responded with an invalid body: {0}")]
    InvalidResponse(reqwest::Error),
}

/// Enumeration of errors related to reading and writing the persisted identity.
#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("failed to access identity file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("identity file is not a valid JSON object: {0}")]
    ParseError(#[from] serde_json::Error),
}

/// Enumeration of errors raised when constructing a `Collector`.
#[derive(Error, Debug)]
pub enum CollectorError {
    #[error("collector must be created inside a tokio runtime")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),
    #[error("failed to initialize event sink: {0}")]
    SinkError(#[from] SinkError),
}
