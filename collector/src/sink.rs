use std::time;

use async_trait::async_trait;
use metrics::{counter, histogram};
use reqwest::header;
use url::Url;

use crate::error::SinkError;
use crate::event::{Event, IngestPayload};

pub const INGEST_PATH: &str = "/api/events/ingest";

#[async_trait]
pub trait EventSink: Send + Sync {
    async fn send_batch(&self, events: &[Event]) -> Result<(), SinkError>;
}

pub struct PrintSink {}

#[async_trait]
impl EventSink for PrintSink {
    async fn send_batch(&self, events: &[Event]) -> Result<(), SinkError> {
        let span = tracing::span!(tracing::Level::INFO, "batch of events");
        let _enter = span.enter();

        histogram!("collector_event_batch_size").record(events.len() as f64);
        for event in events {
            tracing::info!("event: {:?}", event);
        }

        Ok(())
    }
}

/// Delivers batches to the remote ingestion endpoint as a single JSON POST.
#[derive(Clone)]
pub struct HttpSink {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpSink {
    pub fn new(api_url: &str, api_key: &str, timeout: time::Duration) -> Result<Self, SinkError> {
        let endpoint = Url::parse(&format!("{}{}", api_url.trim_end_matches('/'), INGEST_PATH))?;

        let mut authorization = header::HeaderValue::from_str(&format!("Bearer {api_key}"))
            .map_err(|_| SinkError::InvalidApiKey)?;
        authorization.set_sensitive(true);

        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );
        headers.insert(header::AUTHORIZATION, authorization);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(concat!("arguxai-collector/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(SinkError::ClientError)?;

        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl EventSink for HttpSink {
    async fn send_batch(&self, events: &[Event]) -> Result<(), SinkError> {
        histogram!("collector_event_batch_size").record(events.len() as f64);

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&IngestPayload { events })
            .send()
            .await
            .map_err(SinkError::RequestError)?;

        let status = response.status();
        if !status.is_success() {
            counter!("collector_ingest_errors_total", "status" => status.as_str().to_owned())
                .increment(1);
            return Err(SinkError::UnexpectedStatus(status));
        }

        // The endpoint acknowledges with a JSON body, anything else is treated as a failed delivery.
        response
            .json::<serde_json::Value>()
            .await
            .map_err(SinkError::InvalidResponse)?;

        Ok(())
    }
}
