use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

pub type Properties = HashMap<String, Value>;

/// A named, timestamped record of a user interaction.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Event {
    pub name: String,
    pub user_id: String,
    pub session_id: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub properties: Properties,
}

/// Body of a single ingestion request.
#[derive(Debug, Serialize)]
pub struct IngestPayload<'a> {
    pub events: &'a [Event],
}

/// Ambient context attached to every event, the equivalent of what a browser would
/// expose through its location, document title and navigator.
///
/// An empty `url` or `title` means there is no current page; those properties are then left
/// out of tracked events rather than sent as empty strings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageContext {
    pub url: String,
    pub title: String,
    pub user_agent: String,
}

impl PageContext {
    pub fn new(url: &str, title: &str) -> Self {
        Self {
            url: url.to_owned(),
            title: title.to_owned(),
            user_agent: default_user_agent(),
        }
    }

    pub fn properties(&self) -> impl Iterator<Item = (String, Value)> {
        [
            ("url", &self.url),
            ("page_title", &self.title),
            ("user_agent", &self.user_agent),
        ]
        .into_iter()
        .filter(|(_, value)| !value.is_empty())
        .map(|(key, value)| (key.to_owned(), Value::String(value.clone())))
        .collect::<Vec<_>>()
        .into_iter()
    }
}

impl Default for PageContext {
    fn default() -> Self {
        Self::new("", "")
    }
}

pub fn default_user_agent() -> String {
    format!(
        "arguxai-collector/{} ({})",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS
    )
}

pub fn generate_user_id() -> String {
    format!("user_{}", Uuid::now_v7().simple())
}

pub fn generate_session_id() -> String {
    format!("session_{}", Uuid::now_v7().simple())
}
