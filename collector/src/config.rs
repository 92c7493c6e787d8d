use std::path::PathBuf;
use std::str::FromStr;
use std::time;

use envconfig::Envconfig;

use crate::event::Properties;

#[derive(Envconfig, Clone, Debug)]
pub struct Config {
    /// Bearer credential for the ingestion endpoint. Events are only logged locally when unset.
    #[envconfig(from = "ARGUX_API_KEY")]
    pub api_key: Option<String>,

    #[envconfig(from = "ARGUX_API_URL", default = "http://localhost:8000")]
    pub api_url: String,

    /// Overrides the persisted (or generated) user id.
    #[envconfig(from = "ARGUX_USER_ID")]
    pub user_id: Option<String>,

    /// JSON object merged into the properties of every event.
    #[envconfig(from = "ARGUX_METADATA", default = "{}")]
    pub metadata: Metadata,

    #[envconfig(from = "ARGUX_FLUSH_INTERVAL", default = "5000")]
    pub flush_interval: EnvMsDuration,

    #[envconfig(from = "ARGUX_BATCH_SIZE", default = "10")]
    pub batch_size: usize,

    #[envconfig(from = "ARGUX_REQUEST_TIMEOUT", default = "10000")]
    pub request_timeout: EnvMsDuration,

    #[envconfig(from = "ARGUX_IDENTITY_PATH", default = ".arguxai/identity.json")]
    pub identity_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: "http://localhost:8000".to_owned(),
            user_id: None,
            metadata: Metadata::default(),
            flush_interval: EnvMsDuration(time::Duration::from_millis(5000)),
            batch_size: 10,
            request_timeout: EnvMsDuration(time::Duration::from_millis(10000)),
            identity_path: PathBuf::from(".arguxai/identity.json"),
        }
    }
}

impl Config {
    /// Default configuration sending to `api_url` with `api_key`.
    pub fn new(api_key: &str, api_url: &str) -> Self {
        Self {
            api_key: Some(api_key.to_owned()),
            api_url: api_url.to_owned(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvMsDuration(pub time::Duration);

#[derive(Debug, PartialEq, Eq)]
pub struct ParseEnvMsDurationError;

impl FromStr for EnvMsDuration {
    type Err = ParseEnvMsDurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ms = s.parse::<u64>().map_err(|_| ParseEnvMsDurationError)?;

        Ok(EnvMsDuration(time::Duration::from_millis(ms)))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata(pub Properties);

#[derive(Debug, PartialEq, Eq)]
pub struct ParseMetadataError;

impl FromStr for Metadata {
    type Err = ParseMetadataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_str::<Properties>(s)
            .map(Metadata)
            .map_err(|_| ParseMetadataError)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use serde_json::json;

    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = Config::init_from_hashmap(&HashMap::new()).expect("failed to load config");

        assert_eq!(config.api_key, None);
        assert_eq!(config.api_url, "http://localhost:8000");
        assert_eq!(config.user_id, None);
        assert!(config.metadata.0.is_empty());
        assert_eq!(config.flush_interval.0, time::Duration::from_millis(5000));
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.identity_path, PathBuf::from(".arguxai/identity.json"));
    }

    #[test]
    fn test_config_from_env() {
        let env = HashMap::from([
            ("ARGUX_API_KEY".to_owned(), "secret".to_owned()),
            ("ARGUX_FLUSH_INTERVAL".to_owned(), "250".to_owned()),
            (
                "ARGUX_METADATA".to_owned(),
                r#"{"app": "login-demo", "release": 3}"#.to_owned(),
            ),
        ]);
        let config = Config::init_from_hashmap(&env).expect("failed to load config");

        assert_eq!(config.api_key.as_deref(), Some("secret"));
        assert_eq!(config.flush_interval.0, time::Duration::from_millis(250));
        assert_eq!(config.metadata.0.get("app"), Some(&json!("login-demo")));
        assert_eq!(config.metadata.0.get("release"), Some(&json!(3)));
    }

    #[test]
    fn test_metadata_must_be_an_object() {
        assert_eq!(Metadata::from_str("[1, 2]"), Err(ParseMetadataError));
        assert_eq!(Metadata::from_str("not json"), Err(ParseMetadataError));
    }

    #[test]
    fn test_parse_ms_duration() {
        assert_eq!(
            EnvMsDuration::from_str("1500"),
            Ok(EnvMsDuration(time::Duration::from_millis(1500)))
        );
        assert_eq!(
            EnvMsDuration::from_str("-1"),
            Err(ParseEnvMsDurationError)
        );
    }
}
