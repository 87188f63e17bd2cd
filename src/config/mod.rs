//! Typed configuration from environment variables, optionally layered over
//! a TOML file.
//!
//! Loads once at startup and fails fast on malformed values. Environment
//! variables win over the file.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::context::PublishContext;
use crate::error::{Error, Result};

const DEFAULT_SERVICE_NAME: &str = "storage-lock-events";
const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub otel_endpoint: Option<String>,
    pub log_level: String,
    pub service_name: String,
    /// Deadline given to listeners on publish. `None` means no deadline.
    pub publish_timeout: Option<Duration>,
}

/// Shape of the optional TOML file. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    otel_endpoint: Option<String>,
    log_level: Option<String>,
    service_name: Option<String>,
    publish_timeout_ms: Option<u64>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        resolve(FileConfig::default(), env_var)
    }

    /// Load `path` (if given) as TOML, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Self::from_env();
        };
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read config file {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse TOML text, then apply environment overrides.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: FileConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("bad config file: {e}")))?;
        resolve(file, env_var)
    }

    /// A publish context carrying the configured timeout.
    pub fn publish_context(&self) -> PublishContext {
        match self.publish_timeout {
            Some(timeout) => PublishContext::with_timeout(timeout),
            None => PublishContext::background(),
        }
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn resolve(file: FileConfig, var: impl Fn(&str) -> Option<String>) -> Result<Config> {
    let publish_timeout_ms = match var("LOCK_EVENTS_PUBLISH_TIMEOUT_MS") {
        Some(raw) => Some(raw.parse::<u64>().map_err(|_| {
            Error::Config(format!(
                "LOCK_EVENTS_PUBLISH_TIMEOUT_MS must be a whole number of milliseconds, got {raw:?}"
            ))
        })?),
        None => file.publish_timeout_ms,
    };

    Ok(Config {
        otel_endpoint: var("OTEL_ENDPOINT").or(file.otel_endpoint),
        log_level: var("LOG_LEVEL")
            .or(file.log_level)
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
        service_name: var("LOCK_EVENTS_SERVICE_NAME")
            .or(file.service_name)
            .unwrap_or_else(|| DEFAULT_SERVICE_NAME.to_string()),
        publish_timeout: publish_timeout_ms.map(Duration::from_millis),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = resolve(FileConfig::default(), vars(&[])).unwrap();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.service_name, "storage-lock-events");
        assert!(config.otel_endpoint.is_none());
        assert!(config.publish_timeout.is_none());
    }

    #[test]
    fn env_overrides_file() {
        let file: FileConfig = toml::from_str(
            r#"
            log_level = "debug"
            service_name = "from-file"
            publish_timeout_ms = 250
            "#,
        )
        .unwrap();
        let config = resolve(
            file,
            vars(&[
                ("LOCK_EVENTS_SERVICE_NAME", "from-env"),
                ("OTEL_ENDPOINT", "http://localhost:4317"),
            ]),
        )
        .unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.service_name, "from-env");
        assert_eq!(config.otel_endpoint.as_deref(), Some("http://localhost:4317"));
        assert_eq!(config.publish_timeout, Some(Duration::from_millis(250)));
    }

    #[test]
    fn malformed_timeout_is_a_config_error() {
        let result = resolve(
            FileConfig::default(),
            vars(&[("LOCK_EVENTS_PUBLISH_TIMEOUT_MS", "soon")]),
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn unknown_file_keys_are_rejected() {
        assert!(toml::from_str::<FileConfig>("database_url = \"x\"").is_err());
    }
}
