//! Configuration loading and typed config structures for the collector.
//!
//! The canonical configuration lives in `vigil-config.yaml`. This module
//! defines strongly-typed structs that mirror the YAML structure, a loader,
//! and validation. Secrets and infrastructure URLs can be supplied through
//! environment variables instead of the file.

use std::collections::BTreeSet;
use std::path::Path;

use serde::Deserialize;
use vigil_types::{ApiVersion, EventCategory};

use crate::first_fetch::FirstFetch;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// The configuration parsed but is not usable.
    #[error("invalid configuration: {reason}")]
    Invalid {
        /// Explanation of what is wrong.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level collector configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CollectorConfig {
    /// Remote API connection.
    #[serde(default)]
    pub api: ApiConfig,

    /// What to fetch and how much.
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Where delivered events go.
    #[serde(default)]
    pub sink: SinkConfig,

    /// Where checkpoint state is kept.
    #[serde(default)]
    pub state: StateConfig,

    /// Logging output.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl CollectorConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// Environment variables override YAML values, see
    /// [`apply_overrides`](Self::apply_overrides).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if the content is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Like [`from_file`](Self::from_file), but a missing file yields the
    /// defaults (still subject to environment overrides).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file exists but cannot be read, or
    /// [`ConfigError::Yaml`] if the content is not valid YAML.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(contents) => Self::parse(&contents),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let mut config = Self::default();
                config.apply_overrides(|name| std::env::var(name).ok());
                Ok(config)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Parse configuration from a YAML string and apply environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yml::from_str(yaml)?;
        config.apply_overrides(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Override values from a variable lookup (normally the environment).
    ///
    /// - `VIGIL_API_URL` overrides `api.url`
    /// - `VIGIL_API_TOKEN` overrides `api.token`
    /// - `VIGIL_SINK_URL` overrides `sink.http_url`
    /// - `VIGIL_SINK_TOKEN` overrides `sink.token`
    /// - `NATS_URL` overrides `sink.nats_url`
    /// - `DRAGONFLY_URL` overrides `state.dragonfly_url`
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(val) = lookup("VIGIL_API_URL") {
            self.api.url = val;
        }
        if let Some(val) = lookup("VIGIL_API_TOKEN") {
            self.api.token = Some(val);
        }
        if let Some(val) = lookup("VIGIL_SINK_URL") {
            self.sink.http_url = val;
        }
        if let Some(val) = lookup("VIGIL_SINK_TOKEN") {
            self.sink.token = Some(val);
        }
        if let Some(val) = lookup("NATS_URL") {
            self.sink.nats_url = val;
        }
        if let Some(val) = lookup("DRAGONFLY_URL") {
            self.state.dragonfly_url = val;
        }
    }

    /// Check that the configuration can drive a collector.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: &str| -> Result<(), ConfigError> {
            Err(ConfigError::Invalid {
                reason: reason.to_owned(),
            })
        };

        if self.api.url.trim().is_empty() {
            return invalid("api.url is required (or set VIGIL_API_URL)");
        }
        if self.api.token.as_deref().is_none_or(|t| t.trim().is_empty()) {
            return invalid("api.token is required (or set VIGIL_API_TOKEN)");
        }
        if self.api.retries == 0 {
            return invalid("api.retries must be at least 1");
        }
        if self.fetch.categories.is_empty() {
            return invalid("fetch.categories must list at least one category");
        }
        let unique: BTreeSet<EventCategory> = self.fetch.categories.iter().copied().collect();
        if unique.len() != self.fetch.categories.len() {
            return invalid("fetch.categories contains duplicates");
        }
        if self.fetch.max_fetch == 0 {
            return invalid("fetch.max_fetch must be at least 1");
        }
        if let Err(e) = FirstFetch::parse(&self.fetch.first_fetch) {
            return invalid(&format!("fetch.first_fetch: {e}"));
        }
        if self.sink.kind == SinkKind::Http && self.sink.http_url.trim().is_empty() {
            return invalid("sink.http_url is required for the http sink (or set VIGIL_SINK_URL)");
        }
        Ok(())
    }
}

/// Remote API connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ApiConfig {
    /// Tenant base URL, e.g. `https://tenant.goskope.com`.
    #[serde(default)]
    pub url: String,

    /// API dialect.
    #[serde(default)]
    pub version: ApiVersion,

    /// API token.
    #[serde(default)]
    pub token: Option<String>,

    /// Verify the server's TLS certificate.
    #[serde(default = "default_true")]
    pub verify_certificate: bool,

    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Attempts per HTTP request before giving up.
    #[serde(default = "default_retries")]
    pub retries: u32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            version: ApiVersion::default(),
            token: None,
            verify_certificate: true,
            request_timeout_secs: default_request_timeout_secs(),
            retries: default_retries(),
        }
    }
}

/// Fetch settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FetchConfig {
    /// Categories fetched each cycle, in order.
    #[serde(default = "default_categories")]
    pub categories: Vec<EventCategory>,

    /// Lower bound for never-fetched categories, e.g. `"3 days"`.
    #[serde(default = "default_first_fetch")]
    pub first_fetch: String,

    /// Maximum events delivered per category per scheduled cycle.
    #[serde(default = "default_max_fetch")]
    pub max_fetch: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            categories: default_categories(),
            first_fetch: default_first_fetch(),
            max_fetch: default_max_fetch(),
        }
    }
}

/// Kind of downstream sink.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    /// Publish each batch to a NATS subject.
    Nats,
    /// POST each batch to an HTTP collector.
    Http,
    /// Write each event as a JSON line to stdout.
    #[default]
    Stdout,
}

/// Sink settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SinkConfig {
    /// Which sink to use.
    #[serde(default)]
    pub kind: SinkKind,

    /// NATS server URL for the `nats` sink.
    #[serde(default = "default_nats_url")]
    pub nats_url: String,

    /// Collector endpoint for the `http` sink.
    #[serde(default)]
    pub http_url: String,

    /// Bearer token for the `http` sink.
    #[serde(default)]
    pub token: Option<String>,

    /// Vendor label attached to every batch.
    #[serde(default = "default_vendor")]
    pub vendor: String,

    /// Product label attached to every batch.
    #[serde(default = "default_vendor")]
    pub product: String,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            kind: SinkKind::default(),
            nats_url: default_nats_url(),
            http_url: String::new(),
            token: None,
            vendor: default_vendor(),
            product: default_vendor(),
        }
    }
}

/// Where checkpoint state is persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateBackend {
    /// A JSON file on local disk.
    #[default]
    File,
    /// A key in `Dragonfly` (Redis-compatible).
    Dragonfly,
}

/// State persistence settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StateConfig {
    /// Which backend to use.
    #[serde(default)]
    pub backend: StateBackend,

    /// File path for the `file` backend.
    #[serde(default = "default_state_path")]
    pub path: String,

    /// Connection URL for the `dragonfly` backend.
    #[serde(default = "default_dragonfly_url")]
    pub dragonfly_url: String,

    /// Key holding the state for the `dragonfly` backend.
    #[serde(default = "default_state_key")]
    pub key: String,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            backend: StateBackend::default(),
            path: default_state_path(),
            dragonfly_url: default_dragonfly_url(),
            key: default_state_key(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions
// ---------------------------------------------------------------------------

const fn default_true() -> bool {
    true
}

const fn default_request_timeout_secs() -> u64 {
    60
}

const fn default_retries() -> u32 {
    3
}

fn default_categories() -> Vec<EventCategory> {
    EventCategory::ALL.to_vec()
}

fn default_first_fetch() -> String {
    "3 days".to_owned()
}

const fn default_max_fetch() -> usize {
    1_000
}

fn default_nats_url() -> String {
    "nats://localhost:4222".to_owned()
}

fn default_vendor() -> String {
    "netskope".to_owned()
}

fn default_state_path() -> String {
    "vigil-state.json".to_owned()
}

fn default_dragonfly_url() -> String {
    "redis://localhost:6379".to_owned()
}

fn default_state_key() -> String {
    "vigil:state".to_owned()
}

fn default_log_level() -> String {
    "info".to_owned()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn parse_without_env(yaml: &str) -> CollectorConfig {
        serde_yml::from_str(yaml).unwrap()
    }

    fn valid() -> CollectorConfig {
        let mut config = CollectorConfig::default();
        config.api.url = "https://tenant.goskope.com".to_owned();
        config.api.token = Some("secret".to_owned());
        config
    }

    #[test]
    fn defaults() {
        let config = CollectorConfig::default();
        assert_eq!(config.api.version, ApiVersion::V2);
        assert_eq!(config.api.retries, 3);
        assert_eq!(config.fetch.categories, EventCategory::ALL.to_vec());
        assert_eq!(config.fetch.first_fetch, "3 days");
        assert_eq!(config.fetch.max_fetch, 1_000);
        assert_eq!(config.sink.kind, SinkKind::Stdout);
        assert_eq!(config.state.backend, StateBackend::File);
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn parse_full_yaml() {
        let config = parse_without_env(
            r#"
api:
  url: "https://tenant.goskope.com"
  version: v1
  token: "abc"
  verify_certificate: false
  request_timeout_secs: 30
  retries: 5

fetch:
  categories: [audit, alert]
  first_fetch: "2 hours"
  max_fetch: 250

sink:
  kind: nats
  nats_url: "nats://bus:4222"
  vendor: acme
  product: swg

state:
  backend: dragonfly
  dragonfly_url: "redis://cache:6379"
  key: "collector:state"

logging:
  level: debug
  format: json
"#,
        );

        assert_eq!(config.api.version, ApiVersion::V1);
        assert!(!config.api.verify_certificate);
        assert_eq!(config.api.retries, 5);
        assert_eq!(
            config.fetch.categories,
            vec![EventCategory::Audit, EventCategory::Alert]
        );
        assert_eq!(config.fetch.max_fetch, 250);
        assert_eq!(config.sink.kind, SinkKind::Nats);
        assert_eq!(config.sink.product, "swg");
        assert_eq!(config.state.backend, StateBackend::Dragonfly);
        assert_eq!(config.state.key, "collector:state");
        assert_eq!(config.logging.format, LogFormat::Json);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_yaml_fills_defaults() {
        let config = parse_without_env("fetch:\n  max_fetch: 10\n");
        assert_eq!(config.fetch.max_fetch, 10);
        assert_eq!(config.fetch.first_fetch, "3 days");
        assert_eq!(config.api, ApiConfig::default());
    }

    #[test]
    fn overrides_replace_file_values() {
        let mut config = valid();
        config.apply_overrides(|name| match name {
            "VIGIL_API_TOKEN" => Some("from-env".to_owned()),
            "DRAGONFLY_URL" => Some("redis://other:6379".to_owned()),
            _ => None,
        });
        assert_eq!(config.api.token.as_deref(), Some("from-env"));
        assert_eq!(config.state.dragonfly_url, "redis://other:6379");
        assert_eq!(config.api.url, "https://tenant.goskope.com");
    }

    #[test]
    fn validate_rejects_unusable_config() {
        assert!(valid().validate().is_ok());
        assert!(CollectorConfig::default().validate().is_err());

        let mut no_categories = valid();
        no_categories.fetch.categories.clear();
        assert!(no_categories.validate().is_err());

        let mut duplicate = valid();
        duplicate.fetch.categories = vec![EventCategory::Page, EventCategory::Page];
        assert!(duplicate.validate().is_err());

        let mut bad_first_fetch = valid();
        bad_first_fetch.fetch.first_fetch = "whenever".to_owned();
        assert!(bad_first_fetch.validate().is_err());

        let mut zero = valid();
        zero.fetch.max_fetch = 0;
        assert!(zero.validate().is_err());

        let mut http_without_url = valid();
        http_without_url.sink.kind = SinkKind::Http;
        assert!(http_without_url.validate().is_err());
    }

    #[test]
    fn missing_file_loads_defaults() {
        let config = CollectorConfig::load(Path::new("/nonexistent/vigil-config.yaml")).unwrap();
        assert_eq!(config.fetch, FetchConfig::default());
        assert_eq!(config.logging, LoggingConfig::default());
    }

    #[test]
    fn unknown_category_fails_to_parse() {
        let result: Result<CollectorConfig, _> =
            serde_yml::from_str("fetch:\n  categories: [dns]\n");
        assert!(result.is_err());
    }
}
