//! Agent configuration.
//!
//! Loaded from a TOML file, with environment variable overrides for
//! credentials. Static metric schema entries live under `[metrics]`; they
//! are read-only after startup and shared with the collector registry as an
//! `Arc`.
//!
//! Schema tuning fields are `Option`s on purpose: the registry merges them
//! onto per-type defaults field by field, and an explicitly-set value
//! (including zero) must be distinguishable from an absent one.

use std::collections::HashMap;
use std::env;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use relay_common::MetricType;

/// Top-level configuration for the relay agent.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// HTTP listener.
    pub server: ServerConfig,

    /// Event source subscription.
    pub source: SourceConfig,

    /// Logging.
    pub log: LogConfig,

    /// Outbound alert notifier.
    pub alert: AlertConfig,

    /// Static metric schema entries.
    pub metrics: MetricsConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_owned(),
            port: 9090,
        }
    }
}

/// Event source subscription configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Websocket endpoint of the platform's push stream.
    pub endpoint: String,

    /// Application credentials presented in the subscribe frame.
    pub app_id: String,
    pub app_secret: String,

    /// When set, inbound envelope headers must carry this token.
    pub verify_token: Option<String>,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// trace | debug | info | warn | error
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
        }
    }
}

/// Outbound alert notifier configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Base URL the chat-bot id is appended to. Unset disables `/alert`.
    pub webhook_base: Option<String>,
}

/// Static metric schema configuration: metric name → tuning entry.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Label-name prefix shared by every schema entry.
    pub common_labels: Vec<String>,

    /// Per-name schema entries.
    pub schema: HashMap<String, MetricSchema>,
}

impl MetricsConfig {
    /// Full label-name list for a schema entry: the common prefix followed
    /// by the entry's own labels.
    pub fn resolved_labels(&self, schema: &MetricSchema) -> Vec<String> {
        let mut labels = self.common_labels.clone();
        labels.extend(schema.labels.iter().cloned());
        labels
    }
}

/// One static schema entry. Everything beyond `type` is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MetricSchema {
    /// Help text shown on the exposition surface.
    pub help: Option<String>,

    /// counter | gauge | histogram | summary
    #[serde(rename = "type")]
    pub ty: String,

    /// Explicit label names, appended to the common label prefix.
    pub labels: Vec<String>,

    /// Histogram bucket boundaries. Unset keeps the default ladder.
    pub buckets: Option<Vec<f64>>,

    /// Summary quantile objectives as `[quantile, allowed_error]` pairs.
    pub objectives: Option<Vec<(f64, f64)>>,

    /// Summary quantile window in seconds.
    pub max_age_secs: Option<u64>,

    /// Number of rotating buckets covering the quantile window.
    pub age_buckets: Option<u32>,

    /// Sample capacity per rotating bucket.
    pub buf_cap: Option<usize>,
}

impl AgentConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("failed to read config file: {:?}", path.as_ref()))?;
        Self::from_toml_str(&content)
    }

    /// Parses configuration from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("failed to parse TOML config")
    }

    /// Applies environment variable overrides for credentials.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(endpoint) = env::var("RELAY_SOURCE_ENDPOINT") {
            self.source.endpoint = endpoint;
        }
        if let Ok(app_id) = env::var("RELAY_APP_ID") {
            self.source.app_id = app_id;
        }
        if let Ok(app_secret) = env::var("RELAY_APP_SECRET") {
            self.source.app_secret = app_secret;
        }
        if let Ok(token) = env::var("RELAY_VERIFY_TOKEN") {
            self.source.verify_token = Some(token);
        }
    }

    /// Validates the configuration after all overrides are applied.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            bail!("server.port must be non-zero");
        }
        if self.source.endpoint.is_empty() {
            bail!("source.endpoint is required");
        }
        for (name, schema) in &self.metrics.schema {
            if MetricType::parse(&schema.ty).is_none() {
                bail!("metrics.schema.{name}: unknown type {:?}", schema.ty);
            }
            if let Some(objectives) = &schema.objectives {
                for &(quantile, _) in objectives {
                    if !(0.0..=1.0).contains(&quantile) {
                        bail!("metrics.schema.{name}: quantile {quantile} outside [0, 1]");
                    }
                }
            }
            if let Some(buckets) = &schema.buckets {
                if buckets.windows(2).any(|w| w[0] >= w[1]) {
                    bail!("metrics.schema.{name}: buckets must be strictly increasing");
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_usable() {
        let config = AgentConfig::default();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.log.level, "info");
        assert!(config.metrics.schema.is_empty());
    }

    #[test]
    fn parses_full_toml() {
        let raw = r#"
            [server]
            host = "127.0.0.1"
            port = 9100

            [source]
            endpoint = "wss://events.example.com/stream"
            app_id = "app-1"
            app_secret = "s3cret"
            verify_token = "tok"

            [log]
            level = "debug"

            [alert]
            webhook_base = "https://bots.example.com/hook"

            [metrics]
            common_labels = ["tenant_id"]

            [metrics.schema.request_latency_ms]
            type = "histogram"
            help = "Request latency"
            labels = ["route"]
            buckets = [1.0, 2.0, 3.0]

            [metrics.schema.rpc_latency_ms]
            type = "summary"
            objectives = [[0.5, 0.05], [0.99, 0.001]]
            max_age_secs = 300
            age_buckets = 3
        "#;

        let config = AgentConfig::from_toml_str(raw).unwrap();
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.source.verify_token.as_deref(), Some("tok"));

        let hist = &config.metrics.schema["request_latency_ms"];
        assert_eq!(hist.ty, "histogram");
        assert_eq!(hist.buckets, Some(vec![1.0, 2.0, 3.0]));
        assert_eq!(
            config.metrics.resolved_labels(hist),
            vec!["tenant_id", "route"]
        );

        let summary = &config.metrics.schema["rpc_latency_ms"];
        assert_eq!(
            summary.objectives,
            Some(vec![(0.5, 0.05), (0.99, 0.001)])
        );
        assert_eq!(summary.max_age_secs, Some(300));
        assert_eq!(summary.buf_cap, None);

        config.validate().unwrap();
    }

    #[test]
    fn unset_tuning_stays_unset() {
        let raw = r#"
            [source]
            endpoint = "wss://events.example.com/stream"

            [metrics.schema.plain_histogram]
            type = "histogram"
        "#;

        let config = AgentConfig::from_toml_str(raw).unwrap();
        let schema = &config.metrics.schema["plain_histogram"];
        assert_eq!(schema.buckets, None);
        assert_eq!(schema.help, None);
    }

    #[test]
    fn env_overrides_win() {
        let mut config = AgentConfig::default();
        env::set_var("RELAY_APP_ID", "env-app");
        env::set_var("RELAY_VERIFY_TOKEN", "env-token");
        config.apply_env_overrides();
        env::remove_var("RELAY_APP_ID");
        env::remove_var("RELAY_VERIFY_TOKEN");

        assert_eq!(config.source.app_id, "env-app");
        assert_eq!(config.source.verify_token.as_deref(), Some("env-token"));
    }

    #[test]
    fn validate_rejects_bad_schema() {
        let raw = r#"
            [source]
            endpoint = "wss://events.example.com/stream"

            [metrics.schema.broken]
            type = "bogus"
        "#;
        let config = AgentConfig::from_toml_str(raw).unwrap();
        assert!(config.validate().is_err());

        let raw = r#"
            [source]
            endpoint = "wss://events.example.com/stream"

            [metrics.schema.broken]
            type = "histogram"
            buckets = [3.0, 1.0]
        "#;
        let config = AgentConfig::from_toml_str(raw).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_endpoint_fails_validation() {
        assert!(AgentConfig::default().validate().is_err());
    }
}
