//! Adapter configuration values and the external metrics rule file
//!
//! The rule file drives the external metrics API:
//!
//! ```yaml
//! rules:
//!   - name: queue-depth
//!     query: ts(rabbitmq.queue.depth)
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default prefix for Kubernetes metrics in Wavefront
pub const DEFAULT_METRIC_PREFIX: &str = "kubernetes";

/// Default interval between refreshes of the metrics catalog
pub const DEFAULT_RELIST_INTERVAL: Duration = Duration::from_secs(600);

/// Default timeout for calls to the Wavefront API
pub const DEFAULT_API_TIMEOUT: Duration = Duration::from_secs(10);

/// Default interval between stats of the rule file
pub const DEFAULT_CONFIG_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Runtime configuration of the adapter
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    /// Prefix of custom metrics in Wavefront, without surrounding separators
    pub metric_prefix: String,

    /// How often the custom/external metric catalog is rebuilt
    pub relist_interval: Duration,

    /// Timeout applied to every Wavefront API call
    pub api_timeout: Duration,

    /// Optional rule file for external metrics
    pub external_config: Option<PathBuf>,

    /// How often the rule file is checked for modification
    pub config_poll_interval: Duration,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            metric_prefix: DEFAULT_METRIC_PREFIX.to_string(),
            relist_interval: DEFAULT_RELIST_INTERVAL,
            api_timeout: DEFAULT_API_TIMEOUT,
            external_config: None,
            config_poll_interval: DEFAULT_CONFIG_POLL_INTERVAL,
        }
    }
}

impl AdapterConfig {
    /// Set the metric prefix, trimming leading and trailing `.` separators
    pub fn with_metric_prefix(mut self, prefix: &str) -> Self {
        self.metric_prefix = normalize_prefix(prefix);
        self
    }
}

/// Strip leading and trailing separators from a metric prefix
pub fn normalize_prefix(prefix: &str) -> String {
    prefix.trim().trim_matches('.').to_string()
}

/// `interval`, or `default` when `interval` is zero
///
/// Tickers cannot run on a zero period.
pub fn non_zero_interval(interval: Duration, default: Duration) -> Duration {
    if interval.is_zero() {
        default
    } else {
        interval
    }
}

/// A named Wavefront query exposed as an external metric
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricRule {
    /// Unique name of the external metric
    pub name: String,

    /// Wavefront ts() query computing the metric
    pub query: String,
}

impl MetricRule {
    pub fn new(name: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            query: query.into(),
        }
    }
}

/// Contents of the external metrics rule file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExternalMetricsConfig {
    #[serde(default)]
    pub rules: Vec<MetricRule>,
}

impl ExternalMetricsConfig {
    /// Load the rule file at `path`
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::ConfigError(format!(
                "unable to load metrics discovery config file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_yaml(&contents)
    }

    /// Parse a rule file from YAML, rejecting unknown fields
    pub fn from_yaml(contents: &str) -> Result<Self> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(contents).map_err(|e| {
            Error::ConfigError(format!("unable to parse metrics discovery config: {}", e))
        })
    }
}
