//! Metric descriptors and values exchanged with the API layer

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A custom metric attached to a Kubernetes resource type
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomMetricInfo {
    /// Plural resource name, e.g. `pods` or `nodes`
    pub resource: String,

    /// Whether objects of this resource live in a namespace
    pub namespaced: bool,

    /// Metric name without prefix and resource, e.g. `cpu.usage_rate`
    pub metric: String,
}

impl CustomMetricInfo {
    pub fn new(resource: impl Into<String>, metric: impl Into<String>, namespaced: bool) -> Self {
        Self {
            resource: resource.into(),
            namespaced,
            metric: metric.into(),
        }
    }
}

impl fmt::Display for CustomMetricInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespaced {
            write!(f, "{}/{}(namespaced)", self.resource, self.metric)
        } else {
            write!(f, "{}/{}", self.resource, self.metric)
        }
    }
}

/// An external metric defined by a rule
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExternalMetricInfo {
    pub metric: String,
}

impl ExternalMetricInfo {
    pub fn new(metric: impl Into<String>) -> Self {
        Self {
            metric: metric.into(),
        }
    }
}

/// Namespace and name of a Kubernetes object
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NamespacedName {
    pub namespace: String,
    pub name: String,
}

impl NamespacedName {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for NamespacedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            f.write_str(&self.name)
        } else {
            write!(f, "{}/{}", self.namespace, self.name)
        }
    }
}

/// Value of a custom metric for one object
#[derive(Debug, Clone, PartialEq)]
pub struct MetricValue {
    /// Plural resource of the described object
    pub resource: String,

    /// Namespace of the described object, empty for cluster-scoped objects
    pub namespace: String,

    /// Name of the described object
    pub name: String,

    pub metric: String,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

/// Value of an external metric for one series
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalMetricValue {
    pub metric: String,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}
