//! Wire types of the Wavefront chart and metrics-list APIs

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A single series returned by a chart query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Timeseries {
    #[serde(default)]
    pub label: String,

    #[serde(default)]
    pub host: String,

    /// Point tags, e.g. `pod_name`, `namespace_name`, `nodename`
    #[serde(default)]
    pub tags: HashMap<String, String>,

    /// `[timestamp, value]` pairs in ascending time order
    #[serde(default)]
    pub data: Vec<Vec<f64>>,
}

impl Timeseries {
    /// Last data point of the series, if any
    pub fn last_point(&self) -> Option<&[f64]> {
        self.data.last().map(Vec::as_slice)
    }
}

/// Response of `/api/v2/chart/api`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub query: String,

    #[serde(default)]
    pub timeseries: Vec<Timeseries>,
}

/// Response of `/chart/metrics/list`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListResult {
    #[serde(default)]
    pub metrics: Vec<String>,

    #[serde(default)]
    pub limit: i64,
}
