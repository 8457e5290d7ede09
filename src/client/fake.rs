//! In-memory [`StoreClient`] used to compose the provider in tests

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::types::{QueryResult, Timeseries};
use super::StoreClient;
use crate::error::{Error, Result, StoreErrorKind};

/// Pod names present in the default fixture
pub const FIXTURE_PODS: [&str; 5] = [
    "test-deployment-7f54684694-2cg5v",
    "test-deployment-7f54684694-cbts9",
    "test-deployment-7f54684694-mm49g",
    "test-deployment-7f54684694-t57tb",
    "test-deployment-7f54684694-xnxfp",
];

/// Metric names returned by the default fixture listing
pub const FIXTURE_METRICS: [&str; 5] = [
    "kubernetes.node.cpu.node_reservation",
    "kubernetes.pod.network.rx_errors_rate",
    "kubernetes.pod.network.tx_rate",
    "kubernetes.pod.cpu.request",
    "kubernetes.pod.cpu.usage_rate",
];

const FIXTURE_NODE: &str = "gke-cluster-default-pool-f63db08a-xrdh";

/// Store client answering every call from fixed in-memory data
#[derive(Debug)]
pub struct FakeStoreClient {
    metrics: Vec<String>,
    result: QueryResult,
    fail_queries: bool,
    fail_listing: bool,
    queries: Mutex<Vec<String>>,
}

impl Default for FakeStoreClient {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeStoreClient {
    /// Fixture with five pod metrics and five pod series valued `2.3598`
    pub fn new() -> Self {
        let timeseries = FIXTURE_PODS
            .iter()
            .map(|pod| fixture_series("pod_name", pod))
            .collect();

        Self {
            metrics: FIXTURE_METRICS.iter().map(|m| m.to_string()).collect(),
            result: QueryResult {
                timeseries,
                ..Default::default()
            },
            fail_queries: false,
            fail_listing: false,
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn with_metrics(mut self, metrics: Vec<String>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_result(mut self, result: QueryResult) -> Self {
        self.result = result;
        self
    }

    /// Make every `query` call fail
    pub fn failing_queries(mut self) -> Self {
        self.fail_queries = true;
        self
    }

    /// Make every `list_metrics` call fail
    pub fn failing_listing(mut self) -> Self {
        self.fail_listing = true;
        self
    }

    /// Queries issued so far, in order
    pub fn queries(&self) -> Vec<String> {
        self.queries
            .lock()
            .map(|q| q.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl StoreClient for FakeStoreClient {
    async fn query(&self, _start: i64, query: &str) -> Result<QueryResult> {
        if let Ok(mut queries) = self.queries.lock() {
            queries.push(query.to_string());
        }
        if self.fail_queries {
            return Err(Error::store(StoreErrorKind::Status, "error status=503 code=503"));
        }
        Ok(self.result.clone())
    }

    async fn list_metrics(&self, _pattern: &str) -> Result<Vec<String>> {
        if self.fail_listing {
            return Err(Error::store(StoreErrorKind::Status, "error status=503 code=503"));
        }
        Ok(self.metrics.clone())
    }
}

/// A single-point series tagged with `key=name` and the fixture node
pub fn fixture_series(key: &str, name: &str) -> Timeseries {
    let mut tags = HashMap::new();
    tags.insert(key.to_string(), name.to_string());
    tags.insert("nodename".to_string(), FIXTURE_NODE.to_string());
    Timeseries {
        tags,
        data: vec![vec![0.0, 2.3598]],
        ..Default::default()
    }
}
