//! Wavefront API client
//!
//! The adapter only needs two calls against the time-series store: a chart
//! query and a metric-name listing. [`StoreClient`] captures exactly those so
//! the provider can run against the real HTTP client or the in-memory fake.

pub mod fake;
mod types;
mod wavefront;

use async_trait::async_trait;

use crate::error::Result;

pub use fake::FakeStoreClient;
pub use types::{ListResult, QueryResult, Timeseries};
pub use wavefront::WavefrontClient;

#[async_trait]
pub trait StoreClient: Send + Sync {
    /// Run a ts() query starting at `start` (epoch seconds)
    async fn query(&self, start: i64, query: &str) -> Result<QueryResult>;

    /// List metric names matching `pattern` (e.g. `kubernetes.*`)
    async fn list_metrics(&self, pattern: &str) -> Result<Vec<String>>;
}
