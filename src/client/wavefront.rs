//! HTTP client for the Wavefront REST API

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, Url};
use serde::de::DeserializeOwned;
use tracing::{debug, trace};

use super::types::{ListResult, QueryResult};
use super::StoreClient;
use crate::config::DEFAULT_API_TIMEOUT;
use crate::error::{Error, Result, StoreErrorKind};
use crate::metrics;

const CHART_ENDPOINT: &str = "/api/v2/chart/api";
const METRICS_LIST_ENDPOINT: &str = "/chart/metrics/list";

/// Maximum number of metric names requested per listing
const METRICS_LIST_LIMIT: &str = "500";

/// Wavefront API client authenticated with a bearer token
pub struct WavefrontClient {
    base_url: Url,
    token: String,
    timeout: Duration,
    client: Client,
}

impl WavefrontClient {
    /// Create a client for `base_url` (e.g. `https://INSTANCE.wavefront.com`)
    ///
    /// A zero `timeout` falls back to the default of 10 seconds.
    pub fn new(base_url: Url, token: impl Into<String>, timeout: Duration) -> Result<Self> {
        let timeout = effective_timeout(timeout);
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url,
            token: token.into(),
            timeout,
            client,
        })
    }

    /// Parse `url` and create a client for it
    pub fn from_url(url: &str, token: impl Into<String>, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(url)
            .map_err(|e| Error::ConfigError(format!("unable to parse wavefront url {}: {}", url, e)))?;
        Self::new(base_url, token, timeout)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Build the full URL of `endpoint` with the given query parameters
    pub fn endpoint_url(&self, endpoint: &str, params: &[(&str, &str)]) -> Url {
        endpoint_url(&self.base_url, endpoint, params)
    }

    async fn get<T: DeserializeOwned>(&self, endpoint: &str, params: &[(&str, &str)]) -> Result<T> {
        let url = self.endpoint_url(endpoint, params);
        debug!("Wavefront request: GET {}{}", self.base_url, endpoint);

        let response = self
            .client
            .get(url)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.token))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::store(
                StoreErrorKind::Status,
                format!("error status={} code={}", status, status.as_u16()),
            ));
        }

        let body = response.bytes().await?;
        serde_json::from_slice(&body)
            .map_err(|e| Error::store(StoreErrorKind::BadResponse, e.to_string()))
    }
}

#[async_trait]
impl StoreClient for WavefrontClient {
    async fn query(&self, start: i64, query: &str) -> Result<QueryResult> {
        debug!("Wavefront query: start={}, query={}", start, query);
        if query.is_empty() {
            return Err(Error::store(StoreErrorKind::BadData, "empty query string"));
        }

        let start = start.to_string();
        let params = [("q", query), ("s", start.as_str()), ("g", "m"), ("i", "false")];
        let result = self.get::<QueryResult>(CHART_ENDPOINT, &params).await;
        metrics::record_store_request("query", result.is_ok());

        let result = result?;
        trace!("Wavefront query returned {} series", result.timeseries.len());
        Ok(result)
    }

    async fn list_metrics(&self, pattern: &str) -> Result<Vec<String>> {
        debug!("Wavefront metrics listing: pattern={}", pattern);

        let params = [("m", pattern), ("l", METRICS_LIST_LIMIT)];
        let result = self.get::<ListResult>(METRICS_LIST_ENDPOINT, &params).await;
        metrics::record_store_request("list_metrics", result.is_ok());

        let result = result?;
        trace!("Wavefront listing returned {} metrics", result.metrics.len());
        Ok(result.metrics)
    }
}

fn effective_timeout(timeout: Duration) -> Duration {
    if timeout.is_zero() {
        DEFAULT_API_TIMEOUT
    } else {
        timeout
    }
}

/// Join `endpoint` onto the path of `base` and append `params`
fn endpoint_url(base: &Url, endpoint: &str, params: &[(&str, &str)]) -> Url {
    let mut url = base.clone();
    let path = format!(
        "{}/{}",
        base.path().trim_end_matches('/'),
        endpoint.trim_start_matches('/')
    );
    url.set_path(&path);
    url.set_query(None);
    if !params.is_empty() {
        url.query_pairs_mut().extend_pairs(params);
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str, timeout: Duration) -> WavefrontClient {
        WavefrontClient::from_url(base, "of good news", timeout).unwrap()
    }

    #[test]
    fn test_endpoint_url_joins_base() {
        let wf = client("https://base.url", Duration::from_secs(7));
        let url = wf.endpoint_url("foo", &[("l", "500")]);
        assert_eq!(url.as_str(), "https://base.url/foo?l=500");
    }

    #[test]
    fn test_endpoint_url_keeps_base_path() {
        let wf = client("https://base.url/proxy/", Duration::from_secs(7));
        let url = wf.endpoint_url(CHART_ENDPOINT, &[("q", "ts(a.b, (pod_name=\"p1\"))")]);
        assert_eq!(url.path(), "/proxy/api/v2/chart/api");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![("q".to_string(), "ts(a.b, (pod_name=\"p1\"))".to_string())]
        );
    }

    #[test]
    fn test_timeout_defaults() {
        assert_eq!(
            client("https://base.url", Duration::from_secs(3)).timeout(),
            Duration::from_secs(3)
        );
        assert_eq!(
            client("https://base.url", Duration::ZERO).timeout(),
            Duration::from_secs(10)
        );
    }

    #[test]
    fn test_invalid_url_is_config_error() {
        let result = WavefrontClient::from_url("not a url", "t", Duration::ZERO);
        assert!(matches!(result, Err(Error::ConfigError(_))));
    }

    #[tokio::test]
    async fn test_empty_query_rejected_before_request() {
        let wf = client("http://127.0.0.1:1", Duration::from_secs(1));
        let err = wf.query(0, "").await.unwrap_err();
        assert!(matches!(
            err,
            Error::StoreError {
                kind: StoreErrorKind::BadData,
                ..
            }
        ));
    }
}
