//! External Metrics API (`external.metrics.k8s.io/v1beta1`)

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};

use super::dto::{milli_quantity, ApiResource, ApiResourceList, ListMetadata, SelectorParams};
use crate::error::Result;
use crate::provider::{ExternalMetricInfo, ExternalMetricValue as ProviderValue, MetricsProvider};

pub const GROUP_VERSION: &str = "external.metrics.k8s.io/v1beta1";

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ExternalMetricValueList {
    pub kind: String,
    pub api_version: String,
    pub metadata: ListMetadata,
    pub items: Vec<ExternalMetricValue>,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ExternalMetricValue {
    pub metric_name: String,
    #[serde(default)]
    pub metric_labels: BTreeMap<String, String>,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window_seconds: Option<i64>,
    pub value: String,
}

impl From<ProviderValue> for ExternalMetricValue {
    fn from(value: ProviderValue) -> Self {
        Self {
            metric_name: value.metric,
            metric_labels: BTreeMap::new(),
            timestamp: value.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
            window_seconds: None,
            value: milli_quantity(value.value),
        }
    }
}

/// Handler for /apis/external.metrics.k8s.io/v1beta1
pub async fn list_resources(State(provider): State<Arc<MetricsProvider>>) -> Json<ApiResourceList> {
    let resources = provider
        .list_all_external_metrics()
        .into_iter()
        .map(|info| ApiResource::new(info.metric, true, "ExternalMetricValueList"))
        .collect();
    Json(ApiResourceList::new(GROUP_VERSION, resources))
}

/// Handler for /apis/external.metrics.k8s.io/v1beta1/namespaces/:namespace/:metric
pub async fn get_external_metric(
    State(provider): State<Arc<MetricsProvider>>,
    Path((namespace, metric)): Path<(String, String)>,
    Query(params): Query<SelectorParams>,
) -> Result<Json<ExternalMetricValueList>> {
    let info = ExternalMetricInfo::new(metric);
    let values = provider
        .get_external_metric(&namespace, &params.label_selector, &info)
        .await?;

    Ok(Json(ExternalMetricValueList {
        kind: "ExternalMetricValueList".to_string(),
        api_version: GROUP_VERSION.to_string(),
        metadata: ListMetadata::default(),
        items: values.into_iter().map(ExternalMetricValue::from).collect(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::FakeStoreClient;
    use crate::config::MetricRule;
    use crate::error::Error;
    use crate::provider::{MetricsLister, RuleStore, StaticResourceResolver, Translator};
    use std::time::Duration;

    async fn provider(client: FakeStoreClient) -> Arc<MetricsProvider> {
        let rules = Arc::new(RuleStore::new());
        rules
            .add_rules(vec![
                MetricRule::new("queue-depth", "ts(rabbitmq.queue.depth)"),
                MetricRule::new("failMetric", "ts(unknown)"),
            ])
            .await;

        let client: Arc<FakeStoreClient> = Arc::new(client);
        let translator = Translator::new("kubernetes");
        let lister = Arc::new(MetricsLister::new(
            translator.clone(),
            client.clone(),
            Some(rules.clone()),
            Duration::from_secs(600),
        ));
        lister.refresh().await.unwrap();

        Arc::new(MetricsProvider::new(
            translator,
            client,
            Arc::new(StaticResourceResolver::default()),
            lister,
            Some(rules),
        ))
    }

    fn path(metric: &str) -> Path<(String, String)> {
        Path(("default".to_string(), metric.to_string()))
    }

    #[tokio::test]
    async fn test_list_resources() {
        let provider = provider(FakeStoreClient::new()).await;
        let Json(list) = list_resources(State(provider)).await;

        let names: Vec<&str> = list.resources.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["failMetric", "queue-depth"]);
        assert_eq!(list.group_version, GROUP_VERSION);
    }

    #[tokio::test]
    async fn test_get_external_metric() {
        let provider = provider(FakeStoreClient::new()).await;
        let Json(list) = get_external_metric(
            State(provider),
            path("queue-depth"),
            Query(SelectorParams::default()),
        )
        .await
        .unwrap();

        assert_eq!(list.kind, "ExternalMetricValueList");
        assert_eq!(list.items.len(), 5);
        assert!(list.items.iter().all(|i| i.value == "2360m"));
        assert!(list.items.iter().all(|i| i.metric_name == "queue-depth"));
    }

    #[tokio::test]
    async fn test_failing_query_is_internal_error() {
        let provider = provider(FakeStoreClient::new().failing_queries()).await;
        let err = get_external_metric(
            State(provider),
            path("failMetric"),
            Query(SelectorParams::default()),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, Error::InternalError(_)));
        assert!(!err.is_not_found());
    }
}
