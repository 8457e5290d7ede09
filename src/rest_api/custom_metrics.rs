//! Custom Metrics API (`custom.metrics.k8s.io/v1beta1`)
//!
//! Serves metrics describing Kubernetes objects in the format the
//! Horizontal Pod Autoscaler consumes. A `*` object name selects objects by
//! the `labelSelector` query parameter instead.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};

use super::dto::{milli_quantity, ApiResource, ApiResourceList, ListMetadata, SelectorParams};
use crate::error::Result;
use crate::provider::{
    kind_for, CustomMetricInfo, MetricValue as ProviderValue, MetricsProvider, NamespacedName,
};

pub const GROUP_VERSION: &str = "custom.metrics.k8s.io/v1beta1";

/// Object name selecting by label instead of by name
const ANY_NAME: &str = "*";

/// MetricValueList is the top-level list type for the custom metrics API
#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct MetricValueList {
    pub kind: String,
    pub api_version: String,
    pub metadata: ListMetadata,
    pub items: Vec<MetricValue>,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct MetricValue {
    pub described_object: DescribedObject,
    pub metric_name: String,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window_seconds: Option<i64>,
    pub value: String,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct DescribedObject {
    pub kind: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    pub name: String,
    pub api_version: String,
}

impl From<ProviderValue> for MetricValue {
    fn from(value: ProviderValue) -> Self {
        Self {
            described_object: DescribedObject {
                kind: kind_for(&value.resource).to_string(),
                namespace: value.namespace,
                name: value.name,
                api_version: "v1".to_string(),
            },
            metric_name: value.metric,
            timestamp: value.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
            window_seconds: None,
            value: milli_quantity(value.value),
        }
    }
}

impl MetricValueList {
    fn new(items: Vec<ProviderValue>) -> Self {
        Self {
            kind: "MetricValueList".to_string(),
            api_version: GROUP_VERSION.to_string(),
            metadata: ListMetadata::default(),
            items: items.into_iter().map(MetricValue::from).collect(),
        }
    }
}

/// Handler for /apis/custom.metrics.k8s.io/v1beta1
pub async fn list_resources(State(provider): State<Arc<MetricsProvider>>) -> Json<ApiResourceList> {
    let resources = provider
        .list_all_metrics()
        .into_iter()
        .map(|info| {
            ApiResource::new(
                format!("{}/{}", info.resource, info.metric),
                info.namespaced,
                "MetricValueList",
            )
        })
        .collect();
    Json(ApiResourceList::new(GROUP_VERSION, resources))
}

/// Handler for /apis/custom.metrics.k8s.io/v1beta1/namespaces/:namespace/:resource/:name/:metric
pub async fn get_namespaced_metric(
    State(provider): State<Arc<MetricsProvider>>,
    Path((namespace, resource, name, metric)): Path<(String, String, String, String)>,
    Query(params): Query<SelectorParams>,
) -> Result<Json<MetricValueList>> {
    let info = CustomMetricInfo::new(resource, metric, true);
    fetch(&provider, &namespace, &name, &params.label_selector, &info).await
}

/// Handler for /apis/custom.metrics.k8s.io/v1beta1/:resource/:name/:metric
pub async fn get_root_metric(
    State(provider): State<Arc<MetricsProvider>>,
    Path((resource, name, metric)): Path<(String, String, String)>,
    Query(params): Query<SelectorParams>,
) -> Result<Json<MetricValueList>> {
    let info = CustomMetricInfo::new(resource, metric, false);
    fetch(&provider, "", &name, &params.label_selector, &info).await
}

/// Handler for /apis/custom.metrics.k8s.io/v1beta1/namespaces/:namespace/metrics/:metric
pub async fn get_namespace_metric(
    State(provider): State<Arc<MetricsProvider>>,
    Path((namespace, metric)): Path<(String, String)>,
) -> Result<Json<MetricValueList>> {
    let info = CustomMetricInfo::new("namespaces", metric, false);
    fetch(&provider, "", &namespace, "", &info).await
}

async fn fetch(
    provider: &MetricsProvider,
    namespace: &str,
    name: &str,
    selector: &str,
    info: &CustomMetricInfo,
) -> Result<Json<MetricValueList>> {
    let items = if name == ANY_NAME {
        provider
            .get_metric_by_selector(namespace, selector, info)
            .await?
    } else {
        let name = NamespacedName::new(namespace, name);
        vec![provider.get_metric_by_name(&name, info).await?]
    };
    Ok(Json(MetricValueList::new(items)))
}
