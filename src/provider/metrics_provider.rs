//! Custom and external metrics provider backed by Wavefront
//!
//! This is the surface the API server calls into. It combines the
//! [`Translator`] with the store client for value lookups and answers
//! catalog requests from the [`MetricsLister`] snapshot. Failures are
//! reported as either NotFound or a generic internal error; the underlying
//! cause is only logged.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, instrument};

use super::lister::MetricsLister;
use super::resolver::ResourceResolver;
use super::rules::RuleStore;
use super::translator::Translator;
use super::types::{
    CustomMetricInfo, ExternalMetricInfo, ExternalMetricValue, MetricValue, NamespacedName,
};
use crate::client::{QueryResult, StoreClient};
use crate::error::{Error, Result, INTERNAL_ERROR_MESSAGE};

/// How far back point queries look, in seconds
const QUERY_WINDOW_SECS: i64 = 30;

pub struct MetricsProvider {
    translator: Translator,
    client: Arc<dyn StoreClient>,
    resolver: Arc<dyn ResourceResolver>,
    lister: Arc<MetricsLister>,
    rules: Option<Arc<RuleStore>>,
}

impl MetricsProvider {
    pub fn new(
        translator: Translator,
        client: Arc<dyn StoreClient>,
        resolver: Arc<dyn ResourceResolver>,
        lister: Arc<MetricsLister>,
        rules: Option<Arc<RuleStore>>,
    ) -> Self {
        Self {
            translator,
            client,
            resolver,
            lister,
            rules,
        }
    }

    /// Value of `info` for the single object `name`
    #[instrument(skip_all, fields(object = %name, metric = %info))]
    pub async fn get_metric_by_name(
        &self,
        name: &NamespacedName,
        info: &CustomMetricInfo,
    ) -> Result<MetricValue> {
        info!("Received custom metric request");
        self.get_single(info, name).await
    }

    /// Values of `info` for every object in `namespace` matching `selector`
    #[instrument(skip(self), fields(metric = %info))]
    pub async fn get_metric_by_selector(
        &self,
        namespace: &str,
        selector: &str,
        info: &CustomMetricInfo,
    ) -> Result<Vec<MetricValue>> {
        info!("Received custom metric request");
        self.get_multiple(info, namespace, selector).await
    }

    /// Custom metrics from the last catalog refresh
    pub fn list_all_metrics(&self) -> Vec<CustomMetricInfo> {
        self.lister.list_custom_metrics()
    }

    /// Values of the external metric defined by a rule
    ///
    /// External metrics are not scoped, so `namespace` and `selector` are
    /// only logged.
    #[instrument(skip(self), fields(metric = %info.metric))]
    pub async fn get_external_metric(
        &self,
        namespace: &str,
        selector: &str,
        info: &ExternalMetricInfo,
    ) -> Result<Vec<ExternalMetricValue>> {
        info!("Received external metric request");

        let Some(rules) = &self.rules else {
            error!("No external metrics driver configured");
            return Err(Error::InternalError(format!(
                "missing external driver for external metric: {}",
                info.metric
            )));
        };

        let Some(query) = rules.get_query(&info.metric).await else {
            return Err(Error::InternalError(format!(
                "missing query for external metric: {}",
                info.metric
            )));
        };

        let result = self.do_query(&query).await?;
        self.translator
            .external_values_for(&result, &info.metric)
            .map_err(|e| {
                error!("error reading external metric {}: {}", info.metric, e);
                Error::InternalError(format!(
                    "error fetching metrics for external metric: {}",
                    info.metric
                ))
            })
    }

    /// External metrics from the last catalog refresh
    pub fn list_all_external_metrics(&self) -> Vec<ExternalMetricInfo> {
        self.lister.list_external_metrics()
    }

    async fn get_single(&self, info: &CustomMetricInfo, name: &NamespacedName) -> Result<MetricValue> {
        let result = self
            .query(info, &name.namespace, &[name.name.as_str()])
            .await?;

        if result.timeseries.is_empty() {
            return Err(not_found_for(info, &name.name));
        }

        let values = self
            .translator
            .match_values_to_names(&result, &info.resource)
            .ok_or_else(|| not_found(info))?;

        if values.len() > 1 {
            info!(
                "Got more than one result ({} results) when fetching metric {} for {}, using the one with a matching name",
                values.len(),
                info,
                name
            );
        }

        let Some(value) = values.get(&name.name) else {
            error!(
                "None of the results returned when fetching metric {} for {} matched the resource name",
                info, name
            );
            return Err(not_found_for(info, &name.name));
        };

        Ok(self.metric_for(*value, &name.namespace, &name.name, info))
    }

    async fn get_multiple(
        &self,
        info: &CustomMetricInfo,
        namespace: &str,
        selector: &str,
    ) -> Result<Vec<MetricValue>> {
        let names = self
            .resolver
            .list_object_names(info, namespace, selector)
            .await
            .map_err(|e| {
                error!("unable to list {} for selector {:?}: {}", info.resource, selector, e);
                Error::InternalError(format!("unable to list {}", info.resource))
            })?;
        debug!("Resource names: {:?}", names);

        let result = self.query(info, namespace, &names).await?;
        let values = self
            .translator
            .match_values_to_names(&result, &info.resource)
            .ok_or_else(|| not_found(info))?;
        debug!("Matched values: {:?}", values);

        Ok(names
            .iter()
            .filter_map(|name| {
                values
                    .get(name)
                    .map(|value| self.metric_for(*value, namespace, name, info))
            })
            .collect())
    }

    async fn query<S: AsRef<str>>(
        &self,
        info: &CustomMetricInfo,
        namespace: &str,
        names: &[S],
    ) -> Result<QueryResult> {
        let query = self
            .translator
            .query_for(info, namespace, names)
            .ok_or_else(|| not_found(info))?;
        self.do_query(&query).await
    }

    async fn do_query(&self, query: &str) -> Result<QueryResult> {
        let start = Utc::now().timestamp() - QUERY_WINDOW_SECS;
        self.client.query(start, query).await.map_err(|e| {
            error!("unable to fetch metrics from wavefront: {}", e);
            Error::InternalError(INTERNAL_ERROR_MESSAGE.to_string())
        })
    }

    fn metric_for(
        &self,
        value: f64,
        namespace: &str,
        name: &str,
        info: &CustomMetricInfo,
    ) -> MetricValue {
        MetricValue {
            resource: info.resource.clone(),
            namespace: if info.namespaced {
                namespace.to_string()
            } else {
                String::new()
            },
            name: name.to_string(),
            metric: info.metric.clone(),
            value,
            timestamp: Utc::now(),
        }
    }
}

fn not_found(info: &CustomMetricInfo) -> Error {
    Error::MetricNotFound {
        resource: info.resource.clone(),
        metric: info.metric.clone(),
    }
}

fn not_found_for(info: &CustomMetricInfo, name: &str) -> Error {
    Error::MetricNotFoundFor {
        resource: info.resource.clone(),
        metric: info.metric.clone(),
        name: name.to_string(),
    }
}
