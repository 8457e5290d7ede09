//! Translation between Kubernetes metric requests and Wavefront queries
//!
//! Kubernetes metrics land in Wavefront as `<prefix>.<resource>.<metric>`
//! with point tags identifying the object, for example
//! `kubernetes.pod.cpu.usage_rate` tagged with `pod_name` and
//! `namespace_name`. The [`Translator`] builds `ts()` queries from a metric
//! request and maps the returned series back onto object names.

use std::collections::HashMap;

use chrono::Utc;
use tracing::{debug, error};

use super::types::{CustomMetricInfo, ExternalMetricInfo, ExternalMetricValue};
use crate::client::QueryResult;
use crate::error::{Error, Result, StoreErrorKind};

/// Tag carrying the namespace of namespaced objects
const NAMESPACE_TAG: &str = "namespace_name";

/// Wavefront resource tokens and the plural resource names they are served as
const RESOURCE_ALIASES: [(&str, &str); 6] = [
    ("cluster", "clusters"),
    ("ns", "namespaces"),
    ("pod", "pods"),
    ("node", "nodes"),
    ("pod_container", "pod_containers"),
    ("sys_container", "sys_containers"),
];

/// Stateless translator bound to a metric prefix
#[derive(Debug, Clone)]
pub struct Translator {
    prefix: String,
}

impl Translator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Build the ts() query for `info` restricted to the named objects
    ///
    /// With prefix `kubernetes`, metric `cpu.usage_rate` on `pods` in
    /// `default` for `pod1` and `pod2` this yields
    /// `ts(kubernetes.pod.cpu.usage_rate, (pod_name="pod1" or pod_name="pod2") and (namespace_name="default"))`.
    ///
    /// Translation never rejects its input: an empty metric or an unknown
    /// resource still produces a query, so this currently always returns `Some`.
    pub fn query_for<S: AsRef<str>>(
        &self,
        info: &CustomMetricInfo,
        namespace: &str,
        names: &[S],
    ) -> Option<String> {
        let res_type = resource_type(&info.resource);
        let resource_filter = filter_for(&tag_key(res_type), " or ", names);
        let namespace_filter = if is_namespaced(res_type) {
            filter_for(NAMESPACE_TAG, "", &[namespace])
        } else {
            String::new()
        };
        let filters = combine(&[resource_filter, namespace_filter]);

        Some(format!(
            "ts({}.{}.{}{})",
            self.prefix, res_type, info.metric, filters
        ))
    }

    /// Map each series onto the object named by its resource tag
    ///
    /// Matching is all-or-nothing: an empty response, a series without
    /// points, a series without the resource tag or an unusable value makes
    /// the whole call return `None`. When two series carry the same name the
    /// later one wins.
    pub fn match_values_to_names(
        &self,
        result: &QueryResult,
        resource: &str,
    ) -> Option<HashMap<String, f64>> {
        debug!("Matching {} series to names", result.timeseries.len());

        if result.timeseries.is_empty() {
            return None;
        }

        let key = tag_key(resource_type(resource));
        let mut values = HashMap::with_capacity(result.timeseries.len());
        for series in &result.timeseries {
            let point = series.last_point()?;
            let name = series.tags.get(&key)?;
            let value = trim_float(*point.get(1)?)?;
            values.insert(name.clone(), value);
        }
        Some(values)
    }

    /// Turn Wavefront metric names into custom metric descriptors
    ///
    /// Names that do not split into a resource and a metric are skipped.
    pub fn custom_metrics_for<S: AsRef<str>>(&self, metric_names: &[S]) -> Vec<CustomMetricInfo> {
        metric_names
            .iter()
            .filter_map(|name| {
                let (resource, metric) = split_metric(&self.prefix, name.as_ref())?;
                Some(CustomMetricInfo {
                    resource: normalize(resource).to_string(),
                    namespaced: is_namespaced(resource),
                    metric: metric.to_string(),
                })
            })
            .collect()
    }

    /// One external metric descriptor per rule name
    pub fn external_metrics_for<I>(&self, metric_names: I) -> Vec<ExternalMetricInfo>
    where
        I: IntoIterator<Item = String>,
    {
        metric_names
            .into_iter()
            .map(|metric| ExternalMetricInfo { metric })
            .collect()
    }

    /// Extract the latest value of every series for external metric `metric`
    ///
    /// A series without points fails the whole call; a point whose value is
    /// not a finite number is logged and skipped.
    pub fn external_values_for(
        &self,
        result: &QueryResult,
        metric: &str,
    ) -> Result<Vec<ExternalMetricValue>> {
        let now = Utc::now();
        let mut values = Vec::with_capacity(result.timeseries.len());
        for series in &result.timeseries {
            let point = series.last_point().ok_or_else(|| {
                Error::store(
                    StoreErrorKind::BadResponse,
                    format!("no data for external metric: {}", metric),
                )
            })?;
            if point.len() != 2 {
                return Err(Error::store(
                    StoreErrorKind::BadResponse,
                    format!("invalid data point for external metric: {}", metric),
                ));
            }
            let Some(value) = trim_float(point[1]) else {
                error!(
                    "error converting external metric: {} value: {}",
                    metric, point[1]
                );
                continue;
            };
            values.push(ExternalMetricValue {
                metric: metric.to_string(),
                value,
                timestamp: now,
            });
        }
        Ok(values)
    }
}

/// Wavefront resource token for a plural resource name
pub fn resource_type(resource: &str) -> &str {
    match resource {
        "pods" => "pod",
        "namespaces" => "ns",
        "nodes" => "node",
        other => other,
    }
}

/// Tag identifying objects of `resource_type`: `nodename` for nodes,
/// `<type>_name` for everything else
pub fn tag_key(resource_type: &str) -> String {
    if resource_type == "node" {
        "nodename".to_string()
    } else {
        format!("{}_name", resource_type)
    }
}

/// Only pods and pod containers are accounted per namespace in Wavefront
pub fn is_namespaced(resource_type: &str) -> bool {
    resource_type == "pod" || resource_type == "pod_container"
}

/// Plural resource name a Wavefront resource token is served as
pub fn normalize(resource_type: &str) -> &str {
    RESOURCE_ALIASES
        .iter()
        .find(|(token, _)| *token == resource_type)
        .map(|(_, plural)| *plural)
        .unwrap_or(resource_type)
}

/// Parenthesized disjunction `(key="a"<sep>key="b")` over the non-empty names
fn filter_for<S: AsRef<str>>(key: &str, sep: &str, names: &[S]) -> String {
    let terms: Vec<String> = names
        .iter()
        .map(AsRef::as_ref)
        .filter(|name| !name.is_empty())
        .map(|name| format!("{}=\"{}\"", key, name))
        .collect();
    if terms.is_empty() {
        String::new()
    } else {
        format!("({})", terms.join(sep))
    }
}

/// Join the non-empty filters with ` and `, prefixed by `, `
fn combine(filters: &[String]) -> String {
    let parts: Vec<&str> = filters
        .iter()
        .map(String::as_str)
        .filter(|f| !f.is_empty())
        .collect();
    if parts.is_empty() {
        String::new()
    } else {
        format!(", {}", parts.join(" and "))
    }
}

/// Split `kubernetes.pod.cpu.limit` into `("pod", "cpu.limit")`
///
/// The prefix is only stripped when followed by a `.` separator.
pub fn split_metric<'a>(prefix: &str, metric_name: &'a str) -> Option<(&'a str, &'a str)> {
    let name = metric_name
        .strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix('.'))
        .unwrap_or(metric_name);
    let (resource, metric) = name.split_once('.')?;
    if resource.is_empty() || metric.is_empty() {
        return None;
    }
    Some((resource, metric))
}

/// Reduce a value to 3 decimal digits by formatting and parsing it back
///
/// Non-finite values are rejected.
pub fn trim_float(value: f64) -> Option<f64> {
    if !value.is_finite() {
        return None;
    }
    format!("{:.3}", value).parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::fake::fixture_series;
    use crate::client::Timeseries;

    fn translator() -> Translator {
        Translator::new("kubernetes")
    }

    fn pod_info(metric: &str) -> CustomMetricInfo {
        CustomMetricInfo::new("pods", metric, true)
    }

    fn result_of(series: Vec<Timeseries>) -> QueryResult {
        QueryResult {
            timeseries: series,
            ..Default::default()
        }
    }

    // =========================================================================
    // Query construction
    // =========================================================================

    #[test]
    fn test_tag_keys() {
        for res_type in ["pod", "ns", "cluster", "pod_container", "sys_container"] {
            assert_eq!(tag_key(res_type), format!("{}_name", res_type));
        }
        assert_eq!(tag_key("node"), "nodename");
    }

    #[test]
    fn test_query_for_pods_with_namespace() {
        let query = translator()
            .query_for(&pod_info("cpu.usage_rate"), "default", &["p1", "p2"])
            .unwrap();
        assert_eq!(
            query,
            r#"ts(kubernetes.pod.cpu.usage_rate, (pod_name="p1" or pod_name="p2") and (namespace_name="default"))"#
        );
    }

    #[test]
    fn test_query_for_nodes_has_no_namespace_filter() {
        let info = CustomMetricInfo::new("nodes", "cpu.node_reservation", false);
        let query = translator().query_for(&info, "default", &["n1"]).unwrap();
        assert_eq!(
            query,
            r#"ts(kubernetes.node.cpu.node_reservation, (nodename="n1"))"#
        );
    }

    #[test]
    fn test_query_for_skips_empty_names() {
        let query = translator()
            .query_for(&pod_info("cpu.usage_rate"), "default", &["", "p1", ""])
            .unwrap();
        assert_eq!(
            query,
            r#"ts(kubernetes.pod.cpu.usage_rate, (pod_name="p1") and (namespace_name="default"))"#
        );
    }

    #[test]
    fn test_query_for_without_names_keeps_namespace_clause() {
        let names: [&str; 0] = [];
        let query = translator()
            .query_for(&pod_info("cpu.usage_rate"), "default", &names)
            .unwrap();
        assert_eq!(
            query,
            r#"ts(kubernetes.pod.cpu.usage_rate, (namespace_name="default"))"#
        );
    }

    #[test]
    fn test_query_for_without_any_filter() {
        let names: [&str; 0] = [];
        let query = translator()
            .query_for(&pod_info("cpu.usage_rate"), "", &names)
            .unwrap();
        assert_eq!(query, "ts(kubernetes.pod.cpu.usage_rate)");
    }

    #[test]
    fn test_query_for_accepts_degenerate_input() {
        // Empty metrics and unknown resources are passed through, not rejected.
        let info = CustomMetricInfo::new("widgets", "", false);
        let query = translator().query_for(&info, "default", &["w1"]).unwrap();
        assert_eq!(query, r#"ts(kubernetes.widgets., (widgets_name="w1"))"#);
    }

    // =========================================================================
    // Response matching
    // =========================================================================

    #[test]
    fn test_match_values_to_names() {
        let result = result_of(vec![
            fixture_series("pod_name", "p1"),
            fixture_series("pod_name", "p2"),
        ]);
        let values = translator().match_values_to_names(&result, "pods").unwrap();
        assert_eq!(values.len(), 2);
        assert_eq!(values["p1"], 2.36);
        assert_eq!(values["p2"], 2.36);
    }

    #[test]
    fn test_match_uses_last_point() {
        let mut series = fixture_series("pod_name", "p1");
        series.data = vec![vec![0.0, 1.0], vec![60.0, 7.12345]];
        let values = translator()
            .match_values_to_names(&result_of(vec![series]), "pods")
            .unwrap();
        assert_eq!(values["p1"], 7.123);
    }

    #[test]
    fn test_match_nodes_by_nodename() {
        let result = result_of(vec![fixture_series("pod_name", "p1")]);
        let values = translator().match_values_to_names(&result, "nodes").unwrap();
        assert_eq!(
            values.keys().collect::<Vec<_>>(),
            vec!["gke-cluster-default-pool-f63db08a-xrdh"]
        );
    }

    #[test]
    fn test_match_empty_response_not_found() {
        assert!(translator()
            .match_values_to_names(&QueryResult::default(), "pods")
            .is_none());
    }

    #[test]
    fn test_match_series_missing_tag_fails_whole_call() {
        let result = result_of(vec![
            fixture_series("pod_name", "p1"),
            fixture_series("container_name", "c1"),
        ]);
        assert!(translator().match_values_to_names(&result, "pods").is_none());
    }

    #[test]
    fn test_match_series_without_points_fails_whole_call() {
        let mut empty = fixture_series("pod_name", "p2");
        empty.data.clear();
        let result = result_of(vec![fixture_series("pod_name", "p1"), empty]);
        assert!(translator().match_values_to_names(&result, "pods").is_none());
    }

    #[test]
    fn test_match_duplicate_names_last_wins() {
        let mut second = fixture_series("pod_name", "p1");
        second.data = vec![vec![0.0, 9.0]];
        let result = result_of(vec![fixture_series("pod_name", "p1"), second]);
        let values = translator().match_values_to_names(&result, "pods").unwrap();
        assert_eq!(values.len(), 1);
        assert_eq!(values["p1"], 9.0);
    }

    // =========================================================================
    // Catalog translation
    // =========================================================================

    #[test]
    fn test_split_metric() {
        assert_eq!(
            split_metric("kubernetes", "kubernetes.pod.cpu.usage"),
            Some(("pod", "cpu.usage"))
        );
        assert_eq!(
            split_metric("pks.kubernetes", "pks.kubernetes.pod.cpu.usage"),
            Some(("pod", "cpu.usage"))
        );
        assert_eq!(split_metric("kubernetes", "kubernetes.pod"), None);
        assert_eq!(split_metric("kubernetes", "kubernetes"), None);
    }

    #[test]
    fn test_custom_metrics_for() {
        let metrics = translator().custom_metrics_for(&["kubernetes.pod.cpu.usage_rate"]);
        assert_eq!(
            metrics,
            vec![CustomMetricInfo::new("pods", "cpu.usage_rate", true)]
        );
    }

    #[test]
    fn test_custom_metrics_aliases_and_scope() {
        let metrics = translator().custom_metrics_for(&[
            "kubernetes.node.cpu.node_reservation",
            "kubernetes.ns.memory.usage",
            "kubernetes.pod_container.cpu.limit",
            "kubernetes.sys_container.memory.rss",
            "kubernetes.cluster.cpu.usage",
            "kubernetes.widget.count.total",
            "kubernetes.invalid",
        ]);
        assert_eq!(
            metrics,
            vec![
                CustomMetricInfo::new("nodes", "cpu.node_reservation", false),
                CustomMetricInfo::new("namespaces", "memory.usage", false),
                CustomMetricInfo::new("pod_containers", "cpu.limit", true),
                CustomMetricInfo::new("sys_containers", "memory.rss", false),
                CustomMetricInfo::new("clusters", "cpu.usage", false),
                CustomMetricInfo::new("widget", "count.total", false),
            ]
        );
    }

    #[test]
    fn test_external_metrics_for() {
        let metrics = translator().external_metrics_for(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(
            metrics,
            vec![ExternalMetricInfo::new("a"), ExternalMetricInfo::new("b")]
        );
    }

    // =========================================================================
    // External values
    // =========================================================================

    #[test]
    fn test_trim_float() {
        assert_eq!(trim_float(2.3598), Some(2.36));
        assert_eq!(trim_float(2.3594), Some(2.359));
        assert_eq!(trim_float(0.0), Some(0.0));
        assert_eq!(trim_float(f64::NAN), None);
        assert_eq!(trim_float(f64::INFINITY), None);
    }

    #[test]
    fn test_external_values_for() {
        let result = result_of(vec![
            fixture_series("pod_name", "p1"),
            fixture_series("pod_name", "p2"),
        ]);
        let values = translator().external_values_for(&result, "queue-depth").unwrap();
        assert_eq!(values.len(), 2);
        assert!(values.iter().all(|v| v.metric == "queue-depth" && v.value == 2.36));
    }

    #[test]
    fn test_external_values_skip_unusable_value() {
        let mut bad = fixture_series("pod_name", "p2");
        bad.data = vec![vec![0.0, f64::NAN]];
        let result = result_of(vec![fixture_series("pod_name", "p1"), bad]);
        let values = translator().external_values_for(&result, "m").unwrap();
        assert_eq!(values.len(), 1);
    }

    #[test]
    fn test_external_values_series_without_points_fails() {
        let mut empty = fixture_series("pod_name", "p1");
        empty.data.clear();
        let err = translator()
            .external_values_for(&result_of(vec![empty]), "queue-depth")
            .unwrap_err();
        assert!(err.to_string().contains("queue-depth"));
    }

    #[test]
    fn test_external_values_malformed_point_fails() {
        let mut series = fixture_series("pod_name", "p1");
        series.data = vec![vec![1.0]];
        assert!(translator()
            .external_values_for(&result_of(vec![series]), "m")
            .is_err());
    }
}
