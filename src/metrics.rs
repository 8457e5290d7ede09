//! Prometheus metrics for the adapter itself

use once_cell::sync::Lazy;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;
use std::sync::atomic::AtomicI64;

/// Labels for Wavefront API calls
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct StoreRequestLabels {
    pub operation: String,
    pub outcome: String,
}

/// Counter of Wavefront API calls by operation and outcome
pub static STORE_REQUESTS: Lazy<Family<StoreRequestLabels, Counter>> = Lazy::new(Family::default);

/// Number of custom metrics in the last published catalog
pub static CUSTOM_METRICS: Lazy<Gauge<i64, AtomicI64>> = Lazy::new(Gauge::default);

/// Number of external metrics in the last published catalog
pub static EXTERNAL_METRICS: Lazy<Gauge<i64, AtomicI64>> = Lazy::new(Gauge::default);

/// Global metrics registry
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let mut registry = Registry::default();
    registry.register(
        "wavefront_adapter_store_requests",
        "Wavefront API calls issued by the adapter",
        STORE_REQUESTS.clone(),
    );
    registry.register(
        "wavefront_adapter_custom_metrics",
        "Custom metrics currently offered by the adapter",
        CUSTOM_METRICS.clone(),
    );
    registry.register(
        "wavefront_adapter_external_metrics",
        "External metrics currently offered by the adapter",
        EXTERNAL_METRICS.clone(),
    );
    registry
});

/// Count a Wavefront API call
pub fn record_store_request(operation: &str, success: bool) {
    let labels = StoreRequestLabels {
        operation: operation.to_string(),
        outcome: if success { "success" } else { "error" }.to_string(),
    };
    STORE_REQUESTS.get_or_create(&labels).inc();
}

/// Update the catalog size gauges
pub fn set_catalog_sizes(custom: usize, external: usize) {
    CUSTOM_METRICS.set(custom as i64);
    EXTERNAL_METRICS.set(external as i64);
}

/// Render the registry in the Prometheus text format
pub fn encode_registry() -> Result<String, std::fmt::Error> {
    let mut buffer = String::new();
    prometheus_client::encoding::text::encode(&mut buffer, &REGISTRY)?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_encodes_adapter_metrics() {
        record_store_request("query", true);
        set_catalog_sizes(5, 2);

        let text = encode_registry().unwrap();
        assert!(text.contains("wavefront_adapter_store_requests_total"));
        assert!(text.contains("wavefront_adapter_custom_metrics"));
        assert!(text.contains("wavefront_adapter_external_metrics"));
    }
}
