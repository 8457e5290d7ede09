//! Custom and external metrics provider
//!
//! Translates Kubernetes metric requests into Wavefront queries, keeps the
//! metric catalog fresh and maintains the external metric rules loaded from
//! the rule file and HPA annotations.

mod config_watch;
mod hpa;
mod lister;
mod metrics_provider;
mod resolver;
mod rules;
mod translator;
mod types;


pub use config_watch::ConfigFileWatcher;
pub use hpa::{
    apply_event, rules_from_annotations, AnnotationEvent, AnnotationTracker, Annotations,
    HpaWatcher, METRIC_ANNOTATION_PREFIX,
};
pub use lister::{MetricsLister, MetricsSnapshot};
pub use metrics_provider::MetricsProvider;
pub use resolver::{kind_for, KubeResourceResolver, ResourceResolver, StaticResourceResolver};
pub use rules::{RuleListener, RuleStore};
pub use translator::{
    is_namespaced, normalize, resource_type, split_metric, tag_key, trim_float, Translator,
};
pub use types::{
    CustomMetricInfo, ExternalMetricInfo, ExternalMetricValue, MetricValue, NamespacedName,
};
