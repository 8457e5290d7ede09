//! REST API module serving the Kubernetes metrics API groups
//!
//! Provides the custom and external metrics APIs on top of the
//! [`MetricsProvider`](crate::provider::MetricsProvider), plus health and
//! Prometheus endpoints.

mod custom_metrics;
mod dto;
mod external_metrics;
mod server;

pub use server::{router, run_server};
