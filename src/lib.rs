//! Kubernetes custom and external metrics adapter backed by Wavefront
//!
//! Serves `custom.metrics.k8s.io` and `external.metrics.k8s.io` so that
//! Horizontal Pod Autoscalers can scale on data stored in Wavefront.

pub mod adapter;
pub mod client;
pub mod config;
pub mod error;
pub mod metrics;
pub mod provider;
pub mod rest_api;

pub use error::{Error, Result};
