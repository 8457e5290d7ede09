//! Central error types for the Wavefront metrics adapter
//!
//! Uses `thiserror` for ergonomic, type-safe error handling with
//! automatic `Display` and `Error` trait implementations.

use thiserror::Error;

/// Message returned to API callers for every failure that is not a NotFound.
///
/// The underlying cause is logged where it happens and never echoed back.
pub const INTERNAL_ERROR_MESSAGE: &str = "unable to fetch metrics";

/// Classification of failures reported by the Wavefront API client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorKind {
    /// The request could not be built from the given input
    BadData,
    /// The response body could not be decoded
    BadResponse,
    /// The server answered with a non-2xx status
    Status,
}

impl StoreErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreErrorKind::BadData => "bad_data",
            StoreErrorKind::BadResponse => "bad_response",
            StoreErrorKind::Status => "status",
        }
    }
}

impl std::fmt::Display for StoreErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Central error type for the adapter
#[derive(Error, Debug)]
pub enum Error {
    /// Kubernetes API error from kube-rs
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    /// HTTP request error (from reqwest)
    #[error("HTTP request error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Filesystem error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Configuration could not be read or is invalid
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Wavefront API returned an unusable answer
    #[error("{kind}: {message}")]
    StoreError {
        kind: StoreErrorKind,
        message: String,
    },

    /// No metric definition or series matches the request
    #[error("the server could not find the metric {metric} for {resource}")]
    MetricNotFound { resource: String, metric: String },

    /// The query succeeded but no series belongs to the named object
    #[error("the server could not find the metric {metric} for {resource} {name}")]
    MetricNotFoundFor {
        resource: String,
        metric: String,
        name: String,
    },

    /// Label selector resolution is not available for this resource
    #[error("Unsupported resource: {0}")]
    UnsupportedResource(String),

    /// Failure surfaced to API callers without its cause
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Result type alias for adapter operations
pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub fn store(kind: StoreErrorKind, message: impl Into<String>) -> Self {
        Error::StoreError {
            kind,
            message: message.into(),
        }
    }

    /// Check if this error should be reported to the caller as NotFound
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::MetricNotFound { .. } | Error::MetricNotFoundFor { .. }
        )
    }

    /// Message safe to hand back to an API caller
    pub fn public_message(&self) -> String {
        match self {
            Error::MetricNotFound { .. } | Error::MetricNotFoundFor { .. } => self.to_string(),
            Error::InternalError(msg) => format!("Internal error occurred: {}", msg),
            _ => format!("Internal error occurred: {}", INTERNAL_ERROR_MESSAGE),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_classification() {
        let err = Error::MetricNotFound {
            resource: "pods".to_string(),
            metric: "cpu.usage_rate".to_string(),
        };
        assert!(err.is_not_found());

        let err = Error::MetricNotFoundFor {
            resource: "pods".to_string(),
            metric: "cpu.usage_rate".to_string(),
            name: "web-0".to_string(),
        };
        assert!(err.is_not_found());
        assert_eq!(
            err.public_message(),
            "the server could not find the metric cpu.usage_rate for pods web-0"
        );

        assert!(!Error::InternalError("boom".to_string()).is_not_found());
    }

    #[test]
    fn test_public_message_hides_store_details() {
        let err = Error::store(StoreErrorKind::Status, "error status=403 Forbidden code=403");
        assert_eq!(
            err.public_message(),
            "Internal error occurred: unable to fetch metrics"
        );
        assert_eq!(err.to_string(), "status: error status=403 Forbidden code=403");
    }
}
