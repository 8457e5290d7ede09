//! Wire types shared by the metrics API groups

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Error;

/// `?labelSelector=` query parameter
#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct SelectorParams {
    #[serde(default)]
    pub label_selector: String,
}

#[derive(Serialize, Deserialize, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ListMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub self_link: Option<String>,
}

/// Discovery document of an API group version
#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ApiResourceList {
    pub kind: String,
    pub api_version: String,
    pub group_version: String,
    pub resources: Vec<ApiResource>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ApiResource {
    pub name: String,
    pub singular_name: String,
    pub namespaced: bool,
    pub kind: String,
    pub verbs: Vec<String>,
}

impl ApiResourceList {
    pub fn new(group_version: &str, resources: Vec<ApiResource>) -> Self {
        Self {
            kind: "APIResourceList".to_string(),
            api_version: "v1".to_string(),
            group_version: group_version.to_string(),
            resources,
        }
    }
}

impl ApiResource {
    pub fn new(name: String, namespaced: bool, kind: &str) -> Self {
        Self {
            name,
            singular_name: String::new(),
            namespaced,
            kind: kind.to_string(),
            verbs: vec!["get".to_string()],
        }
    }
}

/// Kubernetes `Status` returned for failed requests
#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    pub kind: String,
    pub api_version: String,
    pub metadata: ListMetadata,
    pub status: String,
    pub message: String,
    pub reason: String,
    pub code: u16,
}

/// Render a quantity in milli-units, e.g. `2.36` as `2360m`
pub fn milli_quantity(value: f64) -> String {
    format!("{}m", (value * 1000.0) as i64)
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (code, reason) = if self.is_not_found() {
            (StatusCode::NOT_FOUND, "NotFound")
        } else {
            (StatusCode::INTERNAL_SERVER_ERROR, "InternalError")
        };
        debug!("Request failed with {}: {}", code, self);

        let body = Status {
            kind: "Status".to_string(),
            api_version: "v1".to_string(),
            metadata: ListMetadata::default(),
            status: "Failure".to_string(),
            message: self.public_message(),
            reason: reason.to_string(),
            code: code.as_u16(),
        };
        (code, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_milli_quantity() {
        assert_eq!(milli_quantity(2.36), "2360m");
        assert_eq!(milli_quantity(0.0), "0m");
        assert_eq!(milli_quantity(-1.5), "-1500m");
        assert_eq!(milli_quantity(0.0004), "0m");
    }

    #[test]
    fn test_not_found_maps_to_404() {
        let err = Error::MetricNotFound {
            resource: "pods".to_string(),
            metric: "cpu.usage_rate".to_string(),
        };
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_other_errors_map_to_500() {
        let err = Error::ConfigError("bad".to_string());
        assert_eq!(
            err.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
