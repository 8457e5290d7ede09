//! Resolution of label selectors to object names

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Namespace, Node, Pod};
use kube::{
    api::{Api, ApiResource, DynamicObject, ListParams},
    client::Client,
    ResourceExt,
};
use tracing::debug;

use super::types::CustomMetricInfo;
use crate::error::{Error, Result};

#[async_trait]
pub trait ResourceResolver: Send + Sync {
    /// Names of the `info.resource` objects in `namespace` matching `selector`
    async fn list_object_names(
        &self,
        info: &CustomMetricInfo,
        namespace: &str,
        selector: &str,
    ) -> Result<Vec<String>>;
}

/// Kind of the objects served under a plural resource name
pub fn kind_for(resource: &str) -> &str {
    match resource {
        "pods" => "Pod",
        "nodes" => "Node",
        "namespaces" => "Namespace",
        other => other,
    }
}

/// Lists objects through the Kubernetes API
pub struct KubeResourceResolver {
    client: Client,
}

impl KubeResourceResolver {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ResourceResolver for KubeResourceResolver {
    async fn list_object_names(
        &self,
        info: &CustomMetricInfo,
        namespace: &str,
        selector: &str,
    ) -> Result<Vec<String>> {
        let (resource, namespaced) = match info.resource.as_str() {
            "pods" => (ApiResource::erase::<Pod>(&()), true),
            "nodes" => (ApiResource::erase::<Node>(&()), false),
            "namespaces" => (ApiResource::erase::<Namespace>(&()), false),
            other => return Err(Error::UnsupportedResource(other.to_string())),
        };

        let api: Api<DynamicObject> = if namespaced && !namespace.is_empty() {
            Api::namespaced_with(self.client.clone(), namespace, &resource)
        } else {
            Api::all_with(self.client.clone(), &resource)
        };

        let mut params = ListParams::default();
        if !selector.is_empty() {
            params = params.labels(selector);
        }

        let objects = api.list(&params).await?;
        let names: Vec<String> = objects.items.iter().map(|o| o.name_any()).collect();
        debug!(
            "Resolved {} {} for selector {:?} in {:?}",
            names.len(),
            info.resource,
            selector,
            namespace
        );
        Ok(names)
    }
}

/// Returns the same names for every request
#[derive(Debug, Clone, Default)]
pub struct StaticResourceResolver {
    names: Vec<String>,
}

impl StaticResourceResolver {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl ResourceResolver for StaticResourceResolver {
    async fn list_object_names(
        &self,
        _info: &CustomMetricInfo,
        _namespace: &str,
        _selector: &str,
    ) -> Result<Vec<String>> {
        Ok(self.names.clone())
    }
}
