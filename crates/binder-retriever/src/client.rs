//! Resource client abstraction
//!
//! Provides a trait-based seam over the Kubernetes API so the retriever can be
//! tested with mocks while production code talks to the API server through
//! untyped `DynamicObject`s.

use std::fmt;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use kube::api::{Api, DynamicObject, PostParams};
use kube::discovery::ApiResource;
use kube::{Client, ResourceExt};
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use binder_common::kube_utils::{is_api_status, STATUS_CONFLICT, STATUS_NOT_FOUND};
use binder_common::{Error, Result, FIELD_MANAGER};

/// Namespaced key-value resource kinds the retriever reads and writes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// core/v1 Secret, values base64 encoded
    Secret,
    /// core/v1 ConfigMap, values plain text
    ConfigMap,
}

impl ResourceKind {
    /// Kubernetes kind name
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Secret => "Secret",
            ResourceKind::ConfigMap => "ConfigMap",
        }
    }

    /// ApiResource for untyped access
    pub fn api_resource(&self) -> ApiResource {
        match self {
            ResourceKind::Secret => ApiResource::erase::<Secret>(&()),
            ResourceKind::ConfigMap => ApiResource::erase::<ConfigMap>(&()),
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trait abstracting the Kubernetes operations the retriever needs
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ResourceClient: Send + Sync {
    /// Get a resource; `Ok(None)` when it does not exist
    async fn get(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
    ) -> Result<Option<DynamicObject>>;

    /// Create a resource; fails with `Error::AlreadyExists` on a name collision
    async fn create(&self, kind: ResourceKind, object: &DynamicObject) -> Result<DynamicObject>;

    /// Replace a resource; fails with `Error::Conflict` on a concurrent change
    async fn update(&self, kind: ResourceKind, object: &DynamicObject) -> Result<DynamicObject>;
}

/// Real client implementation over `Api<DynamicObject>`
pub struct KubeResourceClient {
    client: Client,
}

impl KubeResourceClient {
    /// Create a new KubeResourceClient wrapping the given client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, kind: ResourceKind, namespace: &str) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), namespace, &kind.api_resource())
    }

    fn post_params() -> PostParams {
        PostParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        }
    }
}

/// Namespace and name of an object about to be written
fn object_ref(kind: ResourceKind, object: &DynamicObject) -> Result<(String, String)> {
    let name = object
        .metadata
        .name
        .clone()
        .ok_or_else(|| Error::malformed(kind.as_str(), "<unnamed>", "missing metadata.name"))?;
    let namespace = object
        .namespace()
        .ok_or_else(|| Error::malformed(kind.as_str(), &name, "missing metadata.namespace"))?;
    Ok((namespace, name))
}

#[async_trait]
impl ResourceClient for KubeResourceClient {
    async fn get(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
    ) -> Result<Option<DynamicObject>> {
        match self.api(kind, namespace).get(name).await {
            Ok(obj) => Ok(Some(obj)),
            Err(e) if is_api_status(&e, STATUS_NOT_FOUND) => Ok(None),
            Err(e) => Err(Error::kube(format!("get {kind} {namespace}/{name}"), e)),
        }
    }

    async fn create(&self, kind: ResourceKind, object: &DynamicObject) -> Result<DynamicObject> {
        let (namespace, name) = object_ref(kind, object)?;
        debug!(kind = %kind, namespace = %namespace, name = %name, "creating resource");
        match self
            .api(kind, &namespace)
            .create(&Self::post_params(), object)
            .await
        {
            Ok(obj) => Ok(obj),
            Err(e) if is_api_status(&e, STATUS_CONFLICT) => {
                Err(Error::already_exists(kind.as_str(), namespace, name))
            }
            Err(e) => Err(Error::kube(format!("create {kind} {namespace}/{name}"), e)),
        }
    }

    async fn update(&self, kind: ResourceKind, object: &DynamicObject) -> Result<DynamicObject> {
        let (namespace, name) = object_ref(kind, object)?;
        debug!(kind = %kind, namespace = %namespace, name = %name, "replacing resource");
        match self
            .api(kind, &namespace)
            .replace(&name, &Self::post_params(), object)
            .await
        {
            Ok(obj) => Ok(obj),
            Err(e) if is_api_status(&e, STATUS_CONFLICT) => {
                Err(Error::conflict(kind.as_str(), namespace, name))
            }
            Err(e) => Err(Error::kube(format!("update {kind} {namespace}/{name}"), e)),
        }
    }
}
