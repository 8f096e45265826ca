//! API-server backed [`ResourceStore`].

use super::{gvk_of, name_of, ResourceStore, StoreError};
use crate::constants::OPERATOR_NAME;
use async_trait::async_trait;
use kube::api::{Api, DeleteParams, DynamicObject, ListParams, Patch, PatchParams, PostParams};
use kube::core::GroupVersionKind;
use kube::discovery::{self, ApiResource, Scope};
use kube::error::DiscoveryError;
use kube::Client;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Resolved API resources, keyed by `group/version/kind`
type ResourceCache = Arc<RwLock<HashMap<String, (ApiResource, Scope)>>>;

#[derive(Clone)]
pub struct KubeStore {
    client: Client,
    resources: ResourceCache,
}

impl std::fmt::Debug for KubeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeStore").finish_non_exhaustive()
    }
}

impl KubeStore {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self {
            client,
            resources: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Resolve a kind through discovery so plural and scope are exact
    async fn resolve(&self, gvk: &GroupVersionKind) -> Result<(ApiResource, Scope), StoreError> {
        let key = format!("{}/{}/{}", gvk.group, gvk.version, gvk.kind);
        if let Some(found) = self.resources.read().await.get(&key) {
            return Ok(found.clone());
        }
        let (resource, caps) = match discovery::pinned_kind(&self.client, gvk).await {
            Ok(resolved) => resolved,
            Err(e) => {
                debug!("Discovery failed for {}: {}", key, e);
                return Err(discovery_error(e, key));
            }
        };
        let resolved = (resource, caps.scope);
        self.resources.write().await.insert(key, resolved.clone());
        Ok(resolved)
    }

    async fn api(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
    ) -> Result<Api<DynamicObject>, StoreError> {
        let (resource, scope) = self.resolve(gvk).await?;
        let api = match (scope, namespace) {
            (Scope::Namespaced, Some(ns)) => Api::namespaced_with(self.client.clone(), ns, &resource),
            _ => Api::all_with(self.client.clone(), &resource),
        };
        Ok(api)
    }
}

/// Only a kind the cluster positively does not serve is "unknown"; transport
/// and server failures stay errors so deletes are retried
fn discovery_error(err: kube::Error, key: String) -> StoreError {
    match err {
        kube::Error::Api(e) if e.code == 404 => StoreError::UnknownKind(key),
        kube::Error::Discovery(
            DiscoveryError::MissingKind(_) | DiscoveryError::MissingApiGroup(_),
        ) => StoreError::UnknownKind(key),
        other => StoreError::Kube(other),
    }
}

fn map_not_found(err: kube::Error, gvk: &GroupVersionKind, name: &str) -> StoreError {
    match err {
        kube::Error::Api(e) if e.code == 404 => StoreError::NotFound {
            kind: gvk.kind.clone(),
            name: name.to_string(),
        },
        kube::Error::Api(e) if e.code == 409 => StoreError::AlreadyExists {
            kind: gvk.kind.clone(),
            name: name.to_string(),
        },
        other => StoreError::Kube(other),
    }
}

/// Status goes out as a plain merge patch; apply params would require a
/// field manager and a full apply body
fn status_patch(obj: &DynamicObject) -> (PatchParams, Patch<serde_json::Value>) {
    let status = obj
        .data
        .get("status")
        .cloned()
        .unwrap_or(serde_json::Value::Null);
    (
        PatchParams::default(),
        Patch::Merge(serde_json::json!({ "status": status })),
    )
}

fn post_params() -> PostParams {
    PostParams {
        field_manager: Some(OPERATOR_NAME.to_string()),
        ..PostParams::default()
    }
}

#[async_trait]
impl ResourceStore for KubeStore {
    async fn get(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<DynamicObject, StoreError> {
        let api = self.api(gvk, namespace).await?;
        api.get(name).await.map_err(|e| map_not_found(e, gvk, name))
    }

    async fn list(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
    ) -> Result<Vec<DynamicObject>, StoreError> {
        let api = self.api(gvk, namespace).await?;
        let list = api
            .list(&ListParams::default())
            .await
            .map_err(|e| map_not_found(e, gvk, ""))?;
        Ok(list.items)
    }

    async fn create(&self, obj: &DynamicObject) -> Result<DynamicObject, StoreError> {
        let gvk = gvk_of(obj)?;
        let api = self.api(&gvk, obj.metadata.namespace.as_deref()).await?;
        api.create(&post_params(), obj)
            .await
            .map_err(|e| map_not_found(e, &gvk, name_of(obj)))
    }

    async fn update(&self, obj: &DynamicObject) -> Result<DynamicObject, StoreError> {
        let gvk = gvk_of(obj)?;
        let name = name_of(obj);
        let api = self.api(&gvk, obj.metadata.namespace.as_deref()).await?;
        api.replace(name, &post_params(), obj)
            .await
            .map_err(|e| map_not_found(e, &gvk, name))
    }

    async fn update_status(&self, obj: &DynamicObject) -> Result<DynamicObject, StoreError> {
        let gvk = gvk_of(obj)?;
        let name = name_of(obj);
        let api = self.api(&gvk, obj.metadata.namespace.as_deref()).await?;
        let (params, patch) = status_patch(obj);
        api.patch_status(name, &params, &patch)
            .await
            .map_err(|e| map_not_found(e, &gvk, name))
    }

    async fn delete(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<(), StoreError> {
        let api = self.api(gvk, namespace).await?;
        api.delete(name, &DeleteParams::background())
            .await
            .map_err(|e| map_not_found(e, gvk, name))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> String {
        "serving.knative.dev/v1/Service".to_string()
    }

    #[test]
    fn test_missing_kind_is_unknown() {
        let err = kube::Error::Discovery(DiscoveryError::MissingKind("Service".into()));
        let mapped = discovery_error(err, key());
        assert!(matches!(mapped, StoreError::UnknownKind(_)));
        assert!(mapped.is_not_found());
    }

    #[test]
    fn test_missing_group_is_unknown() {
        let err = kube::Error::Discovery(DiscoveryError::MissingApiGroup(
            "serving.knative.dev".into(),
        ));
        assert!(discovery_error(err, key()).is_not_found());
    }

    #[test]
    fn test_transport_failure_is_not_unknown() {
        let err = kube::Error::Service(Box::new(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            "connection timed out",
        )));
        let mapped = discovery_error(err, key());
        assert!(matches!(mapped, StoreError::Kube(_)));
        assert!(!mapped.is_not_found());
    }

    #[test]
    fn test_status_patch_is_plain_merge() {
        let gvk = GroupVersionKind::gvk("operator.knative.dev", "v1beta1", "KnativeServing");
        let mut obj = DynamicObject::new("knative-serving", &ApiResource::from_gvk(&gvk));
        obj.data = serde_json::json!({ "status": { "version": "1.15.0" } });
        let (params, patch) = status_patch(&obj);
        assert!(params.field_manager.is_none());
        assert!(!params.force);
        match patch {
            Patch::Merge(body) => assert_eq!(body["status"]["version"], "1.15.0"),
            _ => panic!("expected a merge patch"),
        }
    }
}
