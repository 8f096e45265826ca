//! # Resource Store
//!
//! Capability-typed access to cluster objects keyed by group/version/kind and
//! namespaced name.
//!
//! The reconcile engine, the extensions and the pruning logic only ever talk
//! to a [`ResourceStore`]. [`KubeStore`] backs it with the API server;
//! [`MemoryStore`] keeps everything in process for tests.
//!
//! Not-found is a distinguished error kind ([`StoreError::is_not_found`]):
//! call sites treat it as success for deletes and as "create it" for
//! get-before-create.

mod kube_store;
mod memory;

pub use kube_store::KubeStore;
pub use memory::{MemoryStore, StoreEvent, StoreOp};

use async_trait::async_trait;
use kube::api::DynamicObject;
use kube::core::GroupVersionKind;
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} {name} not found")]
    NotFound { kind: String, name: String },

    #[error("kind {0} is not served by the cluster")]
    UnknownKind(String),

    #[error("{kind} {name} already exists")]
    AlreadyExists { kind: String, name: String },

    #[error("invalid object: {0}")]
    Invalid(String),

    #[error("injected failure: {0}")]
    Injected(String),

    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("failed to convert object: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// True when the object (or its whole kind) is absent
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StoreError::NotFound { .. } | StoreError::UnknownKind(_)
        )
    }
}

#[async_trait]
pub trait ResourceStore: Send + Sync {
    async fn get(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<DynamicObject, StoreError>;

    async fn list(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
    ) -> Result<Vec<DynamicObject>, StoreError>;

    async fn create(&self, obj: &DynamicObject) -> Result<DynamicObject, StoreError>;

    async fn update(&self, obj: &DynamicObject) -> Result<DynamicObject, StoreError>;

    async fn update_status(&self, obj: &DynamicObject) -> Result<DynamicObject, StoreError>;

    async fn delete(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<(), StoreError>;
}

/// Parse the group/version/kind out of an object's type meta
pub fn gvk_of(obj: &DynamicObject) -> Result<GroupVersionKind, StoreError> {
    let types = obj
        .types
        .as_ref()
        .ok_or_else(|| StoreError::Invalid(format!("{} has no apiVersion/kind", name_of(obj))))?;
    Ok(parse_gvk(&types.api_version, &types.kind))
}

#[must_use]
pub fn parse_gvk(api_version: &str, kind: &str) -> GroupVersionKind {
    match api_version.split_once('/') {
        Some((group, version)) => GroupVersionKind::gvk(group, version, kind),
        None => GroupVersionKind::gvk("", api_version, kind),
    }
}

#[must_use]
pub fn api_version_of(gvk: &GroupVersionKind) -> String {
    if gvk.group.is_empty() {
        gvk.version.clone()
    } else {
        format!("{}/{}", gvk.group, gvk.version)
    }
}

#[must_use]
pub fn name_of(obj: &DynamicObject) -> &str {
    obj.metadata.name.as_deref().unwrap_or_default()
}

/// Convert a typed resource into its dynamic form
pub fn to_dynamic<T: Serialize>(obj: &T) -> Result<DynamicObject, StoreError> {
    Ok(serde_json::from_value(serde_json::to_value(obj)?)?)
}

/// Convert a dynamic object into a typed resource
pub fn from_dynamic<T: DeserializeOwned>(obj: DynamicObject) -> Result<T, StoreError> {
    Ok(serde_json::from_value(serde_json::to_value(obj)?)?)
}

/// Delete an object, treating an absent object as already deleted
///
/// Returns whether the object existed.
pub async fn delete_if_present(
    store: &dyn ResourceStore,
    gvk: &GroupVersionKind,
    namespace: Option<&str>,
    name: &str,
) -> Result<bool, StoreError> {
    match store.delete(gvk, namespace, name).await {
        Ok(()) => Ok(true),
        Err(e) if e.is_not_found() => Ok(false),
        Err(e) => Err(e),
    }
}
