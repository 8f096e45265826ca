//! # Service Mesh
//!
//! Enabled on clusters that run a service mesh control plane. When the
//! instance opts into istio (`config.istio.enabled: "true"`), the install
//! waits for a ready ServiceMeshControlPlane in its namespace and the mesh
//! workloads get sidecar injection.

use crate::controller::extension::{crd_exists, Extension, Platform};
use crate::controller::manifest::transform::sidecar_injection;
use crate::controller::manifest::{Manifest, Transformer};
use crate::controller::outcome::Outcome;
use crate::controller::store::{ResourceStore, StoreError};
use crate::crd::Component;
use async_trait::async_trait;
use kube::api::DynamicObject;
use kube::core::GroupVersionKind;
use kube::ResourceExt;
use std::sync::Arc;
use tracing::debug;

pub const SMCP_CRD: &str = "servicemeshcontrolplanes.maistra.io";

/// Deployments that run with an istio sidecar
pub const MESHED_WORKLOADS: [&str; 6] = [
    "activator",
    "autoscaler",
    "pingsource-mt-adapter",
    "mt-broker-ingress",
    "mt-broker-filter",
    "imc-dispatcher",
];

#[must_use]
pub fn smcp_gvk() -> GroupVersionKind {
    GroupVersionKind::gvk("maistra.io", "v2", "ServiceMeshControlPlane")
}

/// Whether the instance config enables istio
#[must_use]
pub fn istio_enabled<K: Component>(instance: &K) -> bool {
    instance
        .common_spec()
        .config
        .get("istio")
        .and_then(|istio| istio.get("enabled"))
        .is_some_and(|v| v == "true")
}

fn is_ready(smcp: &DynamicObject) -> bool {
    smcp.data
        .pointer("/status/conditions")
        .and_then(|c| c.as_array())
        .is_some_and(|conditions| {
            conditions.iter().any(|c| {
                c.get("type").and_then(|t| t.as_str()) == Some("Ready")
                    && c.get("status").and_then(|s| s.as_str()) == Some("True")
            })
        })
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MeshPlatform;

#[async_trait]
impl<K: Component> Platform<K> for MeshPlatform {
    fn name(&self) -> &'static str {
        "service-mesh"
    }

    async fn detect(
        &self,
        store: &Arc<dyn ResourceStore>,
        _manifest: &mut Manifest,
    ) -> Result<Option<Arc<dyn Extension<K>>>, StoreError> {
        if !crd_exists(store.as_ref(), SMCP_CRD).await? {
            return Ok(None);
        }
        Ok(Some(Arc::new(MeshExtension {
            store: store.clone(),
        })))
    }
}

pub struct MeshExtension {
    store: Arc<dyn ResourceStore>,
}

impl MeshExtension {
    async fn control_plane_ready(&self, namespace: &str) -> Result<bool, StoreError> {
        match self.store.list(&smcp_gvk(), Some(namespace)).await {
            Ok(planes) => Ok(planes.iter().any(is_ready)),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl<K: Component> Extension<K> for MeshExtension {
    fn name(&self) -> &'static str {
        "service-mesh"
    }

    fn transformers(&self, instance: &K) -> Vec<Transformer> {
        if !istio_enabled(instance) {
            return Vec::new();
        }
        vec![sidecar_injection(&MESHED_WORKLOADS)]
    }

    async fn pre_install(&self, instance: &mut K) -> Outcome {
        if !istio_enabled(instance) {
            return Outcome::Success;
        }
        let namespace = instance.namespace().unwrap_or_default();
        match self.control_plane_ready(&namespace).await {
            Ok(true) => {
                instance.component_status_mut().mark_dependencies_installed();
                Outcome::Success
            }
            Ok(false) => {
                debug!(namespace = namespace.as_str(), "No ready ServiceMeshControlPlane");
                instance
                    .component_status_mut()
                    .mark_dependency_installing("Waiting for ServiceMeshControlPlane to be ready");
                Outcome::retryable("ServiceMeshControlPlane not ready")
            }
            Err(e) => Outcome::fatal(e),
        }
    }

    fn watches(&self) -> Vec<GroupVersionKind> {
        vec![smcp_gvk()]
    }
}
