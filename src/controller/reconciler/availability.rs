//! Deployment availability of an applied manifest.

use super::ReconcilerError;
use crate::controller::manifest::{kind_of, Manifest};
use crate::controller::store::{from_dynamic, gvk_of, name_of, ResourceStore};
use k8s_openapi::api::apps::v1::Deployment;
use tracing::debug;

/// Whether the Deployment reports condition Available=True
#[must_use]
pub fn is_deployment_available(deployment: &Deployment) -> bool {
    deployment
        .status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .is_some_and(|conditions| {
            conditions
                .iter()
                .any(|c| c.type_ == "Available" && c.status == "True")
        })
}

/// True when every Deployment of `manifest` exists and is available
pub async fn deployments_available(
    store: &dyn ResourceStore,
    manifest: &Manifest,
) -> Result<bool, ReconcilerError> {
    for template in manifest
        .resources()
        .iter()
        .filter(|r| kind_of(r) == "Deployment")
    {
        let gvk = gvk_of(template)?;
        let name = name_of(template);
        let live = match store
            .get(&gvk, template.metadata.namespace.as_deref(), name)
            .await
        {
            Ok(live) => live,
            Err(e) if e.is_not_found() => {
                debug!(deployment = name, "Deployment not found yet");
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        };
        let deployment: Deployment = from_dynamic(live)?;
        if !is_deployment_available(&deployment) {
            debug!(deployment = name, "Deployment not available yet");
            return Ok(false);
        }
    }
    Ok(true)
}
