//! # Platforms
//!
//! Platform detectors and the extensions they contribute.
//!
//! - `serving` / `eventing`: component defaults, always enabled
//! - `openshift`: OpenShift clusters (restricted security context, labels)
//! - `mesh`: clusters running a service mesh control plane

pub mod eventing;
pub mod mesh;
pub mod openshift;
pub mod serving;

pub use eventing::EventingPlatform;
pub use mesh::MeshPlatform;
pub use openshift::OpenShiftPlatform;
pub use serving::ServingPlatform;

use crate::controller::conditions::DEPENDENCIES_INSTALLED;
use crate::controller::manifest::transform::ImageMap;
use crate::controller::outcome::Outcome;
use crate::crd::{CommonSpec, Component};
use kube::ResourceExt;

/// Operator-side settings shared by the component extensions
#[derive(Debug, Clone, Default)]
pub struct ComponentSettings {
    /// Namespace the component must be installed into, if restricted
    pub required_namespace: Option<String>,
    /// Image overrides collected from `IMAGE_*` variables
    pub images: ImageMap,
    /// Proxy variables forwarded into the component controller
    pub proxy: Vec<(String, String)>,
}

impl ComponentSettings {
    /// Proxy variables from the operator's own environment
    ///
    /// Unset variables are forwarded as empty so a removed proxy is also
    /// removed from the workload.
    #[must_use]
    pub fn proxy_from_env() -> Vec<(String, String)> {
        ["HTTP_PROXY", "HTTPS_PROXY", "NO_PROXY"]
            .into_iter()
            .map(|name| (name.to_string(), std::env::var(name).unwrap_or_default()))
            .collect()
    }
}

/// Fail the install when the instance lives outside the required namespace
pub(crate) fn check_namespace<K: Component>(instance: &mut K, required: Option<&str>) -> Outcome {
    let Some(required) = required.filter(|r| !r.is_empty()) else {
        return Outcome::Success;
    };
    let namespace = instance.namespace().unwrap_or_default();
    if namespace == required {
        return Outcome::Success;
    }
    let message = format!(
        "{} may only be installed in namespace {required}, not {namespace}",
        K::kind(&())
    );
    instance.component_status_mut().mark_install_failed(&message);
    Outcome::fatal(anyhow::anyhow!(message))
}

/// Merge operator-provided images without overriding the instance's own
///
/// The instance registry wins; the environment only fills unset keys.
pub(crate) fn merge_images(spec: &mut CommonSpec, images: &ImageMap) {
    for (key, image) in images {
        if key == "default" {
            spec.registry.default.get_or_insert_with(|| image.clone());
        } else {
            spec.registry
                .overrides
                .entry(key.clone())
                .or_insert_with(|| image.clone());
        }
    }
}

/// Clear a stale dependency failure left by an earlier pass
///
/// Extensions that track real dependencies run later and may set the
/// condition back to Unknown or False.
pub(crate) fn mark_dependencies_installed<K: Component>(instance: &mut K) {
    let status = instance.component_status_mut();
    if !status.is_condition_true(DEPENDENCIES_INSTALLED) {
        status.mark_dependencies_installed();
    }
}
