//! # Extensions
//!
//! Platform-specific behaviour plugged into the reconcile engine.
//!
//! A [`Platform`] is a detector: it runs once when the reconciler is built,
//! may drop templates from the base manifest, and returns the
//! [`Extension`] to use for that cluster (or nothing). The resolved set is
//! held by [`Extensions`], which also assembles the full transformer chain
//! for an instance.

use crate::controller::manifest::transform::{
    config_from_instance, ha_replicas, image_override, inject_namespace, inject_owner,
    owner_annotations, remove_creation_timestamp, upgrade_deprecated_apis, workload_overrides,
};
use crate::controller::manifest::{Manifest, Transformer};
use crate::controller::outcome::Outcome;
use crate::controller::reconciler::ObsoleteResource;
use crate::controller::store::{ResourceStore, StoreError};
use crate::crd::Component;
use async_trait::async_trait;
use kube::core::GroupVersionKind;
use kube::{Resource, ResourceExt};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Install hooks and transforms contributed by one platform
///
/// Every method has a no-op default so extensions only implement what they
/// need.
#[async_trait]
pub trait Extension<K: Component>: Send + Sync {
    fn name(&self) -> &'static str;

    /// Transforms appended after the base transforms
    fn transformers(&self, _instance: &K) -> Vec<Transformer> {
        Vec::new()
    }

    async fn pre_install(&self, _instance: &mut K) -> Outcome {
        Outcome::Success
    }

    async fn post_install(&self, _instance: &mut K) -> Outcome {
        Outcome::Success
    }

    /// Cleanup of resources the manifest does not own
    async fn finalize(&self, _instance: &K) -> anyhow::Result<()> {
        Ok(())
    }

    /// Extra kinds whose changes should requeue the owning instance
    fn watches(&self) -> Vec<GroupVersionKind> {
        Vec::new()
    }

    /// Resources left behind by older releases, deleted after a successful install
    fn obsolete_resources(&self) -> Vec<ObsoleteResource> {
        Vec::new()
    }

    /// Name prefixes of obsolete leader-election leases
    fn obsolete_lease_prefixes(&self) -> Vec<&'static str> {
        Vec::new()
    }
}

/// Detects whether an extension applies to the current cluster
#[async_trait]
pub trait Platform<K: Component>: Send + Sync {
    fn name(&self) -> &'static str;

    async fn detect(
        &self,
        store: &Arc<dyn ResourceStore>,
        manifest: &mut Manifest,
    ) -> Result<Option<Arc<dyn Extension<K>>>, StoreError>;
}

/// Ordered list of platform detectors
pub struct Platforms<K: Component>(Vec<Arc<dyn Platform<K>>>);

impl<K: Component> Platforms<K> {
    #[must_use]
    pub fn new(platforms: Vec<Arc<dyn Platform<K>>>) -> Self {
        Self(platforms)
    }

    /// Run every detector in registration order
    pub async fn extend(
        &self,
        store: &Arc<dyn ResourceStore>,
        manifest: &mut Manifest,
    ) -> Result<Extensions<K>, StoreError> {
        let mut extensions = Vec::new();
        for platform in &self.0 {
            match platform.detect(store, manifest).await? {
                Some(extension) => {
                    info!(
                        component = K::COMPONENT,
                        platform = platform.name(),
                        "Platform extension enabled"
                    );
                    extensions.push(extension);
                }
                None => debug!(
                    component = K::COMPONENT,
                    platform = platform.name(),
                    "Platform not detected"
                ),
            }
        }
        Ok(Extensions(extensions))
    }
}

impl<K: Component> Default for Platforms<K> {
    fn default() -> Self {
        Self(Vec::new())
    }
}

impl<K: Component> fmt::Debug for Platforms<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.0.iter().map(|p| p.name()))
            .finish()
    }
}

/// Extensions resolved for this cluster, in registration order
pub struct Extensions<K: Component>(Vec<Arc<dyn Extension<K>>>);

impl<K: Component> Extensions<K> {
    #[must_use]
    pub fn new(extensions: Vec<Arc<dyn Extension<K>>>) -> Self {
        Self(extensions)
    }

    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.0.iter().map(|e| e.name()).collect()
    }

    /// Full transformer chain for `instance`
    ///
    /// Base transforms first, then every extension's transforms, then the
    /// instance config so user-supplied values always win.
    pub fn transformers(&self, instance: &K) -> Vec<Transformer> {
        let spec = instance.common_spec();
        let name = instance.name_any();
        let namespace = instance.namespace().unwrap_or_default();

        let mut transformers = vec![inject_namespace(&namespace)];
        if let Some(owner) = instance.controller_owner_ref(&()) {
            transformers.push(inject_owner(owner));
        }
        transformers.extend([
            owner_annotations(&name, &namespace),
            upgrade_deprecated_apis(),
            remove_creation_timestamp(),
            image_override(&spec.registry),
            ha_replicas(spec.ha_replicas()),
            workload_overrides(&spec.workloads),
        ]);
        for extension in &self.0 {
            transformers.extend(extension.transformers(instance));
        }
        transformers.push(config_from_instance(&spec.config));
        transformers
    }

    /// Run pre-install hooks; the first non-success outcome is returned
    pub async fn pre_install(&self, instance: &mut K) -> Outcome {
        for extension in &self.0 {
            let outcome = extension.pre_install(instance).await;
            if !outcome.is_success() {
                debug!(extension = extension.name(), %outcome, "Pre-install hook stopped the pass");
                return outcome;
            }
        }
        Outcome::Success
    }

    /// Run post-install hooks; the first non-success outcome is returned
    pub async fn post_install(&self, instance: &mut K) -> Outcome {
        for extension in &self.0 {
            let outcome = extension.post_install(instance).await;
            if !outcome.is_success() {
                debug!(extension = extension.name(), %outcome, "Post-install hook stopped the pass");
                return outcome;
            }
        }
        Outcome::Success
    }

    pub async fn finalize(&self, instance: &K) -> anyhow::Result<()> {
        for extension in &self.0 {
            extension.finalize(instance).await?;
        }
        Ok(())
    }

    #[must_use]
    pub fn watches(&self) -> Vec<GroupVersionKind> {
        let mut watches: Vec<GroupVersionKind> = Vec::new();
        for gvk in self.0.iter().flat_map(|e| e.watches()) {
            if !watches.contains(&gvk) {
                watches.push(gvk);
            }
        }
        watches
    }

    #[must_use]
    pub fn obsolete_resources(&self) -> Vec<ObsoleteResource> {
        self.0.iter().flat_map(|e| e.obsolete_resources()).collect()
    }

    #[must_use]
    pub fn obsolete_lease_prefixes(&self) -> Vec<&'static str> {
        self.0.iter().flat_map(|e| e.obsolete_lease_prefixes()).collect()
    }
}

impl<K: Component> Default for Extensions<K> {
    fn default() -> Self {
        Self(Vec::new())
    }
}

impl<K: Component> fmt::Debug for Extensions<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// Whether a CustomResourceDefinition with `name` is installed
pub async fn crd_exists(store: &dyn ResourceStore, name: &str) -> Result<bool, StoreError> {
    let gvk = GroupVersionKind::gvk("apiextensions.k8s.io", "v1", "CustomResourceDefinition");
    match store.get(&gvk, None, name).await {
        Ok(_) => Ok(true),
        Err(e) if e.is_not_found() => Ok(false),
        Err(e) => Err(e),
    }
}
