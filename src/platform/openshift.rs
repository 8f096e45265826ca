//! OpenShift cluster support.

use crate::controller::extension::{crd_exists, Extension, Platform};
use crate::controller::manifest::transform::{
    inject_label_into_namespaces, jobs_remove_ttl, restricted_security_context,
};
use crate::controller::manifest::{kind_of, Manifest, Transformer};
use crate::controller::store::{ResourceStore, StoreError};
use crate::crd::Component;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

pub const CLUSTER_VERSION_CRD: &str = "clusterversions.config.openshift.io";
pub const PART_OF_LABEL: &str = "app.openshift.io/part-of";
pub const PART_OF_VALUE: &str = "openshift-serverless";

#[derive(Debug, Clone, Copy, Default)]
pub struct OpenShiftPlatform;

#[async_trait]
impl<K: Component> Platform<K> for OpenShiftPlatform {
    fn name(&self) -> &'static str {
        "openshift"
    }

    async fn detect(
        &self,
        store: &Arc<dyn ResourceStore>,
        manifest: &mut Manifest,
    ) -> Result<Option<Arc<dyn Extension<K>>>, StoreError> {
        if !crd_exists(store.as_ref(), CLUSTER_VERSION_CRD).await? {
            return Ok(None);
        }
        // The cluster's own aggregation layer serves these
        let before = manifest.len();
        manifest.retain(|r| kind_of(r) != "APIService");
        debug!(dropped = before - manifest.len(), "Dropped APIService templates");
        Ok(Some(Arc::new(OpenShiftExtension)))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct OpenShiftExtension;

#[async_trait]
impl<K: Component> Extension<K> for OpenShiftExtension {
    fn name(&self) -> &'static str {
        "openshift"
    }

    fn transformers(&self, _instance: &K) -> Vec<Transformer> {
        vec![
            inject_label_into_namespaces(PART_OF_LABEL, PART_OF_VALUE),
            restricted_security_context(),
            jobs_remove_ttl(),
        ]
    }
}
