//! Delete path of a component instance.

use super::reconcile::has_finalizer;
use super::{ObjectKey, Reconciler, ReconcilerError};
use crate::controller::manifest::{is_crd, is_rbac};
use crate::controller::store::{delete_if_present, from_dynamic, gvk_of, name_of, to_dynamic};
use crate::crd::Component;
use kube::ResourceExt;
use tracing::{debug, info};

impl<K: Component> Reconciler<K> {
    /// Tear down everything the instance installed, then release the finalizer
    ///
    /// RBAC goes last so the remaining deletes are still authorized; CRDs are
    /// never deleted.
    pub(super) async fn finalize(&self, instance: &K) -> Result<(), ReconcilerError> {
        if !has_finalizer(instance) {
            return Ok(());
        }
        let key = ObjectKey::of(instance);
        info!(resource = %key, "Running delete path");

        self.extensions
            .finalize(instance)
            .await
            .map_err(ReconcilerError::Finalize)?;
        if let Some(scaler) = &self.scaler {
            scaler.finalize().await.map_err(ReconcilerError::Scaler)?;
        }

        let desired = self
            .manifest
            .transform(&self.transformers(instance))?;
        let (rbac, rest): (Vec<_>, Vec<_>) = desired
            .resources()
            .iter()
            .filter(|r| !is_crd(r))
            .partition(|r| is_rbac(r));
        for resource in rest.into_iter().chain(rbac) {
            let gvk = gvk_of(resource)?;
            let name = name_of(resource);
            let existed = delete_if_present(
                self.store.as_ref(),
                &gvk,
                resource.metadata.namespace.as_deref(),
                name,
            )
            .await
            .map_err(|source| ReconcilerError::Apply {
                kind: gvk.kind.clone(),
                name: name.to_string(),
                source,
            })?;
            if existed {
                debug!(kind = gvk.kind.as_str(), name, "Deleted resource");
            }
        }

        let gvk = K::gvk();
        let live = match self
            .store
            .get(&gvk, Some(&key.namespace), &key.name)
            .await
        {
            Ok(live) => live,
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        let mut live: K = from_dynamic(live)?;
        live.finalizers_mut().retain(|f| f != K::FINALIZER);
        self.store.update(&to_dynamic(&live)?).await?;
        info!(resource = %key, "Finalizer removed");
        Ok(())
    }
}
