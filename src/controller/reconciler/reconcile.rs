//! # Reconcile
//!
//! One reconcile pass of a component instance.
//!
//! Stages, in order: fetch, delete path or finalizer, status init,
//! pre-install hooks, scaling, transform + apply, post-install hooks,
//! deployment availability, pruning and finally the status write.

use super::apply::apply_manifest;
use super::availability::deployments_available;
use super::prune::prune;
use super::{ObjectKey, Reconciler, ReconcilerError};
use crate::controller::outcome::Outcome;
use crate::controller::store::{from_dynamic, to_dynamic};
use crate::crd::{Component, ComponentStatus};
use crate::observability::metrics;
use kube::ResourceExt;
use kube_runtime::controller::Action;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, Instrument};

/// Controller entry point
///
/// Wraps [`Reconciler::reconcile`] with the reconcile span and metrics and
/// clears the error backoff of the instance after a successful pass.
pub async fn reconcile<K: Component>(
    obj: Arc<K>,
    ctx: Arc<Reconciler<K>>,
) -> Result<Action, ReconcilerError> {
    let key = ObjectKey::of(obj.as_ref());
    let span = tracing::info_span!(
        "controller.reconcile",
        component = K::COMPONENT,
        resource.name = key.name.as_str(),
        resource.namespace = key.namespace.as_str(),
        resource.generation = obj.meta().generation.unwrap_or(0),
    );

    metrics::increment_reconciliations();
    let start = Instant::now();
    let result = ctx.reconcile(&key).instrument(span).await;
    metrics::observe_reconciliation_duration(start.elapsed().as_secs_f64());

    if result.is_ok() {
        ctx.reset_backoff(&key);
    }
    result
}

pub(super) fn has_finalizer<K: Component>(instance: &K) -> bool {
    instance.finalizers().iter().any(|f| f == K::FINALIZER)
}

impl<K: Component> Reconciler<K> {
    /// Reconcile the instance named by `key`
    pub async fn reconcile(&self, key: &ObjectKey) -> Result<Action, ReconcilerError> {
        let gvk = K::gvk();
        let mut instance: K = match self
            .store
            .get(&gvk, Some(&key.namespace), &key.name)
            .await
        {
            Ok(obj) => from_dynamic(obj)?,
            Err(e) if e.is_not_found() => {
                debug!(resource = %key, "Instance no longer exists");
                return Ok(Action::await_change());
            }
            Err(e) => return Err(e.into()),
        };

        if instance.meta().deletion_timestamp.is_some() {
            self.finalize(&instance).await?;
            return Ok(Action::await_change());
        }

        if !has_finalizer(&instance) {
            instance.finalizers_mut().push(K::FINALIZER.to_string());
            let updated = self.store.update(&to_dynamic(&instance)?).await?;
            instance = from_dynamic(updated)?;
            debug!(resource = %key, finalizer = K::FINALIZER, "Added finalizer");
        }

        let observed = instance.component_status().cloned();
        instance.component_status_mut().initialize_conditions();

        match self.extensions.pre_install(&mut instance).await {
            Outcome::Success => {}
            Outcome::Retryable(reason) => return Ok(self.wait_for_dependency(key, &reason)),
            Outcome::Fatal(e) => {
                self.persist_status(&mut instance, observed.as_ref()).await?;
                return Err(ReconcilerError::Hook(e));
            }
        }

        if let Some(scaler) = &self.scaler {
            scaler
                .scale(&mut instance)
                .await
                .map_err(ReconcilerError::Scaler)?;
        }

        let desired = match self
            .manifest
            .transform(&self.transformers(&instance))
        {
            Ok(desired) => desired,
            Err(e) => {
                let err = ReconcilerError::from(e);
                return Err(self.install_failed(&mut instance, observed.as_ref(), err).await);
            }
        };
        if let Err(err) = apply_manifest(self.store.as_ref(), &desired).await {
            return Err(self.install_failed(&mut instance, observed.as_ref(), err).await);
        }
        let status = instance.component_status_mut();
        status.mark_install_succeeded();
        status.version = Some(self.settings.version.clone());
        info!(resource = %key, resources = desired.len(), "Manifest applied");

        match self.extensions.post_install(&mut instance).await {
            Outcome::Success => {}
            Outcome::Retryable(reason) => return Ok(self.wait_for_dependency(key, &reason)),
            Outcome::Fatal(e) => {
                self.persist_status(&mut instance, observed.as_ref()).await?;
                return Err(ReconcilerError::Hook(e));
            }
        }

        if deployments_available(self.store.as_ref(), &desired).await? {
            instance.component_status_mut().mark_deployments_available();
            prune(
                self.store.as_ref(),
                &key.namespace,
                &self.extensions.obsolete_resources(),
                &self.extensions.obsolete_lease_prefixes(),
            )
            .await?;
        } else {
            instance.component_status_mut().mark_deployments_not_ready();
        }

        self.persist_status(&mut instance, observed.as_ref()).await?;
        Ok(Action::requeue(self.settings.resync_period))
    }

    fn wait_for_dependency(&self, key: &ObjectKey, reason: &str) -> Action {
        info!(
            resource = %key,
            reason,
            requeue_secs = self.settings.resync_period.as_secs(),
            "Dependency not ready, waiting"
        );
        metrics::increment_requeues_total("dependency-wait");
        Action::requeue(self.settings.resync_period)
    }

    /// Record InstallSucceeded=False and hand back the original error
    async fn install_failed(
        &self,
        instance: &mut K,
        observed: Option<&ComponentStatus>,
        err: ReconcilerError,
    ) -> ReconcilerError {
        error!(error = %err, "Install failed");
        instance
            .component_status_mut()
            .mark_install_failed(&err.to_string());
        match self.persist_status(instance, observed).await {
            Ok(()) => err,
            Err(status_err) => {
                error!(error = %status_err, "Failed to persist install failure");
                err
            }
        }
    }

    /// Write status through the status subresource when it changed
    pub(super) async fn persist_status(
        &self,
        instance: &mut K,
        observed: Option<&ComponentStatus>,
    ) -> Result<(), ReconcilerError> {
        let generation = instance.meta().generation;
        let status = instance.component_status_mut();
        status.observed_generation = generation;
        metrics::set_component_up(K::HEALTH_LABEL, status.is_ready());

        if instance.component_status() == observed {
            return Ok(());
        }
        self.store.update_status(&to_dynamic(&*instance)?).await?;
        debug!(resource = %ObjectKey::of(&*instance), "Status updated");
        Ok(())
    }
}
