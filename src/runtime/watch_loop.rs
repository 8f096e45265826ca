//! # Watch Loop
//!
//! Runs one kube-runtime `Controller` per component kind and restarts it
//! whenever its stream ends.

use crate::constants::{OWNER_NAMESPACE_ANNOTATION, OWNER_NAME_ANNOTATION};
use crate::controller::reconciler::{reconcile, Reconciler};
use crate::controller::server::ServerState;
use crate::crd::Component;
use crate::runtime::error_policy::handle_reconciliation_error;
use futures::{Stream, StreamExt};
use k8s_openapi::api::apps::v1::Deployment;
use kube::api::{Api, DynamicObject};
use kube::{Client, ResourceExt};
use kube_runtime::reflector::{ObjectRef, Store};
use kube_runtime::{controller, watcher, Controller};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn, Instrument};

/// Flip readiness off on SIGINT/SIGTERM so the watch loops stop restarting
pub fn spawn_shutdown_listener(server_state: Arc<ServerState>) {
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for shutdown signal: {}", e);
            return;
        }
        info!("Received shutdown signal, initiating graceful shutdown...");
        server_state.set_ready(false);
    });
}

/// Instances to requeue when a watched extension object changes
///
/// Managed objects carry the owner annotations; anything else (a mesh
/// control plane, for example) requeues every instance in its namespace.
fn instances_for<K: Component>(obj: &DynamicObject, instances: &Store<K>) -> Vec<ObjectRef<K>> {
    let annotations = obj.annotations();
    if let (Some(name), Some(namespace)) = (
        annotations.get(OWNER_NAME_ANNOTATION),
        annotations.get(OWNER_NAMESPACE_ANNOTATION),
    ) {
        return vec![ObjectRef::new(name).within(namespace)];
    }
    let namespace = obj.namespace();
    instances
        .state()
        .iter()
        .filter(|instance| instance.namespace() == namespace)
        .map(|instance| ObjectRef::from_obj(instance.as_ref()))
        .collect()
}

/// Stream of resync signals from the scaler informers
fn resync_stream(sender: &broadcast::Sender<()>) -> impl Stream<Item = ()> + Send + Sync + 'static {
    futures::stream::unfold(sender.subscribe(), |mut rx| async move {
        match rx.recv().await {
            // A lagging receiver only means several signals collapsed into one
            Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => Some(((), rx)),
            Err(broadcast::error::RecvError::Closed) => None,
        }
    })
}

async fn build_controller<K: Component>(
    client: &Client,
    reconciler: &Reconciler<K>,
    resync: Option<&broadcast::Sender<()>>,
) -> Controller<K> {
    let instances: Api<K> = Api::all(client.clone());
    let deployments: Api<Deployment> = Api::all(client.clone());
    let mut controller = Controller::new(instances, watcher::Config::default().any_semantic())
        .owns(deployments, watcher::Config::default());

    for gvk in reconciler.extensions.watches() {
        let (resource, _caps) = match kube::discovery::pinned_kind(client, &gvk).await {
            Ok(found) => found,
            Err(e) => {
                warn!(kind = gvk.kind.as_str(), "Skipping watch of unserved kind: {}", e);
                continue;
            }
        };
        let api: Api<DynamicObject> = Api::all_with(client.clone(), &resource);
        let store = controller.store();
        controller = controller.watches_with(
            api,
            resource,
            watcher::Config::default(),
            move |obj| instances_for(&obj, &store),
        );
        debug!(kind = gvk.kind.as_str(), "Watching extension kind");
    }

    if let Some(sender) = resync {
        controller = controller.reconcile_all_on(resync_stream(sender));
    }
    controller.shutdown_on_signal()
}

/// Run the controller for `K` until shutdown
pub async fn run_watch_loop<K: Component>(
    client: Client,
    reconciler: Arc<Reconciler<K>>,
    resync: Option<broadcast::Sender<()>>,
    server_state: Arc<ServerState>,
    restart_delay: Duration,
) -> Result<(), anyhow::Error> {
    loop {
        if !server_state.is_ready() {
            info!(component = K::COMPONENT, "Shutdown requested, exiting watch loop");
            break;
        }

        info!(component = K::COMPONENT, "Starting controller");
        let watch_span = tracing::info_span!("controller.watch", component = K::COMPONENT);

        build_controller(&client, &reconciler, resync.as_ref())
            .await
            .run(
                reconcile::<K>,
                handle_reconciliation_error::<K>,
                reconciler.clone(),
            )
            .for_each(|result| {
                match result {
                    Ok((obj, action)) => debug!(resource = %obj, ?action, "Reconciled"),
                    // Already logged and counted by the error policy
                    Err(controller::Error::ReconcilerFailed(_, obj)) => {
                        debug!(resource = %obj, "Reconcile failed");
                    }
                    Err(controller::Error::ObjectNotFound(obj)) => {
                        debug!(resource = %obj, "Object vanished before reconcile");
                    }
                    Err(e) => warn!(component = K::COMPONENT, "Controller stream error: {}", e),
                }
                futures::future::ready(())
            })
            .instrument(watch_span)
            .await;

        if !server_state.is_ready() {
            info!(component = K::COMPONENT, "Shutdown requested, exiting watch loop");
            break;
        }
        warn!(
            component = K::COMPONENT,
            "Controller stream ended, restarting in {} seconds...",
            restart_delay.as_secs()
        );
        tokio::time::sleep(restart_delay).await;
    }

    info!(component = K::COMPONENT, "Controller stopped gracefully");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{KnativeServing, KnativeServingSpec};
    use kube_runtime::reflector::store::Writer;
    use kube_runtime::watcher::Event;

    fn serving(namespace: &str) -> KnativeServing {
        let mut ks = KnativeServing::new("knative-serving", KnativeServingSpec::default());
        ks.metadata.namespace = Some(namespace.to_string());
        ks
    }

    fn object(annotations: serde_json::Value) -> DynamicObject {
        serde_json::from_value(serde_json::json!({
            "apiVersion": "maistra.io/v2",
            "kind": "ServiceMeshControlPlane",
            "metadata": {
                "name": "basic",
                "namespace": "knative-serving",
                "annotations": annotations
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_owner_annotations_take_precedence() {
        let store = Writer::<KnativeServing>::default().as_reader();
        let refs = instances_for(
            &object(serde_json::json!({
                OWNER_NAME_ANNOTATION: "ks",
                OWNER_NAMESPACE_ANNOTATION: "elsewhere"
            })),
            &store,
        );
        assert_eq!(refs, vec![ObjectRef::new("ks").within("elsewhere")]);
    }

    #[test]
    fn test_unannotated_objects_requeue_same_namespace() {
        let mut writer = Writer::<KnativeServing>::default();
        writer.apply_watcher_event(&Event::Apply(serving("knative-serving")));
        writer.apply_watcher_event(&Event::Apply(serving("other")));
        let store = writer.as_reader();

        let refs = instances_for(&object(serde_json::json!({})), &store);
        assert_eq!(refs, vec![ObjectRef::new("knative-serving").within("knative-serving")]);
    }
}
