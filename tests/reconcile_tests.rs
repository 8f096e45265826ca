//! Reconcile engine tests against the in-memory store

mod common;

use common::*;
use knative_component_operator::controller::conditions::{
    DEPENDENCIES_INSTALLED, DEPLOYMENTS_AVAILABLE, INSTALL_SUCCEEDED, READY,
};
use knative_component_operator::controller::manifest::transform::image_map_from_environment;
use knative_component_operator::controller::store::{parse_gvk, MemoryStore, StoreOp};
use knative_component_operator::platform::mesh::SMCP_CRD;
use knative_component_operator::platform::{ComponentSettings, MeshPlatform, ServingPlatform};
use knative_component_operator::prelude::*;
use std::sync::Arc;

async fn serving_reconciler(
    store: &Arc<MemoryStore>,
    component: ComponentSettings,
    mesh: bool,
) -> Reconciler<KnativeServing> {
    let mut detectors: Vec<Arc<dyn Platform<KnativeServing>>> =
        vec![Arc::new(ServingPlatform::new(component))];
    if mesh {
        detectors.push(Arc::new(MeshPlatform));
    }
    let store: Arc<dyn ResourceStore> = store.clone();
    Reconciler::new(store, serving_manifest(), &Platforms::new(detectors), None, settings())
        .await
        .unwrap()
}

fn key() -> ObjectKey {
    ObjectKey::new(NAMESPACE, "knative-serving")
}

fn config_value(store: &MemoryStore, key: &str) -> Option<String> {
    let cm = store.object(&parse_gvk("v1", "ConfigMap"), Some(NAMESPACE), "config-network")?;
    cm.data["data"][key].as_str().map(str::to_string)
}

fn container_image(store: &MemoryStore, deployment: &str) -> String {
    let d = store
        .object(&deployment_gvk(), Some(NAMESPACE), deployment)
        .unwrap();
    d.data["spec"]["template"]["spec"]["containers"][0]["image"]
        .as_str()
        .unwrap()
        .to_string()
}

#[tokio::test]
async fn test_fresh_instance_installs_manifest() {
    let store = Arc::new(MemoryStore::new());
    create_instance(&store, &serving(NAMESPACE)).await;
    let reconciler = serving_reconciler(&store, ComponentSettings::default(), false).await;

    reconciler.reconcile(&key()).await.unwrap();

    let instance: KnativeServing = live_instance(&store, NAMESPACE, "knative-serving").unwrap();
    assert_eq!(
        instance.metadata.finalizers.as_deref(),
        Some(&["knativeservings.operator.knative.dev".to_string()][..])
    );

    let controller = store
        .object(&deployment_gvk(), Some(NAMESPACE), "controller")
        .unwrap();
    let owners = controller.metadata.owner_references.unwrap();
    assert_eq!(owners.len(), 1);
    assert_eq!(owners[0].kind, "KnativeServing");
    assert_eq!(owners[0].uid, instance.metadata.uid.clone().unwrap());

    let role = store
        .object(
            &parse_gvk("rbac.authorization.k8s.io/v1", "ClusterRole"),
            None,
            "knative-serving-admin",
        )
        .unwrap();
    assert!(role.metadata.owner_references.is_none());
    assert_eq!(store.objects_of_kind("CustomResourceDefinition").len(), 1);

    let status = instance.status.unwrap();
    assert!(status.is_condition_true(INSTALL_SUCCEEDED));
    assert!(status.is_condition_true(DEPENDENCIES_INSTALLED));
    assert!(status.is_condition_false(DEPLOYMENTS_AVAILABLE));
    assert!(!status.is_condition_true(READY));
    assert_eq!(status.version.as_deref(), Some("1.15.0"));
    assert_eq!(status.observed_generation, Some(1));

    assert_eq!(
        config_value(&store, "domainTemplate").as_deref(),
        Some("{{.Name}}-{{.Namespace}}.{{.Domain}}")
    );
}

#[tokio::test]
async fn test_roles_are_applied_before_bindings() {
    let store = Arc::new(MemoryStore::new());
    create_instance(&store, &serving(NAMESPACE)).await;
    let reconciler = serving_reconciler(&store, ComponentSettings::default(), false).await;
    store.clear_events();

    reconciler.reconcile(&key()).await.unwrap();

    let created: Vec<String> = store
        .events_of(StoreOp::Create)
        .into_iter()
        .map(|e| e.kind)
        .collect();
    assert_eq!(created[0], "ClusterRole");
    assert_eq!(created[1], "ClusterRoleBinding");
}

#[tokio::test]
async fn test_ready_once_deployments_are_available() {
    let store = Arc::new(MemoryStore::new());
    create_instance(&store, &serving(NAMESPACE)).await;
    let reconciler = serving_reconciler(&store, ComponentSettings::default(), false).await;
    reconciler.reconcile(&key()).await.unwrap();

    make_deployments_available(&store).await;
    store.clear_events();
    reconciler.reconcile(&key()).await.unwrap();

    let instance: KnativeServing = live_instance(&store, NAMESPACE, "knative-serving").unwrap();
    let status = instance.status.unwrap();
    assert!(status.is_condition_true(DEPLOYMENTS_AVAILABLE));
    assert!(status.is_ready());
    assert!(store.events_of(StoreOp::Create).is_empty());
}

#[tokio::test]
async fn test_instance_config_wins_over_defaults() {
    let store = Arc::new(MemoryStore::new());
    let mut ks = serving(NAMESPACE);
    ks.spec.common.configure("network", "domainTemplate", "{{.Name}}.{{.Domain}}");
    create_instance(&store, &ks).await;
    let reconciler = serving_reconciler(&store, ComponentSettings::default(), false).await;

    reconciler.reconcile(&key()).await.unwrap();

    assert_eq!(
        config_value(&store, "domainTemplate").as_deref(),
        Some("{{.Name}}.{{.Domain}}")
    );
    assert_eq!(config_value(&store, "defaultExternalScheme").as_deref(), Some("https"));
}

#[tokio::test]
async fn test_operator_images_apply_unless_instance_overrides() {
    let store = Arc::new(MemoryStore::new());
    let mut ks = serving(NAMESPACE);
    ks.spec
        .common
        .registry
        .overrides
        .insert("activator".to_string(), "registry/mine:v1".to_string());
    create_instance(&store, &ks).await;
    let component = ComponentSettings {
        images: image_map_from_environment([
            ("IMAGE_controller__controller", "registry/controller:v2"),
            ("IMAGE_activator", "registry/activator:v2"),
        ]),
        ..ComponentSettings::default()
    };
    let reconciler = serving_reconciler(&store, component, false).await;

    reconciler.reconcile(&key()).await.unwrap();

    assert_eq!(container_image(&store, "controller"), "registry/controller:v2");
    assert_eq!(container_image(&store, "activator"), "registry/mine:v1");
}

#[tokio::test]
async fn test_mesh_dependency_wait_skips_install_and_status() {
    let store = Arc::new(MemoryStore::new());
    store.insert(crd(SMCP_CRD)).unwrap();
    let mut ks = serving(NAMESPACE);
    ks.spec.common.configure("istio", "enabled", "true");
    create_instance(&store, &ks).await;
    let reconciler = serving_reconciler(&store, ComponentSettings::default(), true).await;
    assert_eq!(reconciler.extensions.names(), vec!["serving", "service-mesh"]);
    store.clear_events();

    reconciler.reconcile(&key()).await.unwrap();

    assert!(store.objects_of_kind("Deployment").is_empty());
    assert!(store.events_of(StoreOp::UpdateStatus).is_empty());

    store
        .insert(
            serde_json::from_value(serde_json::json!({
                "apiVersion": "maistra.io/v2",
                "kind": "ServiceMeshControlPlane",
                "metadata": { "name": "basic", "namespace": NAMESPACE },
                "status": { "conditions": [{ "type": "Ready", "status": "True" }] }
            }))
            .unwrap(),
        )
        .unwrap();
    reconciler.reconcile(&key()).await.unwrap();

    let activator = store
        .object(&deployment_gvk(), Some(NAMESPACE), "activator")
        .unwrap();
    assert_eq!(
        activator.data["spec"]["template"]["metadata"]["labels"]["sidecar.istio.io/inject"],
        "true"
    );
    let instance: KnativeServing = live_instance(&store, NAMESPACE, "knative-serving").unwrap();
    assert!(instance.status.unwrap().is_condition_true(DEPENDENCIES_INSTALLED));
}

#[tokio::test]
async fn test_required_namespace_is_fatal() {
    let store = Arc::new(MemoryStore::new());
    create_instance(&store, &serving("default")).await;
    let component = ComponentSettings {
        required_namespace: Some(NAMESPACE.to_string()),
        ..ComponentSettings::default()
    };
    let reconciler = serving_reconciler(&store, component, false).await;

    let err = reconciler
        .reconcile(&ObjectKey::new("default", "knative-serving"))
        .await
        .unwrap_err();
    assert!(matches!(err, ReconcilerError::Hook(_)));

    assert!(store.objects_of_kind("Deployment").is_empty());
    let instance: KnativeServing = live_instance(&store, "default", "knative-serving").unwrap();
    let status = instance.status.unwrap();
    assert!(status.is_condition_false(INSTALL_SUCCEEDED));
    assert!(!status.is_ready());
}

#[tokio::test]
async fn test_apply_failure_marks_install_failed() {
    let store = Arc::new(MemoryStore::new());
    create_instance(&store, &serving(NAMESPACE)).await;
    let reconciler = serving_reconciler(&store, ComponentSettings::default(), false).await;
    store.fail_on(StoreOp::Create, "Deployment");

    let err = reconciler.reconcile(&key()).await.unwrap_err();
    assert!(matches!(err, ReconcilerError::Apply { .. }));

    let instance: KnativeServing = live_instance(&store, NAMESPACE, "knative-serving").unwrap();
    assert!(instance.status.unwrap().is_condition_false(INSTALL_SUCCEEDED));
}

#[tokio::test]
async fn test_delete_removes_resources_and_finalizer() {
    let store = Arc::new(MemoryStore::new());
    create_instance(&store, &serving(NAMESPACE)).await;
    let reconciler = serving_reconciler(&store, ComponentSettings::default(), false).await;
    reconciler.reconcile(&key()).await.unwrap();

    store
        .delete(&KnativeServing::gvk(), Some(NAMESPACE), "knative-serving")
        .await
        .unwrap();
    store.clear_events();
    reconciler.reconcile(&key()).await.unwrap();

    assert!(live_instance::<KnativeServing>(&store, NAMESPACE, "knative-serving").is_none());
    assert!(store.objects_of_kind("Deployment").is_empty());
    assert!(store.objects_of_kind("ConfigMap").is_empty());
    assert!(store.objects_of_kind("ClusterRole").is_empty());
    assert_eq!(store.objects_of_kind("CustomResourceDefinition").len(), 1);

    let deleted: Vec<String> = store
        .events_of(StoreOp::Delete)
        .into_iter()
        .map(|e| e.kind)
        .collect();
    let first_rbac = deleted
        .iter()
        .position(|k| k.starts_with("ClusterRole"))
        .unwrap();
    assert!(deleted[first_rbac..].iter().all(|k| k.starts_with("ClusterRole")));
}

#[tokio::test]
async fn test_transient_delete_error_keeps_finalizer() {
    let store = Arc::new(MemoryStore::new());
    create_instance(&store, &serving(NAMESPACE)).await;
    let reconciler = serving_reconciler(&store, ComponentSettings::default(), false).await;
    reconciler.reconcile(&key()).await.unwrap();

    store
        .delete(&KnativeServing::gvk(), Some(NAMESPACE), "knative-serving")
        .await
        .unwrap();
    store.fail_on(StoreOp::Delete, "ClusterRole");

    let err = reconciler.reconcile(&key()).await.unwrap_err();
    assert!(matches!(err, ReconcilerError::Apply { .. }));
    let instance: KnativeServing = live_instance(&store, NAMESPACE, "knative-serving").unwrap();
    assert!(instance
        .metadata
        .finalizers
        .unwrap_or_default()
        .contains(&"knativeservings.operator.knative.dev".to_string()));
    assert_eq!(store.objects_of_kind("ClusterRole").len(), 1);

    store.clear_failures();
    reconciler.reconcile(&key()).await.unwrap();
    assert!(live_instance::<KnativeServing>(&store, NAMESPACE, "knative-serving").is_none());
    assert!(store.objects_of_kind("ClusterRole").is_empty());
}

const MIGRATION_JOB: &str = r"
apiVersion: batch/v1
kind: Job
metadata:
  name: storage-version-migration
  namespace: knative-serving
spec:
  template:
    spec:
      restartPolicy: Never
      containers:
      - name: migrate
        image: migrate
";

async fn versioned_reconciler(store: &Arc<MemoryStore>, version: &str) -> Reconciler<KnativeServing> {
    let manifest = Manifest::from_yaml_str(&format!("{SERVING_MANIFEST}\n---{MIGRATION_JOB}")).unwrap();
    let detectors: Vec<Arc<dyn Platform<KnativeServing>>> =
        vec![Arc::new(ServingPlatform::new(ComponentSettings::default()))];
    let dyn_store: Arc<dyn ResourceStore> = store.clone();
    let settings = ReconcilerSettings {
        version: version.to_string(),
        ..settings()
    };
    Reconciler::new(dyn_store, manifest, &Platforms::new(detectors), None, settings)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_upgrade_creates_new_versioned_job() {
    let store = Arc::new(MemoryStore::new());
    create_instance(&store, &serving(NAMESPACE)).await;
    let job = parse_gvk("batch/v1", "Job");

    versioned_reconciler(&store, "1.15.0")
        .await
        .reconcile(&key())
        .await
        .unwrap();
    assert!(store
        .object(&job, Some(NAMESPACE), "storage-version-migration-1.15.0")
        .is_some());

    store.clear_events();
    versioned_reconciler(&store, "1.16.0")
        .await
        .reconcile(&key())
        .await
        .unwrap();

    let created: Vec<String> = store
        .events_of(StoreOp::Create)
        .into_iter()
        .filter(|e| e.kind == "Job")
        .map(|e| e.name)
        .collect();
    assert_eq!(created, vec!["storage-version-migration-1.16.0".to_string()]);
    assert!(store
        .events_of(StoreOp::Update)
        .iter()
        .all(|e| e.kind != "Job"));
    assert_eq!(store.objects_of_kind("Job").len(), 2);
}

#[tokio::test]
async fn test_missing_instance_is_ignored() {
    let store = Arc::new(MemoryStore::new());
    let reconciler = serving_reconciler(&store, ComponentSettings::default(), false).await;
    reconciler.reconcile(&key()).await.unwrap();
    assert!(store.is_empty());
}
