//! Common test utilities for the integration tests
//!
//! Sample manifests, instance builders and an in-memory scaler backend.

#![allow(dead_code)]

use async_trait::async_trait;
use knative_component_operator::controller::scaler::{ScalerBackend, ScalerBackendFactory};
use knative_component_operator::controller::store::{parse_gvk, to_dynamic, MemoryStore};
use knative_component_operator::prelude::*;
use kube::api::DynamicObject;
use kube::core::GroupVersionKind;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const NAMESPACE: &str = "knative-serving";
pub const EVENTING_NAMESPACE: &str = "knative-eventing";

/// A trimmed serving release
pub const SERVING_MANIFEST: &str = r#"
apiVersion: v1
kind: Namespace
metadata:
  name: knative-serving
---
apiVersion: v1
kind: ServiceAccount
metadata:
  name: controller
  namespace: knative-serving
---
apiVersion: rbac.authorization.k8s.io/v1
kind: ClusterRole
metadata:
  name: knative-serving-admin
rules:
  - apiGroups: ["serving.knative.dev"]
    resources: ["*"]
    verbs: ["*"]
---
apiVersion: rbac.authorization.k8s.io/v1
kind: ClusterRoleBinding
metadata:
  name: knative-serving-controller-admin
subjects:
  - kind: ServiceAccount
    name: controller
    namespace: knative-serving
roleRef:
  kind: ClusterRole
  name: knative-serving-admin
  apiGroup: rbac.authorization.k8s.io
---
apiVersion: v1
kind: ConfigMap
metadata:
  name: config-network
  namespace: knative-serving
data:
  _example: |
    ingress-class: istio
---
apiVersion: apps/v1
kind: Deployment
metadata:
  name: controller
  namespace: knative-serving
spec:
  selector:
    matchLabels:
      app: controller
  template:
    metadata:
      labels:
        app: controller
    spec:
      serviceAccountName: controller
      containers:
        - name: controller
          image: gcr.io/knative-releases/controller:v1.15.0
---
apiVersion: apps/v1
kind: Deployment
metadata:
  name: activator
  namespace: knative-serving
spec:
  selector:
    matchLabels:
      app: activator
  template:
    metadata:
      labels:
        app: activator
    spec:
      containers:
        - name: activator
          image: gcr.io/knative-releases/activator:v1.15.0
---
apiVersion: apiextensions.k8s.io/v1
kind: CustomResourceDefinition
metadata:
  name: services.serving.knative.dev
spec:
  group: serving.knative.dev
  names:
    kind: Service
    plural: services
  scope: Namespaced
"#;

/// A trimmed eventing release with the on-demand workloads
pub const EVENTING_MANIFEST: &str = r#"
apiVersion: apps/v1
kind: Deployment
metadata:
  name: eventing-controller
  namespace: knative-eventing
spec:
  selector:
    matchLabels:
      app: eventing-controller
  template:
    metadata:
      labels:
        app: eventing-controller
    spec:
      containers:
        - name: eventing-controller
          image: gcr.io/knative-releases/controller:v1.15.0
---
apiVersion: apps/v1
kind: Deployment
metadata:
  name: mt-broker-ingress
  namespace: knative-eventing
spec:
  selector:
    matchLabels:
      app: mt-broker-ingress
  template:
    metadata:
      labels:
        app: mt-broker-ingress
    spec:
      containers:
        - name: ingress
          image: gcr.io/knative-releases/broker-ingress:v1.15.0
---
apiVersion: apps/v1
kind: Deployment
metadata:
  name: imc-dispatcher
  namespace: knative-eventing
spec:
  selector:
    matchLabels:
      app: imc-dispatcher
  template:
    metadata:
      labels:
        app: imc-dispatcher
    spec:
      containers:
        - name: dispatcher
          image: gcr.io/knative-releases/imc-dispatcher:v1.15.0
"#;

pub fn serving_manifest() -> Manifest {
    Manifest::from_yaml_str(SERVING_MANIFEST).unwrap()
}

pub fn eventing_manifest() -> Manifest {
    Manifest::from_yaml_str(EVENTING_MANIFEST).unwrap()
}

pub fn settings() -> ReconcilerSettings {
    ReconcilerSettings {
        version: "1.15.0".to_string(),
        resync_period: Duration::from_secs(600),
    }
}

pub fn deployment_gvk() -> GroupVersionKind {
    parse_gvk("apps/v1", "Deployment")
}

pub fn serving(namespace: &str) -> KnativeServing {
    let mut ks = KnativeServing::new("knative-serving", KnativeServingSpec::default());
    ks.metadata.namespace = Some(namespace.to_string());
    ks.metadata.generation = Some(1);
    ks
}

pub fn eventing() -> KnativeEventing {
    let mut ke = KnativeEventing::new("knative-eventing", KnativeEventingSpec::default());
    ke.metadata.namespace = Some(EVENTING_NAMESPACE.to_string());
    ke.metadata.generation = Some(1);
    ke
}

/// Create the instance through the store so it gets a uid
pub async fn create_instance<K: Component>(store: &MemoryStore, instance: &K) {
    store.create(&to_dynamic(instance).unwrap()).await.unwrap();
}

/// Read the instance back from the store
pub fn live_instance<K: Component>(store: &MemoryStore, namespace: &str, name: &str) -> Option<K> {
    store
        .object(&K::gvk(), Some(namespace), name)
        .map(|obj| knative_component_operator::controller::store::from_dynamic(obj).unwrap())
}

/// Mark every Deployment in the store Available
pub async fn make_deployments_available(store: &MemoryStore) {
    for mut deployment in store.objects_of_kind("Deployment") {
        deployment.data["status"] = serde_json::json!({
            "conditions": [{ "type": "Available", "status": "True" }]
        });
        store.update_status(&deployment).await.unwrap();
    }
}

pub fn crd(name: &str) -> DynamicObject {
    serde_json::from_value(serde_json::json!({
        "apiVersion": "apiextensions.k8s.io/v1",
        "kind": "CustomResourceDefinition",
        "metadata": { "name": name }
    }))
    .unwrap()
}

pub fn broker(name: &str, class: &str) -> DynamicObject {
    serde_json::from_value(serde_json::json!({
        "apiVersion": "eventing.knative.dev/v1",
        "kind": "Broker",
        "metadata": {
            "name": name,
            "namespace": "default",
            "annotations": { "eventing.knative.dev/broker.class": class }
        }
    }))
    .unwrap()
}

/// Cluster state seen by [`FakeFactory`] backends
#[derive(Debug, Default)]
pub struct FakeCluster {
    pub crds_installed: AtomicBool,
    pub brokers: Mutex<Vec<DynamicObject>>,
    pub channels: AtomicUsize,
    pub started: AtomicUsize,
    pub shutdowns: AtomicUsize,
    pub never_synced: AtomicBool,
}

impl FakeCluster {
    pub fn install_crds(&self) {
        self.crds_installed.store(true, Ordering::SeqCst);
    }

    pub fn add_broker(&self, broker: DynamicObject) {
        self.brokers.lock().unwrap().push(broker);
    }

    /// Backends report CRDs but their caches never finish the initial list
    pub fn stall_sync(&self) {
        self.never_synced.store(true, Ordering::SeqCst);
    }

    pub fn set_channels(&self, count: usize) {
        self.channels.store(count, Ordering::SeqCst);
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }
}

pub struct FakeBackend(Arc<FakeCluster>);

#[async_trait]
impl ScalerBackend for FakeBackend {
    fn crds_installed(&self) -> bool {
        self.0.crds_installed.load(Ordering::SeqCst)
    }

    async fn wait_until_ready(&self) -> anyhow::Result<()> {
        if self.0.never_synced.load(Ordering::SeqCst) {
            futures::future::pending::<()>().await;
        }
        Ok(())
    }

    fn brokers(&self) -> Vec<DynamicObject> {
        self.0.brokers.lock().unwrap().clone()
    }

    fn in_memory_channel_count(&self) -> usize {
        self.0.channels.load(Ordering::SeqCst)
    }

    async fn shutdown(&self) {
        self.0.shutdowns.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct FakeFactory(pub Arc<FakeCluster>);

impl ScalerBackendFactory for FakeFactory {
    fn start(&self) -> Arc<dyn ScalerBackend> {
        self.0.started.fetch_add(1, Ordering::SeqCst);
        Arc::new(FakeBackend(self.0.clone()))
    }
}
