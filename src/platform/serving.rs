//! # Serving
//!
//! Defaults for `KnativeServing` installs. Always enabled.

use super::{check_namespace, mark_dependencies_installed, merge_images, ComponentSettings};
use crate::constants::DEFAULT_HA_REPLICAS;
use crate::controller::extension::{Extension, Platform};
use crate::controller::manifest::transform::{container_memory_limit, inject_environment};
use crate::controller::manifest::{Manifest, Transformer};
use crate::controller::outcome::Outcome;
use crate::controller::reconciler::ObsoleteResource;
use crate::controller::store::{delete_if_present, ResourceStore, StoreError};
use crate::crd::{Component, HighAvailability, KnativeServing};
use anyhow::Context;
use async_trait::async_trait;
use kube::core::GroupVersionKind;
use kube::ResourceExt;
use std::sync::Arc;
use tracing::{debug, info};

pub const DEFAULT_DOMAIN_TEMPLATE: &str = "{{.Name}}-{{.Namespace}}.{{.Domain}}";
pub const DEFAULT_INGRESS_CLASS: &str = "kourier.ingress.networking.knative.dev";
pub const WEBHOOK_MEMORY_LIMIT: &str = "1024Mi";

const NETWORK_CONFIG: &str = "network";
const DEPLOYMENT_CONFIG: &str = "deployment";
const QUEUE_PROXY_IMAGE: &str = "queue-proxy";
const WEBHOOK: &str = "webhook";

/// Leases of the certificate reconcilers that moved out of serving
pub const NETWORKING_CERTIFICATE_LEASE: &str =
    "controller.knative.dev.networking.pkg.certificates.reconciler.reconciler";
pub const CONTROL_PROTOCOL_CERTIFICATE_LEASE: &str =
    "controller.knative.dev.control-protocol.pkg.certificates.reconciler.reconciler";
const DOMAIN_MAPPING_WEBHOOK: &str = "domainmapping-webhook";

/// Namespace the ingress gateway is installed into
#[must_use]
pub fn ingress_namespace(namespace: &str) -> String {
    format!("{namespace}-ingress")
}

#[derive(Debug, Clone, Default)]
pub struct ServingPlatform {
    settings: ComponentSettings,
}

impl ServingPlatform {
    #[must_use]
    pub fn new(settings: ComponentSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl Platform<KnativeServing> for ServingPlatform {
    fn name(&self) -> &'static str {
        "serving"
    }

    async fn detect(
        &self,
        store: &Arc<dyn ResourceStore>,
        _manifest: &mut Manifest,
    ) -> Result<Option<Arc<dyn Extension<KnativeServing>>>, StoreError> {
        Ok(Some(Arc::new(ServingExtension {
            store: store.clone(),
            settings: self.settings.clone(),
        })))
    }
}

pub struct ServingExtension {
    store: Arc<dyn ResourceStore>,
    settings: ComponentSettings,
}

#[async_trait]
impl Extension<KnativeServing> for ServingExtension {
    fn name(&self) -> &'static str {
        "serving"
    }

    fn transformers(&self, _instance: &KnativeServing) -> Vec<Transformer> {
        let mut transformers = vec![container_memory_limit(WEBHOOK, WEBHOOK, WEBHOOK_MEMORY_LIMIT)];
        if !self.settings.proxy.is_empty() {
            transformers.push(inject_environment(
                "controller",
                "controller",
                self.settings.proxy.clone(),
            ));
        }
        transformers
    }

    async fn pre_install(&self, instance: &mut KnativeServing) -> Outcome {
        let outcome = check_namespace(instance, self.settings.required_namespace.as_deref());
        if !outcome.is_success() {
            return outcome;
        }
        mark_dependencies_installed(instance);

        let spec = instance.common_spec_mut();
        spec.configure_if_unset(NETWORK_CONFIG, "domainTemplate", DEFAULT_DOMAIN_TEMPLATE);
        spec.configure_if_unset(NETWORK_CONFIG, "ingress.class", DEFAULT_INGRESS_CLASS);
        spec.configure_if_unset(NETWORK_CONFIG, "defaultExternalScheme", "https");
        spec.configure_if_unset(NETWORK_CONFIG, "autocreateClusterDomainClaims", "true");
        merge_images(spec, &self.settings.images);
        // Revisions get their sidecar from config-deployment, not the registry
        if let Some(image) = spec.registry.overrides.get(QUEUE_PROXY_IMAGE).cloned() {
            spec.configure(DEPLOYMENT_CONFIG, "queue-sidecar-image", &image);
        }
        spec.high_availability.get_or_insert(HighAvailability {
            replicas: Some(DEFAULT_HA_REPLICAS),
        });
        Outcome::Success
    }

    async fn finalize(&self, instance: &KnativeServing) -> anyhow::Result<()> {
        let namespace = ingress_namespace(&instance.namespace().unwrap_or_default());
        let gvk = GroupVersionKind::gvk("", "v1", "Namespace");
        let existed = delete_if_present(self.store.as_ref(), &gvk, None, &namespace)
            .await
            .with_context(|| format!("Failed to remove ingress namespace {namespace}"))?;
        if existed {
            info!(namespace = namespace.as_str(), "Deleted ingress namespace");
        } else {
            debug!(namespace = namespace.as_str(), "Ingress namespace already gone");
        }
        Ok(())
    }

    fn obsolete_resources(&self) -> Vec<ObsoleteResource> {
        vec![
            ObsoleteResource::namespaced("apps/v1", "Deployment", "domain-mapping"),
            ObsoleteResource::namespaced("apps/v1", "Deployment", DOMAIN_MAPPING_WEBHOOK),
            ObsoleteResource::namespaced("v1", "Service", DOMAIN_MAPPING_WEBHOOK),
            ObsoleteResource::namespaced("v1", "Service", "domain-mapping-sm-service"),
            ObsoleteResource::namespaced("v1", "Service", "domainmapping-webhook-sm-service"),
            ObsoleteResource::namespaced("v1", "Secret", "domainmapping-webhook-certs"),
            ObsoleteResource::cluster(
                "admissionregistration.k8s.io/v1",
                "MutatingWebhookConfiguration",
                "webhook.domainmapping.serving.knative.dev",
            ),
            ObsoleteResource::cluster(
                "admissionregistration.k8s.io/v1",
                "ValidatingWebhookConfiguration",
                "validation.webhook.domainmapping.serving.knative.dev",
            ),
        ]
    }

    fn obsolete_lease_prefixes(&self) -> Vec<&'static str> {
        vec![
            "domainmapping",
            "net-certmanager",
            NETWORKING_CERTIFICATE_LEASE,
            CONTROL_PROTOCOL_CERTIFICATE_LEASE,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::conditions::DEPENDENCIES_INSTALLED;
    use crate::controller::manifest::Envelope;
    use crate::controller::store::MemoryStore;
    use crate::crd::KnativeServingSpec;

    fn extension(settings: ComponentSettings) -> (Arc<MemoryStore>, ServingExtension) {
        let store = Arc::new(MemoryStore::new());
        let extension = ServingExtension {
            store: store.clone(),
            settings,
        };
        (store, extension)
    }

    fn instance() -> KnativeServing {
        let mut ks = KnativeServing::new("knative-serving", KnativeServingSpec::default());
        ks.metadata.namespace = Some("knative-serving".to_string());
        ks
    }

    #[tokio::test]
    async fn test_pre_install_defaults_network_config() {
        let (_, ext) = extension(ComponentSettings::default());
        let mut ks = instance();
        ks.spec
            .common
            .configure("network", "domainTemplate", "{{.Name}}.{{.Domain}}");

        assert!(ext.pre_install(&mut ks).await.is_success());
        let network = &ks.spec.common.config["network"];
        assert_eq!(network["domainTemplate"], "{{.Name}}.{{.Domain}}");
        assert_eq!(network["ingress.class"], DEFAULT_INGRESS_CLASS);
        assert_eq!(network["defaultExternalScheme"], "https");
        assert_eq!(network["autocreateClusterDomainClaims"], "true");
        assert_eq!(ks.spec.common.ha_replicas(), Some(DEFAULT_HA_REPLICAS));
        assert!(!ks.spec.common.config.contains_key("deployment"));
        assert!(ks
            .status
            .as_ref()
            .unwrap()
            .is_condition_true(DEPENDENCIES_INSTALLED));
    }

    #[tokio::test]
    async fn test_pre_install_rejects_foreign_namespace() {
        let (_, ext) = extension(ComponentSettings {
            required_namespace: Some("knative-serving".to_string()),
            ..ComponentSettings::default()
        });
        let mut ks = instance();
        ks.metadata.namespace = Some("default".to_string());

        assert!(matches!(ext.pre_install(&mut ks).await, Outcome::Fatal(_)));
        assert!(ks.spec.common.config.is_empty());
    }

    #[tokio::test]
    async fn test_finalize_removes_ingress_namespace() {
        let (store, ext) = extension(ComponentSettings::default());
        store
            .insert(
                serde_json::from_value(serde_json::json!({
                    "apiVersion": "v1",
                    "kind": "Namespace",
                    "metadata": { "name": "knative-serving-ingress" }
                }))
                .unwrap(),
            )
            .unwrap();

        ext.finalize(&instance()).await.unwrap();
        assert!(store.objects_of_kind("Namespace").is_empty());
        // second run finds nothing and still succeeds
        ext.finalize(&instance()).await.unwrap();
    }

    #[tokio::test]
    async fn test_pre_install_keeps_explicit_ha() {
        let (_, ext) = extension(ComponentSettings::default());
        let mut ks = instance();
        ks.spec.common.high_availability = Some(HighAvailability { replicas: Some(5) });

        assert!(ext.pre_install(&mut ks).await.is_success());
        assert_eq!(ks.spec.common.ha_replicas(), Some(5));
    }

    #[tokio::test]
    async fn test_queue_proxy_image_becomes_sidecar_image() {
        let (_, ext) = extension(ComponentSettings {
            images: [(
                "queue-proxy".to_string(),
                "registry/queue-proxy:v1".to_string(),
            )]
            .into(),
            ..ComponentSettings::default()
        });
        let mut ks = instance();
        ks.spec
            .common
            .configure("deployment", "queue-sidecar-image", "stale");

        assert!(ext.pre_install(&mut ks).await.is_success());
        assert_eq!(
            ks.spec.common.config["deployment"]["queue-sidecar-image"],
            "registry/queue-proxy:v1"
        );
    }

    #[tokio::test]
    async fn test_sidecar_image_follows_instance_registry() {
        let (_, ext) = extension(ComponentSettings {
            images: [(
                "queue-proxy".to_string(),
                "registry/queue-proxy:v1".to_string(),
            )]
            .into(),
            ..ComponentSettings::default()
        });
        let mut ks = instance();
        ks.spec
            .common
            .registry
            .overrides
            .insert("queue-proxy".to_string(), "mirror/queue-proxy:v1".to_string());

        assert!(ext.pre_install(&mut ks).await.is_success());
        assert_eq!(ks.spec.common.registry.overrides["queue-proxy"], "mirror/queue-proxy:v1");
        assert_eq!(
            ks.spec.common.config["deployment"]["queue-sidecar-image"],
            "mirror/queue-proxy:v1"
        );
    }

    #[test]
    fn test_webhook_memory_limit_is_ensured() {
        let manifest = Manifest::from_yaml_str(
            r"
apiVersion: apps/v1
kind: Deployment
metadata:
  name: webhook
spec:
  selector:
    matchLabels:
      app: webhook
  template:
    spec:
      containers:
      - name: webhook
        image: webhook
",
        )
        .unwrap();
        let (_, ext) = extension(ComponentSettings::default());

        let transformed = manifest.transform(&ext.transformers(&instance())).unwrap();
        let Envelope::Deployment(d) =
            Envelope::decode(transformed.resources()[0].clone()).unwrap()
        else {
            panic!("expected a Deployment");
        };
        let container = &d.spec.unwrap().template.spec.unwrap().containers[0];
        let limits = container.resources.as_ref().unwrap().limits.as_ref().unwrap();
        assert_eq!(limits["memory"].0, WEBHOOK_MEMORY_LIMIT);
    }

    #[test]
    fn test_proxy_transform_only_when_configured() {
        let (_, ext) = extension(ComponentSettings::default());
        assert_eq!(ext.transformers(&instance()).len(), 1);

        let (_, ext) = extension(ComponentSettings {
            proxy: vec![("HTTP_PROXY".to_string(), "http://proxy:3128".to_string())],
            ..ComponentSettings::default()
        });
        assert_eq!(ext.transformers(&instance()).len(), 2);
    }

    #[test]
    fn test_certificate_reconciler_leases_are_obsolete() {
        let (_, ext) = extension(ComponentSettings::default());
        let prefixes = ext.obsolete_lease_prefixes();
        for lease in [
            "controller.knative.dev.networking.pkg.certificates.reconciler.reconciler.00-of-01",
            "controller.knative.dev.control-protocol.pkg.certificates.reconciler.reconciler.00-of-01",
        ] {
            assert!(prefixes.iter().any(|p| lease.starts_with(p)), "{lease}");
        }
        let serving_lease = "controller.knative.dev.serving.pkg.reconciler.route.reconciler.00-of-01";
        assert!(!prefixes.iter().any(|p| serving_lease.starts_with(p)));
    }
}
