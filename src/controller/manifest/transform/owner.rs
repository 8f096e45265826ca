//! Namespace, owner reference and owner annotation injection.

use super::{transformer, upsert_entry, Transformer};
use crate::constants::{OWNER_NAMESPACE_ANNOTATION, OWNER_NAME_ANNOTATION};
use crate::controller::manifest::Envelope;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use serde_json::Value;

const CLUSTER_SCOPED_KINDS: &[&str] = &[
    "APIService",
    "ClusterRole",
    "ClusterRoleBinding",
    "CustomResourceDefinition",
    "MutatingWebhookConfiguration",
    "Namespace",
    "PersistentVolume",
    "PriorityClass",
    "StorageClass",
    "ValidatingWebhookConfiguration",
];

#[must_use]
pub fn is_cluster_scoped(kind: &str) -> bool {
    CLUSTER_SCOPED_KINDS.contains(&kind)
}

/// Move namespaced templates into `namespace`
///
/// Also rewrites references that must point into the same namespace:
/// ServiceAccount subjects of (Cluster)RoleBindings, webhook client
/// services and APIService backends.
pub fn inject_namespace(namespace: &str) -> Transformer {
    let namespace = namespace.to_string();
    transformer(move |resource| {
        if namespace.is_empty() {
            return Ok(());
        }
        let kind = resource.kind().to_string();
        if !is_cluster_scoped(&kind) {
            resource.metadata_mut().namespace = Some(namespace.clone());
        }
        if let Envelope::Other(obj) = resource {
            let ns = Value::String(namespace.clone());
            match kind.as_str() {
                "RoleBinding" | "ClusterRoleBinding" => {
                    if let Some(subjects) = obj.data.get_mut("subjects").and_then(Value::as_array_mut) {
                        for subject in subjects {
                            if subject.get("kind").and_then(Value::as_str) == Some("ServiceAccount") {
                                subject["namespace"] = ns.clone();
                            }
                        }
                    }
                }
                "MutatingWebhookConfiguration" | "ValidatingWebhookConfiguration" => {
                    if let Some(webhooks) = obj.data.get_mut("webhooks").and_then(Value::as_array_mut) {
                        for webhook in webhooks {
                            if let Some(service) = webhook.pointer_mut("/clientConfig/service") {
                                service["namespace"] = ns.clone();
                            }
                        }
                    }
                }
                "APIService" => {
                    if let Some(service) = obj.data.pointer_mut("/spec/service") {
                        service["namespace"] = ns;
                    }
                }
                _ => {}
            }
        }
        Ok(())
    })
}

/// Make the instance the controlling owner of every namespaced template
///
/// Cluster-scoped resources cannot be owned by a namespaced instance and are
/// left alone; the uninstall path removes them explicitly.
pub fn inject_owner(owner: OwnerReference) -> Transformer {
    transformer(move |resource| {
        if is_cluster_scoped(resource.kind()) {
            return Ok(());
        }
        let refs = resource
            .metadata_mut()
            .owner_references
            .get_or_insert_with(Vec::new);
        match refs.iter_mut().find(|r| r.uid == owner.uid) {
            Some(existing) => existing.clone_from(&owner),
            None => refs.push(owner.clone()),
        }
        Ok(())
    })
}

/// Stamp the instance's identity on every template
pub fn owner_annotations(name: &str, namespace: &str) -> Transformer {
    let name = name.to_string();
    let namespace = namespace.to_string();
    transformer(move |resource| {
        let annotations = &mut resource.metadata_mut().annotations;
        upsert_entry(annotations, OWNER_NAME_ANNOTATION, &name);
        upsert_entry(annotations, OWNER_NAMESPACE_ANNOTATION, &namespace);
        Ok(())
    })
}
