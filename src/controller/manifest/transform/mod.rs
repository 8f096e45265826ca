//! # Transforms
//!
//! Per-template transformers applied by [`Manifest::transform`](super::Manifest::transform).
//!
//! A transformer receives one decoded [`Envelope`] at a time. Transformers
//! that do not match the template are no-ops, and all of them are
//! idempotent: running one twice yields the same template.

mod compat;
mod config;
mod images;
mod owner;
mod platform;
mod workloads;

pub use compat::{remove_creation_timestamp, upgrade_deprecated_apis};
pub use config::config_from_instance;
pub use images::{image_map_from_environment, image_override, ImageMap};
pub use owner::{inject_namespace, inject_owner, is_cluster_scoped, owner_annotations};
pub use platform::{
    inject_label_into_namespaces, jobs_remove_ttl, restricted_security_context,
    sidecar_injection, versioned_job_names,
};
pub use workloads::{
    container_memory_limit, ha_replicas, inject_environment, workload_overrides,
};

use super::Envelope;
use k8s_openapi::api::core::v1::EnvVar;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("failed to decode {kind} {name}: {source}")]
    Decode {
        kind: String,
        name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode {kind} {name}: {source}")]
    Encode {
        kind: String,
        name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{kind} {name}: {message}")]
    Invalid {
        kind: String,
        name: String,
        message: String,
    },
}

/// A pure mutation of a single template
pub type Transformer = Arc<dyn Fn(&mut Envelope) -> Result<(), TransformError> + Send + Sync>;

/// Wrap a closure as a [`Transformer`]
pub fn transformer<F>(f: F) -> Transformer
where
    F: Fn(&mut Envelope) -> Result<(), TransformError> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Update an env var by name if present, else append it
///
/// An empty value removes the variable instead of storing an empty string.
pub fn upsert_env(env: &mut Vec<EnvVar>, name: &str, value: &str) {
    if value.is_empty() {
        env.retain(|e| e.name != name);
        return;
    }
    match env.iter_mut().find(|e| e.name == name) {
        Some(existing) => {
            existing.value = Some(value.to_string());
            existing.value_from = None;
        }
        None => env.push(EnvVar {
            name: name.to_string(),
            value: Some(value.to_string()),
            value_from: None,
        }),
    }
}

/// Insert every entry into an optional label/annotation map
pub fn upsert_map(target: &mut Option<BTreeMap<String, String>>, entries: &BTreeMap<String, String>) {
    if entries.is_empty() {
        return;
    }
    let map = target.get_or_insert_with(BTreeMap::new);
    for (k, v) in entries {
        map.insert(k.clone(), v.clone());
    }
}

/// Insert one label/annotation into an optional map
pub fn upsert_entry(target: &mut Option<BTreeMap<String, String>>, key: &str, value: &str) {
    target
        .get_or_insert_with(BTreeMap::new)
        .insert(key.to_string(), value.to_string());
}
