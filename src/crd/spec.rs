//! # Common Spec
//!
//! Spec fields shared by every component custom resource.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Configmap name -> key -> value
pub type ConfigMapData = BTreeMap<String, BTreeMap<String, String>>;

/// Spec shared by `KnativeServing` and `KnativeEventing`
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CommonSpec {
    /// Entries copied into the component's configmaps.
    /// The outer key is the configmap name with or without the `config-` prefix.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub config: ConfigMapData,
    /// Image overrides
    #[serde(default)]
    pub registry: Registry,
    /// Per-workload overrides (replicas, env, labels, annotations)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub workloads: Vec<WorkloadOverride>,
    /// High-availability settings applied to every replicated workload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub high_availability: Option<HighAvailability>,
}

impl CommonSpec {
    /// Set `config[cm][key] = value`, creating the configmap entry if needed
    pub fn configure(&mut self, cm: &str, key: &str, value: &str) {
        self.config
            .entry(cm.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
    }

    /// Set `config[cm][key] = value` only when the key is not present yet
    pub fn configure_if_unset(&mut self, cm: &str, key: &str, value: &str) {
        self.config
            .entry(cm.to_string())
            .or_default()
            .entry(key.to_string())
            .or_insert_with(|| value.to_string());
    }

    /// Replica count requested by the HA settings, if any
    #[must_use]
    pub fn ha_replicas(&self) -> Option<i32> {
        self.high_availability.as_ref().and_then(|ha| ha.replicas)
    }

    #[must_use]
    pub fn workload(&self, name: &str) -> Option<&WorkloadOverride> {
        self.workloads.iter().find(|w| w.name == name)
    }

    pub fn workload_mut(&mut self, name: &str) -> Option<&mut WorkloadOverride> {
        self.workloads.iter_mut().find(|w| w.name == name)
    }
}

/// Image registry overrides
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Registry {
    /// Default image template; `${NAME}` is replaced with the container name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    /// Image per `<deployment>/<container>` or `<container>`
    #[serde(
        default,
        rename = "override",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub overrides: BTreeMap<String, String>,
}

/// Overrides for a single Deployment or StatefulSet
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadOverride {
    /// Name of the workload in the manifest
    pub name: String,
    /// Replica count; when unset the manifest (or HA) value is kept
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<ContainerEnvOverride>,
    /// Pod template labels
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Pod template annotations
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

impl WorkloadOverride {
    #[must_use]
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }
}

/// Env vars for one container of a workload
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContainerEnvOverride {
    pub container: String,
    #[serde(default)]
    pub env_vars: Vec<EnvVarOverride>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EnvVarOverride {
    pub name: String,
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HighAvailability {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,
}
