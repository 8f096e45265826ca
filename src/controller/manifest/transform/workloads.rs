//! Replica, env and resource adjustments for Deployments and StatefulSets.

use super::{transformer, upsert_env, upsert_map, Transformer};
use crate::controller::manifest::Envelope;
use crate::crd::WorkloadOverride;
use k8s_openapi::api::core::v1::{PodTemplateSpec, ResourceRequirements};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

/// Apply the HA replica count to every Deployment and StatefulSet
///
/// Workloads the manifest pins to zero replicas are left alone.
pub fn ha_replicas(replicas: Option<i32>) -> Transformer {
    transformer(move |resource| {
        let Some(replicas) = replicas else {
            return Ok(());
        };
        if let Some(current) = resource.replicas_mut() {
            if *current != Some(0) {
                *current = Some(replicas);
            }
        }
        Ok(())
    })
}

/// Apply per-workload overrides (replicas, env, pod labels/annotations)
pub fn workload_overrides(overrides: &[WorkloadOverride]) -> Transformer {
    let overrides = overrides.to_vec();
    transformer(move |resource| {
        if !resource.is_workload() || overrides.is_empty() {
            return Ok(());
        }
        let name = resource.name().to_string();
        for o in overrides.iter().filter(|o| o.name == name) {
            if let (Some(replicas), Some(current)) = (o.replicas, resource.replicas_mut()) {
                *current = Some(replicas);
            }
            if let Some(template) = resource.pod_template_mut() {
                apply_to_template(template, o);
            }
        }
        Ok(())
    })
}

fn apply_to_template(template: &mut PodTemplateSpec, o: &WorkloadOverride) {
    let meta = template.metadata.get_or_insert_with(Default::default);
    upsert_map(&mut meta.labels, &o.labels);
    upsert_map(&mut meta.annotations, &o.annotations);

    let Some(pod) = template.spec.as_mut() else {
        return;
    };
    for env_override in &o.env {
        let Some(container) = pod
            .containers
            .iter_mut()
            .find(|c| c.name == env_override.container)
        else {
            continue;
        };
        let env = container.env.get_or_insert_with(Vec::new);
        for var in &env_override.env_vars {
            upsert_env(env, &var.name, &var.value);
        }
    }
}

/// Upsert env vars into one container of one Deployment
pub fn inject_environment(
    deployment: &str,
    container: &str,
    vars: Vec<(String, String)>,
) -> Transformer {
    let deployment = deployment.to_string();
    let container = container.to_string();
    transformer(move |resource| {
        let Envelope::Deployment(d) = resource else {
            return Ok(());
        };
        if d.metadata.name.as_deref() != Some(deployment.as_str()) {
            return Ok(());
        }
        let Some(pod) = d.spec.as_mut().and_then(|s| s.template.spec.as_mut()) else {
            return Ok(());
        };
        for c in pod.containers.iter_mut().filter(|c| c.name == container) {
            let env = c.env.get_or_insert_with(Vec::new);
            for (name, value) in &vars {
                upsert_env(env, name, value);
            }
            if env.is_empty() {
                c.env = None;
            }
        }
        Ok(())
    })
}

/// Set a memory limit on a container that does not declare one
pub fn container_memory_limit(deployment: &str, container: &str, limit: &str) -> Transformer {
    let deployment = deployment.to_string();
    let container = container.to_string();
    let limit = limit.to_string();
    transformer(move |resource| {
        let Envelope::Deployment(d) = resource else {
            return Ok(());
        };
        if d.metadata.name.as_deref() != Some(deployment.as_str()) {
            return Ok(());
        }
        let Some(pod) = d.spec.as_mut().and_then(|s| s.template.spec.as_mut()) else {
            return Ok(());
        };
        for c in pod.containers.iter_mut().filter(|c| c.name == container) {
            let resources = c.resources.get_or_insert_with(ResourceRequirements::default);
            resources
                .limits
                .get_or_insert_with(Default::default)
                .entry("memory".to_string())
                .or_insert_with(|| Quantity(limit.clone()));
        }
        Ok(())
    })
}
