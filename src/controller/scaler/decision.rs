//! Replica decisions for the on-demand eventing workloads.

use crate::crd::{CommonSpec, WorkloadOverride};
use kube::api::DynamicObject;
use kube::ResourceExt;

pub const BROKER_CLASS_ANNOTATION: &str = "eventing.knative.dev/broker.class";
pub const MT_CHANNEL_BROKER_CLASS: &str = "MTChannelBasedBroker";

/// Workloads backing multi-tenant channel-based brokers
pub const MT_BROKER_WORKLOADS: [&str; 3] =
    ["mt-broker-controller", "mt-broker-ingress", "mt-broker-filter"];

/// Workloads backing in-memory channels
pub const IMC_WORKLOADS: [&str; 2] = ["imc-controller", "imc-dispatcher"];

/// Whether any Broker is of the multi-tenant channel-based class
#[must_use]
pub fn has_mt_channel_brokers(brokers: &[DynamicObject]) -> bool {
    brokers.iter().any(|b| {
        b.annotations()
            .get(BROKER_CLASS_ANNOTATION)
            .is_some_and(|class| class == MT_CHANNEL_BROKER_CLASS)
    })
}

/// Give each workload a replica count when none is set yet
///
/// Uses the HA replica count when configured, otherwise 1. Missing
/// override entries are appended.
pub fn ensure_at_least_one_replica(spec: &mut CommonSpec, workloads: &[&str]) {
    let replicas = spec.ha_replicas().unwrap_or(1);
    for name in workloads {
        set_if_unset(spec, name, replicas);
    }
}

/// Pin each workload to zero replicas unless a count is already set
pub fn scale_to_zero(spec: &mut CommonSpec, workloads: &[&str]) {
    for name in workloads {
        set_if_unset(spec, name, 0);
    }
}

fn set_if_unset(spec: &mut CommonSpec, name: &str, replicas: i32) {
    match spec.workload_mut(name) {
        Some(workload) => {
            if workload.replicas.is_none() {
                workload.replicas = Some(replicas);
            }
        }
        None => spec.workloads.push(WorkloadOverride {
            replicas: Some(replicas),
            ..WorkloadOverride::named(name)
        }),
    }
}

/// Apply both scaling rules independently
pub fn apply_scaling(spec: &mut CommonSpec, brokers_in_use: bool, channels_in_use: bool) {
    if brokers_in_use {
        ensure_at_least_one_replica(spec, &MT_BROKER_WORKLOADS);
    } else {
        scale_to_zero(spec, &MT_BROKER_WORKLOADS);
    }
    if channels_in_use {
        ensure_at_least_one_replica(spec, &IMC_WORKLOADS);
    } else {
        scale_to_zero(spec, &IMC_WORKLOADS);
    }
}
