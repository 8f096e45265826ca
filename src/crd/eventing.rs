//! # KnativeEventing
//!
//! Custom resource describing an eventing control plane install.

use crate::crd::{CommonSpec, Component, ComponentStatus};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "operator.knative.dev",
    version = "v1beta1",
    kind = "KnativeEventing",
    namespaced,
    status = "ComponentStatus",
    shortname = "ke",
    printcolumn = r#"{"name":"Version", "type":"string", "jsonPath":".status.version"}, {"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}, {"name":"Reason", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].reason"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct KnativeEventingSpec {
    #[serde(flatten)]
    pub common: CommonSpec,
    /// How SinkBindings select their subjects: `inclusion` or `exclusion`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sink_binding_selection_mode: Option<String>,
}

impl Component for KnativeEventing {
    const COMPONENT: &'static str = "eventing";
    const HEALTH_LABEL: &'static str = "eventing_status";
    const FINALIZER: &'static str = "knativeeventings.operator.knative.dev";

    fn common_spec(&self) -> &CommonSpec {
        &self.spec.common
    }

    fn common_spec_mut(&mut self) -> &mut CommonSpec {
        &mut self.spec.common
    }

    fn component_status(&self) -> Option<&ComponentStatus> {
        self.status.as_ref()
    }

    fn component_status_mut(&mut self) -> &mut ComponentStatus {
        self.status.get_or_insert_with(ComponentStatus::default)
    }
}
