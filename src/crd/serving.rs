//! # KnativeServing
//!
//! Custom resource describing a serving control plane install.

use crate::crd::{CommonSpec, Component, ComponentStatus};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "operator.knative.dev",
    version = "v1beta1",
    kind = "KnativeServing",
    namespaced,
    status = "ComponentStatus",
    shortname = "ks",
    printcolumn = r#"{"name":"Version", "type":"string", "jsonPath":".status.version"}, {"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}, {"name":"Reason", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].reason"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct KnativeServingSpec {
    #[serde(flatten)]
    pub common: CommonSpec,
}

impl Component for KnativeServing {
    const COMPONENT: &'static str = "serving";
    const HEALTH_LABEL: &'static str = "serving_status";
    const FINALIZER: &'static str = "knativeservings.operator.knative.dev";

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
