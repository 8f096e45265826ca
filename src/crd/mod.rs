//! # Custom Resource Definitions
//!
//! Component custom resources and the [`Component`] trait the reconciler is
//! generic over.

mod eventing;
mod serving;
mod spec;
mod status;

pub use eventing::*;
pub use serving::*;
pub use spec::*;
pub use status::*;

use k8s_openapi::NamespaceResourceScope;
use kube::core::GroupVersionKind;
use kube::Resource;
use serde::{de::DeserializeOwned, Serialize};
use std::fmt::Debug;

/// A top-level component install resource
///
/// Implemented by every custom resource the reconcile engine manages.
pub trait Component:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    /// Short name used in spans and logs
    const COMPONENT: &'static str;
    /// Label value of the `knative_up` health gauge
    const HEALTH_LABEL: &'static str;
    /// Finalizer guarding the uninstall path
    const FINALIZER: &'static str;

    fn common_spec(&self) -> &CommonSpec;
    fn common_spec_mut(&mut self) -> &mut CommonSpec;
    fn component_status(&self) -> Option<&ComponentStatus>;
    fn component_status_mut(&mut self) -> &mut ComponentStatus;

    /// Group/version/kind used to address the resource through a `ResourceStore`
    #[must_use]
    fn gvk() -> GroupVersionKind {
        GroupVersionKind::gvk(&Self::group(&()), &Self::version(&()), &Self::kind(&()))
    }
}
