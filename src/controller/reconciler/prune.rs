//! # Pruning
//!
//! Removal of resources that older releases installed and the current
//! manifest no longer contains.

use crate::controller::store::{delete_if_present, name_of, parse_gvk, ResourceStore, StoreError};
use kube::core::GroupVersionKind;
use tracing::info;

/// A resource to delete once the install has converged
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObsoleteResource {
    pub gvk: GroupVersionKind,
    /// Namespaced entries live in the instance namespace
    pub namespaced: bool,
    pub name: String,
}

impl ObsoleteResource {
    #[must_use]
    pub fn namespaced(api_version: &str, kind: &str, name: &str) -> Self {
        Self {
            gvk: parse_gvk(api_version, kind),
            namespaced: true,
            name: name.to_string(),
        }
    }

    #[must_use]
    pub fn cluster(api_version: &str, kind: &str, name: &str) -> Self {
        Self {
            gvk: parse_gvk(api_version, kind),
            namespaced: false,
            name: name.to_string(),
        }
    }
}

/// Delete every obsolete resource and every lease matching a prefix
///
/// Missing objects (and kinds the cluster does not serve) count as already
/// pruned. Returns the number of objects actually deleted.
pub async fn prune(
    store: &dyn ResourceStore,
    namespace: &str,
    obsolete: &[ObsoleteResource],
    lease_prefixes: &[&str],
) -> Result<usize, StoreError> {
    let mut deleted = 0;
    for resource in obsolete {
        let ns = resource.namespaced.then_some(namespace);
        if delete_if_present(store, &resource.gvk, ns, &resource.name).await? {
            info!(
                kind = resource.gvk.kind.as_str(),
                name = resource.name.as_str(),
                "Deleted obsolete resource"
            );
            deleted += 1;
        }
    }

    if lease_prefixes.is_empty() {
        return Ok(deleted);
    }
    let lease = parse_gvk("coordination.k8s.io/v1", "Lease");
    let leases = match store.list(&lease, Some(namespace)).await {
        Ok(leases) => leases,
        Err(e) if e.is_not_found() => return Ok(deleted),
        Err(e) => return Err(e),
    };
    for item in &leases {
        let name = name_of(item);
        if lease_prefixes.iter().any(|p| name.starts_with(p))
            && delete_if_present(store, &lease, Some(namespace), name).await?
        {
            info!(lease = name, "Deleted obsolete lease");
            deleted += 1;
        }
    }
    Ok(deleted)
}
