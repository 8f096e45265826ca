//! # Apply
//!
//! Create-or-update of transformed templates.
//!
//! Roles go first and RoleBindings second so that bindings never reference
//! a missing role; everything else follows in manifest order. An existing
//! object is only updated when the desired fields are not already present
//! on it, which keeps steady-state reconciles write-free.

use super::ReconcilerError;
use crate::controller::manifest::{is_role, is_role_binding, kind_of, Manifest};
use crate::controller::store::{gvk_of, name_of, ResourceStore};
use crate::observability::metrics;
use kube::api::DynamicObject;
use serde_json::Value;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyAction {
    Created,
    Updated,
    Unchanged,
}

impl ApplyAction {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ApplyAction::Created => "create",
            ApplyAction::Updated => "update",
            ApplyAction::Unchanged => "unchanged",
        }
    }
}

/// Templates in apply order
pub fn apply_order(manifest: &Manifest) -> Vec<&DynamicObject> {
    let resources = manifest.resources();
    let roles = resources.iter().filter(|r| is_role(r));
    let bindings = resources.iter().filter(|r| is_role_binding(r));
    let rest = resources
        .iter()
        .filter(|r| !is_role(r) && !is_role_binding(r));
    roles.chain(bindings).chain(rest).collect()
}

/// Apply every template; the first failure aborts
pub async fn apply_manifest(
    store: &dyn ResourceStore,
    manifest: &Manifest,
) -> Result<(), ReconcilerError> {
    for resource in apply_order(manifest) {
        let action = apply_resource(store, resource).await?;
        debug!(
            kind = kind_of(resource),
            name = name_of(resource),
            namespace = resource.metadata.namespace.as_deref().unwrap_or(""),
            action = action.as_str(),
            "Applied resource"
        );
        if action != ApplyAction::Unchanged {
            metrics::increment_resources_applied(action.as_str());
        }
    }
    Ok(())
}

pub async fn apply_resource(
    store: &dyn ResourceStore,
    desired: &DynamicObject,
) -> Result<ApplyAction, ReconcilerError> {
    let gvk = gvk_of(desired)?;
    let namespace = desired.metadata.namespace.as_deref();
    let name = name_of(desired);
    let apply_error = |source| ReconcilerError::Apply {
        kind: gvk.kind.clone(),
        name: name.to_string(),
        source,
    };

    let live = match store.get(&gvk, namespace, name).await {
        Ok(live) => live,
        Err(e) if e.is_not_found() => {
            store.create(desired).await.map_err(apply_error)?;
            return Ok(ApplyAction::Created);
        }
        Err(e) => return Err(apply_error(e)),
    };

    let desired_value = serde_json::to_value(desired)?;
    let mut merged = serde_json::to_value(&live)?;
    if is_subset(&desired_value, &merged) {
        return Ok(ApplyAction::Unchanged);
    }
    merge(&mut merged, &desired_value);
    let updated: DynamicObject = serde_json::from_value(merged)?;
    store.update(&updated).await.map_err(apply_error)?;
    Ok(ApplyAction::Updated)
}

/// True when every field set in `desired` has the same value in `live`
///
/// Arrays must match element by element.
#[must_use]
pub fn is_subset(desired: &Value, live: &Value) -> bool {
    match (desired, live) {
        (Value::Null, _) => true,
        (Value::Object(d), Value::Object(l)) => d
            .iter()
            .all(|(k, v)| l.get(k).map_or(v.is_null(), |lv| is_subset(v, lv))),
        (Value::Array(d), Value::Array(l)) => {
            d.len() == l.len() && d.iter().zip(l).all(|(dv, lv)| is_subset(dv, lv))
        }
        _ => desired == live,
    }
}

/// Overlay `desired` onto `live`; objects merge, everything else is replaced
pub fn merge(live: &mut Value, desired: &Value) {
    match (live, desired) {
        (Value::Object(l), Value::Object(d)) => {
            for (k, v) in d {
                if v.is_null() {
                    continue;
                }
                match l.get_mut(k) {
                    Some(existing) => merge(existing, v),
                    None => {
                        l.insert(k.clone(), v.clone());
                    }
                }
            }
        }
        (l, d) => *l = d.clone(),
    }
}
