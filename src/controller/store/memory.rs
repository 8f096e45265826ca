//! In-process [`ResourceStore`] used by tests.
//!
//! Mimics the API-server behaviours the reconciler relies on:
//! resource versions and uids on write, `status` owned by the status
//! subresource, and deletion blocked by finalizers.

use super::{api_version_of, gvk_of, name_of, ResourceStore, StoreError};
use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::api::DynamicObject;
use kube::core::GroupVersionKind;
use std::collections::BTreeMap;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    Get,
    List,
    Create,
    Update,
    UpdateStatus,
    Delete,
}

/// A recorded store call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreEvent {
    pub op: StoreOp,
    pub kind: String,
    pub namespace: Option<String>,
    pub name: String,
}

type Key = (String, String, String, String);

#[derive(Debug, Default)]
struct MemoryState {
    objects: BTreeMap<Key, DynamicObject>,
    next_version: u64,
    failures: Vec<(StoreOp, String)>,
    events: Vec<StoreEvent>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

fn key(gvk: &GroupVersionKind, namespace: Option<&str>, name: &str) -> Key {
    (
        api_version_of(gvk),
        gvk.kind.clone(),
        namespace.unwrap_or_default().to_string(),
        name.to_string(),
    )
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        // A poisoned lock only means a test panicked mid-call; the data is still usable
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Seed an object without recording an event
    pub fn insert(&self, obj: DynamicObject) -> Result<(), StoreError> {
        let gvk = gvk_of(&obj)?;
        let k = key(&gvk, obj.metadata.namespace.as_deref(), name_of(&obj));
        self.lock().objects.insert(k, obj);
        Ok(())
    }

    /// Make every subsequent `op` on `kind` fail
    pub fn fail_on(&self, op: StoreOp, kind: &str) {
        self.lock().failures.push((op, kind.to_string()));
    }

    pub fn clear_failures(&self) {
        self.lock().failures.clear();
    }

    #[must_use]
    pub fn object(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Option<DynamicObject> {
        self.lock().objects.get(&key(gvk, namespace, name)).cloned()
    }

    /// All stored objects of a kind, in key order
    #[must_use]
    pub fn objects_of_kind(&self, kind: &str) -> Vec<DynamicObject> {
        self.lock()
            .objects
            .iter()
            .filter(|(k, _)| k.1 == kind)
            .map(|(_, o)| o.clone())
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().objects.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn events(&self) -> Vec<StoreEvent> {
        self.lock().events.clone()
    }

    /// Recorded calls of one operation
    #[must_use]
    pub fn events_of(&self, op: StoreOp) -> Vec<StoreEvent> {
        self.lock()
            .events
            .iter()
            .filter(|e| e.op == op)
            .cloned()
            .collect()
    }

    pub fn clear_events(&self) {
        self.lock().events.clear();
    }

    fn record(
        state: &mut MemoryState,
        op: StoreOp,
        kind: &str,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<(), StoreError> {
        state.events.push(StoreEvent {
            op,
            kind: kind.to_string(),
            namespace: namespace.map(str::to_string),
            name: name.to_string(),
        });
        if state.failures.iter().any(|(o, k)| *o == op && k == kind) {
            return Err(StoreError::Injected(format!("{op:?} {kind} {name}")));
        }
        Ok(())
    }

    fn bump_version(state: &mut MemoryState, obj: &mut DynamicObject) {
        state.next_version += 1;
        obj.metadata.resource_version = Some(state.next_version.to_string());
    }
}

#[async_trait]
impl ResourceStore for MemoryStore {
    async fn get(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<DynamicObject, StoreError> {
        let mut state = self.lock();
        Self::record(&mut state, StoreOp::Get, &gvk.kind, namespace, name)?;
        state
            .objects
            .get(&key(gvk, namespace, name))
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                kind: gvk.kind.clone(),
                name: name.to_string(),
            })
    }

    async fn list(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
    ) -> Result<Vec<DynamicObject>, StoreError> {
        let mut state = self.lock();
        Self::record(&mut state, StoreOp::List, &gvk.kind, namespace, "")?;
        let api_version = api_version_of(gvk);
        Ok(state
            .objects
            .iter()
            .filter(|(k, _)| k.0 == api_version && k.1 == gvk.kind)
            .filter(|(k, _)| namespace.is_none_or(|ns| k.2 == ns))
            .map(|(_, o)| o.clone())
            .collect())
    }

    async fn create(&self, obj: &DynamicObject) -> Result<DynamicObject, StoreError> {
        let gvk = gvk_of(obj)?;
        let namespace = obj.metadata.namespace.as_deref();
        let name = name_of(obj);
        let mut state = self.lock();
        Self::record(&mut state, StoreOp::Create, &gvk.kind, namespace, name)?;
        let k = key(&gvk, namespace, name);
        if state.objects.contains_key(&k) {
            return Err(StoreError::AlreadyExists {
                kind: gvk.kind.clone(),
                name: name.to_string(),
            });
        }
        let mut created = obj.clone();
        created.metadata.uid = Some(format!("uid-{}", state.next_version + 1));
        Self::bump_version(&mut state, &mut created);
        state.objects.insert(k, created.clone());
        Ok(created)
    }

    async fn update(&self, obj: &DynamicObject) -> Result<DynamicObject, StoreError> {
        let gvk = gvk_of(obj)?;
        let namespace = obj.metadata.namespace.as_deref();
        let name = name_of(obj);
        let mut state = self.lock();
        Self::record(&mut state, StoreOp::Update, &gvk.kind, namespace, name)?;
        let k = key(&gvk, namespace, name);
        let Some(live) = state.objects.get(&k).cloned() else {
            return Err(StoreError::NotFound {
                kind: gvk.kind.clone(),
                name: name.to_string(),
            });
        };

        let mut updated = obj.clone();
        // Status is owned by the status subresource
        match live.data.get("status") {
            Some(status) => {
                updated.data["status"] = status.clone();
            }
            None => {
                if let Some(data) = updated.data.as_object_mut() {
                    data.remove("status");
                }
            }
        }
        updated.metadata.uid.clone_from(&live.metadata.uid);
        updated
            .metadata
            .deletion_timestamp
            .clone_from(&live.metadata.deletion_timestamp);

        let finalizers_empty = updated
            .metadata
            .finalizers
            .as_ref()
            .is_none_or(Vec::is_empty);
        if updated.metadata.deletion_timestamp.is_some() && finalizers_empty {
            state.objects.remove(&k);
            return Ok(updated);
        }

        Self::bump_version(&mut state, &mut updated);
        state.objects.insert(k, updated.clone());
        Ok(updated)
    }

    async fn update_status(&self, obj: &DynamicObject) -> Result<DynamicObject, StoreError> {
        let gvk = gvk_of(obj)?;
        let namespace = obj.metadata.namespace.as_deref();
        let name = name_of(obj);
        let mut state = self.lock();
        Self::record(&mut state, StoreOp::UpdateStatus, &gvk.kind, namespace, name)?;
        let k = key(&gvk, namespace, name);
        let Some(mut live) = state.objects.get(&k).cloned() else {
            return Err(StoreError::NotFound {
                kind: gvk.kind.clone(),
                name: name.to_string(),
            });
        };
        let status = obj
            .data
            .get("status")
            .cloned()
            .unwrap_or(serde_json::Value::Null);
        live.data["status"] = status;
        Self::bump_version(&mut state, &mut live);
        state.objects.insert(k, live.clone());
        Ok(live)
    }

    async fn delete(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<(), StoreError> {
        let mut state = self.lock();
        Self::record(&mut state, StoreOp::Delete, &gvk.kind, namespace, name)?;
        let k = key(gvk, namespace, name);
        let Some(live) = state.objects.get_mut(&k) else {
            return Err(StoreError::NotFound {
                kind: gvk.kind.clone(),
                name: name.to_string(),
            });
        };
        let has_finalizers = live
            .metadata
            .finalizers
            .as_ref()
            .is_some_and(|f| !f.is_empty());
        if has_finalizers {
            if live.metadata.deletion_timestamp.is_none() {
                live.metadata.deletion_timestamp = Some(Time(chrono::Utc::now()));
            }
        } else {
            state.objects.remove(&k);
        }
        Ok(())
    }
}
