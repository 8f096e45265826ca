//! # Types
//!
//! Core types for the reconciler.

use crate::controller::backoff::FibonacciBackoff;
use crate::controller::extension::{Extensions, Platforms};
use crate::controller::manifest::transform::versioned_job_names;
use crate::controller::manifest::{Manifest, TransformError, Transformer};
use crate::controller::scaler::WorkloadScaler;
use crate::controller::store::{ResourceStore, StoreError};
use crate::crd::Component;
use kube::ResourceExt;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcilerError {
    #[error("Store operation failed: {0}")]
    Store(#[from] StoreError),

    #[error("Manifest transform failed: {0}")]
    Transform(#[from] TransformError),

    #[error("Failed to apply {kind} {name}: {source}")]
    Apply {
        kind: String,
        name: String,
        #[source]
        source: StoreError,
    },

    #[error("Failed to convert object: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Install hook failed: {0:#}")]
    Hook(anyhow::Error),

    #[error("Scaler failed: {0:#}")]
    Scaler(anyhow::Error),

    #[error("Finalizer failed: {0:#}")]
    Finalize(anyhow::Error),
}

/// Namespaced name of a component instance
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn of<K: Component>(instance: &K) -> Self {
        Self {
            namespace: instance.namespace().unwrap_or_default(),
            name: instance.name_any(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Backoff state for a specific resource
/// Tracks error count and backoff calculator for progressive retries
#[derive(Debug, Clone)]
pub struct BackoffState {
    pub backoff: FibonacciBackoff,
    pub error_count: u32,
}

impl Default for BackoffState {
    fn default() -> Self {
        Self::new()
    }
}

impl BackoffState {
    #[must_use]
    pub fn new() -> Self {
        Self {
            backoff: FibonacciBackoff::new(1, 10),
            error_count: 0,
        }
    }

    pub fn increment_error(&mut self) {
        self.error_count += 1;
    }

    pub fn reset(&mut self) {
        self.error_count = 0;
        self.backoff.reset();
    }
}

#[derive(Debug, Clone)]
pub struct ReconcilerSettings {
    /// Version recorded in `status.version` after a successful install
    pub version: String,
    /// Periodic resync, also used when a dependency is not ready yet
    pub resync_period: Duration,
}

/// Reconcile context for one component kind
pub struct Reconciler<K: Component> {
    pub store: Arc<dyn ResourceStore>,
    /// Base manifest after platform resolution; never mutated afterwards
    pub manifest: Arc<Manifest>,
    pub extensions: Extensions<K>,
    pub scaler: Option<Arc<dyn WorkloadScaler<K>>>,
    pub settings: ReconcilerSettings,
    // Keyed by namespace/name, driven by the error policy
    pub backoff_states: Arc<Mutex<HashMap<String, BackoffState>>>,
}

impl<K: Component> fmt::Debug for Reconciler<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reconciler")
            .field("component", &K::COMPONENT)
            .field("resources", &self.manifest.len())
            .field("extensions", &self.extensions)
            .field("scaler", &self.scaler.is_some())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl<K: Component> Reconciler<K> {
    /// Resolve platform extensions against `manifest` and build the context
    pub async fn new(
        store: Arc<dyn ResourceStore>,
        mut manifest: Manifest,
        platforms: &Platforms<K>,
        scaler: Option<Arc<dyn WorkloadScaler<K>>>,
        settings: ReconcilerSettings,
    ) -> Result<Self, ReconcilerError> {
        let extensions = platforms.extend(&store, &mut manifest).await?;
        tracing::info!(
            component = K::COMPONENT,
            resources = manifest.len(),
            extensions = ?extensions.names(),
            "Reconciler initialized"
        );
        Ok(Self {
            store,
            manifest: Arc::new(manifest),
            extensions,
            scaler,
            settings,
            backoff_states: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Transformer chain for one pass over `instance`
    ///
    /// Jobs are renamed per operator version on top of the extension chain.
    pub(super) fn transformers(&self, instance: &K) -> Vec<Transformer> {
        let mut transformers = self.extensions.transformers(instance);
        transformers.push(versioned_job_names(&self.settings.version));
        transformers
    }

    /// Forget the error backoff of `key` after a successful pass
    pub fn reset_backoff(&self, key: &ObjectKey) {
        if let Ok(mut states) = self.backoff_states.lock() {
            if let Some(state) = states.get_mut(&key.to_string()) {
                state.reset();
            }
        }
    }
}
