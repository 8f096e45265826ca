//! # Dynamic Component Scaler
//!
//! Scales the broker and in-memory-channel workloads of eventing up or
//! down depending on whether anything in the cluster uses them.
//!
//! The scaler is an explicit state machine behind one async mutex:
//!
//! ```text
//! Uninitialized --scale()--> Running(backend) --finalize()--> Uninitialized
//! ```
//!
//! The backend owns the informers. While the eventing CRDs are not
//! installed, `scale()` leaves the instance untouched. The mutex only guards
//! transitions: `scale()` waits for the initial sync on a shared handle with
//! a bounded timeout, so `finalize()` is never blocked behind it.

pub mod decision;
mod informer;

pub use decision::apply_scaling;
pub use informer::InformerScalerFactory;

use crate::crd::{Component, KnativeEventing};
use async_trait::async_trait;
use kube::api::DynamicObject;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// How long `scale()` waits for the informers' initial sync before giving up
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(30);

/// Adjusts workload replica overrides of an instance before it is transformed
#[async_trait]
pub trait WorkloadScaler<K: Component>: Send + Sync {
    async fn scale(&self, instance: &mut K) -> anyhow::Result<()>;

    /// Stop background work; the next `scale()` starts over
    async fn finalize(&self) -> anyhow::Result<()>;
}

/// Observed Brokers and InMemoryChannels
#[async_trait]
pub trait ScalerBackend: Send + Sync {
    /// Whether the Broker and InMemoryChannel CRDs have been seen
    fn crds_installed(&self) -> bool;

    /// Wait until both caches finished their initial list
    async fn wait_until_ready(&self) -> anyhow::Result<()>;

    fn brokers(&self) -> Vec<DynamicObject>;

    fn in_memory_channel_count(&self) -> usize;

    /// Cancel background tasks and wait for them to exit
    async fn shutdown(&self);
}

pub trait ScalerBackendFactory: Send + Sync {
    fn start(&self) -> Arc<dyn ScalerBackend>;
}

enum ScalerState {
    Uninitialized,
    Running(Arc<dyn ScalerBackend>),
}

impl ScalerState {
    fn as_str(&self) -> &'static str {
        match self {
            ScalerState::Uninitialized => "uninitialized",
            ScalerState::Running(_) => "running",
        }
    }
}

pub struct ComponentScaler {
    state: Mutex<ScalerState>,
    factory: Arc<dyn ScalerBackendFactory>,
    ready_timeout: Duration,
}

impl fmt::Debug for ComponentScaler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.try_lock().map_or("locked", |s| s.as_str());
        f.debug_struct("ComponentScaler")
            .field("state", &state)
            .field("ready_timeout", &self.ready_timeout)
            .finish_non_exhaustive()
    }
}

impl ComponentScaler {
    #[must_use]
    pub fn new(factory: Arc<dyn ScalerBackendFactory>) -> Self {
        Self {
            state: Mutex::new(ScalerState::Uninitialized),
            factory,
            ready_timeout: DEFAULT_READY_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_ready_timeout(mut self, ready_timeout: Duration) -> Self {
        self.ready_timeout = ready_timeout;
        self
    }

    /// Whether a backend is currently running
    pub async fn is_running(&self) -> bool {
        matches!(*self.state.lock().await, ScalerState::Running(_))
    }
}

#[async_trait]
impl WorkloadScaler<KnativeEventing> for ComponentScaler {
    async fn scale(&self, instance: &mut KnativeEventing) -> anyhow::Result<()> {
        let backend = {
            let mut state = self.state.lock().await;
            if let ScalerState::Running(backend) = &*state {
                backend.clone()
            } else {
                info!("Starting workload scaler informers");
                let backend = self.factory.start();
                *state = ScalerState::Running(backend.clone());
                backend
            }
        };
        if !backend.crds_installed() {
            debug!("Broker/InMemoryChannel CRDs not installed yet, skipping scaling");
            return Ok(());
        }
        tokio::time::timeout(self.ready_timeout, backend.wait_until_ready())
            .await
            .map_err(|_| {
                anyhow::anyhow!(
                    "Scaler informers did not sync within {:?}, will retry",
                    self.ready_timeout
                )
            })??;

        let brokers_in_use = decision::has_mt_channel_brokers(&backend.brokers());
        let channels_in_use = backend.in_memory_channel_count() > 0;
        debug!(brokers_in_use, channels_in_use, "Applying scaling rules");
        apply_scaling(&mut instance.spec.common, brokers_in_use, channels_in_use);
        Ok(())
    }

    async fn finalize(&self) -> anyhow::Result<()> {
        let mut state = self.state.lock().await;
        if let ScalerState::Running(backend) =
            std::mem::replace(&mut *state, ScalerState::Uninitialized)
        {
            info!("Stopping workload scaler informers");
            backend.shutdown().await;
        }
        Ok(())
    }
}
