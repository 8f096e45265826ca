//! Informer-backed scaler backend.
//!
//! A background task polls for the Broker and InMemoryChannel CRDs
//! (`wait_for_crds`), then runs one reflector per kind. Every apply, delete
//! and initial-sync event is forwarded on the resync channel
//! (`forward_events`) so the eventing controller re-evaluates its
//! instances.

use super::{ScalerBackend, ScalerBackendFactory};
use crate::observability::metrics;
use anyhow::Context;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Api, ApiResource, DynamicObject};
use kube::core::GroupVersionKind;
use kube::Client;
use kube_runtime::reflector::{self, store::Writer, Store};
use kube_runtime::{watcher, WatchStreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const BROKER_CRD: &str = "brokers.eventing.knative.dev";
pub const IN_MEMORY_CHANNEL_CRD: &str = "inmemorychannels.messaging.knative.dev";

fn broker_resource() -> ApiResource {
    ApiResource::from_gvk(&GroupVersionKind::gvk("eventing.knative.dev", "v1", "Broker"))
}

fn in_memory_channel_resource() -> ApiResource {
    ApiResource::from_gvk(&GroupVersionKind::gvk(
        "messaging.knative.dev",
        "v1",
        "InMemoryChannel",
    ))
}

/// Builds a fresh informer backend for every scaler start
#[derive(Clone)]
pub struct InformerScalerFactory {
    client: Client,
    resync: broadcast::Sender<()>,
    poll_interval: Duration,
}

impl std::fmt::Debug for InformerScalerFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InformerScalerFactory")
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

impl InformerScalerFactory {
    #[must_use]
    pub fn new(client: Client, resync: broadcast::Sender<()>, poll_interval: Duration) -> Self {
        Self {
            client,
            resync,
            poll_interval,
        }
    }
}

impl ScalerBackendFactory for InformerScalerFactory {
    fn start(&self) -> Arc<dyn ScalerBackend> {
        let token = CancellationToken::new();
        let crds_installed = Arc::new(AtomicBool::new(false));
        let broker_writer = Writer::new(broker_resource());
        let channel_writer = Writer::new(in_memory_channel_resource());
        let brokers = broker_writer.as_reader();
        let channels = channel_writer.as_reader();

        let task = tokio::spawn(run_informers(
            self.client.clone(),
            self.resync.clone(),
            self.poll_interval,
            token.clone(),
            crds_installed.clone(),
            broker_writer,
            channel_writer,
        ));

        Arc::new(InformerBackend {
            token,
            crds_installed,
            brokers,
            channels,
            task: Mutex::new(Some(task)),
        })
    }
}

struct InformerBackend {
    token: CancellationToken,
    crds_installed: Arc<AtomicBool>,
    brokers: Store<DynamicObject>,
    channels: Store<DynamicObject>,
    task: Mutex<Option<JoinHandle<()>>>,
}

#[async_trait]
impl ScalerBackend for InformerBackend {
    fn crds_installed(&self) -> bool {
        self.crds_installed.load(Ordering::Acquire)
    }

    async fn wait_until_ready(&self) -> anyhow::Result<()> {
        self.brokers
            .wait_until_ready()
            .await
            .context("Broker informer stopped before its initial sync")?;
        self.channels
            .wait_until_ready()
            .await
            .context("InMemoryChannel informer stopped before its initial sync")?;
        Ok(())
    }

    fn brokers(&self) -> Vec<DynamicObject> {
        self.brokers
            .state()
            .iter()
            .map(|b| DynamicObject::clone(b))
            .collect()
    }

    fn in_memory_channel_count(&self) -> usize {
        self.channels.state().len()
    }

    async fn shutdown(&self) {
        self.token.cancel();
        let task = self.task.lock().ok().and_then(|mut t| t.take());
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!("Scaler informer task ended abnormally: {}", e);
            }
        }
    }
}

async fn run_informers(
    client: Client,
    resync: broadcast::Sender<()>,
    poll_interval: Duration,
    token: CancellationToken,
    crds_installed: Arc<AtomicBool>,
    broker_writer: Writer<DynamicObject>,
    channel_writer: Writer<DynamicObject>,
) {
    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let crds = &crds;
    if !wait_for_crds(move || crds_present(crds), poll_interval, &token, &crds_installed).await {
        return;
    }
    info!("Broker and InMemoryChannel CRDs installed, starting informers");

    let brokers = inform(
        client.clone(),
        broker_resource(),
        broker_writer,
        resync.clone(),
    );
    let channels = inform(client, in_memory_channel_resource(), channel_writer, resync);
    tokio::select! {
        () = token.cancelled() => debug!("Scaler informers cancelled"),
        ((), ()) = futures::future::join(brokers, channels) => warn!("Scaler informers ended"),
    }
}

/// Poll until both CRDs exist, then raise `installed`
///
/// Returns false when cancelled first; `installed` stays false then.
async fn wait_for_crds<F, Fut>(
    mut crds_present: F,
    poll_interval: Duration,
    token: &CancellationToken,
    installed: &AtomicBool,
) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    loop {
        if token.is_cancelled() {
            return false;
        }
        if crds_present().await {
            installed.store(true, Ordering::Release);
            return true;
        }
        tokio::select! {
            () = token.cancelled() => return false,
            () = tokio::time::sleep(poll_interval) => {}
        }
    }
}

async fn crds_present(crds: &Api<CustomResourceDefinition>) -> bool {
    for name in [BROKER_CRD, IN_MEMORY_CHANNEL_CRD] {
        match crds.get_opt(name).await {
            Ok(Some(_)) => {}
            Ok(None) => return false,
            Err(e) => {
                debug!(crd = name, "Failed to look up CRD: {}", e);
                return false;
            }
        }
    }
    true
}

async fn inform(
    client: Client,
    resource: ApiResource,
    writer: Writer<DynamicObject>,
    resync: broadcast::Sender<()>,
) {
    let kind = resource.kind.clone();
    let reader = writer.as_reader();
    let api: Api<DynamicObject> = Api::all_with(client, &resource);
    let events = reflector::reflector(writer, watcher::watcher(api, watcher::Config::default()))
        .default_backoff();
    forward_events(events, &kind, &reader, &resync).await;
}

/// Publish the cache size and request a resync on every change
///
/// Initial-list pages are folded into the single `InitDone` notification.
async fn forward_events<S>(
    events: S,
    kind: &str,
    reader: &Store<DynamicObject>,
    resync: &broadcast::Sender<()>,
) where
    S: Stream<Item = watcher::Result<watcher::Event<DynamicObject>>>,
{
    events
        .for_each(|event| {
            match event {
                Ok(watcher::Event::Apply(_) | watcher::Event::Delete(_) | watcher::Event::InitDone) => {
                    metrics::set_resources(kind, reader.state().len());
                    // No receivers just means no eventing controller is running
                    if resync.send(()).is_err() {
                        debug!(kind, "No resync subscribers");
                    }
                }
                Ok(_) => {}
                Err(e) => warn!(kind, "Scaler informer error: {}", e),
            }
            futures::future::ready(())
        })
        .await;
}
