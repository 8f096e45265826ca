//! # Initialization
//!
//! Operator startup: rustls provider, tracing, metrics, HTTP server,
//! Kubernetes client and one reconciler per enabled component.

use crate::config::ControllerConfig;
use crate::controller::extension::{Platform, Platforms};
use crate::controller::manifest::transform::image_map_from_environment;
use crate::controller::manifest::Manifest;
use crate::controller::reconciler::{Reconciler, ReconcilerSettings};
use crate::controller::scaler::{ComponentScaler, InformerScalerFactory, WorkloadScaler};
use crate::controller::server::{start_server, ServerState};
use crate::controller::store::{KubeStore, ResourceStore};
use crate::crd::{KnativeEventing, KnativeServing};
use crate::observability;
use crate::platform::{
    ComponentSettings, EventingPlatform, MeshPlatform, OpenShiftPlatform, ServingPlatform,
};
use anyhow::{Context, Result};
use kube::Client;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

/// Capacity of the scaler resync channel; overflow collapses into one resync
const RESYNC_CHANNEL_CAPACITY: usize = 16;

pub struct InitializationResult {
    pub client: Client,
    pub server_state: Arc<ServerState>,
}

impl std::fmt::Debug for InitializationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializationResult")
            .field("server_ready", &self.server_state.is_ready())
            .finish_non_exhaustive()
    }
}

/// Reconciler for `KnativeEventing` and the channel feeding its resyncs
#[derive(Debug)]
pub struct EventingRuntime {
    pub reconciler: Arc<Reconciler<KnativeEventing>>,
    pub resync: broadcast::Sender<()>,
}

fn init_tracing(config: &ControllerConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "knative_component_operator=info".into());
    let result = if config.json_logs() {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .try_init()
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).try_init()
    };
    if let Err(e) = result {
        eprintln!("Tracing subscriber already initialized: {e}");
    }
}

/// Start the shared runtime pieces
pub async fn initialize(config: &ControllerConfig) -> Result<InitializationResult> {
    // Must run before anything opens a TLS connection
    let provider_installed = rustls::crypto::ring::default_provider()
        .install_default()
        .is_ok();

    init_tracing(config);
    if !provider_installed {
        warn!("A rustls crypto provider was already installed");
    }

    info!("Starting Knative component operator");
    info!(
        "Build info: timestamp={}, datetime={}, git_hash={}",
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_DATETIME"),
        env!("BUILD_GIT_HASH")
    );

    observability::metrics::register_metrics().context("Failed to register metrics")?;

    let server_state = Arc::new(ServerState::new());
    let server_port = config.metrics_port;
    let server_state_clone = server_state.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(server_port, server_state_clone).await {
            error!("HTTP server error: {}", e);
        }
    });
    wait_for_server_ready(&server_state, &server_handle, config).await?;

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    Ok(InitializationResult {
        client,
        server_state,
    })
}

async fn wait_for_server_ready(
    server_state: &Arc<ServerState>,
    server_handle: &tokio::task::JoinHandle<()>,
    config: &ControllerConfig,
) -> Result<()> {
    let startup_timeout = config.server_startup_timeout();
    let poll_interval = config.server_poll_interval();
    let start_time = std::time::Instant::now();

    loop {
        if server_handle.is_finished() {
            return Err(anyhow::anyhow!("HTTP server failed to start"));
        }
        if server_state.is_ready() {
            info!("HTTP server is ready and accepting connections");
            return Ok(());
        }
        if start_time.elapsed() > startup_timeout {
            return Err(anyhow::anyhow!(
                "HTTP server failed to become ready within {} seconds",
                startup_timeout.as_secs()
            ));
        }
        tokio::time::sleep(poll_interval).await;
    }
}

fn component_settings(required_namespace: Option<&String>) -> ComponentSettings {
    ComponentSettings {
        required_namespace: required_namespace.cloned(),
        images: image_map_from_environment(std::env::vars()),
        proxy: ComponentSettings::proxy_from_env(),
    }
}

fn load_manifest(path: &std::path::Path) -> Result<Manifest> {
    let manifest = Manifest::from_path(path)
        .with_context(|| format!("Failed to load manifest from {}", path.display()))?;
    info!(
        path = %path.display(),
        resources = manifest.len(),
        "Loaded manifest"
    );
    Ok(manifest)
}

/// Build the `KnativeServing` reconciler
pub async fn serving_reconciler(
    client: &Client,
    config: &ControllerConfig,
) -> Result<Arc<Reconciler<KnativeServing>>> {
    let manifest = load_manifest(&config.serving_manifest_path)?;
    let store: Arc<dyn ResourceStore> = Arc::new(KubeStore::new(client.clone()));
    let detectors: Vec<Arc<dyn Platform<KnativeServing>>> = vec![
        Arc::new(ServingPlatform::new(component_settings(
            config.required_serving_namespace.as_ref(),
        ))),
        Arc::new(OpenShiftPlatform),
        Arc::new(MeshPlatform),
    ];
    let platforms = Platforms::new(detectors);
    let settings = ReconcilerSettings {
        version: config.serving_version.clone(),
        resync_period: config.resync_period(),
    };
    let reconciler = Reconciler::new(store, manifest, &platforms, None, settings)
        .await
        .context("Failed to initialize serving reconciler")?;
    Ok(Arc::new(reconciler))
}

/// Build the `KnativeEventing` reconciler with its workload scaler
pub async fn eventing_runtime(client: &Client, config: &ControllerConfig) -> Result<EventingRuntime> {
    let manifest = load_manifest(&config.eventing_manifest_path)?;
    let store: Arc<dyn ResourceStore> = Arc::new(KubeStore::new(client.clone()));
    let detectors: Vec<Arc<dyn Platform<KnativeEventing>>> = vec![
        Arc::new(EventingPlatform::new(component_settings(
            config.required_eventing_namespace.as_ref(),
        ))),
        Arc::new(OpenShiftPlatform),
        Arc::new(MeshPlatform),
    ];
    let platforms = Platforms::new(detectors);
    let (resync, _) = broadcast::channel(RESYNC_CHANNEL_CAPACITY);
    let factory = InformerScalerFactory::new(
        client.clone(),
        resync.clone(),
        config.scaler_poll_interval(),
    );
    let scaler: Arc<dyn WorkloadScaler<KnativeEventing>> =
        Arc::new(ComponentScaler::new(Arc::new(factory)));
    let settings = ReconcilerSettings {
        version: config.eventing_version.clone(),
        resync_period: config.resync_period(),
    };
    let reconciler = Reconciler::new(store, manifest, &platforms, Some(scaler), settings)
        .await
        .context("Failed to initialize eventing reconciler")?;
    Ok(EventingRuntime {
        reconciler: Arc::new(reconciler),
        resync,
    })
}
