//! # Knative Component Operator
//!
//! Installs the Knative Serving and Eventing control planes described by
//! `KnativeServing` and `KnativeEventing` resources and keeps them
//! reconciled.
//!
//! ## Usage
//!
//! ```bash
//! # Both components, manifests from the image defaults
//! knative-component-operator
//!
//! # Eventing only, manifests from a local checkout
//! knative-component-operator --components eventing --eventing-manifest ./manifests/eventing
//! ```
//!
//! Everything not given on the command line comes from the environment
//! (see `ControllerConfig::from_env`).

use anyhow::Result;
use clap::{Parser, ValueEnum};
use knative_component_operator::config::ControllerConfig;
use knative_component_operator::runtime::initialization::{
    eventing_runtime, initialize, serving_reconciler,
};
use knative_component_operator::runtime::watch_loop::{run_watch_loop, spawn_shutdown_listener};
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ComponentKind {
    Serving,
    Eventing,
}

/// Knative component operator
#[derive(Debug, Parser)]
#[command(name = "knative-component-operator", version, long_about = None)]
struct Cli {
    /// Serving release manifest (file or directory)
    #[arg(long, value_name = "PATH")]
    serving_manifest: Option<PathBuf>,

    /// Eventing release manifest (file or directory)
    #[arg(long, value_name = "PATH")]
    eventing_manifest: Option<PathBuf>,

    /// Components to reconcile; defaults to ENABLE_SERVING / ENABLE_EVENTING
    #[arg(long, value_enum, value_delimiter = ',')]
    components: Option<Vec<ComponentKind>>,
}

impl Cli {
    fn apply(self, config: &mut ControllerConfig) {
        if let Some(path) = self.serving_manifest {
            config.serving_manifest_path = path;
        }
        if let Some(path) = self.eventing_manifest {
            config.eventing_manifest_path = path;
        }
        if let Some(components) = self.components {
            config.enable_serving = components.contains(&ComponentKind::Serving);
            config.enable_eventing = components.contains(&ComponentKind::Eventing);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut config = ControllerConfig::from_env();
    Cli::parse().apply(&mut config);

    let init = initialize(&config).await?;
    spawn_shutdown_listener(init.server_state.clone());

    let serving = async {
        if !config.enable_serving {
            info!("Serving reconciliation disabled");
            return Ok(());
        }
        let reconciler = serving_reconciler(&init.client, &config).await?;
        run_watch_loop(
            init.client.clone(),
            reconciler,
            None,
            init.server_state.clone(),
            config.watch_restart_delay(),
        )
        .await
    };
    let eventing = async {
        if !config.enable_eventing {
            info!("Eventing reconciliation disabled");
            return Ok(());
        }
        let runtime = eventing_runtime(&init.client, &config).await?;
        run_watch_loop(
            init.client.clone(),
            runtime.reconciler,
            Some(runtime.resync),
            init.server_state.clone(),
            config.watch_restart_delay(),
        )
        .await
    };
    tokio::try_join!(serving, eventing)?;

    info!("Operator stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_components_flag_overrides_selection() {
        let mut config = ControllerConfig::default();
        Cli::parse_from(["operator", "--components", "eventing"]).apply(&mut config);
        assert!(!config.enable_serving);
        assert!(config.enable_eventing);
    }

    #[test]
    fn test_manifest_paths_override_config() {
        let mut config = ControllerConfig::default();
        Cli::parse_from(["operator", "--serving-manifest", "/tmp/serving.yaml"]).apply(&mut config);
        assert_eq!(config.serving_manifest_path, PathBuf::from("/tmp/serving.yaml"));
        assert!(config.enable_serving && config.enable_eventing);
    }
}
