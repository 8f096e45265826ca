//! # CRD Generator
//!
//! Prints the `KnativeServing` and `KnativeEventing` CustomResourceDefinitions
//! as a multi-document YAML stream.
//!
//! ```bash
//! cargo run --bin crdgen > config/crd/knative-operator.yaml
//! cargo run --bin crdgen | kubectl apply -f -
//! ```

use anyhow::{Context, Result};
use knative_component_operator::crd::{KnativeEventing, KnativeServing};
use kube::CustomResourceExt;

fn main() -> Result<()> {
    let crds = [KnativeServing::crd(), KnativeEventing::crd()];
    for crd in &crds {
        let yaml = serde_yaml::to_string(crd).context("Failed to serialize CRD")?;
        println!("---\n{}", yaml.trim_end());
    }
    Ok(())
}
