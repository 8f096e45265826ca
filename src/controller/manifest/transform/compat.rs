//! Compatibility fixes applied to every template.

use super::{transformer, Transformer};
use crate::controller::manifest::Envelope;

/// API versions removed from recent clusters and their replacements
const UPGRADES: &[(&str, &str, &str)] = &[
    ("policy/v1beta1", "PodDisruptionBudget", "policy/v1"),
    ("autoscaling/v2beta2", "HorizontalPodAutoscaler", "autoscaling/v2"),
    ("autoscaling/v2beta1", "HorizontalPodAutoscaler", "autoscaling/v2"),
];

/// Rewrite PodDisruptionBudgets and HorizontalPodAutoscalers to their GA API versions
pub fn upgrade_deprecated_apis() -> Transformer {
    transformer(|resource| {
        let Envelope::Other(obj) = resource else {
            return Ok(());
        };
        let Some(types) = obj.types.as_mut() else {
            return Ok(());
        };
        if let Some((_, _, to)) = UPGRADES
            .iter()
            .find(|(from, kind, _)| *from == types.api_version && *kind == types.kind)
        {
            types.api_version = (*to).to_string();
        }
        Ok(())
    })
}

/// Drop `metadata.creationTimestamp` (often `null` in rendered manifests)
pub fn remove_creation_timestamp() -> Transformer {
    transformer(|resource| {
        resource.metadata_mut().creation_timestamp = None;
        Ok(())
    })
}
