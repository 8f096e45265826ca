//! # Eventing
//!
//! Defaults for `KnativeEventing` installs. Always enabled.

use super::{check_namespace, mark_dependencies_installed, merge_images, ComponentSettings};
use crate::constants::DEFAULT_HA_REPLICAS;
use crate::controller::extension::{Extension, Platform};
use crate::controller::manifest::transform::{container_memory_limit, inject_environment};
use crate::controller::manifest::{Manifest, Transformer};
use crate::controller::outcome::Outcome;
use crate::controller::store::{ResourceStore, StoreError};
use crate::crd::{HighAvailability, KnativeEventing};
use async_trait::async_trait;
use std::sync::Arc;

pub const DEFAULT_SINK_BINDING_SELECTION_MODE: &str = "inclusion";
pub const WEBHOOK_MEMORY_LIMIT: &str = "1024Mi";

const WEBHOOK: &str = "eventing-webhook";
const CONTROLLER: &str = "eventing-controller";

#[derive(Debug, Clone, Default)]
pub struct EventingPlatform {
    settings: ComponentSettings,
}

impl EventingPlatform {
    #[must_use]
    pub fn new(settings: ComponentSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl Platform<KnativeEventing> for EventingPlatform {
    fn name(&self) -> &'static str {
        "eventing"
    }

    async fn detect(
        &self,
        _store: &Arc<dyn ResourceStore>,
        _manifest: &mut Manifest,
    ) -> Result<Option<Arc<dyn Extension<KnativeEventing>>>, StoreError> {
        Ok(Some(Arc::new(EventingExtension {
            settings: self.settings.clone(),
        })))
    }
}

#[derive(Debug)]
pub struct EventingExtension {
    settings: ComponentSettings,
}

#[async_trait]
impl Extension<KnativeEventing> for EventingExtension {
    fn name(&self) -> &'static str {
        "eventing"
    }

    fn transformers(&self, instance: &KnativeEventing) -> Vec<Transformer> {
        let mode = instance
            .spec
            .sink_binding_selection_mode
            .clone()
            .unwrap_or_else(|| DEFAULT_SINK_BINDING_SELECTION_MODE.to_string());
        let mut transformers = vec![
            container_memory_limit(WEBHOOK, WEBHOOK, WEBHOOK_MEMORY_LIMIT),
            inject_environment(
                WEBHOOK,
                WEBHOOK,
                vec![("SINK_BINDING_SELECTION_MODE".to_string(), mode)],
            ),
        ];
        if !self.settings.proxy.is_empty() {
            transformers.push(inject_environment(
                CONTROLLER,
                CONTROLLER,
                self.settings.proxy.clone(),
            ));
        }
        transformers
    }

    async fn pre_install(&self, instance: &mut KnativeEventing) -> Outcome {
        let outcome = check_namespace(instance, self.settings.required_namespace.as_deref());
        if !outcome.is_success() {
            return outcome;
        }
        mark_dependencies_installed(instance);

        let spec = &mut instance.spec;
        merge_images(&mut spec.common, &self.settings.images);
        spec.common
            .high_availability
            .get_or_insert(HighAvailability {
                replicas: Some(DEFAULT_HA_REPLICAS),
            });
        spec.sink_binding_selection_mode
            .get_or_insert_with(|| DEFAULT_SINK_BINDING_SELECTION_MODE.to_string());
        Outcome::Success
    }
}
