//! Image overrides for workload containers.

use super::{transformer, Transformer};
use crate::constants::{IMAGE_ENV_PREFIX, IMAGE_ENV_SEPARATOR};
use crate::crd::Registry;
use k8s_openapi::api::core::v1::Container;
use std::collections::BTreeMap;

/// Image per `<deployment>/<container>`, `<container>` or env var name
pub type ImageMap = BTreeMap<String, String>;

/// Build an image map from `IMAGE_<deployment>__<container>` / `IMAGE_<container>` variables
///
/// Only the first `__` separates workload and container. Empty values are
/// skipped rather than recorded as an empty image.
pub fn image_map_from_environment<I, K, V>(vars: I) -> ImageMap
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    vars.into_iter()
        .filter_map(|(k, v)| {
            let name = k.as_ref().strip_prefix(IMAGE_ENV_PREFIX)?;
            let value = v.as_ref();
            if name.is_empty() || value.is_empty() {
                return None;
            }
            Some((name.replacen(IMAGE_ENV_SEPARATOR, "/", 1), value.to_string()))
        })
        .collect()
}

/// Rewrite container images (and image-valued env vars) of workloads
pub fn image_override(registry: &Registry) -> Transformer {
    let overrides = registry.overrides.clone();
    let default = registry.default.clone().filter(|d| !d.is_empty());
    transformer(move |resource| {
        if overrides.is_empty() && default.is_none() {
            return Ok(());
        }
        let workload = resource.name().to_string();
        let Some(template) = resource.pod_template_mut() else {
            return Ok(());
        };
        let Some(pod) = template.spec.as_mut() else {
            return Ok(());
        };
        let init = pod.init_containers.iter_mut().flatten();
        for container in pod.containers.iter_mut().chain(init) {
            override_container(container, &workload, &overrides, default.as_deref());
        }
        Ok(())
    })
}

fn override_container(
    container: &mut Container,
    workload: &str,
    overrides: &ImageMap,
    default: Option<&str>,
) {
    let qualified = format!("{workload}/{}", container.name);
    let image = overrides
        .get(&qualified)
        .or_else(|| overrides.get(&container.name))
        .cloned()
        .or_else(|| default.map(|d| d.replace("${NAME}", &container.name)));
    if let Some(image) = image {
        container.image = Some(image);
    }

    for var in container.env.iter_mut().flatten() {
        if let Some(image) = overrides.get(&var.name) {
            var.value = Some(image.clone());
        }
    }
}
