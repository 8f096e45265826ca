//! Copy instance configuration into configmap templates.

use super::{transformer, Transformer};
use crate::controller::manifest::Envelope;
use crate::crd::ConfigMapData;

/// Copy `spec.config[<name>]` into the configmap `<name>` or `config-<name>`
///
/// Must run after every other transform so instance settings win over
/// defaults contributed by extensions.
pub fn config_from_instance(config: &ConfigMapData) -> Transformer {
    let config = config.clone();
    transformer(move |resource| {
        let Envelope::ConfigMap(cm) = resource else {
            return Ok(());
        };
        let Some(name) = cm.metadata.name.as_deref() else {
            return Ok(());
        };
        let entries = config.get(name).or_else(|| {
            name.strip_prefix("config-")
                .and_then(|short| config.get(short))
        });
        let Some(entries) = entries else {
            return Ok(());
        };
        if entries.is_empty() {
            return Ok(());
        }
        let data = cm.data.get_or_insert_with(Default::default);
        for (k, v) in entries {
            data.insert(k.clone(), v.clone());
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::manifest::Manifest;
    use std::collections::BTreeMap;

    fn manifest() -> Manifest {
        Manifest::from_yaml_str(
            r"
apiVersion: v1
kind: ConfigMap
metadata:
  name: config-network
data:
  domainTemplate: '{{.Name}}.{{.Namespace}}.{{.Domain}}'
---
apiVersion: v1
kind: ConfigMap
metadata:
  name: config-autoscaler
",
        )
        .unwrap()
    }

    fn config() -> ConfigMapData {
        BTreeMap::from([
            (
                "network".to_string(),
                BTreeMap::from([("domainTemplate".to_string(), "custom".to_string())]),
            ),
            (
                "config-autoscaler".to_string(),
                BTreeMap::from([("enable-scale-to-zero".to_string(), "false".to_string())]),
            ),
        ])
    }

    #[test]
    fn test_instance_config_overrides_template() {
        let transformed = manifest()
            .transform(&[config_from_instance(&config())])
            .unwrap();

        let network = transformed.find("ConfigMap", "config-network").unwrap();
        assert_eq!(network.data["data"]["domainTemplate"], "custom");
        let autoscaler = transformed.find("ConfigMap", "config-autoscaler").unwrap();
        assert_eq!(autoscaler.data["data"]["enable-scale-to-zero"], "false");
    }

    #[test]
    fn test_config_from_instance_is_idempotent() {
        let once = manifest()
            .transform(&[config_from_instance(&config())])
            .unwrap();
        let twice = once.transform(&[config_from_instance(&config())]).unwrap();
        assert_eq!(once, twice);
    }
}
