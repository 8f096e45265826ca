//! Transforms contributed by platform extensions.

use super::{transformer, upsert_entry, Transformer};
use crate::controller::manifest::Envelope;
use k8s_openapi::api::core::v1::{Capabilities, SeccompProfile, SecurityContext};

const SIDECAR_INJECT_LABEL: &str = "sidecar.istio.io/inject";
const REWRITE_PROBES_ANNOTATION: &str = "sidecar.istio.io/rewriteAppHTTPProbers";

/// Add a label to every Namespace template
pub fn inject_label_into_namespaces(key: &str, value: &str) -> Transformer {
    let key = key.to_string();
    let value = value.to_string();
    transformer(move |resource| {
        if resource.kind() == "Namespace" {
            upsert_entry(&mut resource.metadata_mut().labels, &key, &value);
        }
        Ok(())
    })
}

/// Give every workload container without a security context the restricted profile
pub fn restricted_security_context() -> Transformer {
    transformer(|resource| {
        let Some(pod) = resource.pod_template_mut().and_then(|t| t.spec.as_mut()) else {
            return Ok(());
        };
        let init = pod.init_containers.iter_mut().flatten();
        for container in pod.containers.iter_mut().chain(init) {
            if container.security_context.is_none() {
                container.security_context = Some(restricted());
            }
        }
        Ok(())
    })
}

fn restricted() -> SecurityContext {
    SecurityContext {
        allow_privilege_escalation: Some(false),
        run_as_non_root: Some(true),
        read_only_root_filesystem: Some(true),
        capabilities: Some(Capabilities {
            add: None,
            drop: Some(vec!["ALL".to_string()]),
        }),
        seccomp_profile: Some(SeccompProfile {
            type_: "RuntimeDefault".to_string(),
            localhost_profile: None,
        }),
        ..SecurityContext::default()
    }
}

/// Jobs must stay around so the operator does not recreate them after completion
pub fn jobs_remove_ttl() -> Transformer {
    transformer(|resource| {
        if let Envelope::Job(job) = resource {
            if let Some(spec) = job.spec.as_mut() {
                spec.ttl_seconds_after_finished = None;
            }
        }
        Ok(())
    })
}

/// Suffix Job names with the operator version
///
/// Jobs are immutable, so every release gets a fresh Job instead of an
/// update of the previous one. A `generateName` prefix becomes the name.
pub fn versioned_job_names(version: &str) -> Transformer {
    let version = version.to_string();
    transformer(move |resource| {
        let Envelope::Job(job) = resource else {
            return Ok(());
        };
        if version.is_empty() {
            return Ok(());
        }
        let meta = &mut job.metadata;
        match (meta.name.as_deref(), meta.generate_name.take()) {
            (None | Some(""), Some(prefix)) if !prefix.is_empty() => {
                meta.name = Some(format!("{prefix}{version}"));
            }
            (Some(name), generate_name) => {
                meta.generate_name = generate_name;
                let suffix = format!("-{version}");
                if !name.ends_with(&suffix) {
                    meta.name = Some(format!("{name}{suffix}"));
                }
            }
            (None, generate_name) => meta.generate_name = generate_name,
        }
        Ok(())
    })
}

/// Opt mesh workloads into sidecar injection and every other Deployment out
pub fn sidecar_injection(meshed: &[&str]) -> Transformer {
    let meshed: Vec<String> = meshed.iter().map(|s| (*s).to_string()).collect();
    transformer(move |resource| {
        let Envelope::Deployment(d) = resource else {
            return Ok(());
        };
        let inject = d
            .metadata
            .name
            .as_ref()
            .is_some_and(|n| meshed.contains(n));
        let Some(spec) = d.spec.as_mut() else {
            return Ok(());
        };
        let meta = spec.template.metadata.get_or_insert_with(Default::default);
        upsert_entry(&mut meta.labels, SIDECAR_INJECT_LABEL, if inject { "true" } else { "false" });
        if inject {
            upsert_entry(&mut meta.annotations, REWRITE_PROBES_ANNOTATION, "true");
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::api::DynamicObject;

    fn decode(value: serde_json::Value) -> Envelope {
        Envelope::decode(serde_json::from_value::<DynamicObject>(value).unwrap()).unwrap()
    }

    fn deployment(name: &str) -> Envelope {
        decode(serde_json::json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": { "name": name },
            "spec": {
                "selector": { "matchLabels": { "app": name } },
                "template": {
                    "metadata": { "labels": { "app": name } },
                    "spec": { "containers": [{ "name": name, "image": "img" }] }
                }
            }
        }))
    }

    #[test]
    fn test_security_context_only_when_missing() {
        let mut d = deployment("activator");
        restricted_security_context()(&mut d).unwrap();
        let once = d.clone();
        restricted_security_context()(&mut d).unwrap();
        assert_eq!(once, d);

        let Envelope::Deployment(dep) = &d else { unreachable!() };
        let ctx = dep.spec.as_ref().unwrap().template.spec.as_ref().unwrap().containers[0]
            .security_context
            .clone()
            .unwrap();
        assert_eq!(ctx.run_as_non_root, Some(true));
        assert_eq!(ctx.capabilities.unwrap().drop.unwrap(), vec!["ALL".to_string()]);
    }

    #[test]
    fn test_sidecar_injection_labels() {
        let mut activator = deployment("activator");
        let mut controller = deployment("controller");
        let t = sidecar_injection(&["activator"]);
        t(&mut activator).unwrap();
        t(&mut controller).unwrap();

        let label = |e: &Envelope| {
            let Envelope::Deployment(d) = e else { unreachable!() };
            d.spec.as_ref().unwrap().template.metadata.as_ref().unwrap().labels.as_ref().unwrap()
                [SIDECAR_INJECT_LABEL]
                .clone()
        };
        assert_eq!(label(&activator), "true");
        assert_eq!(label(&controller), "false");
    }

    fn job(metadata: serde_json::Value) -> Envelope {
        decode(serde_json::json!({
            "apiVersion": "batch/v1",
            "kind": "Job",
            "metadata": metadata,
            "spec": {
                "template": {
                    "spec": {
                        "restartPolicy": "Never",
                        "containers": [{ "name": "migrate", "image": "img" }]
                    }
                }
            }
        }))
    }

    #[test]
    fn test_job_names_carry_version() {
        let mut named = job(serde_json::json!({ "name": "storage-version-migration" }));
        let t = versioned_job_names("1.15.0");
        t(&mut named).unwrap();
        t(&mut named).unwrap();
        assert_eq!(named.name(), "storage-version-migration-1.15.0");

        let mut generated = job(serde_json::json!({ "generateName": "storage-version-migration-" }));
        t(&mut generated).unwrap();
        assert_eq!(generated.name(), "storage-version-migration-1.15.0");
        assert!(generated.metadata().generate_name.is_none());
    }

    #[test]
    fn test_job_names_untouched_without_version() {
        let mut named = job(serde_json::json!({ "name": "storage-version-migration" }));
        versioned_job_names("")(&mut named).unwrap();
        assert_eq!(named.name(), "storage-version-migration");

        let mut d = deployment("controller");
        versioned_job_names("1.15.0")(&mut d).unwrap();
        assert_eq!(d.name(), "controller");
    }

    #[test]
    fn test_namespace_label() {
        let mut ns = decode(serde_json::json!({
            "apiVersion": "v1", "kind": "Namespace", "metadata": { "name": "knative-serving-ingress" }
        }));
        inject_label_into_namespaces("app.openshift.io/part-of", "openshift-serverless")(&mut ns).unwrap();
        assert_eq!(
            ns.metadata().labels.as_ref().unwrap()["app.openshift.io/part-of"],
            "openshift-serverless"
        );
    }
}
