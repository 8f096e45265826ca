//! # Manifest
//!
//! Ordered set of resource templates for one component.
//!
//! The base manifest is loaded once at startup and is read-only afterwards
//! (platform detection may drop templates before the first reconcile).
//! Every reconcile works on the copy returned by [`Manifest::transform`].

mod envelope;
pub mod transform;

pub use envelope::Envelope;
pub use transform::{TransformError, Transformer};

use kube::api::DynamicObject;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read manifest {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse manifest {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("manifest {path} contains a document without apiVersion/kind")]
    MissingTypeMeta { path: PathBuf },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Manifest {
    resources: Vec<DynamicObject>,
}

impl Manifest {
    #[must_use]
    pub fn new(resources: Vec<DynamicObject>) -> Self {
        Self { resources }
    }

    /// Load a YAML file, or every `*.yaml` / `*.yml` file of a directory in name order
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ManifestError> {
        let path = path.as_ref();
        let files = if path.is_dir() {
            let entries = std::fs::read_dir(path).map_err(|source| ManifestError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            let mut files: Vec<PathBuf> = entries
                .filter_map(Result::ok)
                .map(|e| e.path())
                .filter(|p| {
                    p.extension()
                        .and_then(|e| e.to_str())
                        .is_some_and(|e| e == "yaml" || e == "yml")
                })
                .collect();
            files.sort();
            files
        } else {
            vec![path.to_path_buf()]
        };

        let mut resources = Vec::new();
        for file in files {
            let content = std::fs::read_to_string(&file).map_err(|source| ManifestError::Io {
                path: file.clone(),
                source,
            })?;
            resources.extend(parse_documents(&content, &file)?);
        }
        Ok(Self { resources })
    }

    /// Parse a multi-document YAML string
    pub fn from_yaml_str(content: &str) -> Result<Self, ManifestError> {
        Ok(Self {
            resources: parse_documents(content, Path::new("<inline>"))?,
        })
    }

    #[must_use]
    pub fn resources(&self) -> &[DynamicObject] {
        &self.resources
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// First template of the given kind and name
    #[must_use]
    pub fn find(&self, kind: &str, name: &str) -> Option<&DynamicObject> {
        self.resources
            .iter()
            .find(|r| kind_of(r) == kind && r.metadata.name.as_deref() == Some(name))
    }

    /// Copy containing only the templates matching `predicate`
    #[must_use]
    pub fn filter(&self, predicate: impl Fn(&DynamicObject) -> bool) -> Manifest {
        Manifest {
            resources: self
                .resources
                .iter()
                .filter(|r| predicate(r))
                .cloned()
                .collect(),
        }
    }

    /// Drop templates in place; only used while resolving platform extensions
    pub fn retain(&mut self, predicate: impl Fn(&DynamicObject) -> bool) {
        self.resources.retain(|r| predicate(r));
    }

    /// Apply every transformer to a copy of each template, in order
    ///
    /// Each template is decoded into an [`Envelope`] once. The first error
    /// aborts the whole transform.
    pub fn transform(&self, transformers: &[Transformer]) -> Result<Manifest, TransformError> {
        let mut resources = Vec::with_capacity(self.resources.len());
        for resource in &self.resources {
            let mut envelope = Envelope::decode(resource.clone())?;
            for t in transformers {
                t(&mut envelope)?;
            }
            resources.push(envelope.encode()?);
        }
        Ok(Manifest { resources })
    }
}

#[must_use]
pub fn kind_of(obj: &DynamicObject) -> &str {
    obj.types.as_ref().map_or("", |t| t.kind.as_str())
}

pub fn is_role(obj: &DynamicObject) -> bool {
    matches!(kind_of(obj), "Role" | "ClusterRole")
}

pub fn is_role_binding(obj: &DynamicObject) -> bool {
    matches!(kind_of(obj), "RoleBinding" | "ClusterRoleBinding")
}

pub fn is_rbac(obj: &DynamicObject) -> bool {
    is_role(obj) || is_role_binding(obj)
}

pub fn is_crd(obj: &DynamicObject) -> bool {
    kind_of(obj) == "CustomResourceDefinition"
}

fn parse_documents(content: &str, path: &Path) -> Result<Vec<DynamicObject>, ManifestError> {
    let mut resources = Vec::new();
    for document in serde_yaml::Deserializer::from_str(content) {
        let value = serde_yaml::Value::deserialize(document).map_err(|source| ManifestError::Yaml {
            path: path.to_path_buf(),
            source,
        })?;
        if value.is_null() {
            continue;
        }
        let obj: DynamicObject = serde_yaml::from_value(value).map_err(|source| ManifestError::Yaml {
            path: path.to_path_buf(),
            source,
        })?;
        if obj.types.is_none() {
            return Err(ManifestError::MissingTypeMeta {
                path: path.to_path_buf(),
            });
        }
        resources.push(obj);
    }
    Ok(resources)
}

#[cfg(test)]
mod tests {
    use super::transform::{inject_namespace, remove_creation_timestamp};
    use super::*;

    const DOCS: &str = r"
apiVersion: v1
kind: Namespace
metadata:
  name: knative-serving
---
# comment only
---
apiVersion: v1
kind: ServiceAccount
metadata:
  name: controller
  creationTimestamp: null
";

    #[test]
    fn test_parse_skips_empty_documents() {
        let manifest = Manifest::from_yaml_str(DOCS).unwrap();
        assert_eq!(manifest.len(), 2);
        assert_eq!(kind_of(&manifest.resources()[1]), "ServiceAccount");
    }

    #[test]
    fn test_transform_leaves_base_untouched() {
        let base = Manifest::from_yaml_str(DOCS).unwrap();
        let snapshot = base.clone();
        let transformed = base
            .transform(&[inject_namespace("elsewhere"), remove_creation_timestamp()])
            .unwrap();

        assert_eq!(base, snapshot);
        let sa = transformed.find("ServiceAccount", "controller").unwrap();
        assert_eq!(sa.metadata.namespace.as_deref(), Some("elsewhere"));
        assert!(sa.metadata.creation_timestamp.is_none());
        assert!(base.find("ServiceAccount", "controller").unwrap().metadata.namespace.is_none());
    }

    #[test]
    fn test_from_path_reads_directory_in_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("2-sa.yaml"),
            "apiVersion: v1\nkind: ServiceAccount\nmetadata:\n  name: second\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("1-ns.yaml"),
            "apiVersion: v1\nkind: Namespace\nmetadata:\n  name: first\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("README.md"), "ignored").unwrap();

        let manifest = Manifest::from_path(dir.path()).unwrap();
        let names: Vec<_> = manifest
            .resources()
            .iter()
            .map(|r| r.metadata.name.clone().unwrap())
            .collect();
        assert_eq!(names, vec!["first", "second"]);
    }

    #[test]
    fn test_missing_type_meta_is_rejected() {
        let err = Manifest::from_yaml_str("metadata:\n  name: x\n").unwrap_err();
        assert!(matches!(err, ManifestError::MissingTypeMeta { .. }));
    }
}
