//! # Resource Envelope
//!
//! Typed view over a manifest template.
//!
//! A template is decoded once per transform pass into the variant matching
//! its kind, every transformer runs against the envelope, and it is encoded
//! back afterwards. Kinds the transforms never inspect structurally stay
//! untyped in [`Envelope::Other`].

use super::transform::TransformError;
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{ConfigMap, PodTemplateSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::DynamicObject;
use serde::de::DeserializeOwned;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    Deployment(Box<Deployment>),
    StatefulSet(Box<StatefulSet>),
    ConfigMap(Box<ConfigMap>),
    Job(Box<Job>),
    Other(Box<DynamicObject>),
}

fn decode_as<T: DeserializeOwned>(obj: &DynamicObject) -> Result<T, TransformError> {
    serde_json::to_value(obj)
        .and_then(serde_json::from_value)
        .map_err(|source| TransformError::Decode {
            kind: obj.types.as_ref().map(|t| t.kind.clone()).unwrap_or_default(),
            name: obj.metadata.name.clone().unwrap_or_default(),
            source,
        })
}

fn encode_from<T: Serialize>(kind: &str, name: &str, typed: &T) -> Result<DynamicObject, TransformError> {
    serde_json::to_value(typed)
        .and_then(serde_json::from_value)
        .map_err(|source| TransformError::Encode {
            kind: kind.to_string(),
            name: name.to_string(),
            source,
        })
}

impl Envelope {
    /// Decode a template into the variant for its kind
    pub fn decode(obj: DynamicObject) -> Result<Self, TransformError> {
        let (api_version, kind) = match obj.types.as_ref() {
            Some(t) => (t.api_version.as_str(), t.kind.as_str()),
            None => ("", ""),
        };
        Ok(match (api_version, kind) {
            ("apps/v1", "Deployment") => Envelope::Deployment(Box::new(decode_as(&obj)?)),
            ("apps/v1", "StatefulSet") => Envelope::StatefulSet(Box::new(decode_as(&obj)?)),
            ("v1", "ConfigMap") => Envelope::ConfigMap(Box::new(decode_as(&obj)?)),
            ("batch/v1", "Job") => Envelope::Job(Box::new(decode_as(&obj)?)),
            _ => Envelope::Other(Box::new(obj)),
        })
    }

    pub fn encode(self) -> Result<DynamicObject, TransformError> {
        let kind = self.kind().to_string();
        let name = self.name().to_string();
        match self {
            Envelope::Deployment(d) => encode_from(&kind, &name, &d),
            Envelope::StatefulSet(s) => encode_from(&kind, &name, &s),
            Envelope::ConfigMap(c) => encode_from(&kind, &name, &c),
            Envelope::Job(j) => encode_from(&kind, &name, &j),
            Envelope::Other(o) => Ok(*o),
        }
    }

    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            Envelope::Deployment(_) => "Deployment",
            Envelope::StatefulSet(_) => "StatefulSet",
            Envelope::ConfigMap(_) => "ConfigMap",
            Envelope::Job(_) => "Job",
            Envelope::Other(o) => o.types.as_ref().map_or("", |t| t.kind.as_str()),
        }
    }

    #[must_use]
    pub fn metadata(&self) -> &ObjectMeta {
        match self {
            Envelope::Deployment(d) => &d.metadata,
            Envelope::StatefulSet(s) => &s.metadata,
            Envelope::ConfigMap(c) => &c.metadata,
            Envelope::Job(j) => &j.metadata,
            Envelope::Other(o) => &o.metadata,
        }
    }

    pub fn metadata_mut(&mut self) -> &mut ObjectMeta {
        match self {
            Envelope::Deployment(d) => &mut d.metadata,
            Envelope::StatefulSet(s) => &mut s.metadata,
            Envelope::ConfigMap(c) => &mut c.metadata,
            Envelope::Job(j) => &mut j.metadata,
            Envelope::Other(o) => &mut o.metadata,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.metadata().name.as_deref().unwrap_or_default()
    }

    /// Pod template of workload kinds
    pub fn pod_template_mut(&mut self) -> Option<&mut PodTemplateSpec> {
        match self {
            Envelope::Deployment(d) => d.spec.as_mut().map(|s| &mut s.template),
            Envelope::StatefulSet(s) => s.spec.as_mut().map(|s| &mut s.template),
            Envelope::Job(j) => j.spec.as_mut().map(|s| &mut s.template),
            Envelope::ConfigMap(_) | Envelope::Other(_) => None,
        }
    }

    /// Replica field of Deployments and StatefulSets
    pub fn replicas_mut(&mut self) -> Option<&mut Option<i32>> {
        match self {
            Envelope::Deployment(d) => d.spec.as_mut().map(|s| &mut s.replicas),
            Envelope::StatefulSet(s) => s.spec.as_mut().map(|s| &mut s.replicas),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_workload(&self) -> bool {
        matches!(self, Envelope::Deployment(_) | Envelope::StatefulSet(_))
    }
}
