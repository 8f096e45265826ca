//! Knative Component Operator Library
//!
//! Installs and reconciles the Knative Serving and Eventing control planes
//! from release manifests.
//!
//! ## Quick Start
//!
//! ```rust
//! use knative_component_operator::prelude::*;
//! ```
//!
//! This brings commonly used types and traits into scope. For more specific
//! imports, use the individual modules.

pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod observability;
pub mod platform;
pub mod prelude;
pub mod runtime;
