//! # Prelude
//!
//! Re-exports commonly used types and traits.
//!
//! ```rust
//! use knative_component_operator::prelude::*;
//! ```

// CRD types
pub use crate::crd::*;

// Reconcile engine
pub use crate::controller::reconciler::{
    reconcile, ObjectKey, Reconciler, ReconcilerError, ReconcilerSettings,
};

// Extension points
pub use crate::controller::extension::{Extension, Extensions, Platform, Platforms};
pub use crate::controller::outcome::Outcome;
pub use crate::controller::scaler::{ComponentScaler, WorkloadScaler};
pub use crate::controller::store::{KubeStore, MemoryStore, ResourceStore, StoreError};

// Manifests
pub use crate::controller::manifest::{Envelope, Manifest, TransformError, Transformer};

// Configuration
pub use crate::config::ControllerConfig;
