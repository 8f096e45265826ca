//! # Reconciler
//!
//! Install engine shared by every component kind.
//!
//! - `types`: the reconcile context, its settings and error type
//! - `reconcile`: the reconcile pass and the controller entry point
//! - `apply`: get-before-create apply of transformed templates
//! - `availability`: Deployment readiness of an applied manifest
//! - `prune`: removal of resources left by older releases
//! - `finalize`: the delete path

pub mod apply;
pub mod availability;
mod finalize;
pub mod prune;
mod reconcile;
mod types;

pub use prune::ObsoleteResource;
pub use reconcile::reconcile;
pub use types::*;
