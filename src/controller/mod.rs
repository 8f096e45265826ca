//! # Controller
//!
//! Core modules of the operator.
//!
//! - `backoff`: Fibonacci backoff for failed reconciles
//! - `conditions`: status condition bookkeeping
//! - `extension`: platform extension registry
//! - `manifest`: manifest loading and the transform pipeline
//! - `outcome`: result type of install hooks
//! - `reconciler`: the reconcile engine
//! - `scaler`: on-demand scaling of eventing workloads
//! - `server`: HTTP server for metrics and health checks
//! - `store`: resource access used by the reconciler

pub mod backoff;
pub mod conditions;
pub mod extension;
pub mod manifest;
pub mod outcome;
pub mod reconciler;
pub mod scaler;
pub mod server;
pub mod store;
