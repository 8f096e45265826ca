//! # Observability
//!
//! Prometheus metrics; tracing is configured during startup in
//! `runtime::initialization`.

pub mod metrics;
