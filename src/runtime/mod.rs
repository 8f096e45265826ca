//! # Runtime
//!
//! Startup, controller watch loops and the error policy.

pub mod error_policy;
pub mod initialization;
pub mod watch_loop;
