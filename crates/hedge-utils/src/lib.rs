//! Shared utilities for hedge-rs
//!
//! This crate provides logging setup and environment-backed run defaults used
//! by the hedge-rs binaries.

pub mod config;
pub mod logging;

pub use config::{ConfigError, RunDefaults};
pub use logging::{init_tracing, init_tracing_json, init_tracing_with};
