//! Workflow compilation and execution for hedge-rs
//!
//! This crate turns an analyst selection into a fan-out/fan-in plan, runs it
//! against registered capabilities and decodes the resulting trading
//! decisions. Front ends only need [`Pipeline`].

pub mod baseline;
pub mod config;
pub mod parser;
pub mod pipeline;
pub mod plan;
pub mod registry;
pub mod scheduler;

#[cfg(test)]
mod test_support;

// Re-export for convenience
pub use baseline::{HoldSynthesizer, NeutralAnalyst, PositionLimitRisk};
pub use config::{
    AnalystFailurePolicy, DEFAULT_FALLBACK_ANALYSTS, PipelineConfig, PipelineConfigBuilder,
};
pub use pipeline::{
    CompiledPlan, Pipeline, PipelineBuilder, RunFailure, RunOutcome, RunReport, RunRequest,
    resolve_dates,
};
pub use plan::{AnalystSelection, Edge, Node, WorkflowPlan};
pub use registry::{CapabilityRegistry, CapabilityRegistryBuilder};
pub use scheduler::{AnalystFailure, ExecutionOutput, Scheduler};
