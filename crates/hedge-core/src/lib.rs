//! Core types for the hedge-rs analysis pipeline
//!
//! This crate defines the data that flows through a run (portfolio ledger,
//! analyst signals, decisions), the capability traits the pipeline drives, and
//! the shared error taxonomy.

pub mod analyst;
pub mod cancel;
pub mod capability;
pub mod decision;
pub mod error;
pub mod portfolio;
pub mod progress;
pub mod signal;

pub use analyst::{AnalystKey, catalog};
pub use cancel::CancelToken;
pub use capability::{
    AdjustedSignals, AnalystCapability, ModelConfig, PortfolioCapability, RiskAssessment,
    RiskCapability, RunInput,
};
pub use decision::{Action, Decision, Decisions};
pub use error::{Error, ParseError, Result, Stage};
pub use portfolio::{Portfolio, PositionState, RealizedGains};
pub use progress::{ProgressEvent, ProgressReporter};
pub use signal::{AnalystSignals, Signal, SignalType, TickerSignals};
