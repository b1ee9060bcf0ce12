//! Capability interfaces consumed by the pipeline
//!
//! The pipeline does not know how analysts reason, how risk is bounded or how
//! decisions are synthesized. It drives three async traits and only relies on
//! their contracts:
//!
//! - [`AnalystCapability`]: one signal per ticker, evaluated concurrently with
//!   every other selected analyst
//! - [`RiskCapability`]: sees the complete analyst output after the first
//!   barrier and returns an adjusted view
//! - [`PortfolioCapability`]: sees the adjusted view after the second barrier
//!   and returns the serialized decision payload

use crate::{AnalystSignals, Portfolio, ProgressReporter, Result, TickerSignals};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Model selection forwarded untouched to every capability
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub model_name: String,
    pub model_provider: String,
    /// Whether capabilities should emit detailed reasoning
    #[serde(default)]
    pub show_reasoning: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_name: "gpt-4o".to_string(),
            model_provider: "OpenAI".to_string(),
            show_reasoning: false,
        }
    }
}

/// Immutable input captured by the start stage and read by every later stage
#[derive(Debug, Clone)]
pub struct RunInput {
    /// Requested tickers in request order
    pub tickers: Vec<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub portfolio: Arc<Portfolio>,
    pub model: ModelConfig,
}

/// Risk view of one ticker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    /// Dollar amount still available for a new position in this ticker
    pub remaining_position_limit: f64,
    #[serde(default)]
    pub reasoning: serde_json::Value,
}

/// Output of the risk stage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdjustedSignals {
    /// Analyst signals as completed by the fan-out
    pub signals: AnalystSignals,
    /// Risk assessment per ticker
    pub risk: BTreeMap<String, RiskAssessment>,
}

impl AdjustedSignals {
    /// Adjusted view that carries the signals with no risk annotations
    pub fn passthrough(signals: AnalystSignals) -> Self {
        Self {
            signals,
            risk: BTreeMap::new(),
        }
    }
}

/// An independent analyst producing one signal per ticker
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AnalystCapability: Send + Sync {
    /// Evaluate every ticker of `input`
    ///
    /// Expected to block on external I/O (model inference, market data).
    async fn evaluate(
        &self,
        input: &RunInput,
        progress: &ProgressReporter,
    ) -> Result<TickerSignals>;
}

/// Risk aggregation over the complete analyst output
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RiskCapability: Send + Sync {
    async fn assess(
        &self,
        signals: &AnalystSignals,
        input: &RunInput,
        progress: &ProgressReporter,
    ) -> Result<AdjustedSignals>;
}

/// Portfolio synthesis producing the raw decision payload for all tickers
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PortfolioCapability: Send + Sync {
    async fn synthesize(
        &self,
        adjusted: &AdjustedSignals,
        input: &RunInput,
        progress: &ProgressReporter,
    ) -> Result<String>;
}
