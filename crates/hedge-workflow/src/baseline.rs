//! Deterministic capabilities that need no model or market data
//!
//! These let the pipeline run end to end without any external service:
//! - [`NeutralAnalyst`] reports a zero-confidence neutral signal per ticker
//! - [`PositionLimitRisk`] bounds each ticker by a share of portfolio value
//! - [`HoldSynthesizer`] holds every position and explains the signal tally

use async_trait::async_trait;
use hedge_core::signal::tally;
use hedge_core::{
    AdjustedSignals, AnalystCapability, AnalystSignals, Decision, Decisions, Error,
    PortfolioCapability, ProgressReporter, Result, RiskAssessment, RiskCapability, RunInput,
    Signal, Stage, TickerSignals,
};
use serde_json::json;
use std::collections::BTreeMap;
use tracing::debug;

/// Analyst that has no opinion
#[derive(Debug, Clone, Copy, Default)]
pub struct NeutralAnalyst;

#[async_trait]
impl AnalystCapability for NeutralAnalyst {
    async fn evaluate(
        &self,
        input: &RunInput,
        _progress: &ProgressReporter,
    ) -> Result<TickerSignals> {
        Ok(input
            .tickers
            .iter()
            .map(|t| (t.clone(), Signal::neutral("no analysis model configured")))
            .collect())
    }
}

/// Caps each position at a fraction of total portfolio value
///
/// Positions are valued at cost basis. The remaining limit for a ticker is
/// the cap minus its current long value, never more than the cash left after
/// the margin committed to short positions.
#[derive(Debug, Clone, Copy)]
pub struct PositionLimitRisk {
    max_position_fraction: f64,
}

impl PositionLimitRisk {
    pub const DEFAULT_FRACTION: f64 = 0.20;

    /// # Errors
    ///
    /// [`Error::Config`] if `max_position_fraction` is not within `(0, 1]`.
    pub fn new(max_position_fraction: f64) -> Result<Self> {
        if !max_position_fraction.is_finite()
            || max_position_fraction <= 0.0
            || max_position_fraction > 1.0
        {
            return Err(Error::Config(format!(
                "max_position_fraction must be within (0, 1], got {max_position_fraction}"
            )));
        }
        Ok(Self {
            max_position_fraction,
        })
    }
}

impl Default for PositionLimitRisk {
    fn default() -> Self {
        Self {
            max_position_fraction: Self::DEFAULT_FRACTION,
        }
    }
}

#[async_trait]
impl RiskCapability for PositionLimitRisk {
    async fn assess(
        &self,
        signals: &AnalystSignals,
        input: &RunInput,
        progress: &ProgressReporter,
    ) -> Result<AdjustedSignals> {
        let portfolio = &input.portfolio;
        let position_value = |ticker: &str| {
            portfolio
                .position(ticker)
                .map_or(0.0, |p| p.long as f64 * p.long_cost_basis)
        };
        let total_value =
            portfolio.cash() + input.tickers.iter().map(|t| position_value(t)).sum::<f64>();
        let limit = total_value * self.max_position_fraction;
        let available_cash = (portfolio.cash() - portfolio.total_short_margin()).max(0.0);

        let mut risk = BTreeMap::new();
        for ticker in &input.tickers {
            progress.update(Stage::Risk.as_str(), Some(ticker), "Calculating position limit");
            let current = position_value(ticker);
            let remaining = (limit - current).max(0.0).min(available_cash);
            debug!("{} remaining position limit: {:.2}", ticker, remaining);
            risk.insert(
                ticker.clone(),
                RiskAssessment {
                    remaining_position_limit: remaining,
                    reasoning: json!({
                        "portfolio_value": total_value,
                        "current_position": current,
                        "net_shares": portfolio.net_shares(ticker).unwrap_or(0),
                        "position_limit": limit,
                        "remaining_limit": remaining,
                        "available_cash": available_cash,
                    }),
                },
            );
        }

        Ok(AdjustedSignals {
            signals: signals.clone(),
            risk,
        })
    }
}

/// Holds every position
///
/// Confidence is the mean analyst confidence for the ticker.
#[derive(Debug, Clone, Copy, Default)]
pub struct HoldSynthesizer;

#[async_trait]
impl PortfolioCapability for HoldSynthesizer {
    async fn synthesize(
        &self,
        adjusted: &AdjustedSignals,
        input: &RunInput,
        progress: &ProgressReporter,
    ) -> Result<String> {
        let mut decisions = Decisions::new();
        for ticker in &input.tickers {
            progress.update(Stage::Portfolio.as_str(), Some(ticker), "Holding");
            let confidences: Vec<f64> = adjusted
                .signals
                .values()
                .filter_map(|per_ticker| per_ticker.get(ticker))
                .map(|s| s.confidence)
                .collect();
            let confidence = if confidences.is_empty() {
                0.0
            } else {
                confidences.iter().sum::<f64>() / confidences.len() as f64
            };
            let (bullish, bearish, neutral) = tally(&adjusted.signals, ticker);

            let mut decision = Decision::hold(format!(
                "{bullish} bullish, {bearish} bearish, {neutral} neutral"
            ));
            decision.confidence = confidence;
            decisions.insert(ticker.clone(), decision);
        }

        serde_json::to_string(&decisions).map_err(|e| {
            Error::execution(Stage::Portfolio, format!("failed to encode decisions: {e}"))
        })
    }
}
