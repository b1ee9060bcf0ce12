//! Portfolio ledger threaded through a pipeline run
//!
//! A [`Portfolio`] is built once per run from the requested tickers, the
//! starting cash and the margin requirement. Its ticker set is fixed at
//! construction: there is no API that adds or removes a position.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Holdings for a single ticker
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PositionState {
    /// Shares held long
    pub long: u64,
    /// Shares held short
    pub short: u64,
    /// Average cost basis of the long position
    pub long_cost_basis: f64,
    /// Average price at which shares were sold short
    pub short_cost_basis: f64,
    /// Margin committed to this ticker's short position
    pub short_margin_used: f64,
}

/// Realized gains for a single ticker
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RealizedGains {
    pub long: f64,
    pub short: f64,
}

/// Cash, margin and per-ticker positions for one run
///
/// Deserialization goes through the same checks as the constructors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "PortfolioRecord")]
pub struct Portfolio {
    cash: f64,
    margin_requirement: f64,
    margin_used: f64,
    positions: BTreeMap<String, PositionState>,
    realized_gains: BTreeMap<String, RealizedGains>,
}

impl Portfolio {
    /// Build a zeroed portfolio
    ///
    /// Tickers are trimmed and upper-cased; duplicates collapse into one
    /// position.
    pub fn new<S: AsRef<str>>(
        tickers: &[S],
        initial_cash: f64,
        margin_requirement: f64,
    ) -> Result<Self> {
        if !initial_cash.is_finite() || initial_cash <= 0.0 {
            return Err(Error::Validation(format!(
                "initial cash must be greater than 0, got {initial_cash}"
            )));
        }
        check_margin_requirement(margin_requirement)?;

        let tickers = normalize_tickers(tickers)?;

        Ok(Self {
            cash: initial_cash,
            margin_requirement,
            margin_used: 0.0,
            positions: tickers
                .iter()
                .map(|t| (t.clone(), PositionState::default()))
                .collect(),
            realized_gains: tickers
                .into_iter()
                .map(|t| (t, RealizedGains::default()))
                .collect(),
        })
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    pub fn margin_requirement(&self) -> f64 {
        self.margin_requirement
    }

    pub fn margin_used(&self) -> f64 {
        self.margin_used
    }

    /// Tickers in the ledger, sorted
    pub fn tickers(&self) -> impl Iterator<Item = &str> {
        self.positions.keys().map(String::as_str)
    }

    pub fn contains(&self, ticker: &str) -> bool {
        self.positions.contains_key(ticker)
    }

    pub fn position(&self, ticker: &str) -> Option<&PositionState> {
        self.positions.get(ticker)
    }

    pub fn positions(&self) -> &BTreeMap<String, PositionState> {
        &self.positions
    }

    pub fn realized_gains(&self, ticker: &str) -> Option<&RealizedGains> {
        self.realized_gains.get(ticker)
    }

    /// Net share count (long minus short) for a ticker
    pub fn net_shares(&self, ticker: &str) -> Option<i128> {
        self.positions
            .get(ticker)
            .map(|p| i128::from(p.long) - i128::from(p.short))
    }

    /// Sum of per-ticker short margin
    pub fn total_short_margin(&self) -> f64 {
        self.positions.values().map(|p| p.short_margin_used).sum()
    }

    /// Copy of this portfolio with a different cash balance
    ///
    /// Cash may reach zero after trading but never goes negative.
    pub fn with_cash(&self, cash: f64) -> Result<Self> {
        check_cash(cash)?;
        Ok(Self {
            cash,
            ..self.clone()
        })
    }

    /// Copy of this portfolio with `ticker`'s position replaced
    ///
    /// Fails if the ticker is not part of the ledger or the position carries
    /// a negative or non-finite amount. Aggregate margin is recomputed from
    /// the per-ticker short margin.
    pub fn with_position(&self, ticker: &str, position: PositionState) -> Result<Self> {
        if !self.contains(ticker) {
            return Err(Error::Validation(format!(
                "ticker {ticker} is not part of this portfolio"
            )));
        }
        check_position(ticker, &position)?;
        let mut next = self.clone();
        next.positions.insert(ticker.to_string(), position);
        next.margin_used = next.total_short_margin();
        Ok(next)
    }
}

fn check_cash(cash: f64) -> Result<()> {
    if !cash.is_finite() || cash < 0.0 {
        return Err(Error::Validation(format!(
            "cash must be a finite non-negative amount, got {cash}"
        )));
    }
    Ok(())
}

fn check_margin_requirement(margin_requirement: f64) -> Result<()> {
    if !margin_requirement.is_finite() || !(0.0..=1.0).contains(&margin_requirement) {
        return Err(Error::Validation(format!(
            "margin requirement must be within [0, 1], got {margin_requirement}"
        )));
    }
    Ok(())
}

fn check_position(ticker: &str, position: &PositionState) -> Result<()> {
    let amounts = [
        ("long_cost_basis", position.long_cost_basis),
        ("short_cost_basis", position.short_cost_basis),
        ("short_margin_used", position.short_margin_used),
    ];
    for (field, value) in amounts {
        if !value.is_finite() || value < 0.0 {
            return Err(Error::Validation(format!(
                "{ticker} {field} must be a finite non-negative amount, got {value}"
            )));
        }
    }
    Ok(())
}

/// Wire shape of a [`Portfolio`] before validation
#[derive(Deserialize)]
struct PortfolioRecord {
    cash: f64,
    margin_requirement: f64,
    #[serde(default)]
    margin_used: f64,
    positions: BTreeMap<String, PositionState>,
    realized_gains: BTreeMap<String, RealizedGains>,
}

impl TryFrom<PortfolioRecord> for Portfolio {
    type Error = Error;

    /// Aggregate margin is recomputed from the positions; a stored value that
    /// disagrees is rejected.
    fn try_from(record: PortfolioRecord) -> Result<Self> {
        check_cash(record.cash)?;
        check_margin_requirement(record.margin_requirement)?;
        if record.positions.is_empty() {
            return Err(Error::Validation("at least one ticker is required".to_string()));
        }
        if !record.positions.keys().eq(record.realized_gains.keys()) {
            return Err(Error::Validation(
                "positions and realized_gains must cover the same tickers".to_string(),
            ));
        }
        for (ticker, position) in &record.positions {
            if ticker.trim().to_ascii_uppercase() != *ticker || ticker.is_empty() {
                return Err(Error::Validation(format!(
                    "ticker {ticker:?} is not a normalized symbol"
                )));
            }
            check_position(ticker, position)?;
        }
        for (ticker, gains) in &record.realized_gains {
            if !gains.long.is_finite() || !gains.short.is_finite() {
                return Err(Error::Validation(format!(
                    "{ticker} realized gains must be finite"
                )));
            }
        }

        let margin_used: f64 = record.positions.values().map(|p| p.short_margin_used).sum();
        if (record.margin_used - margin_used).abs() > 1e-6 {
            return Err(Error::Validation(format!(
                "margin_used {} does not match short margin {margin_used}",
                record.margin_used
            )));
        }

        Ok(Self {
            cash: record.cash,
            margin_requirement: record.margin_requirement,
            margin_used,
            positions: record.positions,
            realized_gains: record.realized_gains,
        })
    }
}

/// Trim, upper-case and de-duplicate tickers, keeping first-seen order
pub fn normalize_tickers<S: AsRef<str>>(tickers: &[S]) -> Result<Vec<String>> {
    if tickers.is_empty() {
        return Err(Error::Validation("at least one ticker is required".to_string()));
    }
    let mut out: Vec<String> = Vec::with_capacity(tickers.len());
    for raw in tickers {
        let ticker = raw.as_ref().trim().to_ascii_uppercase();
        if ticker.is_empty() {
            return Err(Error::Validation("ticker symbols must not be blank".to_string()));
        }
        if !out.contains(&ticker) {
            out.push(ticker);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_portfolio_zeroed() {
        let portfolio = Portfolio::new(&["AAPL", "MSFT"], 100_000.0, 0.0).unwrap();

        assert_eq!(portfolio.cash(), 100_000.0);
        assert_eq!(portfolio.margin_used(), 0.0);
        assert_eq!(portfolio.margin_requirement(), 0.0);
        assert_eq!(portfolio.tickers().collect::<Vec<_>>(), vec!["AAPL", "MSFT"]);

        for ticker in ["AAPL", "MSFT"] {
            assert_eq!(portfolio.position(ticker), Some(&PositionState::default()));
            assert_eq!(portfolio.realized_gains(ticker), Some(&RealizedGains::default()));
        }
    }

    #[test]
    fn test_rejects_non_positive_cash() {
        let err = Portfolio::new(&["AAPL"], 0.0, 0.0).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(Portfolio::new(&["AAPL"], -5.0, 0.0).is_err());
        assert!(Portfolio::new(&["AAPL"], f64::NAN, 0.0).is_err());
    }

    #[test]
    fn test_rejects_margin_out_of_range() {
        let err = Portfolio::new(&["AAPL"], 1_000.0, 1.5).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(Portfolio::new(&["AAPL"], 1_000.0, -0.1).is_err());
        assert!(Portfolio::new(&["AAPL"], 1_000.0, 1.0).is_ok());
    }

    #[test]
    fn test_ticker_normalization() {
        let portfolio = Portfolio::new(&[" aapl", "AAPL", "msft "], 10.0, 0.5).unwrap();
        assert_eq!(portfolio.tickers().count(), 2);
        assert!(portfolio.contains("AAPL"));
        assert!(portfolio.contains("MSFT"));

        assert!(Portfolio::new(&["AAPL", "  "], 10.0, 0.5).is_err());
        assert!(Portfolio::new::<&str>(&[], 10.0, 0.5).is_err());
    }

    #[test]
    fn test_with_position_keeps_ticker_set() {
        let portfolio = Portfolio::new(&["AAPL"], 1_000.0, 0.5).unwrap();
        let position = PositionState {
            short: 10,
            short_cost_basis: 20.0,
            short_margin_used: 100.0,
            ..PositionState::default()
        };

        let updated = portfolio.with_position("AAPL", position).unwrap();
        assert_eq!(updated.margin_used(), 100.0);
        assert_eq!(updated.net_shares("AAPL"), Some(-10));
        // source portfolio untouched
        assert_eq!(portfolio.margin_used(), 0.0);

        assert!(portfolio.with_position("TSLA", position).is_err());
    }

    #[test]
    fn test_serializes_snake_case_field_names() {
        let portfolio = Portfolio::new(&["AAPL"], 500.0, 0.25).unwrap();
        let json = serde_json::to_value(&portfolio).unwrap();
        assert_eq!(json["margin_requirement"], 0.25);
        assert_eq!(json["positions"]["AAPL"]["long_cost_basis"], 0.0);
        assert_eq!(json["realized_gains"]["AAPL"]["short"], 0.0);
    }

    #[test]
    fn test_with_position_rejects_bad_amounts() {
        let portfolio = Portfolio::new(&["AAPL"], 1_000.0, 0.5).unwrap();

        let negative = PositionState {
            long: 5,
            long_cost_basis: -50.0,
            ..PositionState::default()
        };
        let err = portfolio.with_position("AAPL", negative).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let nan_margin = PositionState {
            short: 5,
            short_margin_used: f64::NAN,
            ..PositionState::default()
        };
        assert!(portfolio.with_position("AAPL", nan_margin).is_err());
        assert_eq!(portfolio.margin_used(), 0.0);
    }

    #[test]
    fn test_with_cash() {
        let portfolio = Portfolio::new(&["AAPL"], 1_000.0, 0.5).unwrap();

        let drained = portfolio.with_cash(0.0).unwrap();
        assert_eq!(drained.cash(), 0.0);
        assert_eq!(portfolio.cash(), 1_000.0);

        assert!(matches!(portfolio.with_cash(-1e9), Err(Error::Validation(_))));
        assert!(portfolio.with_cash(f64::INFINITY).is_err());
    }

    #[test]
    fn test_deserialize_roundtrips_valid_portfolio() {
        let portfolio = Portfolio::new(&["AAPL", "MSFT"], 500.0, 0.25)
            .unwrap()
            .with_position(
                "MSFT",
                PositionState {
                    short: 3,
                    short_cost_basis: 400.0,
                    short_margin_used: 300.0,
                    ..PositionState::default()
                },
            )
            .unwrap();
        let json = serde_json::to_string(&portfolio).unwrap();
        let restored: Portfolio = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, portfolio);
    }

    #[test]
    fn test_deserialize_rejects_broken_ledger() {
        let zero = serde_json::json!({
            "long": 0, "short": 0,
            "long_cost_basis": 0.0, "short_cost_basis": 0.0, "short_margin_used": 0.0
        });
        let gains = serde_json::json!({"long": 0.0, "short": 0.0});

        let mismatched = serde_json::json!({
            "cash": 100.0,
            "margin_requirement": 0.5,
            "margin_used": 0.0,
            "positions": {"AAPL": zero.clone()},
            "realized_gains": {"TSLA": gains.clone()},
        });
        assert!(serde_json::from_value::<Portfolio>(mismatched).is_err());

        let negative_cash = serde_json::json!({
            "cash": -5.0,
            "margin_requirement": 0.5,
            "margin_used": 0.0,
            "positions": {"AAPL": zero.clone()},
            "realized_gains": {"AAPL": gains.clone()},
        });
        assert!(serde_json::from_value::<Portfolio>(negative_cash).is_err());

        let bad_margin = serde_json::json!({
            "cash": 5.0,
            "margin_requirement": 1.5,
            "margin_used": 0.0,
            "positions": {"AAPL": zero.clone()},
            "realized_gains": {"AAPL": gains.clone()},
        });
        assert!(serde_json::from_value::<Portfolio>(bad_margin).is_err());

        let lowercase = serde_json::json!({
            "cash": 5.0,
            "margin_requirement": 0.5,
            "margin_used": 0.0,
            "positions": {"aapl": zero.clone()},
            "realized_gains": {"aapl": gains.clone()},
        });
        assert!(serde_json::from_value::<Portfolio>(lowercase).is_err());
    }
}
