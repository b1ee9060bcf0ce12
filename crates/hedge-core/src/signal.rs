//! Analyst signals

use crate::AnalystKey;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Direction of an analyst's opinion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalType {
    Bullish,
    Bearish,
    Neutral,
}

impl SignalType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bullish => "bullish",
            Self::Bearish => "bearish",
            Self::Neutral => "neutral",
        }
    }
}

impl std::fmt::Display for SignalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One analyst's opinion on one ticker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    #[serde(rename = "signal")]
    pub signal_type: SignalType,
    /// Confidence in percent, `[0, 100]`
    pub confidence: f64,
    /// Free text or structured reasoning
    #[serde(default)]
    pub reasoning: serde_json::Value,
}

impl Signal {
    pub fn new(
        signal_type: SignalType,
        confidence: f64,
        reasoning: impl Into<serde_json::Value>,
    ) -> Self {
        Self {
            signal_type,
            confidence,
            reasoning: reasoning.into(),
        }
    }

    /// Neutral signal with zero confidence
    pub fn neutral(reasoning: impl Into<String>) -> Self {
        Self::new(SignalType::Neutral, 0.0, reasoning.into())
    }

    /// Whether confidence is a finite percentage
    pub fn is_valid(&self) -> bool {
        self.confidence.is_finite() && (0.0..=100.0).contains(&self.confidence)
    }

    /// Reasoning rendered as plain text
    pub fn reasoning_text(&self) -> String {
        match &self.reasoning {
            serde_json::Value::Null => String::new(),
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// Signals produced by one analyst, keyed by ticker
pub type TickerSignals = BTreeMap<String, Signal>;

/// All analyst output of a run, keyed by analyst then ticker
pub type AnalystSignals = BTreeMap<AnalystKey, TickerSignals>;

/// Count of bullish, bearish and neutral signals for `ticker` across analysts
pub fn tally(signals: &AnalystSignals, ticker: &str) -> (usize, usize, usize) {
    signals
        .values()
        .filter_map(|per_ticker| per_ticker.get(ticker))
        .fold((0, 0, 0), |(bull, bear, neutral), s| match s.signal_type {
            SignalType::Bullish => (bull + 1, bear, neutral),
            SignalType::Bearish => (bull, bear + 1, neutral),
            SignalType::Neutral => (bull, bear, neutral + 1),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_json_shape() {
        let signal = Signal::new(SignalType::Bullish, 80.0, "strong moat");
        let json = serde_json::to_value(&signal).unwrap();
        assert_eq!(json["signal"], "bullish");
        assert_eq!(json["confidence"], 80.0);
        assert_eq!(json["reasoning"], "strong moat");

        let back: Signal = serde_json::from_value(json).unwrap();
        assert_eq!(back, signal);
    }

    #[test]
    fn test_structured_reasoning_text() {
        let signal = Signal::new(
            SignalType::Bearish,
            55.0,
            serde_json::json!({"trend": "down"}),
        );
        assert_eq!(signal.reasoning_text(), r#"{"trend":"down"}"#);
    }

    #[test]
    fn test_validity() {
        assert!(Signal::neutral("n/a").is_valid());
        assert!(!Signal::new(SignalType::Bullish, 101.0, "").is_valid());
        assert!(!Signal::new(SignalType::Bullish, f64::NAN, "").is_valid());
    }

    #[test]
    fn test_tally() {
        let mut signals = AnalystSignals::new();
        for (key, kind) in [
            ("a", SignalType::Bullish),
            ("b", SignalType::Bullish),
            ("c", SignalType::Neutral),
        ] {
            let mut per_ticker = TickerSignals::new();
            per_ticker.insert("AAPL".to_string(), Signal::new(kind, 50.0, ""));
            signals.insert(AnalystKey::new(key).unwrap(), per_ticker);
        }
        assert_eq!(tally(&signals, "AAPL"), (2, 0, 1));
        assert_eq!(tally(&signals, "MSFT"), (0, 0, 0));
    }
}
