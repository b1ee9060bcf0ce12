//! Trading decisions produced by the portfolio stage

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Trading action for one ticker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Buy,
    Sell,
    Short,
    Cover,
    Hold,
}

impl Action {
    pub const ALL: [Action; 5] = [Self::Buy, Self::Sell, Self::Short, Self::Cover, Self::Hold];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Buy => "buy",
            Self::Sell => "sell",
            Self::Short => "short",
            Self::Cover => "cover",
            Self::Hold => "hold",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = String;

    /// Case-insensitive
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|a| a.as_str() == lowered)
            .ok_or_else(|| format!("unknown action '{s}'"))
    }
}

/// Final decision for one ticker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub action: Action,
    pub quantity: u64,
    /// Confidence in percent, `[0, 100]`
    pub confidence: f64,
    pub reasoning: String,
}

impl Decision {
    pub fn hold(reasoning: impl Into<String>) -> Self {
        Self {
            action: Action::Hold,
            quantity: 0,
            confidence: 0.0,
            reasoning: reasoning.into(),
        }
    }
}

/// Decisions keyed by ticker
pub type Decisions = BTreeMap<String, Decision>;
