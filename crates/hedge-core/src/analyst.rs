//! Analyst keys and the catalogue of known analyst personas
//!
//! Analysts are addressed by an [`AnalystKey`], a validated identifier such as
//! `warren_buffett`. The [`catalog`] lists the personas the application ships
//! with, in the order reports present them.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Validated analyst identifier
///
/// Keys are non-empty and consist of lowercase ASCII letters, digits and `_`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AnalystKey(String);

impl AnalystKey {
    /// Parse and validate a key
    pub fn new(key: impl Into<String>) -> Result<Self> {
        let key = key.into();
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
        if valid {
            Ok(Self(key))
        } else {
            Err(Error::UnknownCapability(format!(
                "'{key}' is not a valid analyst key"
            )))
        }
    }

    /// The key as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Human readable name from the catalogue, or a title-cased key
    pub fn display_name(&self) -> String {
        catalog::lookup(self.as_str()).map_or_else(
            || {
                self.0
                    .split('_')
                    .filter(|part| !part.is_empty())
                    .map(|part| {
                        let mut chars = part.chars();
                        chars.next().map_or_else(String::new, |first| {
                            first.to_ascii_uppercase().to_string() + chars.as_str()
                        })
                    })
                    .collect::<Vec<_>>()
                    .join(" ")
            },
            |entry| entry.display_name.to_string(),
        )
    }
}

impl fmt::Display for AnalystKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for AnalystKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for AnalystKey {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<AnalystKey> for String {
    fn from(key: AnalystKey) -> Self {
        key.0
    }
}

impl AsRef<str> for AnalystKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::borrow::Borrow<str> for AnalystKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Known analyst personas
pub mod catalog {
    /// One catalogue entry
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CatalogEntry {
        pub key: &'static str,
        pub display_name: &'static str,
        pub description: &'static str,
    }

    /// Personas in presentation order
    pub const ENTRIES: &[CatalogEntry] = &[
        CatalogEntry {
            key: "aswath_damodaran",
            display_name: "Aswath Damodaran",
            description: "The dean of valuation",
        },
        CatalogEntry {
            key: "ben_graham",
            display_name: "Ben Graham",
            description: "Father of value investing, seeks a margin of safety",
        },
        CatalogEntry {
            key: "bill_ackman",
            display_name: "Bill Ackman",
            description: "Activist investor pushing for corporate change",
        },
        CatalogEntry {
            key: "cathie_wood",
            display_name: "Cathie Wood",
            description: "Growth investor focused on disruptive innovation",
        },
        CatalogEntry {
            key: "charlie_munger",
            display_name: "Charlie Munger",
            description: "Rational thinker who prefers quality businesses",
        },
        CatalogEntry {
            key: "michael_burry",
            display_name: "Michael Burry",
            description: "Contrarian deep-value investor",
        },
        CatalogEntry {
            key: "peter_lynch",
            display_name: "Peter Lynch",
            description: "Ten-bagger hunter in everyday businesses",
        },
        CatalogEntry {
            key: "phil_fisher",
            display_name: "Phil Fisher",
            description: "Growth pioneer relying on deep company research",
        },
        CatalogEntry {
            key: "rakesh_jhunjhunwala",
            display_name: "Rakesh Jhunjhunwala",
            description: "The big bull of India",
        },
        CatalogEntry {
            key: "stanley_druckenmiller",
            display_name: "Stanley Druckenmiller",
            description: "Macro investor riding economic cycles",
        },
        CatalogEntry {
            key: "warren_buffett",
            display_name: "Warren Buffett",
            description: "Seeks companies with durable moats",
        },
        CatalogEntry {
            key: "technical_analyst",
            display_name: "Technical Analyst",
            description: "Chart patterns and price trends",
        },
        CatalogEntry {
            key: "fundamentals_analyst",
            display_name: "Fundamentals Analyst",
            description: "Financial statement analysis",
        },
        CatalogEntry {
            key: "sentiment_analyst",
            display_name: "Sentiment Analyst",
            description: "Market psychology and insider activity",
        },
        CatalogEntry {
            key: "valuation_analyst",
            display_name: "Valuation Analyst",
            description: "Intrinsic value estimation",
        },
    ];

    /// Find a catalogue entry by key
    pub fn lookup(key: &str) -> Option<&'static CatalogEntry> {
        ENTRIES.iter().find(|entry| entry.key == key)
    }

    /// Presentation rank of a key; unknown keys sort after every catalogue entry
    pub fn rank(key: &str) -> usize {
        ENTRIES
            .iter()
            .position(|entry| entry.key == key)
            .unwrap_or(ENTRIES.len())
    }
}
