//! Error types for hedge-core

use thiserror::Error;

/// Result type alias for hedge-core
pub type Result<T> = std::result::Result<T, Error>;

/// Pipeline stage an execution error originated from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Run input capture
    Start,
    /// Concurrent analyst evaluation
    Analysts,
    /// Risk aggregation
    Risk,
    /// Portfolio synthesis
    Portfolio,
}

impl Stage {
    /// Stable lowercase name
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Analysts => "analysts",
            Self::Risk => "risk_management",
            Self::Portfolio => "portfolio_management",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error type for pipeline operations
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid or empty analyst selection, or bad pipeline configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Analyst key not present in the registry or not a valid key
    #[error("Unknown capability: {0}")]
    UnknownCapability(String),

    /// Bad cash, margin, date or ticker input
    #[error("Validation error: {0}")]
    Validation(String),

    /// A stage's capability invocation failed, timed out or panicked
    #[error("Execution failed in {stage} stage: {message}")]
    Execution {
        stage: Stage,
        message: String,
    },

    /// Terminal payload could not be decoded
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// The run was cancelled by the caller
    #[error("Run cancelled")]
    Cancelled,
}

impl Error {
    /// Shorthand for an execution error
    pub fn execution(stage: Stage, message: impl Into<String>) -> Self {
        Self::Execution {
            stage,
            message: message.into(),
        }
    }

    /// Stable snake_case name used in result envelopes
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config_error",
            Self::UnknownCapability(_) => "unknown_capability_error",
            Self::Validation(_) => "validation_error",
            Self::Execution { .. } => "execution_error",
            Self::Parse(_) => "parse_error",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether a plan build failing with this error may fall back to the
    /// default analyst set
    pub fn is_build_error(&self) -> bool {
        matches!(self, Self::Config(_) | Self::UnknownCapability(_))
    }
}

/// Failure to decode the portfolio stage's decision payload
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    /// Payload is not valid JSON (truncated, prose, ...)
    #[error("Malformed decision payload: {0}")]
    Malformed(String),

    /// Payload has the wrong shape at the top level
    #[error("Decision payload type mismatch: expected {expected}, got {found}")]
    TypeMismatch {
        expected: &'static str,
        found: String,
    },

    /// A decision entry violates the schema
    #[error("Invalid decision for {ticker}: {reason}")]
    Schema {
        ticker: String,
        reason: String,
    },
}
