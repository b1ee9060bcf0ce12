//! Configuration for pipeline execution

use hedge_core::{AnalystKey, Error, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Analysts used when the requested selection cannot be compiled
pub const DEFAULT_FALLBACK_ANALYSTS: [&str; 3] =
    ["warren_buffett", "peter_lynch", "technical_analyst"];

/// What the scheduler does when a single analyst fails or times out
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalystFailurePolicy {
    /// Any analyst failure fails the whole run
    #[default]
    FailRun,
    /// Continue with the analysts that succeeded
    SkipFailed,
    /// Substitute a zero-confidence neutral signal for the failed analyst
    NeutralFallback,
}

impl FromStr for AnalystFailurePolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "fail_run" | "fail" => Ok(Self::FailRun),
            "skip_failed" | "skip" => Ok(Self::SkipFailed),
            "neutral_fallback" | "neutral" => Ok(Self::NeutralFallback),
            other => Err(Error::Config(format!("unknown failure policy '{other}'"))),
        }
    }
}

/// Configuration for pipeline runs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Timeout applied to each analyst invocation independently
    pub analyst_timeout: Duration,

    /// Timeout applied to the risk and portfolio stages
    pub stage_timeout: Duration,

    /// Per-analyst failure handling
    pub failure_policy: AnalystFailurePolicy,

    /// Analysts used for the single fallback attempt after a build failure
    pub fallback_analysts: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            analyst_timeout: Duration::from_secs(300),
            stage_timeout: Duration::from_secs(120),
            failure_policy: AnalystFailurePolicy::FailRun,
            fallback_analysts: DEFAULT_FALLBACK_ANALYSTS.iter().map(ToString::to_string).collect(),
        }
    }
}

impl PipelineConfig {
    /// Create a new configuration builder
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// Override fields from `HEDGE_*` environment variables
    pub fn with_env(self) -> Result<Self> {
        self.with_lookup(|name| std::env::var(name).ok())
    }

    /// Override fields from a variable lookup
    ///
    /// Reads `HEDGE_ANALYST_TIMEOUT_SECS`, `HEDGE_STAGE_TIMEOUT_SECS` and
    /// `HEDGE_FAILURE_POLICY`.
    pub fn with_lookup<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(secs) = lookup("HEDGE_ANALYST_TIMEOUT_SECS") {
            self.analyst_timeout = parse_secs("HEDGE_ANALYST_TIMEOUT_SECS", &secs)?;
        }
        if let Some(secs) = lookup("HEDGE_STAGE_TIMEOUT_SECS") {
            self.stage_timeout = parse_secs("HEDGE_STAGE_TIMEOUT_SECS", &secs)?;
        }
        if let Some(policy) = lookup("HEDGE_FAILURE_POLICY") {
            self.failure_policy = policy.parse()?;
        }
        Ok(self)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.analyst_timeout.is_zero() {
            return Err(Error::Config(
                "analyst_timeout must be greater than 0".to_string(),
            ));
        }
        if self.stage_timeout.is_zero() {
            return Err(Error::Config("stage_timeout must be greater than 0".to_string()));
        }
        if self.fallback_analysts.is_empty() {
            return Err(Error::Config(
                "fallback_analysts must name at least one analyst".to_string(),
            ));
        }
        for key in &self.fallback_analysts {
            AnalystKey::new(key.as_str())?;
        }
        Ok(())
    }
}

fn parse_secs(name: &str, value: &str) -> Result<Duration> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|e| Error::Config(format!("{name} must be a whole number of seconds: {e}")))
}

/// Builder for PipelineConfig
#[derive(Debug, Default)]
pub struct PipelineConfigBuilder {
    analyst_timeout: Option<Duration>,
    stage_timeout: Option<Duration>,
    failure_policy: Option<AnalystFailurePolicy>,
    fallback_analysts: Option<Vec<String>>,
}

impl PipelineConfigBuilder {
    /// Set the per-analyst timeout
    pub fn analyst_timeout(mut self, timeout: Duration) -> Self {
        self.analyst_timeout = Some(timeout);
        self
    }

    /// Set the risk/portfolio stage timeout
    pub fn stage_timeout(mut self, timeout: Duration) -> Self {
        self.stage_timeout = Some(timeout);
        self
    }

    /// Set the per-analyst failure policy
    pub fn failure_policy(mut self, policy: AnalystFailurePolicy) -> Self {
        self.failure_policy = Some(policy);
        self
    }

    /// Set the fallback analyst keys
    pub fn fallback_analysts<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fallback_analysts = Some(keys.into_iter().map(Into::into).collect());
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<PipelineConfig> {
        let defaults = PipelineConfig::default();

        let config = PipelineConfig {
            analyst_timeout: self.analyst_timeout.unwrap_or(defaults.analyst_timeout),
            stage_timeout: self.stage_timeout.unwrap_or(defaults.stage_timeout),
            failure_policy: self.failure_policy.unwrap_or(defaults.failure_policy),
            fallback_analysts: self.fallback_analysts.unwrap_or(defaults.fallback_analysts),
        };

        config.validate()?;
        Ok(config)
    }
}
