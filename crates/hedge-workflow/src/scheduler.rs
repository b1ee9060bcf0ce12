//! Plan execution: fan-out, barrier, risk, barrier, portfolio
//!
//! The scheduler runs a compiled [`WorkflowPlan`] in four strictly ordered
//! stages:
//! 1. Start: capture the run input as a shared, read-only snapshot
//! 2. Fan-out: evaluate every analyst concurrently, each with its own timeout
//! 3. Risk: once every analyst has returned, failed or timed out
//! 4. Portfolio: once the risk stage has returned
//!
//! Analyst tasks never share mutable state. Each returns its key and outcome
//! through the [`JoinSet`], and the collector loop is the only writer of the
//! [`AnalystSignals`] map.

use crate::config::{AnalystFailurePolicy, PipelineConfig};
use crate::plan::WorkflowPlan;
use crate::registry::CapabilityRegistry;
use hedge_core::{
    AdjustedSignals, AnalystKey, AnalystSignals, CancelToken, Error, PortfolioCapability,
    ProgressReporter, Result, RiskCapability, RunInput, Signal, Stage, TickerSignals,
};
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// An analyst that did not contribute signals to a run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalystFailure {
    pub analyst: AnalystKey,
    pub error: String,
}

/// Everything a completed execution produced
#[derive(Debug, Clone)]
pub struct ExecutionOutput {
    /// Analyst signals as collected at the first barrier
    pub analyst_signals: AnalystSignals,
    /// Risk stage output
    pub adjusted: AdjustedSignals,
    /// Raw decision payload from the portfolio stage
    pub payload: String,
    /// Analysts that failed under a non-fatal failure policy
    pub failed_analysts: Vec<AnalystFailure>,
}

/// Executes compiled plans against a registry and the two aggregation stages
#[derive(Clone)]
pub struct Scheduler {
    registry: Arc<CapabilityRegistry>,
    risk: Arc<dyn RiskCapability>,
    portfolio: Arc<dyn PortfolioCapability>,
    config: PipelineConfig,
}

impl Scheduler {
    pub fn new(
        registry: Arc<CapabilityRegistry>,
        risk: Arc<dyn RiskCapability>,
        portfolio: Arc<dyn PortfolioCapability>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            registry,
            risk,
            portfolio,
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run `plan` to completion
    ///
    /// # Errors
    ///
    /// - [`Error::Cancelled`] if `cancel` fires before the portfolio stage returns
    /// - [`Error::Execution`] if a stage fails, times out or panics (analyst
    ///   failures only under [`AnalystFailurePolicy::FailRun`], or when every
    ///   analyst failed)
    /// - [`Error::UnknownCapability`] if the plan names an analyst missing from
    ///   the registry
    pub async fn execute(
        &self,
        plan: &WorkflowPlan,
        input: RunInput,
        progress: &ProgressReporter,
        cancel: &CancelToken,
    ) -> Result<ExecutionOutput> {
        // Start
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let input = Arc::new(input);
        progress.update(Stage::Start.as_str(), None, "Run input captured");
        info!(
            "Starting run for {} ticker(s) with {} analyst(s)",
            input.tickers.len(),
            plan.analyst_count()
        );

        // Fan-out and first barrier
        let (analyst_signals, failed_analysts) =
            self.fan_out(plan, &input, progress, cancel).await?;
        info!(
            "All analysts finished: {} succeeded, {} failed",
            analyst_signals.len(),
            failed_analysts.len()
        );

        // Risk and second barrier
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        progress.update(Stage::Risk.as_str(), None, "Assessing risk");
        let adjusted = {
            let risk = Arc::clone(&self.risk);
            let signals = analyst_signals.clone();
            let input = Arc::clone(&input);
            let progress = progress.clone();
            self.run_stage(Stage::Risk, cancel, async move {
                risk.assess(&signals, &input, &progress).await
            })
            .await?
        };
        progress.update(Stage::Risk.as_str(), None, "Done");

        // Portfolio
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        progress.update(Stage::Portfolio.as_str(), None, "Synthesizing decisions");
        let payload = {
            let portfolio = Arc::clone(&self.portfolio);
            let adjusted = adjusted.clone();
            let input = Arc::clone(&input);
            let progress = progress.clone();
            self.run_stage(Stage::Portfolio, cancel, async move {
                portfolio.synthesize(&adjusted, &input, &progress).await
            })
            .await?
        };
        progress.update(Stage::Portfolio.as_str(), None, "Done");
        info!("Run completed");

        Ok(ExecutionOutput {
            analyst_signals,
            adjusted,
            payload,
            failed_analysts,
        })
    }

    /// Evaluate every analyst of `plan` concurrently and wait for all of them
    async fn fan_out(
        &self,
        plan: &WorkflowPlan,
        input: &Arc<RunInput>,
        progress: &ProgressReporter,
        cancel: &CancelToken,
    ) -> Result<(AnalystSignals, Vec<AnalystFailure>)> {
        let mut capabilities = Vec::with_capacity(plan.analyst_count());
        for key in plan.analysts() {
            capabilities.push((key.clone(), self.registry.lookup(key)?));
        }

        let mut tasks: JoinSet<(AnalystKey, Result<TickerSignals>)> = JoinSet::new();
        let mut task_keys = HashMap::with_capacity(capabilities.len());
        let timeout = self.config.analyst_timeout;

        for (key, capability) in capabilities {
            let input = Arc::clone(input);
            let progress = progress.clone();
            let task_key = key.clone();
            let handle = tasks.spawn(async move {
                progress.update(key.as_str(), None, "Analyzing");
                let outcome =
                    match tokio::time::timeout(timeout, capability.evaluate(&input, &progress))
                        .await
                    {
                        Ok(result) => result,
                        Err(_) => Err(Error::execution(
                            Stage::Analysts,
                            format!("analyst '{key}' timed out after {timeout:?}"),
                        )),
                    };
                (key, outcome)
            });
            task_keys.insert(handle.id(), task_key);
        }

        let mut signals = AnalystSignals::new();
        let mut failures = Vec::new();

        loop {
            let joined = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    warn!("Run cancelled with {} analyst(s) still running", tasks.len());
                    tasks.abort_all();
                    return Err(Error::Cancelled);
                }
                joined = tasks.join_next_with_id() => joined,
            };
            let Some(joined) = joined else {
                break;
            };

            let (key, outcome) = match joined {
                Ok((_, pair)) => pair,
                Err(join_error) => {
                    let key = task_keys.get(&join_error.id()).cloned().ok_or_else(|| {
                        Error::execution(
                            Stage::Analysts,
                            format!("analyst task failed: {join_error}"),
                        )
                    })?;
                    let message = format!("analyst '{key}' task failed: {join_error}");
                    (key, Err(Error::execution(Stage::Analysts, message)))
                }
            };

            match outcome.and_then(|raw| accept_signals(&key, raw, &input.tickers)) {
                Ok(per_ticker) => {
                    debug!("Analyst '{}' returned {} signal(s)", key, per_ticker.len());
                    progress.update(key.as_str(), None, "Done");
                    signals.insert(key, per_ticker);
                }
                Err(e) => {
                    warn!("Analyst '{}' failed: {}", key, e);
                    progress.update(key.as_str(), None, "Failed");
                    failures.push(AnalystFailure {
                        analyst: key,
                        error: e.to_string(),
                    });
                }
            }
        }

        self.apply_failure_policy(signals, failures, &input.tickers)
    }

    fn apply_failure_policy(
        &self,
        mut signals: AnalystSignals,
        failures: Vec<AnalystFailure>,
        tickers: &[String],
    ) -> Result<(AnalystSignals, Vec<AnalystFailure>)> {
        if failures.is_empty() {
            return Ok((signals, failures));
        }

        match self.config.failure_policy {
            AnalystFailurePolicy::FailRun => {
                let first = &failures[0];
                Err(Error::execution(
                    Stage::Analysts,
                    format!(
                        "{} analyst(s) failed; first: {}: {}",
                        failures.len(),
                        first.analyst,
                        first.error
                    ),
                ))
            }
            AnalystFailurePolicy::SkipFailed => {
                if signals.is_empty() {
                    return Err(Error::execution(
                        Stage::Analysts,
                        format!("all {} analyst(s) failed", failures.len()),
                    ));
                }
                Ok((signals, failures))
            }
            AnalystFailurePolicy::NeutralFallback => {
                for failure in &failures {
                    let neutral = tickers
                        .iter()
                        .map(|t| {
                            (
                                t.clone(),
                                Signal::neutral(format!("analyst unavailable: {}", failure.error)),
                            )
                        })
                        .collect();
                    signals.insert(failure.analyst.clone(), neutral);
                }
                Ok((signals, failures))
            }
        }
    }

    /// Run one aggregation stage in its own task with the stage timeout
    async fn run_stage<T, F>(&self, stage: Stage, cancel: &CancelToken, future: F) -> Result<T>
    where
        F: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let timeout = self.config.stage_timeout;
        let mut handle = tokio::spawn(tokio::time::timeout(timeout, future));

        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                handle.abort();
                Err(Error::Cancelled)
            }
            joined = &mut handle => match joined {
                Ok(Ok(result)) => result.map_err(|e| stage_error(stage, e)),
                Ok(Err(_)) => Err(timed_out(stage, timeout)),
                Err(join_error) => {
                    Err(Error::execution(stage, format!("task failed: {join_error}")))
                }
            },
        }
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Check an analyst's output against the requested tickers
///
/// Signals for tickers outside the request are dropped. A signal with a
/// confidence outside `[0, 100]` fails the analyst.
fn accept_signals(
    key: &AnalystKey,
    raw: TickerSignals,
    tickers: &[String],
) -> Result<TickerSignals> {
    let mut accepted = TickerSignals::new();
    for (ticker, signal) in raw {
        if !tickers.contains(&ticker) {
            warn!("Analyst '{}' returned a signal for unrequested ticker {}", key, ticker);
            continue;
        }
        if !signal.is_valid() {
            return Err(Error::execution(
                Stage::Analysts,
                format!(
                    "analyst '{key}' returned confidence {} for {ticker}",
                    signal.confidence
                ),
            ));
        }
        accepted.insert(ticker, signal);
    }
    Ok(accepted)
}

fn stage_error(stage: Stage, error: Error) -> Error {
    match error {
        Error::Execution { .. } | Error::Cancelled => error,
        other => Error::execution(stage, other.to_string()),
    }
}

fn timed_out(stage: Stage, timeout: Duration) -> Error {
    Error::execution(stage, format!("timed out after {timeout:?}"))
}
