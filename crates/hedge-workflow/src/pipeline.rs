//! Pipeline façade
//!
//! [`Pipeline::run`] is the single entry point for front ends. It validates
//! the request, compiles a plan (falling back once to the default analysts),
//! executes it and parses the decision payload. Every failure is folded into
//! [`RunOutcome::Failed`]; nothing crosses the boundary as a panic or `Err`.

use crate::config::PipelineConfig;
use crate::parser;
use crate::plan::{self, AnalystSelection, WorkflowPlan};
use crate::registry::CapabilityRegistry;
use crate::scheduler::{AnalystFailure, Scheduler};
use chrono::{Local, Months, NaiveDate};
use hedge_core::portfolio::normalize_tickers;
use hedge_core::{
    AnalystKey, AnalystSignals, CancelToken, Decisions, Error, ModelConfig, Portfolio,
    PortfolioCapability, ProgressReporter, Result, RiskAssessment, RiskCapability, RunInput,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Date format accepted for start and end dates
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Months between the default start date and the end date
const DEFAULT_LOOKBACK_MONTHS: u32 = 3;

/// Parameters of one run
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub tickers: Vec<String>,
    /// `YYYY-MM-DD`; three months before the end date when absent
    pub start_date: Option<String>,
    /// `YYYY-MM-DD`; today when absent
    pub end_date: Option<String>,
    pub initial_cash: f64,
    pub margin_requirement: f64,
    pub analysts: AnalystSelection,
    pub model: ModelConfig,
    pub progress: ProgressReporter,
    pub cancel: CancelToken,
}

impl RunRequest {
    /// Request with default cash (100 000), no margin and every registered analyst
    pub fn new<I, S>(tickers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tickers: tickers.into_iter().map(Into::into).collect(),
            start_date: None,
            end_date: None,
            initial_cash: 100_000.0,
            margin_requirement: 0.0,
            analysts: AnalystSelection::All,
            model: ModelConfig::default(),
            progress: ProgressReporter::disabled(),
            cancel: CancelToken::new(),
        }
    }

    pub fn with_dates(mut self, start: Option<String>, end: Option<String>) -> Self {
        self.start_date = start;
        self.end_date = end;
        self
    }

    pub fn with_cash(mut self, initial_cash: f64, margin_requirement: f64) -> Self {
        self.initial_cash = initial_cash;
        self.margin_requirement = margin_requirement;
        self
    }

    pub fn with_analysts(mut self, analysts: AnalystSelection) -> Self {
        self.analysts = analysts;
        self
    }

    pub fn with_model(mut self, model: ModelConfig) -> Self {
        self.model = model;
        self
    }

    pub fn with_progress(mut self, progress: ProgressReporter) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Result of a completed run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// `None` when the decision payload could not be parsed
    pub decisions: Option<Decisions>,
    pub analyst_signals: AnalystSignals,
    pub risk: BTreeMap<String, RiskAssessment>,
    /// Analysts the executed plan contained, sorted
    pub analysts: Vec<AnalystKey>,
    pub failed_analysts: Vec<AnalystFailure>,
    /// Whether the plan came from the default analyst fallback
    pub fallback_used: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parse_error: Option<String>,
    pub tickers: Vec<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

/// Error envelope of a failed run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunFailure {
    pub error: String,
    /// Stable snake_case error kind
    pub kind: &'static str,
    pub diagnostic: String,
}

impl From<Error> for RunFailure {
    fn from(err: Error) -> Self {
        Self {
            error: err.to_string(),
            kind: err.kind(),
            diagnostic: format!("{err:?}"),
        }
    }
}

/// Outcome of [`Pipeline::run`]
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum RunOutcome {
    Completed(RunReport),
    Failed(RunFailure),
}

impl RunOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    pub fn report(&self) -> Option<&RunReport> {
        match self {
            Self::Completed(report) => Some(report),
            Self::Failed(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&RunFailure> {
        match self {
            Self::Completed(_) => None,
            Self::Failed(failure) => Some(failure),
        }
    }
}

/// A compiled plan and whether the fallback produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledPlan {
    pub plan: WorkflowPlan,
    pub fallback_used: bool,
}

type Clock = Arc<dyn Fn() -> NaiveDate + Send + Sync>;

/// Build, execute and parse in one call
#[derive(Clone)]
pub struct Pipeline {
    registry: Arc<CapabilityRegistry>,
    scheduler: Scheduler,
    config: PipelineConfig,
    today: Clock,
}

impl Pipeline {
    /// Create a new pipeline builder
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run the pipeline for `request`
    pub async fn run(&self, request: RunRequest) -> RunOutcome {
        match self.try_run(request).await {
            Ok(report) => RunOutcome::Completed(report),
            Err(err) => {
                error!("Run failed: {}", err);
                RunOutcome::Failed(err.into())
            }
        }
    }

    async fn try_run(&self, request: RunRequest) -> Result<RunReport> {
        let tickers = normalize_tickers(&request.tickers)?;
        let (start_date, end_date) = resolve_dates(
            request.start_date.as_deref(),
            request.end_date.as_deref(),
            (self.today)(),
        )?;
        let portfolio = Portfolio::new(&tickers, request.initial_cash, request.margin_requirement)?;
        let compiled = self.compile(&request.analysts)?;

        info!(
            "Running {} analyst(s) over {:?} from {} to {}",
            compiled.plan.analyst_count(),
            tickers,
            start_date,
            end_date
        );

        let input = RunInput {
            tickers: tickers.clone(),
            start_date,
            end_date,
            portfolio: Arc::new(portfolio),
            model: request.model,
        };
        let output = self
            .scheduler
            .execute(&compiled.plan, input, &request.progress, &request.cancel)
            .await?;

        let (decisions, parse_error) = match parser::parse_for(&output.payload, &tickers) {
            Ok(decisions) => (Some(decisions), None),
            Err(e) => {
                warn!("Could not parse decision payload: {}", e);
                (None, Some(e.to_string()))
            }
        };

        Ok(RunReport {
            decisions,
            analyst_signals: output.analyst_signals,
            risk: output.adjusted.risk,
            analysts: compiled.plan.analysts().cloned().collect(),
            failed_analysts: output.failed_analysts,
            fallback_used: compiled.fallback_used,
            parse_error,
            tickers,
            start_date,
            end_date,
        })
    }

    /// Compile a plan for `selection`, falling back once to the default analysts
    ///
    /// # Errors
    ///
    /// Fails if `selection` is rejected with a non-build error, or if the
    /// fallback selection is rejected too.
    pub fn compile(&self, selection: &AnalystSelection) -> Result<CompiledPlan> {
        match plan::build(&self.registry, selection) {
            Ok(plan) => Ok(CompiledPlan {
                plan,
                fallback_used: false,
            }),
            Err(err) if err.is_build_error() => {
                warn!(
                    "Workflow build failed ({}), falling back to {:?}",
                    err, self.config.fallback_analysts
                );
                let fallback = AnalystSelection::Keys(self.config.fallback_analysts.clone());
                plan::build(&self.registry, &fallback)
                    .map(|plan| CompiledPlan {
                        plan,
                        fallback_used: true,
                    })
                    .map_err(|fallback_err| {
                        Error::Config(format!(
                            "{err}; fallback to default analysts failed: {fallback_err}"
                        ))
                    })
            }
            Err(err) => Err(err),
        }
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Pipeline`]
#[derive(Default)]
pub struct PipelineBuilder {
    registry: Option<CapabilityRegistry>,
    risk: Option<Arc<dyn RiskCapability>>,
    portfolio: Option<Arc<dyn PortfolioCapability>>,
    config: Option<PipelineConfig>,
    today: Option<Clock>,
}

impl PipelineBuilder {
    pub fn registry(mut self, registry: CapabilityRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn risk(mut self, risk: Arc<dyn RiskCapability>) -> Self {
        self.risk = Some(risk);
        self
    }

    pub fn portfolio(mut self, portfolio: Arc<dyn PortfolioCapability>) -> Self {
        self.portfolio = Some(portfolio);
        self
    }

    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Override the source of today's date used for default dates
    pub fn today<F>(mut self, today: F) -> Self
    where
        F: Fn() -> NaiveDate + Send + Sync + 'static,
    {
        self.today = Some(Arc::new(today));
        self
    }

    /// # Errors
    ///
    /// [`Error::Config`] if the risk or portfolio capability is missing or the
    /// configuration is invalid.
    pub fn build(self) -> Result<Pipeline> {
        let risk = self
            .risk
            .ok_or_else(|| Error::Config("risk capability is required".to_string()))?;
        let portfolio = self
            .portfolio
            .ok_or_else(|| Error::Config("portfolio capability is required".to_string()))?;
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let registry = Arc::new(self.registry.unwrap_or_default());
        let scheduler = Scheduler::new(Arc::clone(&registry), risk, portfolio, config.clone());

        Ok(Pipeline {
            registry,
            scheduler,
            config,
            today: self
                .today
                .unwrap_or_else(|| Arc::new(|| Local::now().date_naive())),
        })
    }
}

/// Resolve optional `YYYY-MM-DD` dates against `today`
///
/// # Errors
///
/// [`Error::Validation`] for unparseable dates or a start after the end.
pub fn resolve_dates(
    start: Option<&str>,
    end: Option<&str>,
    today: NaiveDate,
) -> Result<(NaiveDate, NaiveDate)> {
    let end = match non_empty(end) {
        Some(raw) => parse_date("end", raw)?,
        None => today,
    };
    let start = match non_empty(start) {
        Some(raw) => parse_date("start", raw)?,
        None => end
            .checked_sub_months(Months::new(DEFAULT_LOOKBACK_MONTHS))
            .ok_or_else(|| Error::Validation(format!("cannot compute start date from {end}")))?,
    };

    if start > end {
        return Err(Error::Validation(format!(
            "start date {start} is after end date {end}"
        )));
    }
    Ok((start, end))
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn parse_date(which: &str, raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT).map_err(|e| {
        Error::Validation(format!("{which} date '{raw}' must be in YYYY-MM-DD format: {e}"))
    })
}
