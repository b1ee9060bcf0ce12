//! Capability doubles shared by unit tests

use async_trait::async_trait;
use hedge_core::{
    AdjustedSignals, AnalystCapability, AnalystKey, AnalystSignals, Error, PortfolioCapability,
    ProgressReporter, Result, RiskCapability, RunInput, Signal, SignalType, Stage, TickerSignals,
};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

pub fn key(s: &str) -> AnalystKey {
    AnalystKey::new(s).unwrap()
}

/// Returns the same signal for every requested ticker
pub struct StaticAnalyst {
    signal_type: SignalType,
    confidence: f64,
    delay: Duration,
    extra_ticker: Option<String>,
    calls: AtomicUsize,
}

impl StaticAnalyst {
    pub fn bullish(confidence: f64) -> Self {
        Self {
            signal_type: SignalType::Bullish,
            confidence,
            delay: Duration::ZERO,
            extra_ticker: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_extra_ticker(mut self, ticker: &str) -> Self {
        self.extra_ticker = Some(ticker.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnalystCapability for StaticAnalyst {
    async fn evaluate(&self, input: &RunInput, _: &ProgressReporter) -> Result<TickerSignals> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let mut signals: TickerSignals = input
            .tickers
            .iter()
            .map(|t| (t.clone(), Signal::new(self.signal_type, self.confidence, "static")))
            .collect();
        if let Some(extra) = &self.extra_ticker {
            signals.insert(extra.clone(), Signal::new(self.signal_type, self.confidence, "extra"));
        }
        Ok(signals)
    }
}

pub struct FailingAnalyst;

#[async_trait]
impl AnalystCapability for FailingAnalyst {
    async fn evaluate(&self, _: &RunInput, _: &ProgressReporter) -> Result<TickerSignals> {
        Err(Error::execution(Stage::Analysts, "market data unavailable"))
    }
}

pub struct PanickingAnalyst;

#[async_trait]
impl AnalystCapability for PanickingAnalyst {
    async fn evaluate(&self, _: &RunInput, _: &ProgressReporter) -> Result<TickerSignals> {
        panic!("analyst blew up");
    }
}

/// Passes signals through and remembers what it was given
#[derive(Default)]
pub struct RecordingRisk {
    seen: Mutex<Option<AnalystSignals>>,
}

impl RecordingRisk {
    pub fn seen(&self) -> Option<AnalystSignals> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl RiskCapability for RecordingRisk {
    async fn assess(
        &self,
        signals: &AnalystSignals,
        _: &RunInput,
        _: &ProgressReporter,
    ) -> Result<AdjustedSignals> {
        *self.seen.lock().unwrap() = Some(signals.clone());
        Ok(AdjustedSignals::passthrough(signals.clone()))
    }
}

pub struct FailingRisk;

#[async_trait]
impl RiskCapability for FailingRisk {
    async fn assess(
        &self,
        _: &AnalystSignals,
        _: &RunInput,
        _: &ProgressReporter,
    ) -> Result<AdjustedSignals> {
        Err(Error::Validation("risk model rejected input".to_string()))
    }
}

/// Emits a fixed payload, or hold decisions for every requested ticker
pub enum StaticSynthesizer {
    Holds,
    Fixed(String),
}

impl StaticSynthesizer {
    pub fn holds() -> Self {
        Self::Holds
    }

    pub fn fixed(payload: &str) -> Self {
        Self::Fixed(payload.to_string())
    }
}

#[async_trait]
impl PortfolioCapability for StaticSynthesizer {
    async fn synthesize(
        &self,
        _: &AdjustedSignals,
        input: &RunInput,
        _: &ProgressReporter,
    ) -> Result<String> {
        match self {
            Self::Fixed(payload) => Ok(payload.clone()),
            Self::Holds => {
                let decisions: serde_json::Map<String, serde_json::Value> = input
                    .tickers
                    .iter()
                    .map(|t| {
                        (
                            t.clone(),
                            serde_json::json!({
                                "action": "hold",
                                "quantity": 0,
                                "confidence": 50.0,
                                "reasoning": "test"
                            }),
                        )
                    })
                    .collect();
                Ok(serde_json::Value::Object(decisions).to_string())
            }
        }
    }
}

/// Risk or portfolio stage that stalls or panics before it finishes
pub struct MisbehavingStage {
    delay: Duration,
    panics: bool,
    started: AtomicUsize,
    completed: AtomicBool,
}

impl MisbehavingStage {
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay,
            panics: false,
            started: AtomicUsize::new(0),
            completed: AtomicBool::new(false),
        }
    }

    pub fn panicking() -> Self {
        Self {
            panics: true,
            ..Self::slow(Duration::ZERO)
        }
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn completed(&self) -> bool {
        self.completed.load(Ordering::SeqCst)
    }

    async fn behave(&self) {
        self.started.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        if self.panics {
            panic!("stage boom");
        }
        self.completed.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl RiskCapability for MisbehavingStage {
    async fn assess(
        &self,
        signals: &AnalystSignals,
        _: &RunInput,
        _: &ProgressReporter,
    ) -> Result<AdjustedSignals> {
        self.behave().await;
        Ok(AdjustedSignals::passthrough(signals.clone()))
    }
}

#[async_trait]
impl PortfolioCapability for MisbehavingStage {
    async fn synthesize(
        &self,
        _: &AdjustedSignals,
        _: &RunInput,
        _: &ProgressReporter,
    ) -> Result<String> {
        self.behave().await;
        Ok("{}".to_string())
    }
}
