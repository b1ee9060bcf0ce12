//! Per-run progress reporting
//!
//! A [`ProgressReporter`] is created for one run and handed to every stage.
//! Events are always logged through `tracing`; when the reporter was created
//! with [`ProgressReporter::channel`] they are also delivered to the receiver
//! so a front end can render live status.

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::debug;

/// A status update from one agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressEvent {
    /// Agent or stage name (`warren_buffett`, `risk_management`, ...)
    pub agent: String,
    /// Ticker the update refers to, if any
    pub ticker: Option<String>,
    /// Free-form status text
    pub status: String,
}

/// Cloneable progress handle scoped to one run
#[derive(Debug, Clone, Default)]
pub struct ProgressReporter {
    sender: Option<mpsc::UnboundedSender<ProgressEvent>>,
}

impl ProgressReporter {
    /// Reporter that only logs
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Reporter paired with a receiver for live updates
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self {
                sender: Some(sender),
            },
            receiver,
        )
    }

    /// Report a status change
    ///
    /// A dropped receiver is not an error; the event is still logged.
    pub fn update(&self, agent: &str, ticker: Option<&str>, status: impl Into<String>) {
        let event = ProgressEvent {
            agent: agent.to_string(),
            ticker: ticker.map(str::to_string),
            status: status.into(),
        };
        debug!(
            agent = %event.agent,
            ticker = event.ticker.as_deref().unwrap_or("-"),
            "{}",
            event.status
        );
        if let Some(sender) = &self.sender {
            let _ = sender.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_delivers_events() {
        let (reporter, mut rx) = ProgressReporter::channel();
        reporter.update("warren_buffett", Some("AAPL"), "Analyzing");
        reporter.clone().update("risk_management", None, "Done");

        let first = rx.recv().await.unwrap();
        assert_eq!(first.agent, "warren_buffett");
        assert_eq!(first.ticker.as_deref(), Some("AAPL"));
        assert_eq!(first.status, "Analyzing");

        let second = rx.recv().await.unwrap();
        assert_eq!(second.ticker, None);
    }

    #[test]
    fn test_disabled_and_dropped_receivers_are_silent() {
        ProgressReporter::disabled().update("a", None, "ok");

        let (reporter, rx) = ProgressReporter::channel();
        drop(rx);
        reporter.update("a", None, "still ok");
    }
}
