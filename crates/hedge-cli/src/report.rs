//! Console rendering of run results

use comfy_table::presets::UTF8_FULL;
use comfy_table::{ContentArrangement, Table};
use hedge_core::{Action, AnalystKey, AnalystSignals, Decisions, ProgressEvent, catalog};
use hedge_workflow::RunReport;
use std::fmt::Write as _;

const REASONING_WIDTH: usize = 80;

fn table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

/// Analyst keys in catalogue order, unknown keys last by name
fn ordered_analysts(signals: &AnalystSignals) -> Vec<&AnalystKey> {
    let mut keys: Vec<&AnalystKey> = signals.keys().collect();
    keys.sort_by(|a, b| {
        catalog::rank(a.as_str())
            .cmp(&catalog::rank(b.as_str()))
            .then_with(|| a.cmp(b))
    });
    keys
}

/// Mean analyst confidence for `ticker`
fn average_confidence(signals: &AnalystSignals, ticker: &str) -> Option<f64> {
    let confidences: Vec<f64> = signals
        .values()
        .filter_map(|per_ticker| per_ticker.get(ticker))
        .map(|s| s.confidence)
        .collect();
    if confidences.is_empty() {
        return None;
    }
    Some(confidences.iter().sum::<f64>() / confidences.len() as f64)
}

/// Number of decisions per action, in action order, skipping zeros
fn action_counts(decisions: &Decisions) -> Vec<(Action, usize)> {
    Action::ALL
        .into_iter()
        .map(|action| {
            let count = decisions.values().filter(|d| d.action == action).count();
            (action, count)
        })
        .filter(|(_, count)| *count > 0)
        .collect()
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let mut out: String = text.chars().take(width.saturating_sub(3)).collect();
    out.push_str("...");
    out
}

pub fn render_progress(event: &ProgressEvent) -> String {
    match &event.ticker {
        Some(ticker) => format!("  {:<24} [{}] {}", event.agent, ticker, event.status),
        None => format!("  {:<24} {}", event.agent, event.status),
    }
}

pub fn render_catalog() -> String {
    let mut table = table(vec!["Key", "Analyst", "Style"]);
    for entry in catalog::ENTRIES {
        table.add_row(vec![entry.key, entry.display_name, entry.description]);
    }
    format!("{table}\n")
}

pub fn render_report(report: &RunReport, show_reasoning: bool) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "\nAnalysis for {} from {} to {}",
        report.tickers.join(", "),
        report.start_date,
        report.end_date
    );
    if report.fallback_used {
        out.push_str("Requested analysts were unavailable; used the default analyst set\n");
    }

    for ticker in &report.tickers {
        let _ = writeln!(out, "\n{ticker}");

        let mut header = vec!["Analyst", "Signal", "Confidence"];
        if show_reasoning {
            header.push("Reasoning");
        }
        let mut signals = table(header);
        for key in ordered_analysts(&report.analyst_signals) {
            let Some(signal) = report.analyst_signals[key].get(ticker) else {
                continue;
            };
            let mut row = vec![
                key.display_name(),
                signal.signal_type.to_string(),
                format!("{:.1}%", signal.confidence),
            ];
            if show_reasoning {
                row.push(truncate(&signal.reasoning_text(), REASONING_WIDTH));
            }
            signals.add_row(row);
        }
        let _ = writeln!(out, "{signals}");

        if let Some(avg) = average_confidence(&report.analyst_signals, ticker) {
            let _ = writeln!(out, "Average analyst confidence: {avg:.1}%");
        }
        if let Some(risk) = report.risk.get(ticker) {
            let _ = writeln!(
                out,
                "Remaining position limit: ${:.2}",
                risk.remaining_position_limit
            );
        }
    }

    match &report.decisions {
        Some(decisions) => {
            let mut table = table(vec!["Ticker", "Action", "Quantity", "Confidence", "Reasoning"]);
            for (ticker, decision) in decisions {
                table.add_row(vec![
                    ticker.clone(),
                    decision.action.as_str().to_uppercase(),
                    decision.quantity.to_string(),
                    format!("{:.1}%", decision.confidence),
                    truncate(&decision.reasoning, REASONING_WIDTH),
                ]);
            }
            let _ = writeln!(out, "\nTrading decisions\n{table}");

            let counts: Vec<String> = action_counts(decisions)
                .into_iter()
                .map(|(action, count)| format!("{count} {action}"))
                .collect();
            if !counts.is_empty() {
                let _ = writeln!(out, "Actions: {}", counts.join(", "));
            }
        }
        None => {
            let _ = writeln!(
                out,
                "\nNo trading decisions: {}",
                report.parse_error.as_deref().unwrap_or("payload could not be parsed")
            );
        }
    }

    if !report.failed_analysts.is_empty() {
        out.push_str("\nFailed analysts\n");
        for failure in &report.failed_analysts {
            let _ = writeln!(out, "  {}: {}", failure.analyst.display_name(), failure.error);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use hedge_core::{Decision, Signal, SignalType, TickerSignals};
    use hedge_workflow::AnalystFailure;
    use std::collections::BTreeMap;

    fn key(s: &str) -> AnalystKey {
        AnalystKey::new(s).unwrap()
    }

    fn report() -> RunReport {
        let mut analyst_signals = AnalystSignals::new();
        analyst_signals.insert(
            key("technical_analyst"),
            TickerSignals::from([(
                "AAPL".to_string(),
                Signal::new(SignalType::Bearish, 40.0, "breakdown"),
            )]),
        );
        analyst_signals.insert(
            key("warren_buffett"),
            TickerSignals::from([(
                "AAPL".to_string(),
                Signal::new(SignalType::Bullish, 90.0, "moat"),
            )]),
        );
        analyst_signals.insert(
            key("custom_quant"),
            TickerSignals::from([("AAPL".to_string(), Signal::neutral("flat"))]),
        );

        RunReport {
            decisions: Some(Decisions::from([(
                "AAPL".to_string(),
                Decision {
                    action: Action::Buy,
                    quantity: 12,
                    confidence: 75.0,
                    reasoning: "majority bullish".to_string(),
                },
            )])),
            analyst_signals,
            risk: BTreeMap::new(),
            analysts: vec![key("custom_quant"), key("technical_analyst"), key("warren_buffett")],
            failed_analysts: vec![AnalystFailure {
                analyst: key("michael_burry"),
                error: "timed out".to_string(),
            }],
            fallback_used: false,
            parse_error: None,
            tickers: vec!["AAPL".to_string()],
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2024, 4, 1).unwrap(),
        }
    }

    #[test]
    fn test_analysts_follow_catalogue_order() {
        let report = report();
        let ordered: Vec<&str> = ordered_analysts(&report.analyst_signals)
            .into_iter()
            .map(AnalystKey::as_str)
            .collect();
        assert_eq!(ordered, vec!["warren_buffett", "technical_analyst", "custom_quant"]);
    }

    #[test]
    fn test_average_confidence() {
        let report = report();
        let avg = average_confidence(&report.analyst_signals, "AAPL").unwrap();
        assert!((avg - 130.0 / 3.0).abs() < 1e-9);
        assert!(average_confidence(&report.analyst_signals, "MSFT").is_none());
    }

    #[test]
    fn test_render_report() {
        let rendered = render_report(&report(), true);
        assert!(rendered.contains("Warren Buffett"));
        assert!(rendered.contains("Custom Quant"));
        assert!(rendered.contains("BUY"));
        assert!(rendered.contains("Actions: 1 buy"));
        assert!(rendered.contains("Michael Burry: timed out"));
        assert!(rendered.contains("moat"));
    }

    #[test]
    fn test_render_report_without_decisions() {
        let mut report = report();
        report.decisions = None;
        report.parse_error = Some("Malformed decision payload: EOF".to_string());
        let rendered = render_report(&report, false);
        assert!(rendered.contains("No trading decisions: Malformed decision payload: EOF"));
        assert!(!rendered.contains("moat"));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdefghijkl", 8), "abcde...");
    }

    #[test]
    fn test_render_catalog_lists_every_entry() {
        let rendered = render_catalog();
        for entry in catalog::ENTRIES {
            assert!(rendered.contains(entry.key));
        }
    }
}
