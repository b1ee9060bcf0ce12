//! Command-line interface for hedge-rs

mod report;

use anyhow::{Context, bail};
use clap::Parser;
use hedge_core::{AnalystKey, CancelToken, ModelConfig, ProgressReporter, catalog};
use hedge_utils::RunDefaults;
use hedge_workflow::{
    AnalystFailurePolicy, AnalystSelection, CapabilityRegistry, HoldSynthesizer, NeutralAnalyst,
    Pipeline, PipelineConfig, PositionLimitRisk, RunOutcome, RunRequest,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "hedge")]
#[command(about = "Run the analyst panel over a set of tickers", long_about = None)]
struct Args {
    /// Comma-separated ticker symbols
    #[arg(long, value_delimiter = ',', required_unless_present = "list_analysts")]
    tickers: Vec<String>,

    /// Start date (YYYY-MM-DD), defaults to 3 months before the end date
    #[arg(long)]
    start_date: Option<String>,

    /// End date (YYYY-MM-DD), defaults to today
    #[arg(long)]
    end_date: Option<String>,

    /// Initial cash position
    #[arg(long)]
    initial_cash: Option<f64>,

    /// Initial margin requirement
    #[arg(long)]
    margin_requirement: Option<f64>,

    /// Comma-separated analyst keys, all analysts when omitted
    #[arg(long, value_delimiter = ',')]
    analysts: Option<Vec<String>>,

    /// List available analysts and exit
    #[arg(long)]
    list_analysts: bool,

    /// Show reasoning from each analyst
    #[arg(long)]
    show_reasoning: bool,

    /// Print the workflow graph in Graphviz DOT format
    #[arg(long)]
    show_agent_graph: bool,

    /// Print the outcome as JSON instead of tables; logs become JSON lines too
    #[arg(long)]
    json: bool,

    /// Per-analyst timeout in seconds
    #[arg(long)]
    analyst_timeout: Option<u64>,

    /// What to do when an analyst fails: fail_run, skip_failed or neutral_fallback
    #[arg(long)]
    failure_policy: Option<AnalystFailurePolicy>,

    /// Model name forwarded to analysts
    #[arg(long)]
    model_name: Option<String>,

    /// Model provider forwarded to analysts
    #[arg(long)]
    model_provider: Option<String>,

    /// Use a local Ollama model provider
    #[arg(long)]
    ollama: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    if args.json {
        hedge_utils::init_tracing_json();
    } else {
        hedge_utils::init_tracing();
    }

    if args.list_analysts {
        print!("{}", report::render_catalog());
        return Ok(());
    }

    let defaults = RunDefaults::from_env().context("invalid HEDGE_* environment variable")?;
    let mut config = PipelineConfig::default()
        .with_env()
        .context("invalid pipeline configuration")?;
    if let Some(secs) = args.analyst_timeout {
        config.analyst_timeout = Duration::from_secs(secs);
    }
    if let Some(policy) = args.failure_policy {
        config.failure_policy = policy;
    }

    let pipeline = Pipeline::builder()
        .registry(baseline_registry()?)
        .risk(Arc::new(PositionLimitRisk::default()))
        .portfolio(Arc::new(HoldSynthesizer))
        .config(config)
        .build()?;

    let selection = args
        .analysts
        .clone()
        .map_or(AnalystSelection::All, AnalystSelection::Keys);

    if args.show_agent_graph {
        let compiled = pipeline.compile(&selection)?;
        print!("{}", compiled.plan.to_dot());
    }

    let model = ModelConfig {
        model_name: args.model_name.clone().unwrap_or(defaults.model_name),
        model_provider: if args.ollama {
            "Ollama".to_string()
        } else {
            args.model_provider.clone().unwrap_or(defaults.model_provider)
        },
        show_reasoning: args.show_reasoning,
    };

    let cancel = CancelToken::new();
    tokio::spawn(cancel_on_ctrl_c(cancel.clone()));

    let (progress, mut events) = ProgressReporter::channel();
    let show_progress = !args.json;
    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            if show_progress {
                eprintln!("{}", report::render_progress(&event));
            }
        }
    });

    let request = RunRequest::new(args.tickers.clone())
        .with_dates(args.start_date.clone(), args.end_date.clone())
        .with_cash(
            args.initial_cash.unwrap_or(defaults.initial_cash),
            args.margin_requirement.unwrap_or(defaults.margin_requirement),
        )
        .with_analysts(selection)
        .with_model(model)
        .with_progress(progress)
        .with_cancel(cancel);

    info!("Starting hedge run for {:?}", args.tickers);
    let outcome = pipeline.run(request).await;
    // the request (and its progress sender) is gone, so the printer drains and stops
    let _ = printer.await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    }

    match outcome {
        RunOutcome::Completed(run_report) => {
            if !args.json {
                print!("{}", report::render_report(&run_report, args.show_reasoning));
            }
            Ok(())
        }
        RunOutcome::Failed(failure) => {
            bail!("{} ({})", failure.error, failure.kind)
        }
    }
}

/// Registry with the baseline analyst behind every catalogue key
fn baseline_registry() -> anyhow::Result<CapabilityRegistry> {
    let registry = catalog::ENTRIES
        .iter()
        .try_fold(CapabilityRegistry::builder(), |builder, entry| {
            AnalystKey::new(entry.key).map(|key| builder.register(key, Arc::new(NeutralAnalyst)))
        })?
        .build();
    Ok(registry)
}

async fn cancel_on_ctrl_c(cancel: CancelToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            info!("Received Ctrl+C");
            cancel.cancel();
        }
        Err(e) => warn!("Failed to listen for Ctrl+C: {}", e),
    }
}
