use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod breakdown;
mod clarity;
mod collaborators;
mod collector;
mod config;
mod error;
mod heuristic;
mod issues;
mod models;
mod pipeline;
mod recorded;
mod report;
mod risk;
mod signals;
mod timeline;
mod transcript;
mod windower;

use collaborators::{Collaborators, Retrying};
use config::AnalysisConfig;
use heuristic::HeuristicCollaborators;
use models::{BreakdownMode, RunReport};
use pipeline::Pipeline;
use recorded::RecordedCollaborators;

#[derive(Parser)]
#[command(name = "clarity-risk")]
#[command(about = "Clarity risk profiler for presentation transcripts", long_about = None)]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct RunArgs {
    /// Transcript file (.json or .csv)
    #[arg(long)]
    transcript: PathBuf,
    /// Recorded collaborator responses to replay instead of the offline heuristics
    #[arg(long)]
    responses: Option<PathBuf>,
    #[arg(long)]
    config: Option<PathBuf>,
    /// Overrides the transcript's own duration
    #[arg(long)]
    duration: Option<f64>,
    #[arg(long)]
    window_size: Option<f64>,
    #[arg(long)]
    bin_size: Option<f64>,
    #[arg(long)]
    threshold: Option<f64>,
    #[arg(long, value_enum)]
    mode: Option<BreakdownMode>,
}

#[derive(Subcommand)]
enum Commands {
    /// Score a transcript and emit the full run as JSON
    Analyze {
        #[command(flatten)]
        run: RunArgs,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Generate a markdown report
    Report {
        #[command(flatten)]
        run: RunArgs,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Measure filler words and repetition in a snippet of text
    Ramble {
        #[arg(long)]
        text: String,
    },
    /// Print the effective configuration as TOML
    Config {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> anyhow::Result<AnalysisConfig> {
    match path {
        Some(path) => AnalysisConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => Ok(AnalysisConfig::default()),
    }
}

fn effective_config(run: &RunArgs) -> anyhow::Result<AnalysisConfig> {
    let mut config = load_config(run.config.as_deref())?;
    if let Some(window_size) = run.window_size {
        config.window_size_sec = window_size;
    }
    if let Some(bin_size) = run.bin_size {
        config.bin_size_sec = bin_size;
    }
    if let Some(threshold) = run.threshold {
        config.risk_threshold = threshold;
    }
    if let Some(mode) = run.mode {
        config.breakdown_mode = mode;
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn build_collaborators(
    responses: Option<&Path>,
    config: &AnalysisConfig,
) -> anyhow::Result<Arc<dyn Collaborators>> {
    let policy = config.collector.retry.clone();
    let timeout_ms = config.collector.call_timeout_ms;

    let collaborators: Arc<dyn Collaborators> = match responses {
        Some(path) => {
            let recorded = RecordedCollaborators::load(path, Some(HeuristicCollaborators))
                .with_context(|| format!("failed to load responses from {}", path.display()))?;
            Arc::new(Retrying::new(recorded, policy, timeout_ms))
        }
        None => Arc::new(Retrying::new(HeuristicCollaborators, policy, timeout_ms)),
    };
    Ok(collaborators)
}

async fn run_analysis(run: &RunArgs) -> anyhow::Result<RunReport> {
    let config = effective_config(run)?;

    let mut transcript = transcript::load(&run.transcript)
        .with_context(|| format!("failed to read transcript {}", run.transcript.display()))?;
    if let Some(duration) = run.duration {
        transcript.duration_sec = Some(duration);
    }

    let collaborators = build_collaborators(run.responses.as_deref(), &config)?;
    let pipeline = Pipeline::new(config, collaborators)?;

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, finishing with the windows already collected");
            let _ = cancel_tx.send(true);
        }
    });

    let report = pipeline
        .run(&transcript, cancel_rx)
        .await
        .context("analysis failed")?;
    Ok(report)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Analyze { run, out } => {
            let report = run_analysis(&run).await?;
            let json = serde_json::to_string_pretty(&report)?;
            match out {
                Some(out) => {
                    std::fs::write(&out, json)?;
                    info!(path = %out.display(), "run written");
                    println!(
                        "{} issues across {} windows written to {}.",
                        report.issues.len(),
                        report.window_count,
                        out.display()
                    );
                }
                None => println!("{json}"),
            }
        }
        Commands::Report { run, out } => {
            let report = run_analysis(&run).await?;
            let title = run
                .transcript
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| run.transcript.display().to_string());
            let markdown = report::build_report(&title, &report);
            std::fs::write(&out, markdown)?;
            println!("Report written to {}.", out.display());
        }
        Commands::Ramble { text } => {
            let ramble = signals::analyze_ramble(&text);
            println!("{}", serde_json::to_string_pretty(&ramble)?);
        }
        Commands::Config { config } => {
            let config = load_config(config.as_deref())?;
            print!("{}", config.to_toml()?);
        }
    }

    Ok(())
}
