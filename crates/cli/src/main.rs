//! tuimuppet - scripted terminal application runner

use anyhow::bail;
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};

use tuimuppet_cli::config::HarnessConfig;
use tuimuppet_cli::loader;
use tuimuppet_cli::output::ReportTarget;
use tuimuppet_engine::{build_backend, RunPlan, ScenarioRunner};

/// Drive an interactive terminal application through a scenario
#[derive(Parser)]
#[command(name = "tuimuppet")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Scenario JSON file; sequences/ and macros/ are read from its directory
    #[arg(long)]
    scenario: PathBuf,

    /// Run only this sequence
    #[arg(long)]
    sequence: Option<String>,

    /// Report file, or "stdout"
    #[arg(long)]
    report: Option<String>,

    /// Directory for capture files
    #[arg(long)]
    captures: Option<PathBuf>,

    /// Harness configuration file
    #[arg(long, env = "TUIMUPPET_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Logs go to stderr so a stdout report stays parseable
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = match &cli.config {
        Some(path) => HarnessConfig::load(path)?,
        None => HarnessConfig::default(),
    };

    let bundle = loader::load_bundle(&cli.scenario)?;
    let scenario = &bundle.scenario;

    let target = ReportTarget::resolve(&[
        cli.report.as_deref(),
        scenario.artifacts.report.as_deref(),
        config.report.as_deref(),
    ]);
    let captures = match (cli.captures, &scenario.artifacts.captures_dir) {
        (Some(dir), _) => Some(dir),
        (None, Some(_)) => None,
        (None, None) => config.captures_dir.clone(),
    };
    let kind = scenario.launch.backend;
    let options = config.backend.for_launch(&scenario.launch);

    let plan = RunPlan::build_selected(
        bundle.scenario,
        bundle.sequences,
        &bundle.macros,
        cli.sequence.as_deref(),
    )?;
    let runner = ScenarioRunner::new(plan)?.with_captures_dir(captures);

    let mut backend = build_backend(kind, &options)?;
    info!("Using {} backend ({}x{})", backend.name(), options.cols, options.rows);

    let report = tokio::select! {
        result = runner.run(backend.as_mut()) => result?,
        _ = tokio::signal::ctrl_c() => {
            bail!("Interrupted");
        }
    };

    if !report.passed() {
        warn!("Scenario {} failed", report.scenario);
    }
    target.write(&report)?;
    Ok(())
}
