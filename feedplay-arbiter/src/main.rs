//! FeedPlay Arbiter - scenario replay entry point
//!
//! Mounts a scripted feed, applies each step of a scenario file and prints
//! which element holds playback after every step.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use feedplay_arbiter::scenario::{Scenario, ScenarioRunner, StepReport};
use feedplay_common::config::ArbiterConfig;
use feedplay_common::mute::{FileMuteStore, MemoryMuteStore, MuteStore};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Command-line arguments for feedplay-arbiter
#[derive(Parser, Debug)]
#[command(name = "feedplay-arbiter")]
#[command(about = "Replay feed scrolling scenarios against the playback arbiter")]
#[command(version)]
struct Args {
    /// Scenario file (TOML)
    scenario: PathBuf,

    /// Configuration file
    #[arg(short, long, env = "FEEDPLAY_CONFIG")]
    config: Option<PathBuf>,

    /// Print step reports as JSON lines
    #[arg(long)]
    json: bool,

    /// Read and write the persisted mute preference instead of an in-memory one
    #[arg(long)]
    persist_mute: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = ArbiterConfig::resolve(args.config.as_deref())
        .context("Failed to load configuration")?;
    init_tracing(&config)?;

    let scenario = Scenario::load(&args.scenario)
        .with_context(|| format!("Failed to load scenario {}", args.scenario.display()))?;
    info!(
        "Replaying {} steps over {} elements",
        scenario.steps.len(),
        scenario.elements.len()
    );

    let mute_store: Arc<dyn MuteStore> = if args.persist_mute {
        let path = config.mute_store_path();
        info!("Mute preference: {}", path.display());
        Arc::new(FileMuteStore::new(path))
    } else {
        Arc::new(MemoryMuteStore::default())
    };

    let mut runner = ScenarioRunner::new(scenario, &config, mute_store);
    let reports = runner.run().await.context("Scenario failed")?;

    for report in &reports {
        if args.json {
            println!("{}", serde_json::to_string(report)?);
        } else {
            print_report(report);
        }
    }

    Ok(())
}

fn print_report(report: &StepReport) {
    let step = report
        .step
        .as_ref()
        .map(|s| s.to_string())
        .unwrap_or_else(|| "initial layout".to_string());
    let active = report
        .active
        .as_ref()
        .map(|id| id.to_string())
        .unwrap_or_else(|| "none".to_string());
    let players: Vec<String> = report
        .players
        .iter()
        .filter(|p| p.mounted)
        .map(|p| format!("{}={}", p.id, p.state))
        .collect();

    println!(
        "[{:>3}] {:<24} active: {:<12} {}",
        report.index,
        step,
        active,
        players.join(" ")
    );
}

/// Logs go to the configured file, or stderr when none is set.
/// `RUST_LOG` overrides the configured level.
fn init_tracing(config: &ArbiterConfig) -> Result<()> {
    let level = &config.logging.level;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "feedplay_arbiter={level},feedplay_common={level}"
        ))
    });

    let (stderr_layer, file_layer) = match &config.logging.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Arc::new(file));
            (None, Some(layer))
        }
        None => (
            Some(tracing_subscriber::fmt::layer().with_writer(std::io::stderr)),
            None,
        ),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();

    Ok(())
}
