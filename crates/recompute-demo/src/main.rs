//! Demo binary - drives a recompute engine through a simulated drag

mod backend;
mod config;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use recompute_core::{
    Command, EngineConfig, Parameters, RecomputeEngine, TrackedKeys, TracingObserver,
};

use crate::backend::SimulatedBackend;
use crate::config::DemoConfig;

#[derive(Parser, Debug)]
#[command(name = "recompute-demo")]
#[command(about = "Simulate an interactive edit against a slow backend")]
struct Args {
    /// TOML file with session settings
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Backend latency in milliseconds
    #[arg(long)]
    latency_ms: Option<u64>,

    /// Number of edits to make
    #[arg(short, long)]
    edits: Option<usize>,

    /// Largest distance the backend accepts
    #[arg(long)]
    max_distance: Option<f64>,

    /// Abort the operation instead of confirming it
    #[arg(long)]
    abort: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "recompute_demo=info,recompute_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    // CLI flags override the config file
    let mut config = DemoConfig::load(args.config.as_deref())?;
    if let Some(latency_ms) = args.latency_ms {
        config.latency_ms = latency_ms;
    }
    if let Some(edits) = args.edits {
        config.edits = edits;
    }
    if let Some(max_distance) = args.max_distance {
        config.max_distance = max_distance;
    }

    info!(label = %config.label, edits = config.edits, latency_ms = config.latency_ms, "Starting session");

    let engine_config = EngineConfig {
        label: config.label.clone(),
        tracked_keys: TrackedKeys::new(config.tracked.iter().cloned()),
        parameters: Parameters::new()
            .with("distance", 1.0)
            .with("direction", [0.0, 0.0, 1.0]),
    };
    let engine = RecomputeEngine::builder(SimulatedBackend::new(
        Duration::from_millis(config.latency_ms),
        config.max_distance,
    ))
    .config(engine_config)
    .observer(Arc::new(TracingObserver::new()))
    .build()?;

    let mut command = Command::new(config.label.clone());
    let engine = command.add_engine(Arc::new(engine));

    let mut distance = 1.0;
    for _ in 0..config.edits {
        distance += config.step;
        engine.set("distance", distance);
        // Edits do not wait for the backend; bursts coalesce
        tokio::spawn(engine.update());
        tokio::time::sleep(Duration::from_millis(config.interval_ms)).await;
    }
    engine.settled().await;

    info!(
        calls = engine.call_count(),
        distance = ?engine.get("distance"),
        previews = ?engine.with_visuals(|v| v.iter().map(|p| p.distance).collect::<Vec<_>>()),
        "Editing finished"
    );

    if args.abort {
        command.abort();
        info!(distance = ?engine.get("distance"), "Operation aborted");
        return Ok(());
    }

    match command.confirm().await {
        Ok(shown) => info!(shown, commits = engine.commit_count(), "Operation confirmed"),
        Err(error) if error.is_no_op() => info!("Nothing to commit"),
        Err(error) => {
            command.abort();
            return Err(error.into());
        }
    }

    Ok(())
}
