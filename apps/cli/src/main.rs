//! Insight Sync CLI
//!
//! Reads scanner manifest exports and publishes their package insights to the
//! aggregation service through the sync reporter.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use insight_sync_core::{Manifest, SyncConfig, SyncReporter};
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Publish dependency scanner insights to an aggregation service.
#[derive(Parser, Debug)]
#[command(name = "insight-sync", author, version, about)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long)]
    config: PathBuf,

    /// Create one session per manifest instead of a single global session
    #[arg(long)]
    multi_project: bool,

    /// Number of publish workers (overrides the configuration)
    #[arg(short, long)]
    workers: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Manifest documents (JSON) exported by the scanner
    #[arg(required = true)]
    manifests: Vec<PathBuf>,
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("insight_sync_core={log_level},insight_sync_cli={log_level}"))
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();
}

fn load_config(args: &Args) -> anyhow::Result<SyncConfig> {
    let mut config = SyncConfig::load(&args.config)
        .with_context(|| format!("Failed to load configuration from {}", args.config.display()))?;

    if args.multi_project {
        config.enable_multi_project_sync = true;
    }
    if let Some(workers) = args.workers {
        config.worker_count = workers;
    }
    Ok(config)
}

fn load_manifest(path: &Path) -> anyhow::Result<Manifest> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read manifest {}", path.display()))?;
    let manifest = Manifest::from_json(&content)
        .with_context(|| format!("Failed to parse manifest {}", path.display()))?;
    debug!(manifest = %path.display(), packages = manifest.packages.len(), "Loaded manifest");
    Ok(manifest)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level);

    let config = load_config(&args)?;
    let manifests = args.manifests.iter().map(|path| load_manifest(path)).collect::<anyhow::Result<Vec<_>>>()?;

    info!(
        base_url = %config.base_url,
        project = %config.project_name,
        multi_project = config.enable_multi_project_sync,
        "Starting insight sync"
    );

    let reporter = SyncReporter::connect(config).await.context("Failed to start sync reporter")?;

    let mut queued = 0;
    for manifest in &manifests {
        queued += reporter.add_manifest(manifest).await;
    }

    reporter.finish().await.context("Failed to finish insight sync")?;

    let metrics = reporter.metrics();
    println!(
        "Synced {} manifests: {} packages queued, {} published, {} failed",
        manifests.len(),
        queued,
        metrics.published,
        metrics.failed
    );
    Ok(())
}
