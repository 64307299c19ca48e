use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use listing_watch::config;
use listing_watch::notify::LogNotifier;
use listing_watch::pipeline::Pipeline;
use listing_watch::render;
use listing_watch::snapshot::SnapshotStore;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML (or legacy JSON) config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Run the pipeline once and exit instead of watching on an interval
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))
        .with_context(|| format!("failed to load config {}", args.config.display()))?;
    cfg.ensure_dirs()?;

    let renderer = render::from_settings(&cfg.render)?;
    let store = SnapshotStore::new(cfg.app.snapshot_path.clone()).strict(cfg.app.strict_snapshot);
    let pipeline = Pipeline::new(renderer, Arc::new(LogNotifier), store)
        .with_concurrency(cfg.app.concurrency);

    if args.once {
        tokio::select! {
            res = pipeline.run_once(&cfg.urls) => {
                res?;
            }
            _ = tokio::signal::ctrl_c() => {
                warn!("interrupted; snapshot left untouched");
            }
        }
        return Ok(());
    }

    info!(
        sources = cfg.urls.len(),
        interval_secs = cfg.app.interval_secs,
        "watching listings"
    );
    let shutdown = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(?err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };
    let runs = pipeline.watch(&cfg.urls, cfg.app.interval(), shutdown).await;
    info!(runs, "stopped");
    Ok(())
}
