use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use factory_queue::app;
use factory_queue::catalog::{Catalog, SqliteCatalog};
use factory_queue::config;
use factory_queue::db;
use factory_queue::worker;

#[derive(Debug, Parser)]
#[command(author, version, about = "Pull marketplace orders into the production queue")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
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
        .with_context(|| format!("failed to load {}", args.config.display()))?;
    cfg.ensure_dirs()?;

    let pool = db::init_pool(&cfg.database_url()).await?;
    db::run_migrations(&pool).await?;

    let catalog: Arc<dyn Catalog> = Arc::new(SqliteCatalog::new(pool.clone()));
    let scheduled = app::build_workers(&cfg, &pool, catalog)?;

    let shutdown = CancellationToken::new();
    let handles: Vec<_> = scheduled
        .into_iter()
        .map(|s| worker::spawn(s.worker, s.interval, shutdown.clone()))
        .collect();
    info!(workers = handles.len(), "factory queue running");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    info!("shutting down");
    shutdown.cancel();

    for res in futures::future::join_all(handles).await {
        if let Err(err) = res {
            error!(?err, "worker task panicked");
        }
    }
    pool.close().await;
    Ok(())
}
