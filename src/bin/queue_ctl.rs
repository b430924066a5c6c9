use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use factory_queue::catalog::{Product, SqliteCatalog};
use factory_queue::config;
use factory_queue::db;
use factory_queue::model::Marketplace;
use factory_queue::service::{QueueQuery, QueueService};

#[derive(Debug, Parser)]
#[command(author, version, about = "Inspect and update the production queue")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print queue entries for one marketplace as JSON
    List {
        #[arg(long)]
        marketplace: Marketplace,
        /// List completed entries instead of open ones
        #[arg(long)]
        completed: bool,
        /// Hide composite items already marked complete
        #[arg(long)]
        hide_complete_items: bool,
    },
    /// Mark an order complete (or reopen it with --clear)
    SetComplete {
        id: String,
        #[arg(long)]
        clear: bool,
    },
    /// Mark an order as printing (or stop with --clear)
    SetPrinting {
        id: String,
        #[arg(long)]
        clear: bool,
    },
    /// Mark one composite item complete by its item id
    SetItemComplete {
        item_id: String,
        #[arg(long)]
        clear: bool,
    },
    /// Insert or update catalog products from a YAML file with a `products:` list
    ImportCatalog { file: PathBuf },
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    products: Vec<Product>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let pool = db::init_pool(&cfg.database_url()).await?;
    db::run_migrations(&pool).await?;

    let catalog = Arc::new(SqliteCatalog::new(pool.clone()));
    let service = QueueService::new(pool.clone(), catalog.clone());

    let output = match args.command {
        Command::List {
            marketplace,
            completed,
            hide_complete_items,
        } => {
            let items = service
                .list_queue(QueueQuery {
                    marketplace,
                    with_parent_complete: completed,
                    with_children_complete: !hide_complete_items,
                })
                .await?;
            serde_json::to_value(items)?
        }
        Command::SetComplete { id, clear } => {
            json!({ "updated": service.set_complete(&id, !clear).await? })
        }
        Command::SetPrinting { id, clear } => {
            json!({ "updated": service.set_printing(&id, !clear).await? })
        }
        Command::SetItemComplete { item_id, clear } => {
            json!({ "updated": service.set_children_complete(&item_id, !clear).await? })
        }
        Command::ImportCatalog { file } => {
            let content = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let parsed: CatalogFile = serde_yaml::from_str(&content)
                .with_context(|| format!("failed to parse {}", file.display()))?;
            let written = catalog.add_products(&parsed.products).await?;
            info!(written, "catalog imported");
            json!({ "written": written })
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    pool.close().await;
    Ok(())
}
