//! Command line entry point

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use sqlx::PgPool;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{Config, StorageKind};
use crate::service::{BalanceService, ServiceSettings};
use crate::store::{DynBalanceStore, MemoryBalanceStore, PgBalanceStore};
use crate::{db, server};

#[derive(Debug, Parser)]
#[command(name = "balance-service", version, about = "User balance and revenue ledger API")]
pub struct Cli {
    /// YAML configuration file; missing files are ignored
    #[arg(short, long, env = "BALANCE_CONFIG", default_value = "config/config.yaml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the HTTP server (default)
    Serve,
    /// Apply database migrations and exit
    Migrate,
}

/// Parse arguments and run the selected command
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load(Some(cli.config.as_path()))?;
    init_tracing(&config)?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await,
        Commands::Migrate => migrate(config).await,
    }
}

/// Initialize tracing/logging
fn init_tracing(config: &Config) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))?;
    let registry = tracing_subscriber::registry().with(filter);

    if config.log_json {
        registry.with(tracing_subscriber::fmt::layer().json()).try_init()?;
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()?;
    }
    Ok(())
}

async fn migrate(config: Config) -> anyhow::Result<()> {
    tracing::info!("Connecting to database...");
    let pool = db::connect(&config).await?;

    db::run_migrations(&pool).await?;
    tracing::info!("Migrations applied");

    pool.close().await;
    Ok(())
}

async fn serve(config: Config) -> anyhow::Result<()> {
    tracing::info!("Starting balance service");

    let (store, pool) = open_store(&config).await?;
    let settings = ServiceSettings {
        history_page_size: config.history_page_size,
        report_directory: config.file_server_directory.clone(),
    };
    let app = server::build_router(BalanceService::new(store, settings), config.request_timeout());

    server::serve(&config.server_addr(), app).await?;

    tracing::info!("Server shutting down...");
    if let Some(pool) = pool {
        pool.close().await;
        tracing::info!("Database connections closed. Goodbye!");
    }
    Ok(())
}

async fn open_store(config: &Config) -> anyhow::Result<(DynBalanceStore, Option<PgPool>)> {
    match config.storage {
        StorageKind::Memory => {
            tracing::warn!("Using in-memory storage; the ledger is lost on shutdown");
            Ok((Arc::new(MemoryBalanceStore::new()), None))
        }
        StorageKind::Postgres => {
            tracing::info!("Connecting to database...");
            let pool = db::connect(config).await?;
            db::verify_connection(&pool).await?;

            if !db::check_schema(&pool).await? {
                tracing::error!("Database schema is not complete. Please run migrations.");
                return Err(anyhow::anyhow!("Database schema incomplete"));
            }
            tracing::info!("Database connected successfully");

            Ok((Arc::new(PgBalanceStore::new(pool.clone())), Some(pool)))
        }
    }
}
