//! Database module
//!
//! Connection pool, migrations and schema verification.

use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;

use crate::config::Config;

/// Tables the ledger procedures operate on
const REQUIRED_TABLES: &[&str] = &["users", "services", "transactions", "history"];

/// Stored procedures and functions called by the Postgres store
const REQUIRED_ROUTINES: &[&str] = &[
    "get_balance",
    "replenish_balance",
    "reserve_money",
    "recognize_revenue",
    "cancel_transaction",
    "get_history_sorted_by_timestamp",
    "get_history_sorted_by_amount",
    "get_month_report",
];

/// Connection options built from the individual `db_*` settings
pub fn connect_options(config: &Config) -> PgConnectOptions {
    PgConnectOptions::new()
        .host(&config.db_host)
        .port(config.db_port)
        .username(&config.db_username)
        .password(&config.db_password)
        .database(&config.database_name)
}

/// Create the connection pool
pub async fn connect(config: &Config) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .acquire_timeout(config.database_timeout())
        .connect_with(connect_options(config))
        .await
}

/// Apply the SQL files in `migrations/`
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

/// Simple connectivity check
pub async fn verify_connection(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Check if required tables and routines exist
pub async fn check_schema(pool: &PgPool) -> Result<bool, sqlx::Error> {
    for table in REQUIRED_TABLES {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.tables
                WHERE table_schema = 'public' AND table_name = $1
            )
            "#,
        )
        .bind(*table)
        .fetch_one(pool)
        .await?;

        if !exists {
            tracing::error!("Required table '{}' does not exist", table);
            return Ok(false);
        }
    }

    for routine in REQUIRED_ROUTINES {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.routines
                WHERE routine_schema = 'public' AND routine_name = $1
            )
            "#,
        )
        .bind(*routine)
        .fetch_one(pool)
        .await?;

        if !exists {
            tracing::error!("Required routine '{}' does not exist", routine);
            return Ok(false);
        }
    }

    Ok(true)
}
