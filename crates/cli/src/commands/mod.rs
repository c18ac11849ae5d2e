//! Command implementations.

pub mod migrate;
pub mod tags;

use sqlx::PgPool;
use thiserror::Error;

use souk_catalog::config::{CatalogConfig, ConfigError};
use souk_catalog::db;
use souk_catalog::error::CatalogError;
use souk_catalog::state::AppState;

/// Errors from CLI commands.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("CATALOG_DATABASE_URL (or DATABASE_URL) is not set")]
    MissingDatabaseUrl,

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),
}

/// Load configuration and connect to the catalog database.
async fn connect() -> Result<(CatalogConfig, PgPool), CommandError> {
    let config = CatalogConfig::from_env()?;
    let url = config
        .database_url
        .as_ref()
        .ok_or(CommandError::MissingDatabaseUrl)?;

    tracing::info!("Connecting to catalog database...");
    let pool = db::create_pool(url).await?;
    Ok((config, pool))
}

/// Connect and load the catalog, including its search indexes.
async fn load_catalog() -> Result<(AppState, PgPool), CommandError> {
    let (config, pool) = connect().await?;
    let state = AppState::new(config, Some(pool.clone())).await?;
    Ok((state, pool))
}
