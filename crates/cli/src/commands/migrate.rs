//! Database migration command.
//!
//! # Usage
//!
//! ```bash
//! souk-cli migrate
//! ```
//!
//! # Environment Variables
//!
//! - `CATALOG_DATABASE_URL` (or `DATABASE_URL`) - `PostgreSQL` connection string
//!
//! # Migration Files
//!
//! Catalog migrations live in `crates/catalog/migrations/`.

use super::{CommandError, connect};

/// Run catalog database migrations.
///
/// # Errors
///
/// Returns an error if the database is not configured or unreachable, or a
/// migration fails.
pub async fn run() -> Result<(), CommandError> {
    let (_, pool) = connect().await?;

    tracing::info!("Running catalog migrations...");
    sqlx::migrate!("../catalog/migrations").run(&pool).await?;

    tracing::info!("Catalog migrations complete!");
    pool.close().await;
    Ok(())
}
