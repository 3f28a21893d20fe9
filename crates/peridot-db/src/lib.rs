//! Database layer for the peridot job datastore.
//!
//! Provides repository traits, PostgreSQL implementations and an in-memory
//! job store.

pub mod error;
pub mod memory;
pub mod repo;

pub use error::{DbError, DbResult};
pub use memory::MemoryJobRepo;
pub use repo::*;
pub use sqlx::PgPool;

use std::time::Duration;

use peridot_core::{UserAccessLevel, UserId};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use tracing::info;

/// Connection pool tuning.
#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub max_connections: u32,
    /// How long to wait for a free connection before failing.
    pub acquire_timeout: Duration,
    /// Server-side cap on any single statement.
    pub statement_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 10,
            acquire_timeout: Duration::from_secs(5),
            statement_timeout: Duration::from_millis(5000),
        }
    }
}

/// Create a new database connection pool.
pub async fn create_pool(database_url: &str, settings: &PoolSettings) -> DbResult<PgPool> {
    let options: PgConnectOptions = database_url.parse()?;
    let options = options.options([(
        "statement_timeout",
        settings.statement_timeout.as_millis().to_string(),
    )]);
    let pool = PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .acquire_timeout(settings.acquire_timeout)
        .connect_with(options)
        .await?;
    info!(
        max_connections = settings.max_connections,
        "Connected to database"
    );
    Ok(pool)
}

/// Run database migrations.
pub async fn run_migrations(pool: &PgPool) -> DbResult<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Create the schema and, when the users table is still empty and an
/// initial admin is given, add that admin as user 1.
pub async fn init_db(pool: &PgPool, initial_admin_github: Option<&str>) -> DbResult<()> {
    run_migrations(pool).await?;
    info!("Migrations applied");

    let Some(github) = initial_admin_github.filter(|g| !g.is_empty()) else {
        return Ok(());
    };
    let users = PgUserRepo::new(pool.clone());
    if users.get_all().await?.is_empty() {
        users
            .add(UserId::new(1), "Admin", github, UserAccessLevel::Admin)
            .await?;
        info!(github = %github, "Created initial admin user");
    }
    Ok(())
}

/// Drop the whole schema and initialize a fresh one.
pub async fn reset_db(pool: &PgPool, initial_admin_github: Option<&str>) -> DbResult<()> {
    sqlx::query("DROP SCHEMA IF EXISTS peridot CASCADE")
        .execute(pool)
        .await?;
    sqlx::query("DROP TABLE IF EXISTS _sqlx_migrations")
        .execute(pool)
        .await?;
    info!("Dropped peridot schema");
    init_db(pool, initial_admin_github).await
}
