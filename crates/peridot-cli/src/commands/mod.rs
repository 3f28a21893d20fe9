//! CLI command implementations.

pub mod agents;
pub mod db;
pub mod jobs;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use peridot_config::{SystemConfig, load_system_config, parse_job_plan};
use peridot_db::{PgJobRepo, PgPool, PoolSettings, create_pool};
use peridot_scheduler::{JsonLinesDispatcher, Worker};
use serde::Serialize;

/// System configuration with command-line overrides applied.
pub struct Settings {
    pub config: SystemConfig,
    pub database_url: String,
}

impl Settings {
    pub fn load(config_path: Option<&Path>, database_url: Option<String>) -> Result<Self> {
        let config = match config_path {
            Some(path) => load_system_config(path)
                .with_context(|| format!("Failed to load config file: {}", path.display()))?,
            None => SystemConfig::default(),
        };
        let database_url = database_url
            .or_else(|| config.database.url.clone())
            .context("No database URL: pass --database-url, set DATABASE_URL, or configure database.url")?;
        Ok(Self {
            config,
            database_url,
        })
    }

    pub async fn connect(&self) -> Result<PgPool> {
        let db = &self.config.database;
        let settings = PoolSettings {
            max_connections: db.max_connections,
            acquire_timeout: Duration::from_secs(db.acquire_timeout_secs),
            statement_timeout: Duration::from_millis(db.statement_timeout_ms),
        };
        create_pool(&self.database_url, &settings)
            .await
            .context("Failed to connect to database")
    }
}

/// Print a value as pretty JSON on stdout.
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", peridot_core::wire::encode(value)?);
    Ok(())
}

pub fn validate(path: &Path) -> Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read job plan: {}", path.display()))?;
    let plan = parse_job_plan(&content)
        .with_context(|| format!("Invalid job plan: {}", path.display()))?;
    let order: Vec<&str> = plan
        .creation_order()
        .into_iter()
        .map(|j| j.name.as_str())
        .collect();
    println!("Job plan is valid; creation order: {}", order.join(", "));
    Ok(())
}

/// Hand ready jobs to stdout, once or until interrupted.
pub async fn dispatch(pool: PgPool, settings: &Settings, once: bool) -> Result<()> {
    let scheduler = &settings.config.scheduler;
    let worker = Worker::new(
        Arc::new(PgJobRepo::new(pool)),
        Arc::new(JsonLinesDispatcher::new(std::io::stdout())),
        scheduler.batch_size,
        Duration::from_millis(scheduler.poll_interval_ms),
    );

    if once {
        let outcome = worker.poll_once().await?;
        if !outcome.failed.is_empty() {
            anyhow::bail!("Failed to dispatch jobs: {:?}", outcome.failed);
        }
        return Ok(());
    }

    tokio::select! {
        _ = worker.run() => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutting down");
        }
    }
    Ok(())
}
