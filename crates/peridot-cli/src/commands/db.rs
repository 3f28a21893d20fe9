//! Database administration commands.

use anyhow::{Result, bail};
use peridot_db::{PgPool, init_db, reset_db};

use super::Settings;

pub async fn init(pool: &PgPool, settings: &Settings) -> Result<()> {
    init_db(pool, admin_github(settings)).await?;
    println!("Database initialized");
    Ok(())
}

pub async fn reset(pool: &PgPool, settings: &Settings, yes: bool) -> Result<()> {
    if !yes {
        bail!("Refusing to drop all data without --yes");
    }
    reset_db(pool, admin_github(settings)).await?;
    println!("Database reset");
    Ok(())
}

fn admin_github(settings: &Settings) -> Option<&str> {
    settings.config.bootstrap.initial_admin_github.as_deref()
}
