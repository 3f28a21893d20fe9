//! Agent commands.

use anyhow::Result;
use peridot_db::{AgentRepo, PgAgentRepo, PgPool};

use super::print_json;

pub async fn list(pool: &PgPool) -> Result<()> {
    let agents = PgAgentRepo::new(pool.clone()).get_all().await?;
    print_json(&agents)
}
