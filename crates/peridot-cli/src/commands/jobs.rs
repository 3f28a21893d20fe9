//! Job commands.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use peridot_config::parse_job_plan;
use peridot_core::{AgentId, JobConfig, JobId, JobStatusUpdate, RepoPullId, wire};
use peridot_db::{AgentRepo, JobRepo, PgAgentRepo, PgJobRepo, PgPool};
use peridot_scheduler::submit_plan;
use serde_json::json;

use super::print_json;

fn repo(pool: &PgPool) -> PgJobRepo {
    PgJobRepo::new(pool.clone())
}

pub async fn get(pool: &PgPool, id: JobId) -> Result<()> {
    print_json(&repo(pool).get_by_id(id).await?)
}

pub async fn list(pool: &PgPool, repo_pull_id: RepoPullId) -> Result<()> {
    print_json(&repo(pool).get_all_for_repo_pull(repo_pull_id).await?)
}

pub async fn ready(pool: &PgPool, limit: usize) -> Result<()> {
    print_json(&repo(pool).get_ready(limit).await?)
}

pub async fn add(
    pool: &PgPool,
    repo_pull_id: RepoPullId,
    agent_id: AgentId,
    priors: &[JobId],
    config_path: Option<&Path>,
) -> Result<()> {
    let config = match config_path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read job config: {}", path.display()))?;
            wire::decode::<JobConfig>(&text)
                .with_context(|| format!("Invalid job config: {}", path.display()))?
        }
        None => JobConfig::default(),
    };
    let id = repo(pool)
        .add_with_config(repo_pull_id, agent_id, priors, &config)
        .await?;
    print_json(&json!({ "id": id }))
}

pub async fn set_ready(pool: &PgPool, id: JobId, ready: bool) -> Result<()> {
    repo(pool).update_is_ready(id, ready).await?;
    print_json(&json!({ "id": id, "is_ready": ready }))
}

pub async fn set_status(pool: &PgPool, id: JobId, update: &JobStatusUpdate) -> Result<()> {
    let jobs = repo(pool);
    jobs.update_status(id, update).await?;
    print_json(&jobs.get_by_id(id).await?)
}

pub async fn delete(pool: &PgPool, id: JobId) -> Result<()> {
    repo(pool).delete(id).await?;
    println!("Deleted job {id}");
    Ok(())
}

/// Create the jobs in a plan file, resolving agent names against the
/// registered agents.
pub async fn plan(pool: &PgPool, repo_pull_id: RepoPullId, path: &Path) -> Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read job plan: {}", path.display()))?;
    let plan = parse_job_plan(&content)
        .with_context(|| format!("Invalid job plan: {}", path.display()))?;

    let agents: HashMap<String, AgentId> = PgAgentRepo::new(pool.clone())
        .get_all()
        .await?
        .into_iter()
        .map(|a| (a.name, a.id))
        .collect();

    let ids = submit_plan(&repo(pool), &agents, repo_pull_id, &plan).await?;
    print_json(&ids)
}
