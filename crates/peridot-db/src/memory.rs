//! In-memory job store for testing.
//!
//! Mirrors the constraints the Postgres schema enforces: jobs must belong to
//! a known repo pull and agent, edges and reader back-references must name
//! existing jobs, and deleting a job removes every row that points at it.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use peridot_core::readiness::{self, JobState, PriorEdge};
use peridot_core::{
    AgentId, Health, Job, JobConfig, JobId, JobStatusUpdate, RepoPullId, Status,
};
use tokio::sync::RwLock;

use crate::repo::JobRepo;
use crate::{DbError, DbResult};

#[derive(Default)]
struct Inner {
    last_id: u32,
    jobs: BTreeMap<JobId, Job>,
    repo_pulls: BTreeSet<RepoPullId>,
    agents: BTreeSet<AgentId>,
}

#[derive(Default)]
pub struct MemoryJobRepo {
    inner: RwLock<Inner>,
}

impl MemoryJobRepo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a repo pull known so jobs may reference it.
    pub async fn add_repo_pull(&self, id: RepoPullId) {
        self.inner.write().await.repo_pulls.insert(id);
    }

    /// Make an agent known so jobs may reference it.
    pub async fn add_agent(&self, id: AgentId) {
        self.inner.write().await.agents.insert(id);
    }
}

fn violation(relation: String) -> DbError {
    DbError::ReferentialIntegrity {
        relation,
        message: "referenced row does not exist".to_string(),
    }
}

#[async_trait]
impl JobRepo for MemoryJobRepo {
    async fn get_all_for_repo_pull(&self, repo_pull_id: RepoPullId) -> DbResult<Vec<Job>> {
        let inner = self.inner.read().await;
        Ok(inner
            .jobs
            .values()
            .filter(|j| j.repo_pull_id == repo_pull_id)
            .cloned()
            .collect())
    }

    async fn get_by_id(&self, id: JobId) -> DbResult<Job> {
        self.inner
            .read()
            .await
            .jobs
            .get(&id)
            .cloned()
            .ok_or_else(|| DbError::not_found("job", id))
    }

    async fn get_by_ids(&self, ids: &[JobId]) -> DbResult<Vec<Job>> {
        let wanted: BTreeSet<JobId> = ids.iter().copied().collect();
        let inner = self.inner.read().await;
        Ok(wanted
            .iter()
            .filter_map(|id| inner.jobs.get(id).cloned())
            .collect())
    }

    async fn get_ready(&self, limit: usize) -> DbResult<Vec<Job>> {
        let inner = self.inner.read().await;
        let states: Vec<JobState> = inner
            .jobs
            .values()
            .map(|j| JobState {
                id: j.id,
                status: j.status,
                health: j.health,
                is_ready: j.is_ready,
            })
            .collect();
        let edges: Vec<PriorEdge> = inner
            .jobs
            .values()
            .flat_map(|j| {
                j.prior_job_ids.iter().map(move |&prior| PriorEdge {
                    job_id: j.id,
                    prior_job_id: prior,
                })
            })
            .collect();

        Ok(readiness::select_ready(&states, &edges, limit)
            .into_iter()
            .filter_map(|id| inner.jobs.get(&id).cloned())
            .collect())
    }

    async fn add_with_config(
        &self,
        repo_pull_id: RepoPullId,
        agent_id: AgentId,
        prior_job_ids: &[JobId],
        config: &JobConfig,
    ) -> DbResult<JobId> {
        let mut inner = self.inner.write().await;
        let job_id = JobId::new(inner.last_id + 1);

        // Validate everything first so a failure leaves no trace.
        if !inner.repo_pulls.contains(&repo_pull_id) {
            return Err(violation(format!("repo pull {repo_pull_id} for job")));
        }
        if !inner.agents.contains(&agent_id) {
            return Err(violation(format!("agent {agent_id} for job")));
        }
        let priors: BTreeSet<JobId> = prior_job_ids.iter().copied().collect();
        if let Some(missing) = priors.iter().find(|id| !inner.jobs.contains_key(id)) {
            return Err(violation(format!("prior job {missing} for job {job_id}")));
        }
        for row in config.to_rows() {
            if let Some(prior) = row.prior_job_id {
                if !inner.jobs.contains_key(&prior) {
                    return Err(violation(format!(
                        "{} config {:?} for job {job_id}",
                        row.kind, row.key
                    )));
                }
            }
        }

        inner.last_id = job_id.get();
        inner.jobs.insert(
            job_id,
            Job {
                id: job_id,
                repo_pull_id,
                agent_id,
                prior_job_ids: priors,
                started_at: None,
                finished_at: None,
                status: Status::Startup,
                health: Health::Ok,
                output: String::new(),
                is_ready: false,
                config: config.clone(),
            },
        );
        Ok(job_id)
    }

    async fn update_is_ready(&self, id: JobId, ready: bool) -> DbResult<()> {
        let mut inner = self.inner.write().await;
        let job = inner
            .jobs
            .get_mut(&id)
            .ok_or_else(|| DbError::not_found("job", id))?;
        job.is_ready = ready;
        Ok(())
    }

    async fn update_status(&self, id: JobId, update: &JobStatusUpdate) -> DbResult<()> {
        let mut inner = self.inner.write().await;
        let job = inner
            .jobs
            .get_mut(&id)
            .ok_or_else(|| DbError::not_found("job", id))?;
        job.started_at = update.started_at;
        job.finished_at = update.finished_at;
        if update.status != Status::Same {
            job.status = update.status;
        }
        if update.health != Health::Same {
            job.health = update.health;
        }
        job.output = update.output.clone();
        Ok(())
    }

    async fn delete(&self, id: JobId) -> DbResult<()> {
        let mut inner = self.inner.write().await;
        if inner.jobs.remove(&id).is_none() {
            return Err(DbError::not_found("job", id));
        }
        for job in inner.jobs.values_mut() {
            job.prior_job_ids.remove(&id);
            job.config
                .code_reader
                .retain(|_, cfg| cfg.prior_job_id() != Some(id));
            job.config
                .spdx_reader
                .retain(|_, cfg| cfg.prior_job_id() != Some(id));
        }
        Ok(())
    }
}
