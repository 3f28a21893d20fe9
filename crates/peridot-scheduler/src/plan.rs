//! Creating the jobs described by a job plan.

use std::collections::{BTreeMap, HashMap};

use peridot_config::{JobPlan, PlannedPath};
use peridot_core::{AgentId, JobConfig, JobId, JobPathConfig, RepoPullId};
use peridot_db::JobRepo;
use tracing::info;

use crate::{SchedulerError, SchedulerResult};

/// Create every job in `plan` for one repo pull and return their IDs by
/// plan name.
///
/// Jobs are created dependencies first, so `needs` become prior-job edges
/// and `job=` entries become back-references to real IDs. Jobs marked
/// `ready` are flipped only after the whole plan exists, so a plan that
/// fails halfway never becomes runnable.
pub async fn submit_plan(
    jobs: &dyn JobRepo,
    agents: &HashMap<String, AgentId>,
    repo_pull_id: RepoPullId,
    plan: &JobPlan,
) -> SchedulerResult<BTreeMap<String, JobId>> {
    if let Some(missing) = plan.jobs.iter().find(|j| !agents.contains_key(&j.agent)) {
        return Err(SchedulerError::UnknownAgent(missing.agent.clone()));
    }

    let mut ids: BTreeMap<String, JobId> = BTreeMap::new();
    for planned in plan.creation_order() {
        let agent_id = agents
            .get(&planned.agent)
            .copied()
            .ok_or_else(|| SchedulerError::UnknownAgent(planned.agent.clone()))?;
        let priors = planned
            .needs
            .iter()
            .map(|name| lookup(&ids, name))
            .collect::<SchedulerResult<Vec<_>>>()?;
        let config = JobConfig {
            kv: planned.kv.clone(),
            code_reader: resolve_paths(&planned.code_reader, &ids)?,
            spdx_reader: resolve_paths(&planned.spdx_reader, &ids)?,
        };

        let id = jobs
            .add_with_config(repo_pull_id, agent_id, &priors, &config)
            .await?;
        info!(job = %planned.name, job_id = %id, agent = %planned.agent, "Created planned job");
        ids.insert(planned.name.clone(), id);
    }

    for planned in plan.jobs.iter().filter(|j| j.ready) {
        jobs.update_is_ready(lookup(&ids, &planned.name)?, true)
            .await?;
    }

    info!(repo_pull_id = %repo_pull_id, jobs = ids.len(), "Submitted job plan");
    Ok(ids)
}

fn lookup(ids: &BTreeMap<String, JobId>, name: &str) -> SchedulerResult<JobId> {
    ids.get(name)
        .copied()
        .ok_or_else(|| SchedulerError::UnresolvedJob(name.to_string()))
}

fn resolve_paths(
    planned: &BTreeMap<String, PlannedPath>,
    ids: &BTreeMap<String, JobId>,
) -> SchedulerResult<BTreeMap<String, JobPathConfig>> {
    planned
        .iter()
        .map(|(key, path)| {
            let resolved = match path {
                PlannedPath::Path(p) => JobPathConfig::Path(p.clone()),
                PlannedPath::Job(name) => JobPathConfig::PriorJob(lookup(ids, name)?),
            };
            Ok((key.clone(), resolved))
        })
        .collect()
}
