//! Which jobs may be handed to an agent right now.
//!
//! Selection runs in two phases over one consistent snapshot:
//! 1. collect every job with at least one prior that is not yet
//!    terminally clear (stopped, health not `Error`);
//! 2. keep jobs that are marked ready, waiting at `Startup`, healthy,
//!    and not in the blocked set.
//!
//! A prior edge pointing at a job absent from the snapshot counts as not
//! clear, so the dependent stays blocked.

use std::collections::{BTreeSet, HashMap};

use crate::JobId;
use crate::status::{Health, Status, is_terminally_clear};

/// The readiness-relevant slice of one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobState {
    pub id: JobId,
    pub status: Status,
    pub health: Health,
    pub is_ready: bool,
}

impl JobState {
    fn is_waiting(&self) -> bool {
        self.is_ready && self.status == Status::Startup && self.health == Health::Ok
    }
}

/// `job_id` must wait for `prior_job_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriorEdge {
    pub job_id: JobId,
    pub prior_job_id: JobId,
}

/// Phase one: jobs with at least one prior that is not terminally clear.
pub fn blocked_jobs(states: &[JobState], edges: &[PriorEdge]) -> BTreeSet<JobId> {
    let by_id: HashMap<JobId, &JobState> = states.iter().map(|s| (s.id, s)).collect();
    edges
        .iter()
        .filter(|e| {
            by_id
                .get(&e.prior_job_id)
                .is_none_or(|p| !is_terminally_clear(p.status, p.health))
        })
        .map(|e| e.job_id)
        .collect()
}

/// Phase two: ready jobs in ascending ID order, at most `limit` of them
/// when `limit > 0`.
pub fn select_ready(states: &[JobState], edges: &[PriorEdge], limit: usize) -> Vec<JobId> {
    let blocked = blocked_jobs(states, edges);
    let ready: BTreeSet<JobId> = states
        .iter()
        .filter(|s| s.is_waiting() && !blocked.contains(&s.id))
        .map(|s| s.id)
        .collect();

    let mut ids: Vec<JobId> = ready.into_iter().collect();
    if limit > 0 {
        ids.truncate(limit);
    }
    ids
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(id: u32, status: Status, health: Health, is_ready: bool) -> JobState {
        JobState {
            id: JobId::new(id),
            status,
            health,
            is_ready,
        }
    }

    fn waiting(id: u32) -> JobState {
        state(id, Status::Startup, Health::Ok, true)
    }

    fn edge(job: u32, prior: u32) -> PriorEdge {
        PriorEdge {
            job_id: JobId::new(job),
            prior_job_id: JobId::new(prior),
        }
    }

    fn ids(raw: &[u32]) -> Vec<JobId> {
        raw.iter().copied().map(JobId::new).collect()
    }

    #[test]
    fn test_no_dependencies() {
        let states = vec![waiting(1), state(2, Status::Running, Health::Ok, true)];
        assert_eq!(select_ready(&states, &[], 0), ids(&[1]));
    }

    #[test]
    fn test_not_ready_is_skipped() {
        let states = vec![waiting(1), state(2, Status::Startup, Health::Ok, false)];
        assert_eq!(select_ready(&states, &[], 0), ids(&[1]));
    }

    #[test]
    fn test_unhealthy_startup_is_skipped() {
        let states = vec![
            state(1, Status::Startup, Health::Degraded, true),
            state(2, Status::Startup, Health::Error, true),
        ];
        assert!(select_ready(&states, &[], 0).is_empty());
    }

    #[test]
    fn test_blocked_by_running_prior() {
        let states = vec![state(1, Status::Running, Health::Ok, true), waiting(2)];
        let edges = vec![edge(2, 1)];
        assert!(select_ready(&states, &edges, 0).is_empty());
    }

    #[test]
    fn test_blocked_by_errored_prior() {
        let states = vec![state(1, Status::Stopped, Health::Error, true), waiting(2)];
        let edges = vec![edge(2, 1)];
        assert!(select_ready(&states, &edges, 0).is_empty());
        assert_eq!(
            blocked_jobs(&states, &edges).into_iter().collect::<Vec<_>>(),
            ids(&[2])
        );
    }

    #[test]
    fn test_unblocked_by_degraded_prior() {
        let states = vec![
            state(1, Status::Stopped, Health::Degraded, true),
            waiting(2),
        ];
        let edges = vec![edge(2, 1)];
        assert_eq!(select_ready(&states, &edges, 0), ids(&[2]));
    }

    #[test]
    fn test_all_priors_must_clear() {
        let states = vec![
            state(1, Status::Stopped, Health::Ok, true),
            state(2, Status::Running, Health::Ok, true),
            waiting(3),
        ];
        let edges = vec![edge(3, 1), edge(3, 2)];
        assert!(select_ready(&states, &edges, 0).is_empty());
    }

    #[test]
    fn test_missing_prior_blocks() {
        let states = vec![waiting(2)];
        let edges = vec![edge(2, 99)];
        assert!(select_ready(&states, &edges, 0).is_empty());
    }

    #[test]
    fn test_limit_returns_lowest_ids() {
        let states = vec![waiting(9), waiting(3), waiting(7), waiting(1), waiting(5)];
        assert_eq!(select_ready(&states, &[], 3), ids(&[1, 3, 5]));
        assert_eq!(select_ready(&states, &[], 0), ids(&[1, 3, 5, 7, 9]));
        assert_eq!(select_ready(&states, &[], 10).len(), 5);
    }
}
