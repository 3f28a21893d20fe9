//! Worker that hands ready jobs to a dispatcher.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use peridot_core::{JobId, JobStatusUpdate};
use peridot_db::{DbError, JobRepo};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::SchedulerResult;
use crate::dispatch::Dispatcher;

/// What one poll did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PollOutcome {
    /// Jobs accepted by the dispatcher and marked running.
    pub dispatched: Vec<JobId>,
    /// Jobs the dispatcher refused; they stay ready for the next poll.
    pub failed: Vec<JobId>,
    /// Jobs the dispatcher accepted but whose running status could not be
    /// stored. The worker retries the write on later polls and does not
    /// dispatch them again.
    pub unrecorded: Vec<JobId>,
}

impl PollOutcome {
    /// Number of jobs handed to the dispatcher successfully.
    pub fn handed_off(&self) -> usize {
        self.dispatched.len() + self.unrecorded.len()
    }
}

/// Polls for ready jobs and dispatches them.
pub struct Worker {
    jobs: Arc<dyn JobRepo>,
    dispatcher: Arc<dyn Dispatcher>,
    batch_size: usize,
    poll_interval: Duration,
    /// Dispatched jobs whose start is not yet stored, with their start time.
    unrecorded: Mutex<BTreeMap<JobId, DateTime<Utc>>>,
}

impl Worker {
    pub fn new(
        jobs: Arc<dyn JobRepo>,
        dispatcher: Arc<dyn Dispatcher>,
        batch_size: usize,
        poll_interval: Duration,
    ) -> Self {
        Self {
            jobs,
            dispatcher,
            batch_size,
            poll_interval,
            unrecorded: Mutex::new(BTreeMap::new()),
        }
    }

    /// Fetch one batch of ready jobs and dispatch each in ID order.
    ///
    /// A dispatched job is marked `Running` with `started_at` set so it is not
    /// offered again. A refused job is left as it was.
    pub async fn poll_once(&self) -> SchedulerResult<PollOutcome> {
        self.retry_unrecorded().await;

        let ready = self.jobs.get_ready(self.batch_size).await?;
        debug!(count = ready.len(), "Polled ready jobs");

        let mut outcome = PollOutcome::default();
        for job in ready {
            if self.pending_start(job.id).is_some() {
                debug!(job_id = %job.id, "Skipping job already dispatched");
                continue;
            }
            if let Err(e) = self.dispatcher.dispatch(&job).await {
                warn!(job_id = %job.id, error = %e, "Failed to dispatch job");
                outcome.failed.push(job.id);
                continue;
            }

            let started_at = Utc::now();
            match self
                .jobs
                .update_status(job.id, &JobStatusUpdate::started(started_at))
                .await
            {
                Ok(()) => {
                    info!(
                        job_id = %job.id,
                        agent_id = %job.agent_id,
                        dispatcher = self.dispatcher.name(),
                        "Dispatched job"
                    );
                    outcome.dispatched.push(job.id);
                }
                Err(e) => {
                    warn!(job_id = %job.id, error = %e, "Dispatched job but failed to record its start");
                    self.lock_unrecorded().insert(job.id, started_at);
                    outcome.unrecorded.push(job.id);
                }
            }
        }
        Ok(outcome)
    }

    /// Run the worker loop.
    pub async fn run(&self) {
        info!(
            dispatcher = self.dispatcher.name(),
            batch_size = self.batch_size,
            "Starting worker"
        );

        loop {
            match self.poll_once().await {
                Ok(outcome) if self.batch_size > 0 && outcome.handed_off() == self.batch_size => {
                    // Full batch; there may be more waiting.
                }
                Ok(_) => sleep(self.poll_interval).await,
                Err(e) => {
                    warn!(error = %e, "Failed to poll ready jobs");
                    sleep(self.poll_interval * 5).await;
                }
            }
        }
    }

    async fn retry_unrecorded(&self) {
        let pending: Vec<(JobId, DateTime<Utc>)> = self
            .lock_unrecorded()
            .iter()
            .map(|(&id, &at)| (id, at))
            .collect();
        for (id, started_at) in pending {
            match self
                .jobs
                .update_status(id, &JobStatusUpdate::started(started_at))
                .await
            {
                Ok(()) => {
                    info!(job_id = %id, "Recorded start of dispatched job");
                    self.lock_unrecorded().remove(&id);
                }
                Err(DbError::NotFound { .. }) => {
                    info!(job_id = %id, "Dispatched job was deleted before its start was recorded");
                    self.lock_unrecorded().remove(&id);
                }
                Err(e) => warn!(job_id = %id, error = %e, "Still unable to record job start"),
            }
        }
    }

    fn pending_start(&self, id: JobId) -> Option<DateTime<Utc>> {
        self.lock_unrecorded().get(&id).copied()
    }

    fn lock_unrecorded(&self) -> std::sync::MutexGuard<'_, BTreeMap<JobId, DateTime<Utc>>> {
        self.unrecorded
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SchedulerError;
    use async_trait::async_trait;
    use peridot_core::{AgentId, Health, Job, RepoPullId, Status};
    use peridot_core::{JobConfig, JobStatusUpdate};
    use peridot_db::{DbResult, MemoryJobRepo};
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const PULL: RepoPullId = RepoPullId::new(1);
    const AGENT: AgentId = AgentId::new(1);

    #[derive(Default)]
    struct RecordingDispatcher {
        seen: Mutex<Vec<JobId>>,
        refuse: HashSet<JobId>,
    }

    #[async_trait]
    impl Dispatcher for RecordingDispatcher {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn dispatch(&self, job: &Job) -> SchedulerResult<()> {
            if self.refuse.contains(&job.id) {
                return Err(SchedulerError::Dispatch("agent unavailable".into()));
            }
            self.seen.lock().unwrap().push(job.id);
            Ok(())
        }
    }

    /// Wraps the in-memory store, counting polls and failing status writes
    /// for chosen jobs.
    #[derive(Default)]
    struct FlakyRepo {
        inner: MemoryJobRepo,
        polls: AtomicUsize,
        failing_status: Mutex<HashSet<JobId>>,
    }

    #[async_trait]
    impl JobRepo for FlakyRepo {
        async fn get_all_for_repo_pull(&self, repo_pull_id: RepoPullId) -> DbResult<Vec<Job>> {
            self.inner.get_all_for_repo_pull(repo_pull_id).await
        }

        async fn get_by_id(&self, id: JobId) -> DbResult<Job> {
            self.inner.get_by_id(id).await
        }

        async fn get_by_ids(&self, ids: &[JobId]) -> DbResult<Vec<Job>> {
            self.inner.get_by_ids(ids).await
        }

        async fn get_ready(&self, limit: usize) -> DbResult<Vec<Job>> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            self.inner.get_ready(limit).await
        }

        async fn add_with_config(
            &self,
            repo_pull_id: RepoPullId,
            agent_id: AgentId,
            prior_job_ids: &[JobId],
            config: &JobConfig,
        ) -> DbResult<JobId> {
            self.inner
                .add_with_config(repo_pull_id, agent_id, prior_job_ids, config)
                .await
        }

        async fn update_is_ready(&self, id: JobId, ready: bool) -> DbResult<()> {
            self.inner.update_is_ready(id, ready).await
        }

        async fn update_status(&self, id: JobId, update: &JobStatusUpdate) -> DbResult<()> {
            if self.failing_status.lock().unwrap().contains(&id) {
                return Err(DbError::InvalidInput("connection reset".into()));
            }
            self.inner.update_status(id, update).await
        }

        async fn delete(&self, id: JobId) -> DbResult<()> {
            self.inner.delete(id).await
        }
    }

    async fn flaky_store() -> Arc<FlakyRepo> {
        let repo = Arc::new(FlakyRepo::default());
        repo.inner.add_repo_pull(PULL).await;
        repo.inner.add_agent(AGENT).await;
        repo
    }

    async fn ready_jobs(repo: &dyn JobRepo, count: usize) -> Vec<JobId> {
        let mut ids = Vec::new();
        for _ in 0..count {
            let id = repo.add(PULL, AGENT, &[]).await.unwrap();
            repo.update_is_ready(id, true).await.unwrap();
            ids.push(id);
        }
        ids
    }

    async fn store() -> Arc<MemoryJobRepo> {
        let repo = Arc::new(MemoryJobRepo::new());
        repo.add_repo_pull(PULL).await;
        repo.add_agent(AGENT).await;
        repo
    }

    #[tokio::test]
    async fn test_dispatched_jobs_are_marked_running() {
        let repo = store().await;
        let ids = ready_jobs(repo.as_ref(), 2).await;
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let worker = Worker::new(
            repo.clone(),
            dispatcher.clone(),
            10,
            Duration::from_millis(10),
        );

        let outcome = worker.poll_once().await.unwrap();
        assert_eq!(outcome.dispatched, ids);
        assert!(outcome.failed.is_empty());
        assert_eq!(*dispatcher.seen.lock().unwrap(), ids);

        let job = repo.get_by_id(ids[0]).await.unwrap();
        assert_eq!(job.status, Status::Running);
        assert_eq!(job.health, Health::Ok);
        assert!(job.started_at.is_some());

        let again = worker.poll_once().await.unwrap();
        assert!(again.dispatched.is_empty());
    }

    #[tokio::test]
    async fn test_batch_size_caps_dispatch() {
        let repo = store().await;
        let ids = ready_jobs(repo.as_ref(), 5).await;
        let worker = Worker::new(
            repo.clone(),
            Arc::new(RecordingDispatcher::default()),
            3,
            Duration::from_millis(10),
        );

        let outcome = worker.poll_once().await.unwrap();
        assert_eq!(outcome.dispatched, ids[..3].to_vec());
        let outcome = worker.poll_once().await.unwrap();
        assert_eq!(outcome.dispatched, ids[3..].to_vec());
    }

    #[tokio::test]
    async fn test_refused_job_stays_ready() {
        let repo = store().await;
        let ids = ready_jobs(repo.as_ref(), 2).await;
        let dispatcher = Arc::new(RecordingDispatcher {
            refuse: HashSet::from([ids[0]]),
            ..Default::default()
        });
        let worker = Worker::new(repo.clone(), dispatcher, 10, Duration::from_millis(10));

        let outcome = worker.poll_once().await.unwrap();
        assert_eq!(outcome.dispatched, vec![ids[1]]);
        assert_eq!(outcome.failed, vec![ids[0]]);

        let job = repo.get_by_id(ids[0]).await.unwrap();
        assert_eq!(job.status, Status::Startup);
        assert!(job.started_at.is_none());

        let again = worker.poll_once().await.unwrap();
        assert_eq!(again.failed, vec![ids[0]]);
    }

    #[tokio::test]
    async fn test_dependent_dispatched_after_prior_stops() {
        let repo = store().await;
        let scan = ready_jobs(repo.as_ref(), 1).await[0];
        let report = repo.add(PULL, AGENT, &[scan]).await.unwrap();
        repo.update_is_ready(report, true).await.unwrap();
        let worker = Worker::new(
            repo.clone(),
            Arc::new(RecordingDispatcher::default()),
            10,
            Duration::from_millis(10),
        );

        assert_eq!(worker.poll_once().await.unwrap().dispatched, vec![scan]);
        assert!(worker.poll_once().await.unwrap().dispatched.is_empty());

        let done = JobStatusUpdate {
            started_at: None,
            finished_at: Some(Utc::now()),
            status: Status::Stopped,
            health: Health::Ok,
            output: "done".into(),
        };
        repo.update_status(scan, &done).await.unwrap();
        assert_eq!(worker.poll_once().await.unwrap().dispatched, vec![report]);
    }

    #[tokio::test]
    async fn test_run_loop_dispatches() {
        let repo = store().await;
        let ids = ready_jobs(repo.as_ref(), 2).await;
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let worker = Worker::new(
            repo.clone(),
            dispatcher.clone(),
            10,
            Duration::from_millis(5),
        );

        let _ = tokio::time::timeout(Duration::from_millis(100), worker.run()).await;
        assert_eq!(*dispatcher.seen.lock().unwrap(), ids);
    }

    #[tokio::test]
    async fn test_failed_start_write_does_not_stop_batch() {
        let repo = flaky_store().await;
        let ids = ready_jobs(repo.as_ref(), 3).await;
        repo.failing_status.lock().unwrap().insert(ids[0]);
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let worker = Worker::new(
            repo.clone(),
            dispatcher.clone(),
            10,
            Duration::from_millis(10),
        );

        let outcome = worker.poll_once().await.unwrap();
        assert_eq!(outcome.dispatched, ids[1..].to_vec());
        assert_eq!(outcome.unrecorded, vec![ids[0]]);
        assert!(outcome.failed.is_empty());
        assert_eq!(*dispatcher.seen.lock().unwrap(), ids);

        // Still Startup in the store, but not handed out a second time.
        let again = worker.poll_once().await.unwrap();
        assert_eq!(again, PollOutcome::default());
        assert_eq!(dispatcher.seen.lock().unwrap().len(), 3);

        repo.failing_status.lock().unwrap().clear();
        worker.poll_once().await.unwrap();
        let job = repo.get_by_id(ids[0]).await.unwrap();
        assert_eq!(job.status, Status::Running);
        assert!(job.started_at.is_some());
        assert_eq!(dispatcher.seen.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_unbounded_batch_still_sleeps_when_idle() {
        let repo = flaky_store().await;
        let worker = Worker::new(
            repo.clone(),
            Arc::new(RecordingDispatcher::default()),
            0,
            Duration::from_millis(100),
        );

        let _ = tokio::time::timeout(Duration::from_millis(300), worker.run()).await;
        let polls = repo.polls.load(Ordering::SeqCst);
        assert!((1..=4).contains(&polls), "polled {polls} times");
    }
}
