//! Job repository: jobs, their prior-job edges and their configuration rows.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use peridot_core::{
    AgentId, Health, Job, JobConfig, JobConfigRow, JobConfigType, JobId, JobStatusUpdate,
    RepoPullId, Status,
};
use sqlx::{PgConnection, PgPool};
use tracing::{debug, info};

use crate::error::{pg_key, row_key};
use crate::{DbError, DbResult};

/// Database row for jobs.
#[derive(Debug, Clone, sqlx::FromRow)]
struct JobRow {
    id: i32,
    repopull_id: i32,
    agent_id: i32,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    status: i32,
    health: i32,
    output: String,
    is_ready: bool,
}

impl TryFrom<JobRow> for Job {
    type Error = DbError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        Ok(Job {
            id: JobId::new(row_key(row.id)?),
            repo_pull_id: RepoPullId::new(row_key(row.repopull_id)?),
            agent_id: AgentId::new(row_key(row.agent_id)?),
            prior_job_ids: BTreeSet::new(),
            started_at: row.started_at,
            finished_at: row.finished_at,
            status: Status::from_code(row.status)?,
            health: Health::from_code(row.health)?,
            output: row.output,
            is_ready: row.is_ready,
            config: JobConfig::default(),
        })
    }
}

/// Database row for job configuration entries.
#[derive(Debug, Clone, sqlx::FromRow)]
struct PathConfigRow {
    job_id: i32,
    kind: i32,
    key: String,
    value: Option<String>,
    priorjob_id: Option<i32>,
}

impl TryFrom<PathConfigRow> for JobConfigRow {
    type Error = DbError;

    fn try_from(row: PathConfigRow) -> Result<Self, Self::Error> {
        let prior_job_id = row
            .priorjob_id
            .map(|raw| row_key(raw).map(JobId::new))
            .transpose()?;
        Ok(JobConfigRow {
            kind: JobConfigType::from_code(row.kind)?,
            key: row.key,
            value: row.value,
            prior_job_id,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct PriorRow {
    job_id: i32,
    priorjob_id: i32,
}

#[async_trait]
pub trait JobRepo: Send + Sync {
    /// All jobs for a repo pull, ascending by ID.
    async fn get_all_for_repo_pull(&self, repo_pull_id: RepoPullId) -> DbResult<Vec<Job>>;

    /// Get one job with its configuration and prior jobs.
    async fn get_by_id(&self, id: JobId) -> DbResult<Job>;

    /// Get the jobs with the given IDs. Missing IDs are silently omitted.
    async fn get_by_ids(&self, ids: &[JobId]) -> DbResult<Vec<Job>>;

    /// Jobs that may run now, lowest IDs first. `limit == 0` means no cap.
    async fn get_ready(&self, limit: usize) -> DbResult<Vec<Job>>;

    /// Create a job with no configuration.
    async fn add(
        &self,
        repo_pull_id: RepoPullId,
        agent_id: AgentId,
        prior_job_ids: &[JobId],
    ) -> DbResult<JobId> {
        self.add_with_config(repo_pull_id, agent_id, prior_job_ids, &JobConfig::default())
            .await
    }

    /// Create a job with its prior jobs and configuration, atomically.
    /// The job starts at `Startup`/`Ok`, with no timestamps and not ready.
    async fn add_with_config(
        &self,
        repo_pull_id: RepoPullId,
        agent_id: AgentId,
        prior_job_ids: &[JobId],
        config: &JobConfig,
    ) -> DbResult<JobId>;

    /// Mark whether the job's configuration is complete.
    async fn update_is_ready(&self, id: JobId, ready: bool) -> DbResult<()>;

    /// Record execution progress reported by an agent.
    async fn update_status(&self, id: JobId, update: &JobStatusUpdate) -> DbResult<()>;

    /// Delete a job, its configuration and every edge touching it.
    async fn delete(&self, id: JobId) -> DbResult<()>;
}

/// PostgreSQL implementation of JobRepo.
pub struct PgJobRepo {
    pool: PgPool,
}

impl PgJobRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const JOB_COLUMNS: &str =
    "id, repopull_id, agent_id, started_at, finished_at, status, health, output, is_ready";

/// Load configuration rows and prior edges for `rows` in two batched
/// queries and assemble full jobs, ascending by ID.
async fn hydrate(conn: &mut PgConnection, rows: Vec<JobRow>) -> DbResult<Vec<Job>> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }
    let ids: Vec<i32> = rows.iter().map(|r| r.id).collect();

    let configs = sqlx::query_as::<_, PathConfigRow>(
        r#"
        SELECT job_id, type AS kind, key, value, priorjob_id
        FROM peridot.jobpathconfigs
        WHERE job_id = ANY($1)
        "#,
    )
    .bind(&ids)
    .fetch_all(&mut *conn)
    .await?;

    let priors = sqlx::query_as::<_, PriorRow>(
        "SELECT job_id, priorjob_id FROM peridot.jobpriorids WHERE job_id = ANY($1)",
    )
    .bind(&ids)
    .fetch_all(&mut *conn)
    .await?;

    let mut jobs = BTreeMap::new();
    for row in rows {
        jobs.insert(row.id, Job::try_from(row)?);
    }
    for row in configs {
        let job_id = row.job_id;
        let config_row = JobConfigRow::try_from(row)?;
        if let Some(job) = jobs.get_mut(&job_id) {
            job.config.apply_row(&config_row);
        }
    }
    for row in priors {
        if let Some(job) = jobs.get_mut(&row.job_id) {
            job.prior_job_ids.insert(JobId::new(row_key(row.priorjob_id)?));
        }
    }
    Ok(jobs.into_values().collect())
}

async fn fetch_by_ids(conn: &mut PgConnection, ids: &[i32]) -> DbResult<Vec<Job>> {
    let rows = sqlx::query_as::<_, JobRow>(&format!(
        "SELECT {JOB_COLUMNS} FROM peridot.jobs WHERE id = ANY($1) ORDER BY id"
    ))
    .bind(ids)
    .fetch_all(&mut *conn)
    .await?;
    hydrate(conn, rows).await
}

fn job_not_found(id: JobId) -> DbError {
    DbError::not_found("job", id)
}

#[async_trait]
impl JobRepo for PgJobRepo {
    async fn get_all_for_repo_pull(&self, repo_pull_id: RepoPullId) -> DbResult<Vec<Job>> {
        let mut tx = self.pool.begin().await?;
        let rows = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {JOB_COLUMNS} FROM peridot.jobs WHERE repopull_id = $1 ORDER BY id"
        ))
        .bind(pg_key(repo_pull_id.get())?)
        .fetch_all(&mut *tx)
        .await?;
        let jobs = hydrate(&mut *tx, rows).await?;
        tx.commit().await?;
        Ok(jobs)
    }

    async fn get_by_id(&self, id: JobId) -> DbResult<Job> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {JOB_COLUMNS} FROM peridot.jobs WHERE id = $1"
        ))
        .bind(pg_key(id.get())?)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| job_not_found(id))?;
        let job = hydrate(&mut *tx, vec![row])
            .await?
            .pop()
            .ok_or_else(|| job_not_found(id))?;
        tx.commit().await?;
        Ok(job)
    }

    async fn get_by_ids(&self, ids: &[JobId]) -> DbResult<Vec<Job>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        // IDs beyond the column range cannot exist; omit them like any miss.
        let keys: Vec<i32> = ids
            .iter()
            .filter_map(|id| pg_key(id.get()).ok())
            .collect();
        let mut tx = self.pool.begin().await?;
        let jobs = fetch_by_ids(&mut *tx, &keys).await?;
        tx.commit().await?;
        Ok(jobs)
    }

    async fn get_ready(&self, limit: usize) -> DbResult<Vec<Job>> {
        let cap = match limit {
            0 => None,
            n => Some(i64::try_from(n).unwrap_or(i64::MAX)),
        };

        // Selection and hydration must read the same snapshot.
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ")
            .execute(&mut *tx)
            .await?;

        // A dangling edge finds no prior row and counts as unready.
        let ids: Vec<i32> = sqlx::query_scalar(
            r#"
            WITH prior_flags AS (
                SELECT e.job_id,
                       bool_or(p.id IS NULL OR p.status <> $1 OR p.health = $2) AS any_unready
                FROM peridot.jobpriorids e
                LEFT JOIN peridot.jobs p ON p.id = e.priorjob_id
                GROUP BY e.job_id
            )
            SELECT j.id
            FROM peridot.jobs j
            LEFT JOIN prior_flags f ON f.job_id = j.id
            WHERE NOT COALESCE(f.any_unready, FALSE)
              AND j.is_ready
              AND j.status = $3
              AND j.health = $4
            ORDER BY j.id
            LIMIT $5
            "#,
        )
        .bind(Status::Stopped.code())
        .bind(Health::Error.code())
        .bind(Status::Startup.code())
        .bind(Health::Ok.code())
        .bind(cap)
        .fetch_all(&mut *tx)
        .await?;

        debug!(count = ids.len(), limit, "Selected ready jobs");
        let jobs = fetch_by_ids(&mut *tx, &ids).await?;
        tx.commit().await?;
        Ok(jobs)
    }

    async fn add_with_config(
        &self,
        repo_pull_id: RepoPullId,
        agent_id: AgentId,
        prior_job_ids: &[JobId],
        config: &JobConfig,
    ) -> DbResult<JobId> {
        let mut tx = self.pool.begin().await?;

        let raw_id: i32 = sqlx::query_scalar(
            r#"
            INSERT INTO peridot.jobs (repopull_id, agent_id, status, health, output, is_ready)
            VALUES ($1, $2, $3, $4, '', FALSE)
            RETURNING id
            "#,
        )
        .bind(pg_key(repo_pull_id.get())?)
        .bind(pg_key(agent_id.get())?)
        .bind(Status::Startup.code())
        .bind(Health::Ok.code())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            DbError::from_constraint(
                e,
                format!("job for repo pull {repo_pull_id} and agent {agent_id}"),
            )
        })?;
        let job_id = JobId::new(row_key(raw_id)?);

        let priors: BTreeSet<JobId> = prior_job_ids.iter().copied().collect();
        for prior in &priors {
            sqlx::query("INSERT INTO peridot.jobpriorids (job_id, priorjob_id) VALUES ($1, $2)")
                .bind(raw_id)
                .bind(pg_key(prior.get())?)
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    DbError::from_constraint(e, format!("prior job {prior} for job {job_id}"))
                })?;
        }

        for row in config.to_rows() {
            let prior = row.prior_job_id.map(|id| pg_key(id.get())).transpose()?;
            sqlx::query(
                r#"
                INSERT INTO peridot.jobpathconfigs (job_id, type, key, value, priorjob_id)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(raw_id)
            .bind(row.kind.code())
            .bind(&row.key)
            .bind(&row.value)
            .bind(prior)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                DbError::from_constraint(
                    e,
                    format!("{} config {:?} for job {job_id}", row.kind, row.key),
                )
            })?;
        }

        tx.commit().await?;
        info!(
            job_id = %job_id,
            repo_pull_id = %repo_pull_id,
            agent_id = %agent_id,
            priors = priors.len(),
            "Created job"
        );
        Ok(job_id)
    }

    async fn update_is_ready(&self, id: JobId, ready: bool) -> DbResult<()> {
        let result = sqlx::query("UPDATE peridot.jobs SET is_ready = $1 WHERE id = $2")
            .bind(ready)
            .bind(pg_key(id.get())?)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(job_not_found(id));
        }
        Ok(())
    }

    async fn update_status(&self, id: JobId, update: &JobStatusUpdate) -> DbResult<()> {
        let status = (update.status != Status::Same).then(|| update.status.code());
        let health = (update.health != Health::Same).then(|| update.health.code());
        let result = sqlx::query(
            r#"
            UPDATE peridot.jobs
            SET started_at = $1,
                finished_at = $2,
                status = COALESCE($3, status),
                health = COALESCE($4, health),
                output = $5
            WHERE id = $6
            "#,
        )
        .bind(update.started_at)
        .bind(update.finished_at)
        .bind(status)
        .bind(health)
        .bind(&update.output)
        .bind(pg_key(id.get())?)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(job_not_found(id));
        }
        Ok(())
    }

    async fn delete(&self, id: JobId) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM peridot.jobs WHERE id = $1")
            .bind(pg_key(id.get())?)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(job_not_found(id));
        }
        info!(job_id = %id, "Deleted job");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use peridot_core::JobPathConfig;

    fn job_row(id: i32) -> JobRow {
        JobRow {
            id,
            repopull_id: 3,
            agent_id: 8,
            started_at: None,
            finished_at: None,
            status: 1,
            health: 1,
            output: String::new(),
            is_ready: false,
        }
    }

    #[test]
    fn test_job_row_conversion() {
        let job = Job::try_from(job_row(17)).unwrap();
        assert_eq!(job.id, JobId::new(17));
        assert_eq!(job.status, Status::Startup);
        assert_eq!(job.health, Health::Ok);
        assert!(job.config.is_empty());
    }

    #[test]
    fn test_job_row_bad_status_rejected() {
        let mut row = job_row(17);
        row.status = 9;
        assert!(matches!(
            Job::try_from(row),
            Err(DbError::Domain(peridot_core::Error::InvalidDomainValue { .. }))
        ));
    }

    #[test]
    fn test_job_row_negative_id_rejected() {
        assert!(Job::try_from(job_row(-1)).is_err());
    }

    #[test]
    fn test_path_config_row_conversion() {
        let reference = PathConfigRow {
            job_id: 5,
            kind: 1,
            key: "primary".into(),
            value: None,
            priorjob_id: Some(4),
        };
        let row = JobConfigRow::try_from(reference).unwrap();
        assert_eq!(row.kind, JobConfigType::CodeReader);
        assert_eq!(row.to_path_config(), JobPathConfig::PriorJob(JobId::new(4)));

        let literal = PathConfigRow {
            job_id: 5,
            kind: 2,
            key: "historical".into(),
            value: Some("/spdx/prior/lastbest.spdx".into()),
            priorjob_id: None,
        };
        let row = JobConfigRow::try_from(literal).unwrap();
        assert_eq!(
            row.to_path_config(),
            JobPathConfig::path("/spdx/prior/lastbest.spdx")
        );
    }
}
