//! Repos, repo branches and repo pulls.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use peridot_core::{Health, Repo, RepoBranch, RepoId, RepoPull, RepoPullId, Status, SubprojectId};
use sqlx::PgPool;

use super::{ensure_some_change, expect_affected};
use crate::error::{pg_key, row_key};
use crate::{DbError, DbResult};

#[derive(Debug, Clone, sqlx::FromRow)]
struct RepoRow {
    id: i32,
    subproject_id: i32,
    name: String,
    address: String,
}

impl TryFrom<RepoRow> for Repo {
    type Error = DbError;

    fn try_from(row: RepoRow) -> Result<Self, Self::Error> {
        Ok(Repo {
            id: RepoId::new(row_key(row.id)?),
            subproject_id: SubprojectId::new(row_key(row.subproject_id)?),
            name: row.name,
            address: row.address,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct RepoBranchRow {
    repo_id: i32,
    branch: String,
}

impl TryFrom<RepoBranchRow> for RepoBranch {
    type Error = DbError;

    fn try_from(row: RepoBranchRow) -> Result<Self, Self::Error> {
        Ok(RepoBranch {
            repo_id: RepoId::new(row_key(row.repo_id)?),
            branch: row.branch,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct RepoPullRow {
    id: i32,
    repo_id: i32,
    branch: String,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    status: i32,
    health: i32,
    output: String,
    commit: String,
    tag: String,
    spdx_id: String,
}

impl TryFrom<RepoPullRow> for RepoPull {
    type Error = DbError;

    fn try_from(row: RepoPullRow) -> Result<Self, Self::Error> {
        Ok(RepoPull {
            id: RepoPullId::new(row_key(row.id)?),
            repo_id: RepoId::new(row_key(row.repo_id)?),
            branch: row.branch,
            started_at: row.started_at,
            finished_at: row.finished_at,
            status: Status::from_code(row.status)?,
            health: Health::from_code(row.health)?,
            output: row.output,
            commit: row.commit,
            tag: row.tag,
            spdx_id: row.spdx_id,
        })
    }
}

/// Fields for recording a repo pull whose outcome is already known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRepoPull {
    pub repo_id: RepoId,
    pub branch: String,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: Status,
    pub health: Health,
    pub output: String,
    pub commit: String,
    pub tag: String,
    pub spdx_id: String,
}

#[async_trait]
pub trait RepoRepo: Send + Sync {
    async fn get_all(&self) -> DbResult<Vec<Repo>>;
    async fn get_all_for_subproject(&self, subproject_id: SubprojectId) -> DbResult<Vec<Repo>>;
    async fn get_by_id(&self, id: RepoId) -> DbResult<Repo>;
    async fn add(&self, subproject_id: SubprojectId, name: &str, address: &str) -> DbResult<RepoId>;
    /// Change name and/or address. Empty strings keep the stored value.
    async fn update(&self, id: RepoId, name: &str, address: &str) -> DbResult<()>;
    async fn update_subproject_id(&self, id: RepoId, subproject_id: SubprojectId)
    -> DbResult<()>;
    async fn delete(&self, id: RepoId) -> DbResult<()>;

    async fn get_branches(&self, repo_id: RepoId) -> DbResult<Vec<RepoBranch>>;
    async fn add_branch(&self, repo_id: RepoId, branch: &str) -> DbResult<()>;
    async fn delete_branch(&self, repo_id: RepoId, branch: &str) -> DbResult<()>;
}

#[async_trait]
pub trait RepoPullRepo: Send + Sync {
    async fn get_all_for_branch(&self, repo_id: RepoId, branch: &str) -> DbResult<Vec<RepoPull>>;
    async fn get_by_id(&self, id: RepoPullId) -> DbResult<RepoPull>;
    /// Record a pull that has not started: `Startup`/`Ok`, no timestamps.
    async fn add(
        &self,
        repo_id: RepoId,
        branch: &str,
        commit: &str,
        tag: &str,
        spdx_id: &str,
    ) -> DbResult<RepoPullId> {
        self.add_full(&NewRepoPull {
            repo_id,
            branch: branch.to_string(),
            started_at: None,
            finished_at: None,
            status: Status::Startup,
            health: Health::Ok,
            output: String::new(),
            commit: commit.to_string(),
            tag: tag.to_string(),
            spdx_id: spdx_id.to_string(),
        })
        .await
    }
    async fn add_full(&self, pull: &NewRepoPull) -> DbResult<RepoPullId>;
    async fn delete(&self, id: RepoPullId) -> DbResult<()>;
}

/// PostgreSQL implementation of RepoRepo.
pub struct PgRepoRepo {
    pool: PgPool,
}

impl PgRepoRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RepoRepo for PgRepoRepo {
    async fn get_all(&self) -> DbResult<Vec<Repo>> {
        let rows = sqlx::query_as::<_, RepoRow>(
            "SELECT id, subproject_id, name, address FROM peridot.repos ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Repo::try_from).collect()
    }

    async fn get_all_for_subproject(&self, subproject_id: SubprojectId) -> DbResult<Vec<Repo>> {
        let rows = sqlx::query_as::<_, RepoRow>(
            r#"
            SELECT id, subproject_id, name, address FROM peridot.repos
            WHERE subproject_id = $1 ORDER BY id
            "#,
        )
        .bind(pg_key(subproject_id.get())?)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Repo::try_from).collect()
    }

    async fn get_by_id(&self, id: RepoId) -> DbResult<Repo> {
        sqlx::query_as::<_, RepoRow>(
            "SELECT id, subproject_id, name, address FROM peridot.repos WHERE id = $1",
        )
        .bind(pg_key(id.get())?)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::not_found("repo", id))?
        .try_into()
    }

    async fn add(&self, subproject_id: SubprojectId, name: &str, address: &str) -> DbResult<RepoId> {
        let id: i32 = sqlx::query_scalar(
            r#"
            INSERT INTO peridot.repos (subproject_id, name, address)
            VALUES ($1, $2, $3) RETURNING id
            "#,
        )
        .bind(pg_key(subproject_id.get())?)
        .bind(name)
        .bind(address)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DbError::from_constraint(e, format!("subproject {subproject_id} of repo")))?;
        Ok(RepoId::new(row_key(id)?))
    }

    async fn update(&self, id: RepoId, name: &str, address: &str) -> DbResult<()> {
        ensure_some_change("repo", id, name, address)?;
        let result = sqlx::query(
            r#"
            UPDATE peridot.repos
            SET name = COALESCE(NULLIF($1, ''), name),
                address = COALESCE(NULLIF($2, ''), address)
            WHERE id = $3
            "#,
        )
        .bind(name)
        .bind(address)
        .bind(pg_key(id.get())?)
        .execute(&self.pool)
        .await?;
        expect_affected(result, "repo", id)
    }

    async fn update_subproject_id(
        &self,
        id: RepoId,
        subproject_id: SubprojectId,
    ) -> DbResult<()> {
        let result = sqlx::query("UPDATE peridot.repos SET subproject_id = $1 WHERE id = $2")
            .bind(pg_key(subproject_id.get())?)
            .bind(pg_key(id.get())?)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                DbError::from_constraint(e, format!("subproject {subproject_id} of repo {id}"))
            })?;
        expect_affected(result, "repo", id)
    }

    async fn delete(&self, id: RepoId) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM peridot.repos WHERE id = $1")
            .bind(pg_key(id.get())?)
            .execute(&self.pool)
            .await?;
        expect_affected(result, "repo", id)
    }

    async fn get_branches(&self, repo_id: RepoId) -> DbResult<Vec<RepoBranch>> {
        let rows = sqlx::query_as::<_, RepoBranchRow>(
            "SELECT repo_id, branch FROM peridot.repo_branches WHERE repo_id = $1 ORDER BY branch",
        )
        .bind(pg_key(repo_id.get())?)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(RepoBranch::try_from).collect()
    }

    async fn add_branch(&self, repo_id: RepoId, branch: &str) -> DbResult<()> {
        sqlx::query("INSERT INTO peridot.repo_branches (repo_id, branch) VALUES ($1, $2)")
            .bind(pg_key(repo_id.get())?)
            .bind(branch)
            .execute(&self.pool)
            .await
            .map_err(|e| DbError::from_constraint(e, format!("branch {branch:?} of repo {repo_id}")))?;
        Ok(())
    }

    async fn delete_branch(&self, repo_id: RepoId, branch: &str) -> DbResult<()> {
        let result =
            sqlx::query("DELETE FROM peridot.repo_branches WHERE repo_id = $1 AND branch = $2")
                .bind(pg_key(repo_id.get())?)
                .bind(branch)
                .execute(&self.pool)
                .await?;
        expect_affected(result, "repo branch", format!("{repo_id}/{branch}"))
    }
}

/// PostgreSQL implementation of RepoPullRepo.
pub struct PgRepoPullRepo {
    pool: PgPool,
}

impl PgRepoPullRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const REPO_PULL_COLUMNS: &str = "id, repo_id, branch, started_at, finished_at, status, health, output, commit, tag, spdx_id";

#[async_trait]
impl RepoPullRepo for PgRepoPullRepo {
    async fn get_all_for_branch(&self, repo_id: RepoId, branch: &str) -> DbResult<Vec<RepoPull>> {
        let rows = sqlx::query_as::<_, RepoPullRow>(&format!(
            "SELECT {REPO_PULL_COLUMNS} FROM peridot.repo_pulls WHERE repo_id = $1 AND branch = $2 ORDER BY id"
        ))
        .bind(pg_key(repo_id.get())?)
        .bind(branch)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(RepoPull::try_from).collect()
    }

    async fn get_by_id(&self, id: RepoPullId) -> DbResult<RepoPull> {
        sqlx::query_as::<_, RepoPullRow>(&format!(
            "SELECT {REPO_PULL_COLUMNS} FROM peridot.repo_pulls WHERE id = $1"
        ))
        .bind(pg_key(id.get())?)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::not_found("repo pull", id))?
        .try_into()
    }

    async fn add_full(&self, pull: &NewRepoPull) -> DbResult<RepoPullId> {
        let id: i32 = sqlx::query_scalar(
            r#"
            INSERT INTO peridot.repo_pulls
                (repo_id, branch, started_at, finished_at, status, health, output, commit, tag, spdx_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING id
            "#,
        )
        .bind(pg_key(pull.repo_id.get())?)
        .bind(&pull.branch)
        .bind(pull.started_at)
        .bind(pull.finished_at)
        .bind(pull.status.code())
        .bind(pull.health.code())
        .bind(&pull.output)
        .bind(&pull.commit)
        .bind(&pull.tag)
        .bind(&pull.spdx_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            DbError::from_constraint(
                e,
                format!("branch {:?} of repo {} for pull", pull.branch, pull.repo_id),
            )
        })?;
        Ok(RepoPullId::new(row_key(id)?))
    }

    async fn delete(&self, id: RepoPullId) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM peridot.repo_pulls WHERE id = $1")
            .bind(pg_key(id.get())?)
            .execute(&self.pool)
            .await?;
        expect_affected(result, "repo pull", id)
    }
}
