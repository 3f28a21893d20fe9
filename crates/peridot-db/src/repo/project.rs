//! Project and subproject repositories.

use async_trait::async_trait;
use peridot_core::{Project, ProjectId, Subproject, SubprojectId};
use sqlx::PgPool;

use super::{ensure_some_change, expect_affected};
use crate::error::{pg_key, row_key};
use crate::{DbError, DbResult};

#[derive(Debug, Clone, sqlx::FromRow)]
struct ProjectRow {
    id: i32,
    name: String,
    fullname: String,
}

impl TryFrom<ProjectRow> for Project {
    type Error = DbError;

    fn try_from(row: ProjectRow) -> Result<Self, Self::Error> {
        Ok(Project {
            id: ProjectId::new(row_key(row.id)?),
            name: row.name,
            fullname: row.fullname,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct SubprojectRow {
    id: i32,
    project_id: i32,
    name: String,
    fullname: String,
}

impl TryFrom<SubprojectRow> for Subproject {
    type Error = DbError;

    fn try_from(row: SubprojectRow) -> Result<Self, Self::Error> {
        Ok(Subproject {
            id: SubprojectId::new(row_key(row.id)?),
            project_id: ProjectId::new(row_key(row.project_id)?),
            name: row.name,
            fullname: row.fullname,
        })
    }
}

#[async_trait]
pub trait ProjectRepo: Send + Sync {
    async fn get_all(&self) -> DbResult<Vec<Project>>;
    async fn get_by_id(&self, id: ProjectId) -> DbResult<Project>;
    async fn add(&self, name: &str, fullname: &str) -> DbResult<ProjectId>;
    /// Change name and/or full name. An empty string keeps the stored value;
    /// passing two empty strings is an error.
    async fn update(&self, id: ProjectId, name: &str, fullname: &str) -> DbResult<()>;
    /// Delete a project and, by cascade, everything beneath it.
    async fn delete(&self, id: ProjectId) -> DbResult<()>;
}

#[async_trait]
pub trait SubprojectRepo: Send + Sync {
    async fn get_all(&self) -> DbResult<Vec<Subproject>>;
    async fn get_all_for_project(&self, project_id: ProjectId) -> DbResult<Vec<Subproject>>;
    async fn get_by_id(&self, id: SubprojectId) -> DbResult<Subproject>;
    async fn add(&self, project_id: ProjectId, name: &str, fullname: &str)
    -> DbResult<SubprojectId>;
    /// Same empty-string rules as [`ProjectRepo::update`].
    async fn update(&self, id: SubprojectId, name: &str, fullname: &str) -> DbResult<()>;
    async fn update_project_id(&self, id: SubprojectId, project_id: ProjectId) -> DbResult<()>;
    async fn delete(&self, id: SubprojectId) -> DbResult<()>;
}

/// PostgreSQL implementation of ProjectRepo.
pub struct PgProjectRepo {
    pool: PgPool,
}

impl PgProjectRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProjectRepo for PgProjectRepo {
    async fn get_all(&self) -> DbResult<Vec<Project>> {
        let rows = sqlx::query_as::<_, ProjectRow>(
            "SELECT id, name, fullname FROM peridot.projects ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Project::try_from).collect()
    }

    async fn get_by_id(&self, id: ProjectId) -> DbResult<Project> {
        sqlx::query_as::<_, ProjectRow>(
            "SELECT id, name, fullname FROM peridot.projects WHERE id = $1",
        )
        .bind(pg_key(id.get())?)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::not_found("project", id))?
        .try_into()
    }

    async fn add(&self, name: &str, fullname: &str) -> DbResult<ProjectId> {
        let id: i32 = sqlx::query_scalar(
            "INSERT INTO peridot.projects (name, fullname) VALUES ($1, $2) RETURNING id",
        )
        .bind(name)
        .bind(fullname)
        .fetch_one(&self.pool)
        .await?;
        Ok(ProjectId::new(row_key(id)?))
    }

    async fn update(&self, id: ProjectId, name: &str, fullname: &str) -> DbResult<()> {
        ensure_some_change("project", id, name, fullname)?;
        let result = sqlx::query(
            r#"
            UPDATE peridot.projects
            SET name = COALESCE(NULLIF($1, ''), name),
                fullname = COALESCE(NULLIF($2, ''), fullname)
            WHERE id = $3
            "#,
        )
        .bind(name)
        .bind(fullname)
        .bind(pg_key(id.get())?)
        .execute(&self.pool)
        .await?;
        expect_affected(result, "project", id)
    }

    async fn delete(&self, id: ProjectId) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM peridot.projects WHERE id = $1")
            .bind(pg_key(id.get())?)
            .execute(&self.pool)
            .await?;
        expect_affected(result, "project", id)
    }
}

/// PostgreSQL implementation of SubprojectRepo.
pub struct PgSubprojectRepo {
    pool: PgPool,
}

impl PgSubprojectRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SubprojectRepo for PgSubprojectRepo {
    async fn get_all(&self) -> DbResult<Vec<Subproject>> {
        let rows = sqlx::query_as::<_, SubprojectRow>(
            "SELECT id, project_id, name, fullname FROM peridot.subprojects ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Subproject::try_from).collect()
    }

    async fn get_all_for_project(&self, project_id: ProjectId) -> DbResult<Vec<Subproject>> {
        let rows = sqlx::query_as::<_, SubprojectRow>(
            r#"
            SELECT id, project_id, name, fullname FROM peridot.subprojects
            WHERE project_id = $1 ORDER BY id
            "#,
        )
        .bind(pg_key(project_id.get())?)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Subproject::try_from).collect()
    }

    async fn get_by_id(&self, id: SubprojectId) -> DbResult<Subproject> {
        sqlx::query_as::<_, SubprojectRow>(
            "SELECT id, project_id, name, fullname FROM peridot.subprojects WHERE id = $1",
        )
        .bind(pg_key(id.get())?)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::not_found("subproject", id))?
        .try_into()
    }

    async fn add(
        &self,
        project_id: ProjectId,
        name: &str,
        fullname: &str,
    ) -> DbResult<SubprojectId> {
        let id: i32 = sqlx::query_scalar(
            r#"
            INSERT INTO peridot.subprojects (project_id, name, fullname)
            VALUES ($1, $2, $3) RETURNING id
            "#,
        )
        .bind(pg_key(project_id.get())?)
        .bind(name)
        .bind(fullname)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DbError::from_constraint(e, format!("project {project_id} of subproject")))?;
        Ok(SubprojectId::new(row_key(id)?))
    }

    async fn update(&self, id: SubprojectId, name: &str, fullname: &str) -> DbResult<()> {
        ensure_some_change("subproject", id, name, fullname)?;
        let result = sqlx::query(
            r#"
            UPDATE peridot.subprojects
            SET name = COALESCE(NULLIF($1, ''), name),
                fullname = COALESCE(NULLIF($2, ''), fullname)
            WHERE id = $3
            "#,
        )
        .bind(name)
        .bind(fullname)
        .bind(pg_key(id.get())?)
        .execute(&self.pool)
        .await?;
        expect_affected(result, "subproject", id)
    }

    async fn update_project_id(&self, id: SubprojectId, project_id: ProjectId) -> DbResult<()> {
        let result = sqlx::query("UPDATE peridot.subprojects SET project_id = $1 WHERE id = $2")
            .bind(pg_key(project_id.get())?)
            .bind(pg_key(id.get())?)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                DbError::from_constraint(e, format!("project {project_id} of subproject {id}"))
            })?;
        expect_affected(result, "subproject", id)
    }

    async fn delete(&self, id: SubprojectId) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM peridot.subprojects WHERE id = $1")
            .bind(pg_key(id.get())?)
            .execute(&self.pool)
            .await?;
        expect_affected(result, "subproject", id)
    }
}
