//! User repository.

use async_trait::async_trait;
use peridot_core::{User, UserAccessLevel, UserId};
use sqlx::PgPool;

use crate::error::{pg_key, row_key};
use crate::{DbError, DbResult};

/// Database row for users.
#[derive(Debug, Clone, sqlx::FromRow)]
struct UserRow {
    id: i32,
    name: String,
    github: String,
    access_level: i32,
}

impl TryFrom<UserRow> for User {
    type Error = DbError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(User {
            id: UserId::new(row_key(row.id)?),
            name: row.name,
            github: row.github,
            access_level: UserAccessLevel::from_code(row.access_level)?,
        })
    }
}

#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn get_all(&self) -> DbResult<Vec<User>>;
    async fn get_by_id(&self, id: UserId) -> DbResult<User>;
    async fn get_by_github(&self, github: &str) -> DbResult<User>;
    /// Add a user under a caller-chosen ID, which must fit the store's
    /// signed 32-bit key.
    async fn add(
        &self,
        id: UserId,
        name: &str,
        github: &str,
        access_level: UserAccessLevel,
    ) -> DbResult<()>;
    async fn update(
        &self,
        id: UserId,
        name: &str,
        github: &str,
        access_level: UserAccessLevel,
    ) -> DbResult<()>;
    async fn update_name_only(&self, id: UserId, name: &str) -> DbResult<()>;
}

/// PostgreSQL implementation of UserRepo.
pub struct PgUserRepo {
    pool: PgPool,
}

impl PgUserRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepo for PgUserRepo {
    async fn get_all(&self) -> DbResult<Vec<User>> {
        let rows = sqlx::query_as::<_, UserRow>(
            "SELECT id, name, github, access_level FROM peridot.users ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(User::try_from).collect()
    }

    async fn get_by_id(&self, id: UserId) -> DbResult<User> {
        sqlx::query_as::<_, UserRow>(
            "SELECT id, name, github, access_level FROM peridot.users WHERE id = $1",
        )
        .bind(pg_key(id.get())?)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::not_found("user", id))?
        .try_into()
    }

    async fn get_by_github(&self, github: &str) -> DbResult<User> {
        sqlx::query_as::<_, UserRow>(
            "SELECT id, name, github, access_level FROM peridot.users WHERE github = $1",
        )
        .bind(github)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::NotFound {
            entity: "user",
            id: format!("github {github}"),
        })?
        .try_into()
    }

    async fn add(
        &self,
        id: UserId,
        name: &str,
        github: &str,
        access_level: UserAccessLevel,
    ) -> DbResult<()> {
        sqlx::query(
            "INSERT INTO peridot.users (id, github, name, access_level) VALUES ($1, $2, $3, $4)",
        )
        .bind(pg_key(id.get())?)
        .bind(github)
        .bind(name)
        .bind(access_level.code())
        .execute(&self.pool)
        .await
        .map_err(|e| DbError::from_constraint(e, format!("user {id}")))?;
        Ok(())
    }

    async fn update(
        &self,
        id: UserId,
        name: &str,
        github: &str,
        access_level: UserAccessLevel,
    ) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE peridot.users SET name = $1, github = $2, access_level = $3 WHERE id = $4",
        )
        .bind(name)
        .bind(github)
        .bind(access_level.code())
        .bind(pg_key(id.get())?)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::not_found("user", id));
        }
        Ok(())
    }

    async fn update_name_only(&self, id: UserId, name: &str) -> DbResult<()> {
        let result = sqlx::query("UPDATE peridot.users SET name = $1 WHERE id = $2")
            .bind(name)
            .bind(pg_key(id.get())?)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::not_found("user", id));
        }
        Ok(())
    }
}
