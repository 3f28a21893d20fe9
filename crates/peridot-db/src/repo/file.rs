//! File hash and file instance repositories.

use async_trait::async_trait;
use peridot_core::{FileHash, FileHashId, FileInstance, FileInstanceId, RepoPullId};
use sqlx::PgPool;

use super::expect_affected;
use crate::error::{pg_key, pg_key64, row_key, row_key64};
use crate::{DbError, DbResult};

#[derive(Debug, Clone, sqlx::FromRow)]
struct FileHashRow {
    id: i64,
    hash_s256: String,
    hash_s1: String,
}

impl TryFrom<FileHashRow> for FileHash {
    type Error = DbError;

    fn try_from(row: FileHashRow) -> Result<Self, Self::Error> {
        Ok(FileHash {
            id: FileHashId::new(row_key64(row.id)?),
            hash_sha256: row.hash_s256,
            hash_sha1: row.hash_s1,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct FileInstanceRow {
    id: i64,
    repopull_id: i32,
    filehash_id: i64,
    path: String,
}

impl TryFrom<FileInstanceRow> for FileInstance {
    type Error = DbError;

    fn try_from(row: FileInstanceRow) -> Result<Self, Self::Error> {
        Ok(FileInstance {
            id: FileInstanceId::new(row_key64(row.id)?),
            repo_pull_id: RepoPullId::new(row_key(row.repopull_id)?),
            file_hash_id: FileHashId::new(row_key64(row.filehash_id)?),
            path: row.path,
        })
    }
}

#[async_trait]
pub trait FileRepo: Send + Sync {
    async fn get_hash_by_id(&self, id: FileHashId) -> DbResult<FileHash>;
    /// Batched lookup; missing IDs are silently omitted.
    async fn get_hashes_by_ids(&self, ids: &[FileHashId]) -> DbResult<Vec<FileHash>>;
    async fn add_hash(&self, sha256: &str, sha1: &str) -> DbResult<FileHashId>;
    async fn delete_hash(&self, id: FileHashId) -> DbResult<()>;

    async fn get_instance_by_id(&self, id: FileInstanceId) -> DbResult<FileInstance>;
    async fn add_instance(
        &self,
        repo_pull_id: RepoPullId,
        file_hash_id: FileHashId,
        path: &str,
    ) -> DbResult<FileInstanceId>;
    async fn delete_instance(&self, id: FileInstanceId) -> DbResult<()>;
}

/// PostgreSQL implementation of FileRepo.
pub struct PgFileRepo {
    pool: PgPool,
}

impl PgFileRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FileRepo for PgFileRepo {
    async fn get_hash_by_id(&self, id: FileHashId) -> DbResult<FileHash> {
        sqlx::query_as::<_, FileHashRow>(
            "SELECT id, hash_s256, hash_s1 FROM peridot.file_hashes WHERE id = $1",
        )
        .bind(pg_key64(id.get())?)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::not_found("file hash", id))?
        .try_into()
    }

    async fn get_hashes_by_ids(&self, ids: &[FileHashId]) -> DbResult<Vec<FileHash>> {
        let keys: Vec<i64> = ids
            .iter()
            .filter_map(|id| pg_key64(id.get()).ok())
            .collect();
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, FileHashRow>(
            "SELECT id, hash_s256, hash_s1 FROM peridot.file_hashes WHERE id = ANY($1) ORDER BY id",
        )
        .bind(&keys)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(FileHash::try_from).collect()
    }

    async fn add_hash(&self, sha256: &str, sha1: &str) -> DbResult<FileHashId> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO peridot.file_hashes (hash_s256, hash_s1) VALUES ($1, $2) RETURNING id",
        )
        .bind(sha256)
        .bind(sha1)
        .fetch_one(&self.pool)
        .await?;
        Ok(FileHashId::new(row_key64(id)?))
    }

    async fn delete_hash(&self, id: FileHashId) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM peridot.file_hashes WHERE id = $1")
            .bind(pg_key64(id.get())?)
            .execute(&self.pool)
            .await?;
        expect_affected(result, "file hash", id)
    }

    async fn get_instance_by_id(&self, id: FileInstanceId) -> DbResult<FileInstance> {
        sqlx::query_as::<_, FileInstanceRow>(
            "SELECT id, repopull_id, filehash_id, path FROM peridot.file_instances WHERE id = $1",
        )
        .bind(pg_key64(id.get())?)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::not_found("file instance", id))?
        .try_into()
    }

    async fn add_instance(
        &self,
        repo_pull_id: RepoPullId,
        file_hash_id: FileHashId,
        path: &str,
    ) -> DbResult<FileInstanceId> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO peridot.file_instances (repopull_id, filehash_id, path)
            VALUES ($1, $2, $3) RETURNING id
            "#,
        )
        .bind(pg_key(repo_pull_id.get())?)
        .bind(pg_key64(file_hash_id.get())?)
        .bind(path)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            DbError::from_constraint(
                e,
                format!("repo pull {repo_pull_id} and file hash {file_hash_id} of file instance"),
            )
        })?;
        Ok(FileInstanceId::new(row_key64(id)?))
    }

    async fn delete_instance(&self, id: FileInstanceId) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM peridot.file_instances WHERE id = $1")
            .bind(pg_key64(id.get())?)
            .execute(&self.pool)
            .await?;
        expect_affected(result, "file instance", id)
    }
}
