//! Database error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("no {entity} found with ID {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("duplicate: {0}")]
    Duplicate(String),

    /// A foreign-key constraint failed. `relation` names the relationship,
    /// e.g. "prior job 7 for job 12".
    #[error("referential integrity violated for {relation}: {message}")]
    ReferentialIntegrity { relation: String, message: String },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Domain(#[from] peridot_core::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl DbError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Classify a store error raised while writing `relation`, turning
    /// constraint violations into their typed variants.
    pub fn from_constraint(err: sqlx::Error, relation: impl Into<String>) -> Self {
        if let Some(db_err) = err.as_database_error() {
            if db_err.is_foreign_key_violation() {
                return Self::ReferentialIntegrity {
                    relation: relation.into(),
                    message: db_err.message().to_string(),
                };
            }
            if db_err.is_unique_violation() {
                return Self::Duplicate(relation.into());
            }
        }
        Self::Database(err)
    }
}

pub type DbResult<T> = std::result::Result<T, DbError>;

/// Convert an unsigned key to the store's signed column type.
pub(crate) fn pg_key(id: u32) -> DbResult<i32> {
    i32::try_from(id).map_err(|_| DbError::InvalidInput(format!("ID {id} exceeds {}", i32::MAX)))
}

pub(crate) fn pg_key64(id: u64) -> DbResult<i64> {
    i64::try_from(id).map_err(|_| DbError::InvalidInput(format!("ID {id} exceeds {}", i64::MAX)))
}

/// Convert a signed column value back to an unsigned key.
pub(crate) fn row_key(raw: i32) -> DbResult<u32> {
    u32::try_from(raw).map_err(|_| DbError::InvalidInput(format!("negative ID {raw} in store")))
}

pub(crate) fn row_key64(raw: i64) -> DbResult<u64> {
    u64::try_from(raw).map_err(|_| DbError::InvalidInput(format!("negative ID {raw} in store")))
}
