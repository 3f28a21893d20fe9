//! Repository traits and implementations.

pub mod agent;
pub mod file;
pub mod job;
pub mod project;
pub mod repository;
pub mod user;

pub use agent::{AgentRepo, PgAgentRepo};
pub use file::{FileRepo, PgFileRepo};
pub use job::{JobRepo, PgJobRepo};
pub use project::{PgProjectRepo, PgSubprojectRepo, ProjectRepo, SubprojectRepo};
pub use repository::{NewRepoPull, PgRepoPullRepo, PgRepoRepo, RepoPullRepo, RepoRepo};
pub use user::{PgUserRepo, UserRepo};

use std::fmt::Display;

use sqlx::postgres::PgQueryResult;

use crate::{DbError, DbResult};

/// A single-row mutation that touched nothing means the row was not there.
fn expect_affected(result: PgQueryResult, entity: &'static str, id: impl Display) -> DbResult<()> {
    if result.rows_affected() == 0 {
        return Err(DbError::not_found(entity, id));
    }
    Ok(())
}

/// Partial updates treat an empty string as "keep"; all-empty is a no-op
/// the caller almost certainly did not mean.
fn ensure_some_change(entity: &str, id: impl Display, first: &str, second: &str) -> DbResult<()> {
    if first.is_empty() && second.is_empty() {
        return Err(DbError::InvalidInput(format!(
            "only empty strings passed to update {entity} {id}"
        )));
    }
    Ok(())
}
