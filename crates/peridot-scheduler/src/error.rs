//! Scheduler error types.

use peridot_db::DbError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Db(#[from] DbError),

    #[error("no agent registered with name {0:?}")]
    UnknownAgent(String),

    #[error("job plan references {0:?} before it was created")]
    UnresolvedJob(String),

    #[error("dispatch failed: {0}")]
    Dispatch(String),
}

pub type SchedulerResult<T> = std::result::Result<T, SchedulerError>;
