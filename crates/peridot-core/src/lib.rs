//! Core domain types for the peridot job datastore.
//!
//! This crate contains:
//! - Typed resource identifiers
//! - Enum-coded status, health, access and element types
//! - Entity records (projects, repos, pulls, files, agents, users, jobs)
//! - The job readiness selection rules
//! - JSON wire helpers

pub mod agent;
mod codec;
pub mod error;
pub mod file;
pub mod id;
pub mod job;
pub mod project;
pub mod readiness;
pub mod repository;
pub mod spdx;
pub mod status;
pub mod user;
pub mod wire;

pub use agent::{Agent, AgentAbilities};
pub use error::{Error, Result};
pub use file::{FileHash, FileInstance};
pub use id::{
    AgentId, FileHashId, FileInstanceId, JobId, ProjectId, RepoId, RepoPullId, SubprojectId,
    UserId,
};
pub use job::{Job, JobConfig, JobConfigRow, JobConfigType, JobPathConfig, JobStatusUpdate};
pub use project::{Project, Subproject};
pub use repository::{Repo, RepoBranch, RepoPull};
pub use spdx::SpdxElementType;
pub use status::{Health, Status};
pub use user::{User, UserAccessLevel};
