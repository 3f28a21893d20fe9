//! KDL configuration parsing for peridot.
//!
//! This crate handles parsing of:
//! - System configuration (peridot.kdl)
//! - Job plans describing the jobs for one repo pull

pub mod error;
mod nodes;
pub mod plan;
pub mod system;

pub use error::{ConfigError, ConfigResult};
pub use plan::{JobPlan, PlannedJob, PlannedPath, parse_job_plan};
pub use system::{
    BootstrapConfig, DatabaseConfig, SchedulerConfig, SystemConfig, load_system_config,
    parse_system_config,
};
