//! Repositories, their branches, and pulls of code from those branches.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::status::{Health, Status};
use crate::{RepoId, RepoPullId, SubprojectId};

/// A repo tracked within a subproject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repo {
    pub id: RepoId,
    pub subproject_id: SubprojectId,
    /// Reference name.
    pub name: String,
    /// Address the repo is cloned from (whatever `git clone` would take).
    pub address: String,
}

/// A branch of a repo. Keyed by (repo, branch name); has no ID of its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoBranch {
    pub repo_id: RepoId,
    pub branch: String,
}

/// One fetch of a repo branch at a point in time. Jobs and file instances
/// hang off a pull.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoPull {
    pub id: RepoPullId,
    pub repo_id: RepoId,
    pub branch: String,
    /// When the pull began. `None` until started.
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    /// When the pull completed. `None` until finished (or if it never will).
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    pub status: Status,
    pub health: Health,
    /// Output or error messages from the pull.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub output: String,
    /// Git commit hash.
    pub commit: String,
    /// Git tag, empty if the pull was not tagged.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tag: String,
    /// SPDX identifier for this pull.
    pub spdx_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_repo_pull_json() {
        let rp = RepoPull {
            id: RepoPullId::new(12),
            repo_id: RepoId::new(3),
            branch: "main".to_string(),
            started_at: Some(Utc.with_ymd_and_hms(2019, 5, 2, 13, 53, 41).unwrap()),
            finished_at: None,
            status: Status::Running,
            health: Health::Degraded,
            output: String::new(),
            commit: "fb8e1bd".to_string(),
            tag: String::new(),
            spdx_id: "SPDXRef-xyzzy-12".to_string(),
        };

        let js = serde_json::to_value(&rp).unwrap();
        assert_eq!(js["started_at"], "2019-05-02T13:53:41Z");
        assert!(js["finished_at"].is_null());
        assert_eq!(js["status"], "running");
        assert_eq!(js["health"], "degraded");
        assert!(js.get("tag").is_none());
        assert!(js.get("output").is_none());

        let back: RepoPull = serde_json::from_value(js).unwrap();
        assert_eq!(back, rp);
    }
}
