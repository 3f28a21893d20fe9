//! Jobs: units of analysis work bound to a repo pull and an agent.
//!
//! A job may depend on prior jobs (`prior_job_ids`) and carries three
//! independent configuration collections keyed by caller-chosen labels:
//! - `kv`: literal string values
//! - `codereader`: where a code-reading agent finds its input
//! - `spdxreader`: where an SPDX-reading agent finds its input
//!
//! Reader entries are either a literal path or a back-reference to another
//! job whose output should be used. A back-reference does not by itself make
//! the job wait for that prior job; ordering comes only from
//! `prior_job_ids`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::codec::coded_enum;
use crate::status::{Health, Status, is_terminally_clear};
use crate::{AgentId, JobId, RepoPullId};

coded_enum! {
    /// Which configuration collection a stored config row belongs to.
    pub enum JobConfigType in "job config type" {
        #[default]
        Kv = (0, "kv"),
        CodeReader = (1, "codereader"),
        SpdxReader = (2, "spdxreader"),
    }
}

/// Input location for a reader agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "WirePathConfig", into = "WirePathConfig")]
pub enum JobPathConfig {
    /// A literal path or URL.
    Path(String),
    /// Use the output of this prior job.
    PriorJob(JobId),
}

impl JobPathConfig {
    pub fn path(value: impl Into<String>) -> Self {
        Self::Path(value.into())
    }

    pub fn prior_job(id: JobId) -> Self {
        Self::PriorJob(id)
    }

    /// The referenced job, if this is a back-reference.
    pub fn prior_job_id(&self) -> Option<JobId> {
        match self {
            Self::Path(_) => None,
            Self::PriorJob(id) => Some(*id),
        }
    }
}

/// JSON shape: `{"path": "..."}` or `{"priorjob_id": N}`, unset side omitted.
/// A non-zero `priorjob_id` wins if both are present.
#[derive(Serialize, Deserialize)]
struct WirePathConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    path: Option<String>,
    #[serde(default, rename = "priorjob_id", skip_serializing_if = "Option::is_none")]
    prior_job_id: Option<JobId>,
}

impl From<WirePathConfig> for JobPathConfig {
    fn from(wire: WirePathConfig) -> Self {
        match wire.prior_job_id.filter(|id| id.get() != 0) {
            Some(id) => Self::PriorJob(id),
            None => Self::Path(wire.path.unwrap_or_default()),
        }
    }
}

impl From<JobPathConfig> for WirePathConfig {
    fn from(cfg: JobPathConfig) -> Self {
        match cfg {
            JobPathConfig::Path(path) => Self {
                path: Some(path),
                prior_job_id: None,
            },
            JobPathConfig::PriorJob(id) => Self {
                path: None,
                prior_job_id: Some(id),
            },
        }
    }
}

/// One stored configuration row: (type, key, value, nullable prior job).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobConfigRow {
    pub kind: JobConfigType,
    pub key: String,
    pub value: Option<String>,
    pub prior_job_id: Option<JobId>,
}

impl JobConfigRow {
    fn literal(kind: JobConfigType, key: &str, value: &str) -> Self {
        Self {
            kind,
            key: key.to_string(),
            value: Some(value.to_string()),
            prior_job_id: None,
        }
    }

    fn for_path(kind: JobConfigType, key: &str, cfg: &JobPathConfig) -> Self {
        match cfg {
            JobPathConfig::Path(path) => Self::literal(kind, key, path),
            JobPathConfig::PriorJob(id) => Self {
                kind,
                key: key.to_string(),
                value: None,
                prior_job_id: Some(*id),
            },
        }
    }

    /// Rebuild the tagged value: a present, non-zero prior job wins.
    pub fn to_path_config(&self) -> JobPathConfig {
        match self.prior_job_id.filter(|id| id.get() != 0) {
            Some(id) => JobPathConfig::PriorJob(id),
            None => JobPathConfig::Path(self.value.clone().unwrap_or_default()),
        }
    }
}

/// All configuration for one job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobConfig {
    #[serde(default)]
    pub kv: BTreeMap<String, String>,
    #[serde(default, rename = "codereader")]
    pub code_reader: BTreeMap<String, JobPathConfig>,
    #[serde(default, rename = "spdxreader")]
    pub spdx_reader: BTreeMap<String, JobPathConfig>,
}

impl JobConfig {
    pub fn is_empty(&self) -> bool {
        self.kv.is_empty() && self.code_reader.is_empty() && self.spdx_reader.is_empty()
    }

    /// Flatten into storage rows, ordered by collection then key.
    pub fn to_rows(&self) -> Vec<JobConfigRow> {
        let kv = self
            .kv
            .iter()
            .map(|(k, v)| JobConfigRow::literal(JobConfigType::Kv, k, v));
        let code = self
            .code_reader
            .iter()
            .map(|(k, c)| JobConfigRow::for_path(JobConfigType::CodeReader, k, c));
        let spdx = self
            .spdx_reader
            .iter()
            .map(|(k, c)| JobConfigRow::for_path(JobConfigType::SpdxReader, k, c));
        kv.chain(code).chain(spdx).collect()
    }

    /// Fold one stored row back into the matching collection.
    pub fn apply_row(&mut self, row: &JobConfigRow) {
        match row.kind {
            JobConfigType::Kv => {
                self.kv
                    .insert(row.key.clone(), row.value.clone().unwrap_or_default());
            }
            JobConfigType::CodeReader => {
                self.code_reader.insert(row.key.clone(), row.to_path_config());
            }
            JobConfigType::SpdxReader => {
                self.spdx_reader.insert(row.key.clone(), row.to_path_config());
            }
        }
    }

    pub fn from_rows<'a>(rows: impl IntoIterator<Item = &'a JobConfigRow>) -> Self {
        let mut config = Self::default();
        for row in rows {
            config.apply_row(row);
        }
        config
    }

    /// Every job referenced from a reader entry.
    pub fn referenced_jobs(&self) -> BTreeSet<JobId> {
        self.code_reader
            .values()
            .chain(self.spdx_reader.values())
            .filter_map(JobPathConfig::prior_job_id)
            .collect()
    }
}

/// A job and everything hanging off it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    #[serde(rename = "repopull_id")]
    pub repo_pull_id: RepoPullId,
    pub agent_id: AgentId,
    /// Jobs that must be stopped without error before this one may run.
    #[serde(default, rename = "priorjob_ids")]
    pub prior_job_ids: BTreeSet<JobId>,
    /// When an agent was asked to start this job.
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    /// When the agent finished this job.
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub health: Health,
    /// Output or error messages from the job.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub output: String,
    /// Configuration is complete; the job may run once its priors clear.
    #[serde(default)]
    pub is_ready: bool,
    #[serde(default)]
    pub config: JobConfig,
}

impl Job {
    /// Whether this job unblocks its dependents.
    pub fn is_terminally_clear(&self) -> bool {
        is_terminally_clear(self.status, self.health)
    }
}

/// The execution-result fields an agent reports back for a job.
///
/// `Status::Same` and `Health::Same` leave the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobStatusUpdate {
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: Status,
    pub health: Health,
    pub output: String,
}

impl JobStatusUpdate {
    /// An agent has accepted the job and begun work.
    pub fn started(at: DateTime<Utc>) -> Self {
        Self {
            started_at: Some(at),
            finished_at: None,
            status: Status::Running,
            health: Health::Ok,
            output: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_config() -> JobConfig {
        let mut config = JobConfig::default();
        config.kv.insert("hi".into(), "there".into());
        config.kv.insert("hello".into(), "world".into());
        config
            .code_reader
            .insert("primary".into(), JobPathConfig::prior_job(JobId::new(4)));
        config
            .code_reader
            .insert("deps".into(), JobPathConfig::path("/deps/"));
        config.spdx_reader.insert(
            "historical".into(),
            JobPathConfig::path("/spdx/prior/lastbest.spdx"),
        );
        config
            .spdx_reader
            .insert("primary".into(), JobPathConfig::prior_job(JobId::new(4)));
        config
    }

    fn sample_job() -> Job {
        Job {
            id: JobId::new(4),
            repo_pull_id: RepoPullId::new(14),
            agent_id: AgentId::new(6),
            prior_job_ids: [JobId::new(2), JobId::new(3)].into(),
            started_at: Some(Utc.with_ymd_and_hms(2019, 5, 2, 13, 53, 41).unwrap()),
            finished_at: Some(Utc.with_ymd_and_hms(2019, 5, 2, 13, 54, 17).unwrap()),
            status: Status::Stopped,
            health: Health::Ok,
            output: "success, 2930 files scanned".to_string(),
            is_ready: true,
            config: sample_config(),
        }
    }

    #[test]
    fn test_config_type_round_trips() {
        for &jct in JobConfigType::ALL {
            assert_eq!(JobConfigType::from_code(jct.code()).unwrap(), jct);
            assert_eq!(jct.as_str().parse::<JobConfigType>().unwrap(), jct);
            let js = serde_json::to_string(&jct).unwrap();
            assert_eq!(serde_json::from_str::<JobConfigType>(&js).unwrap(), jct);
        }
        assert_eq!(
            JobConfigType::from_code(3).unwrap_or_default(),
            JobConfigType::Kv
        );
    }

    #[test]
    fn test_rows_are_sorted_by_collection_then_key() {
        let rows = sample_config().to_rows();
        let keys: Vec<(JobConfigType, &str)> =
            rows.iter().map(|r| (r.kind, r.key.as_str())).collect();
        assert_eq!(
            keys,
            vec![
                (JobConfigType::Kv, "hello"),
                (JobConfigType::Kv, "hi"),
                (JobConfigType::CodeReader, "deps"),
                (JobConfigType::CodeReader, "primary"),
                (JobConfigType::SpdxReader, "historical"),
                (JobConfigType::SpdxReader, "primary"),
            ]
        );
    }

    #[test]
    fn test_reference_rows_store_null_value() {
        let rows = sample_config().to_rows();
        let primary = rows
            .iter()
            .find(|r| r.kind == JobConfigType::CodeReader && r.key == "primary")
            .unwrap();
        assert_eq!(primary.value, None);
        assert_eq!(primary.prior_job_id, Some(JobId::new(4)));

        let deps = rows.iter().find(|r| r.key == "deps").unwrap();
        assert_eq!(deps.value.as_deref(), Some("/deps/"));
        assert_eq!(deps.prior_job_id, None);
    }

    #[test]
    fn test_config_rebuilds_from_rows() {
        let config = sample_config();
        let rebuilt = JobConfig::from_rows(&config.to_rows());
        assert_eq!(rebuilt, config);
    }

    #[test]
    fn test_zero_prior_job_row_is_a_path() {
        let row = JobConfigRow {
            kind: JobConfigType::SpdxReader,
            key: "primary".into(),
            value: Some("/x".into()),
            prior_job_id: Some(JobId::new(0)),
        };
        assert_eq!(row.to_path_config(), JobPathConfig::path("/x"));
    }

    #[test]
    fn test_referenced_jobs() {
        let refs = sample_config().referenced_jobs();
        assert_eq!(refs.into_iter().collect::<Vec<_>>(), vec![JobId::new(4)]);
    }

    #[test]
    fn test_path_config_json_omits_unset_side() {
        let reference = serde_json::to_value(JobPathConfig::prior_job(JobId::new(4))).unwrap();
        assert_eq!(reference, serde_json::json!({"priorjob_id": 4}));

        let literal = serde_json::to_value(JobPathConfig::path("/x")).unwrap();
        assert_eq!(literal, serde_json::json!({"path": "/x"}));

        let back: JobPathConfig = serde_json::from_str(r#"{"priorjob_id":4}"#).unwrap();
        assert_eq!(back, JobPathConfig::PriorJob(JobId::new(4)));
        let back: JobPathConfig = serde_json::from_str(r#"{"path":"/x"}"#).unwrap();
        assert_eq!(back, JobPathConfig::Path("/x".into()));
    }

    #[test]
    fn test_marshal_job_with_configs() {
        let js = serde_json::to_value(sample_job()).unwrap();

        assert_eq!(js["id"], 4);
        assert_eq!(js["repopull_id"], 14);
        assert_eq!(js["agent_id"], 6);
        assert_eq!(js["priorjob_ids"], serde_json::json!([2, 3]));
        assert_eq!(js["started_at"], "2019-05-02T13:53:41Z");
        assert_eq!(js["finished_at"], "2019-05-02T13:54:17Z");
        assert_eq!(js["status"], "stopped");
        assert_eq!(js["health"], "ok");
        assert_eq!(js["output"], "success, 2930 files scanned");
        assert_eq!(js["is_ready"], true);

        let config = &js["config"];
        assert_eq!(config.as_object().unwrap().len(), 3);
        assert_eq!(config["kv"]["hi"], "there");
        assert_eq!(config["codereader"]["primary"]["priorjob_id"], 4);
        assert!(config["codereader"]["primary"].get("path").is_none());
        assert_eq!(config["codereader"]["deps"]["path"], "/deps/");
        assert!(config["codereader"]["deps"].get("priorjob_id").is_none());
        assert_eq!(
            config["spdxreader"]["historical"]["path"],
            "/spdx/prior/lastbest.spdx"
        );
    }

    #[test]
    fn test_unmarshal_job_without_configs() {
        let js = r#"{"id":17, "repopull_id":3, "agent_id":8, "started_at":"2019-01-02T15:04:05Z", "finished_at":"2019-01-02T15:05:00Z", "status":"stopped", "health":"ok", "output":"completed successfully", "is_ready":true}"#;
        let job: Job = serde_json::from_str(js).unwrap();

        assert_eq!(job.id, JobId::new(17));
        assert_eq!(job.repo_pull_id, RepoPullId::new(3));
        assert_eq!(job.agent_id, AgentId::new(8));
        assert_eq!(
            job.started_at.unwrap().to_rfc3339(),
            "2019-01-02T15:04:05+00:00"
        );
        assert_eq!(job.status, Status::Stopped);
        assert_eq!(job.health, Health::Ok);
        assert!(job.is_ready);
        assert!(job.prior_job_ids.is_empty());
        assert!(job.config.is_empty());
    }

    #[test]
    fn test_unmarshal_job_with_configs_sorts_prior_ids() {
        let js = r#"{"id":17, "repopull_id":3, "agent_id":8,
            "status":"stopped", "health":"ok", "is_ready":true,
            "priorjob_ids":[16, 13, 15],
            "config":{
                "kv": {"hi": "there", "hello": "world"},
                "codereader": {"primary": {"priorjob_id": 4}, "deps": {"path": "/deps/"}},
                "spdxreader": {"primary": {"priorjob_id": 4}, "historical": {"path": "/spdx/prior/lastbest.spdx"}}
            }}"#;
        let job: Job = serde_json::from_str(js).unwrap();

        let priors: Vec<u32> = job.prior_job_ids.iter().map(|id| id.get()).collect();
        assert_eq!(priors, vec![13, 15, 16]);
        assert_eq!(job.config, sample_config());
        assert_eq!(job.started_at, None);
    }

    #[test]
    fn test_job_json_round_trip() {
        let job = sample_job();
        let js = serde_json::to_string(&job).unwrap();
        assert_eq!(serde_json::from_str::<Job>(&js).unwrap(), job);
    }

    #[test]
    fn test_unmarshal_job_with_negative_id_fails() {
        let js = r#"{"id":-17, "repopull_id":3, "agent_id":8, "status":"stopped", "health":"ok", "is_ready":true}"#;
        assert!(serde_json::from_str::<Job>(js).is_err());

        let js = r#"{"id":17, "repopull_id":3, "agent_id":8, "priorjob_ids":[-1]}"#;
        assert!(serde_json::from_str::<Job>(js).is_err());
    }

    #[test]
    fn test_unmarshal_job_with_bad_status_fails() {
        let js = r#"{"id":17, "repopull_id":3, "agent_id":8, "status":"paused", "health":"ok"}"#;
        assert!(serde_json::from_str::<Job>(js).is_err());
    }
}
