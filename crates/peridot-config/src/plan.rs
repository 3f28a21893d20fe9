//! Job plan parsing.
//!
//! A plan names the jobs to create for one repo pull, their agents, the
//! jobs each must wait for (`needs`), and their configuration. Reader
//! entries may point at another job in the plan with `job=` instead of a
//! literal `path=`.

use std::collections::{BTreeMap, HashMap, HashSet};

use kdl::{KdlDocument, KdlNode};
use serde::{Deserialize, Serialize};

use crate::nodes::{
    get_all_string_args, get_bool_prop, get_first_string_arg, get_string_list_prop,
    get_string_prop,
};
use crate::{ConfigError, ConfigResult};

/// Where a reader entry in a plan finds its input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlannedPath {
    Path(String),
    /// Output of the named job in the same plan.
    Job(String),
}

/// One job in a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedJob {
    pub name: String,
    /// Registered agent name.
    pub agent: String,
    pub needs: Vec<String>,
    /// Mark the job ready once it has been created.
    pub ready: bool,
    pub kv: BTreeMap<String, String>,
    pub code_reader: BTreeMap<String, PlannedPath>,
    pub spdx_reader: BTreeMap<String, PlannedPath>,
}

impl PlannedJob {
    /// Plan jobs referenced from reader entries.
    pub fn referenced_jobs(&self) -> impl Iterator<Item = &str> {
        self.code_reader
            .values()
            .chain(self.spdx_reader.values())
            .filter_map(|p| match p {
                PlannedPath::Job(name) => Some(name.as_str()),
                PlannedPath::Path(_) => None,
            })
    }

    /// Everything that must exist before this job can be created.
    fn dependencies(&self) -> impl Iterator<Item = &str> {
        self.needs
            .iter()
            .map(String::as_str)
            .chain(self.referenced_jobs())
    }
}

/// A validated job plan: names are unique, every reference resolves, and
/// there are no cycles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobPlan {
    pub jobs: Vec<PlannedJob>,
}

impl JobPlan {
    /// Jobs ordered so each comes after everything it depends on. Ties keep
    /// declaration order.
    pub fn creation_order(&self) -> Vec<&PlannedJob> {
        let by_name: HashMap<&str, &PlannedJob> =
            self.jobs.iter().map(|j| (j.name.as_str(), j)).collect();
        let mut placed = HashSet::new();
        let mut order = Vec::with_capacity(self.jobs.len());
        for job in &self.jobs {
            place(job, &by_name, &mut placed, &mut order);
        }
        order
    }
}

fn place<'a>(
    job: &'a PlannedJob,
    by_name: &HashMap<&str, &'a PlannedJob>,
    placed: &mut HashSet<&'a str>,
    order: &mut Vec<&'a PlannedJob>,
) {
    if !placed.insert(job.name.as_str()) {
        return;
    }
    for dep in job.dependencies() {
        if let Some(&dep_job) = by_name.get(dep) {
            place(dep_job, by_name, placed, order);
        }
    }
    order.push(job);
}

/// Parse a job plan from KDL text.
pub fn parse_job_plan(kdl: &str) -> ConfigResult<JobPlan> {
    let doc: KdlDocument = kdl.parse()?;

    let mut jobs: Vec<PlannedJob> = Vec::new();
    for node in doc.nodes() {
        if node.name().value() == "job" {
            let job = parse_job(node)?;
            if jobs.iter().any(|j| j.name == job.name) {
                return Err(ConfigError::Duplicate(format!("job '{}'", job.name)));
            }
            jobs.push(job);
        }
    }

    if jobs.is_empty() {
        return Err(ConfigError::MissingField("job".to_string()));
    }

    let names: HashSet<&str> = jobs.iter().map(|j| j.name.as_str()).collect();
    for job in &jobs {
        for dep in &job.needs {
            if !names.contains(dep.as_str()) {
                return Err(ConfigError::InvalidReference(format!(
                    "job '{}' needs unknown job '{}'",
                    job.name, dep
                )));
            }
        }
        for referenced in job.referenced_jobs() {
            if !names.contains(referenced) {
                return Err(ConfigError::InvalidReference(format!(
                    "job '{}' reads from unknown job '{}'",
                    job.name, referenced
                )));
            }
        }
    }

    if let Err(cycle) = detect_cycle(&jobs) {
        return Err(ConfigError::CycleDetected(cycle));
    }

    Ok(JobPlan { jobs })
}

fn parse_job(node: &KdlNode) -> ConfigResult<PlannedJob> {
    let name = get_first_string_arg(node)
        .ok_or_else(|| ConfigError::MissingField("job name".to_string()))?;
    let agent = get_string_prop(node, "agent")
        .ok_or_else(|| ConfigError::MissingField(format!("agent for job '{}'", name)))?;
    let needs = get_string_list_prop(node, "needs");
    let ready = get_bool_prop(node, "ready").unwrap_or(false);

    let mut kv = BTreeMap::new();
    let mut code_reader = BTreeMap::new();
    let mut spdx_reader = BTreeMap::new();

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "kv" => {
                    let args = get_all_string_args(child);
                    let [key, value] = <[String; 2]>::try_from(args).map_err(|_| {
                        ConfigError::InvalidValue {
                            field: format!("kv in job '{}'", name),
                            message: "expected a key and a value".to_string(),
                        }
                    })?;
                    insert_unique(&mut kv, &name, "kv", key, value)?;
                }
                kind @ ("codereader" | "spdxreader") => {
                    let (key, path) = parse_reader(child, &name)?;
                    let target = if kind == "codereader" {
                        &mut code_reader
                    } else {
                        &mut spdx_reader
                    };
                    insert_unique(target, &name, kind, key, path)?;
                }
                _ => {}
            }
        }
    }

    Ok(PlannedJob {
        name,
        agent,
        needs,
        ready,
        kv,
        code_reader,
        spdx_reader,
    })
}

fn parse_reader(node: &KdlNode, job: &str) -> ConfigResult<(String, PlannedPath)> {
    let kind = node.name().value();
    let key = get_first_string_arg(node)
        .ok_or_else(|| ConfigError::MissingField(format!("{} key in job '{}'", kind, job)))?;
    let path = get_string_prop(node, "path");
    let from_job = get_string_prop(node, "job");

    let planned = match (path, from_job) {
        (Some(path), None) => PlannedPath::Path(path),
        (None, Some(from_job)) => PlannedPath::Job(from_job),
        _ => {
            return Err(ConfigError::InvalidValue {
                field: format!("{} '{}' in job '{}'", kind, key, job),
                message: "exactly one of path= or job= is required".to_string(),
            });
        }
    };
    Ok((key, planned))
}

fn insert_unique<V>(
    map: &mut BTreeMap<String, V>,
    job: &str,
    kind: &str,
    key: String,
    value: V,
) -> ConfigResult<()> {
    if map.contains_key(&key) {
        return Err(ConfigError::Duplicate(format!(
            "{} '{}' in job '{}'",
            kind, key, job
        )));
    }
    map.insert(key, value);
    Ok(())
}

/// Detect cycles over `needs` and reader references using DFS.
fn detect_cycle(jobs: &[PlannedJob]) -> Result<(), String> {
    let mut visited = HashMap::new();
    let mut rec_stack = HashMap::new();

    let job_map: HashMap<&str, &PlannedJob> = jobs.iter().map(|j| (j.name.as_str(), j)).collect();

    for job in jobs {
        if !visited.contains_key(job.name.as_str()) {
            if let Some(cycle) = dfs_detect_cycle(&job.name, &job_map, &mut visited, &mut rec_stack)
            {
                return Err(cycle);
            }
        }
    }
    Ok(())
}

fn dfs_detect_cycle<'a>(
    node: &'a str,
    job_map: &HashMap<&'a str, &'a PlannedJob>,
    visited: &mut HashMap<&'a str, bool>,
    rec_stack: &mut HashMap<&'a str, bool>,
) -> Option<String> {
    visited.insert(node, true);
    rec_stack.insert(node, true);

    if let Some(&job) = job_map.get(node) {
        for dep in job.dependencies() {
            if !visited.contains_key(dep) {
                if let Some(cycle) = dfs_detect_cycle(dep, job_map, visited, rec_stack) {
                    return Some(cycle);
                }
            } else if rec_stack.get(dep).copied().unwrap_or(false) {
                return Some(format!("{} -> {}", node, dep));
            }
        }
    }

    rec_stack.insert(node, false);
    None
}
