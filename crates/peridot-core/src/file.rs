//! File content hashes and the instances of those files within pulls.

use serde::{Deserialize, Serialize};

use crate::{FileHashId, FileInstanceId, RepoPullId};

/// A distinct file body seen by peridot. Every instance of the same file
/// across pulls points at one `FileHash`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileHash {
    pub id: FileHashId,
    #[serde(rename = "sha256")]
    pub hash_sha256: String,
    #[serde(rename = "sha1")]
    pub hash_sha1: String,
}

/// A file at a particular path within a repo pull.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInstance {
    pub id: FileInstanceId,
    #[serde(rename = "repopull_id")]
    pub repo_pull_id: RepoPullId,
    #[serde(rename = "filehash_id")]
    pub file_hash_id: FileHashId,
    pub path: String,
}
