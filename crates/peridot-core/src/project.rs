//! Projects and subprojects: the top of the repo hierarchy.

use serde::{Deserialize, Serialize};

use crate::{ProjectId, SubprojectId};

/// A project. Contains subprojects, which in turn contain repos.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    /// Short name, typically a single alphanumeric word.
    pub name: String,
    /// Full descriptive name.
    pub fullname: String,
}

/// A subproject within one project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subproject {
    pub id: SubprojectId,
    pub project_id: ProjectId,
    pub name: String,
    pub fullname: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subproject_json() {
        let js = r#"{"id":4,"project_id":1,"name":"xyzzy","fullname":"The Xyzzy Subproject"}"#;
        let sp: Subproject = serde_json::from_str(js).unwrap();
        assert_eq!(sp.id, SubprojectId::new(4));
        assert_eq!(sp.project_id, ProjectId::new(1));
        assert_eq!(sp.fullname, "The Xyzzy Subproject");
    }

    #[test]
    fn test_project_negative_id_rejected() {
        let js = r#"{"id":-4,"name":"p","fullname":"P"}"#;
        assert!(serde_json::from_str::<Project>(js).is_err());
    }
}
