//! Platform users and their access tiers.

use serde::{Deserialize, Serialize};

use crate::UserId;
use crate::codec::coded_enum;

coded_enum! {
    /// Tier of access a user has to the platform.
    pub enum UserAccessLevel in "user access level" {
        /// Cannot log in.
        #[default]
        Disabled = (0, "disabled"),
        /// Read-only access to results and reports.
        Viewer = (10, "viewer"),
        /// Read-only, plus may comment.
        Commenter = (20, "commenter"),
        /// May start pulls and scans and clear results, but not administer.
        Operator = (30, "operator"),
        Admin = (99, "admin"),
    }
}

/// A registered user of the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    /// GitHub user name.
    pub github: String,
    #[serde(rename = "access")]
    pub access_level: UserAccessLevel,
}
