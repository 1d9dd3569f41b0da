use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// --- On-disk descriptors ---

/// One entry of `degrees.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DegreeDescriptor {
    pub name: String,
    pub display: String,
    #[serde(rename = "isRemoteCampus", alias = "tagus", default)]
    pub remote_campus: bool,
}

/// `roles.json`: prompt text per role plus the groups presenting them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelfRoleDescriptor {
    #[serde(default)]
    pub roles: BTreeMap<String, String>,
    #[serde(default)]
    pub groups: BTreeMap<String, GroupDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupDescriptor {
    pub msg: String,
    pub roles: Vec<String>,
}

/// One value of `courses.json`, keyed by course id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseDescriptor {
    pub name: String,
    #[serde(default)]
    pub degrees: Vec<String>,
}

pub type CourseMap = BTreeMap<String, CourseDescriptor>;

// --- Validated catalog ---

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Degree {
    pub name: String,
    pub display: String,
    pub remote_campus: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelfRoleEntry {
    pub role_name: String,
    pub prompt: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelfRoleGroup {
    pub id: String,
    pub header: String,
    pub entries: Vec<SelfRoleEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourseEntitlement {
    pub course_id: String,
    pub topic: String,
    pub degrees: BTreeSet<String>,
}

/// Desired state, read once at startup and immutable afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    pub degrees: Vec<Degree>,
    pub self_roles: Vec<SelfRoleGroup>,
    pub courses: Vec<CourseEntitlement>,
}
