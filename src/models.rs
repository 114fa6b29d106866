//! Documents stored in the `Users`, `Courses` and `attendance` collections
//!
//! Field names follow the stored documents exactly; several of them are not
//! snake case and are renamed explicitly.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Format of the `date` field and of the date component of record ids
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// What a signed-in account is allowed to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Instructor,
    Student,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Instructor => "instructor",
            Role::Student => "student",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "instructor" => Ok(Role::Instructor),
            "student" => Ok(Role::Student),
            other => Err(Error::account_setup(format!("Unknown role '{}'", other))),
        }
    }
}

/// A directory entry in `Users`, keyed by the identity service's uid
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "id")]
    pub uid: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    pub role: Role,
    /// Present for students only
    #[serde(rename = "studentId", default, skip_serializing_if = "Option::is_none")]
    pub student_id: Option<String>,
}

impl User {
    pub fn instructor(uid: &str, name: &str, email: &str) -> Self {
        Self {
            uid: uid.to_string(),
            name: name.to_string(),
            email: email.to_string(),
            role: Role::Instructor,
            student_id: None,
        }
    }

    pub fn student(uid: &str, name: &str, email: &str, student_id: &str) -> Self {
        Self {
            uid: uid.to_string(),
            name: name.to_string(),
            email: email.to_string(),
            role: Role::Student,
            student_id: Some(student_id.to_string()),
        }
    }
}

/// A course in `Courses`, keyed by its name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    pub id: String,
    #[serde(rename = "courseName", default)]
    pub display_name: String,
    /// Older documents store an empty string for "unassigned"
    #[serde(rename = "instructorId", default, deserialize_with = "empty_as_none")]
    pub instructor_id: Option<String>,
    #[serde(rename = "Bssid", default, deserialize_with = "empty_as_none")]
    pub allowed_bssid: Option<String>,
    #[serde(rename = "Groups", default, deserialize_with = "null_as_empty")]
    pub allowed_groups: Vec<String>,
}

impl Course {
    /// A freshly created course: no instructor, no access point, no groups
    pub fn new(name: &str) -> Self {
        Self {
            id: name.to_string(),
            display_name: name.to_string(),
            instructor_id: None,
            allowed_bssid: None,
            allowed_groups: Vec::new(),
        }
    }

    pub fn with_network(mut self, bssid: &str, groups: &[&str]) -> Self {
        self.allowed_bssid = Some(bssid.to_string());
        self.allowed_groups = groups.iter().map(|g| g.to_string()).collect();
        self
    }
}

/// One attendance mark in `attendance`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    #[serde(rename = "id")]
    pub record_id: String,
    #[serde(rename = "name")]
    pub student_name: String,
    #[serde(rename = "studentId")]
    pub student_id: String,
    #[serde(rename = "course")]
    pub course_id: String,
    #[serde(rename = "DoctorName", default)]
    pub instructor_name: String,
    #[serde(default)]
    pub group: String,
    /// Local calendar day, `YYYY-MM-DD`
    pub date: String,
    /// Access point id exactly as observed, kept for audit
    #[serde(rename = "bssid")]
    pub observed_bssid: String,
    pub timestamp: DateTime<Utc>,
}

impl AttendanceRecord {
    /// The deterministic id that makes (student, day, course) unique
    pub fn record_id(student_id: &str, date: NaiveDate, course_id: &str) -> String {
        format!("{}-{}-{}", student_id, date.format(DATE_FORMAT), course_id)
    }
}

fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.trim().is_empty()))
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}
