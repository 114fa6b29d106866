//! Typed access to the `Users`, `Courses` and `attendance` collections
//!
//! Two backends implement [`DirectoryStore`]: [`RestDirectory`] talks to the
//! hosted document store, [`InMemoryDirectory`] keeps everything in process.
//! Both implement the attendance create as a single create-if-absent step.

mod memory;
mod rest;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{AttendanceRecord, Course, Role, User};

pub use memory::InMemoryDirectory;
pub use rest::RestDirectory;

/// Result of a conditional create
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    AlreadyExists,
}

#[async_trait]
pub trait DirectoryStore: Send + Sync {
    /// Course by id, `None` if there is no such document
    async fn get_course(&self, course_id: &str) -> Result<Option<Course>>;

    /// Create the course unless one with the same id exists
    async fn create_course_conditional(&self, course: &Course) -> Result<CreateOutcome>;

    /// Create or overwrite the course
    async fn set_course(&self, course: &Course) -> Result<()>;

    /// Fails with `NotFound` if the course does not exist
    async fn assign_instructor(&self, course_id: &str, instructor_id: &str) -> Result<()>;

    /// Set the access point and groups allowed to attend
    async fn configure_network(&self, course_id: &str, bssid: &str, groups: &[String])
        -> Result<()>;

    async fn list_instructors(&self) -> Result<Vec<User>>;

    async fn list_students(&self) -> Result<Vec<User>>;

    async fn list_courses(&self) -> Result<Vec<Course>>;

    /// Fails with `AccountSetup` when the uid has no directory entry
    async fn get_role(&self, uid: &str) -> Result<Role>;

    /// Create or overwrite the directory entry for `user.uid`
    async fn create_user_record(&self, user: &User) -> Result<()>;

    async fn get_attendance(&self, record_id: &str) -> Result<Option<AttendanceRecord>>;

    /// Atomic create-if-absent keyed on `record.record_id`
    async fn create_attendance_conditional(
        &self,
        record: &AttendanceRecord,
    ) -> Result<CreateOutcome>;

    /// Records for a course, newest day first
    async fn list_attendance(&self, course_id: &str) -> Result<Vec<AttendanceRecord>>;

    /// Act as the signed-in account from now on; `None` reverts to anonymous
    fn use_access_token(&self, _token: Option<String>) {}
}

pub(crate) const NO_ROLE_ASSIGNED: &str = "No role assigned";
