use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

use super::{CreateOutcome, DirectoryStore, NO_ROLE_ASSIGNED};
use crate::error::{Error, Result};
use crate::models::{AttendanceRecord, Course, Role, User};

/// Process-local directory
///
/// Each collection sits behind its own lock; the conditional creates check
/// and insert under one write guard.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    users: RwLock<HashMap<String, User>>,
    courses: RwLock<HashMap<String, Course>>,
    attendance: RwLock<HashMap<String, AttendanceRecord>>,
    unreachable: AtomicBool,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail as if the store could not be reached
    pub fn set_unreachable(&self, value: bool) {
        self.unreachable.store(value, Ordering::SeqCst);
    }

    /// Number of attendance records held
    pub async fn attendance_count(&self) -> usize {
        self.attendance.read().await.len()
    }

    fn check_reachable(&self) -> Result<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(Error::store("document store unreachable"));
        }
        Ok(())
    }

    async fn users_with_role(&self, role: Role) -> Result<Vec<User>> {
        self.check_reachable()?;
        let mut users: Vec<User> = self
            .users
            .read()
            .await
            .values()
            .filter(|user| user.role == role)
            .cloned()
            .collect();
        users.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(users)
    }
}

#[async_trait]
impl DirectoryStore for InMemoryDirectory {
    async fn get_course(&self, course_id: &str) -> Result<Option<Course>> {
        self.check_reachable()?;
        Ok(self.courses.read().await.get(course_id).cloned())
    }

    async fn create_course_conditional(&self, course: &Course) -> Result<CreateOutcome> {
        self.check_reachable()?;
        let mut courses = self.courses.write().await;
        if courses.contains_key(&course.id) {
            return Ok(CreateOutcome::AlreadyExists);
        }
        courses.insert(course.id.clone(), course.clone());
        Ok(CreateOutcome::Created)
    }

    async fn set_course(&self, course: &Course) -> Result<()> {
        self.check_reachable()?;
        self.courses
            .write()
            .await
            .insert(course.id.clone(), course.clone());
        Ok(())
    }

    async fn assign_instructor(&self, course_id: &str, instructor_id: &str) -> Result<()> {
        self.check_reachable()?;
        let mut courses = self.courses.write().await;
        let course = courses
            .get_mut(course_id)
            .ok_or_else(|| Error::not_found(format!("Course '{}'", course_id)))?;
        course.instructor_id = Some(instructor_id.to_string());
        Ok(())
    }

    async fn configure_network(
        &self,
        course_id: &str,
        bssid: &str,
        groups: &[String],
    ) -> Result<()> {
        self.check_reachable()?;
        let mut courses = self.courses.write().await;
        let course = courses
            .get_mut(course_id)
            .ok_or_else(|| Error::not_found(format!("Course '{}'", course_id)))?;
        course.allowed_bssid = Some(bssid.to_string());
        course.allowed_groups = groups.to_vec();
        Ok(())
    }

    async fn list_instructors(&self) -> Result<Vec<User>> {
        self.users_with_role(Role::Instructor).await
    }

    async fn list_students(&self) -> Result<Vec<User>> {
        self.users_with_role(Role::Student).await
    }

    async fn list_courses(&self) -> Result<Vec<Course>> {
        self.check_reachable()?;
        let mut courses: Vec<Course> = self.courses.read().await.values().cloned().collect();
        courses.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(courses)
    }

    async fn get_role(&self, uid: &str) -> Result<Role> {
        self.check_reachable()?;
        self.users
            .read()
            .await
            .get(uid)
            .map(|user| user.role)
            .ok_or_else(|| Error::account_setup(NO_ROLE_ASSIGNED))
    }

    async fn create_user_record(&self, user: &User) -> Result<()> {
        self.check_reachable()?;
        self.users
            .write()
            .await
            .insert(user.uid.clone(), user.clone());
        Ok(())
    }

    async fn get_attendance(&self, record_id: &str) -> Result<Option<AttendanceRecord>> {
        self.check_reachable()?;
        Ok(self.attendance.read().await.get(record_id).cloned())
    }

    async fn create_attendance_conditional(
        &self,
        record: &AttendanceRecord,
    ) -> Result<CreateOutcome> {
        self.check_reachable()?;
        let mut attendance = self.attendance.write().await;
        if attendance.contains_key(&record.record_id) {
            return Ok(CreateOutcome::AlreadyExists);
        }
        attendance.insert(record.record_id.clone(), record.clone());
        Ok(CreateOutcome::Created)
    }

    async fn list_attendance(&self, course_id: &str) -> Result<Vec<AttendanceRecord>> {
        self.check_reachable()?;
        let mut records: Vec<AttendanceRecord> = self
            .attendance
            .read()
            .await
            .values()
            .filter(|record| record.course_id == course_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.date.cmp(&a.date).then(a.student_id.cmp(&b.student_id)));
        Ok(records)
    }
}
