//! Administrator flows: accounts, courses and their networks

use std::sync::Arc;
use tracing::{info, warn};

use crate::directory::{CreateOutcome, DirectoryStore};
use crate::error::{Error, Result};
use crate::identity::IdentityGateway;
use crate::models::{Course, User};

/// Everything the admin dashboard lists
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryOverview {
    pub courses: Vec<Course>,
    pub instructors: Vec<User>,
    pub students: Vec<User>,
}

impl DirectoryOverview {
    /// Display name of a course's instructor
    pub fn instructor_name(&self, course: &Course) -> &str {
        course
            .instructor_id
            .as_deref()
            .and_then(|uid| self.instructors.iter().find(|user| user.uid == uid))
            .map(|user| user.name.as_str())
            .unwrap_or("Unassigned")
    }
}

#[derive(Clone)]
pub struct AdminService {
    identity: Arc<dyn IdentityGateway>,
    directory: Arc<dyn DirectoryStore>,
}

impl AdminService {
    pub fn new(identity: Arc<dyn IdentityGateway>, directory: Arc<dyn DirectoryStore>) -> Self {
        Self {
            identity,
            directory,
        }
    }

    /// Provision an instructor account and its directory entry
    pub async fn create_instructor(&self, email: &str, password: &str, name: &str) -> Result<User> {
        let uid = self.identity.provision_account(email, password).await?;
        let user = User::instructor(&uid, name, email);
        self.write_user_record(&user).await?;
        Ok(user)
    }

    /// Provision a student account and its directory entry
    pub async fn create_student(
        &self,
        email: &str,
        password: &str,
        name: &str,
        student_id: &str,
    ) -> Result<User> {
        if student_id.trim().is_empty() {
            return Err(Error::config("student id cannot be empty"));
        }
        let uid = self.identity.provision_account(email, password).await?;
        let user = User::student(&uid, name, email, student_id.trim());
        self.write_user_record(&user).await?;
        Ok(user)
    }

    /// Create a course named `name`; an existing course is left untouched
    pub async fn add_course(&self, name: &str) -> Result<CreateOutcome> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::config("course name cannot be empty"));
        }
        let outcome = self
            .directory
            .create_course_conditional(&Course::new(name))
            .await?;
        info!(course_id = name, ?outcome, "add course");
        Ok(outcome)
    }

    pub async fn assign_instructor(&self, course_id: &str, instructor_id: &str) -> Result<()> {
        self.directory
            .assign_instructor(course_id, instructor_id)
            .await
    }

    /// Set the access point and the groups allowed to attend
    pub async fn configure_network(
        &self,
        course_id: &str,
        bssid: &str,
        groups: &[String],
    ) -> Result<()> {
        if bssid.trim().is_empty() {
            return Err(Error::config("access point id cannot be empty"));
        }
        self.directory
            .configure_network(course_id, bssid.trim(), groups)
            .await
    }

    pub async fn overview(&self) -> Result<DirectoryOverview> {
        Ok(DirectoryOverview {
            courses: self.directory.list_courses().await?,
            instructors: self.directory.list_instructors().await?,
            students: self.directory.list_students().await?,
        })
    }

    async fn write_user_record(&self, user: &User) -> Result<()> {
        // The account already exists at this point; a failed write leaves it without a role
        if let Err(err) = self.directory.create_user_record(user).await {
            warn!(uid = %user.uid, error = %err, "account created but directory entry failed");
            return Err(err);
        }
        info!(uid = %user.uid, role = %user.role, "directory entry written");
        Ok(())
    }
}
