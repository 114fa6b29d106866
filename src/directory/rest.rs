use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, warn};

use wifi_attendance_postgrest::{PostgrestClient, SortOrder};

use super::{CreateOutcome, DirectoryStore, NO_ROLE_ASSIGNED};
use crate::config::{AttendanceConfig, Collections};
use crate::error::{Error, Result};
use crate::models::{AttendanceRecord, Course, Role, User};

/// Directory backed by the hosted document store's REST API
#[derive(Clone)]
pub struct RestDirectory {
    base_url: String,
    anon_key: String,
    http_client: Client,
    collections: Collections,
    request_timeout: Option<Duration>,
    access_token: Arc<RwLock<Option<String>>>,
}

impl RestDirectory {
    pub fn new(
        config: &AttendanceConfig,
        http_client: Client,
        collections: Collections,
        request_timeout: Option<Duration>,
    ) -> Self {
        Self {
            base_url: config.base_url().to_string(),
            anon_key: config.anon_key.clone(),
            http_client,
            collections,
            request_timeout,
            access_token: Arc::new(RwLock::new(None)),
        }
    }

    /// Send subsequent requests as the signed-in user; `None` reverts to the anon key
    pub fn set_access_token(&self, token: Option<String>) {
        match self.access_token.write() {
            Ok(mut guard) => *guard = token,
            Err(poisoned) => *poisoned.into_inner() = token,
        }
    }

    fn current_token(&self) -> Option<String> {
        match self.access_token.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn from(&self, table: &str) -> Result<PostgrestClient> {
        let client = PostgrestClient::new(
            &self.base_url,
            &self.anon_key,
            table,
            self.http_client.clone(),
        )
        .with_timeout(self.request_timeout);

        match self.current_token() {
            Some(token) => Ok(client.with_auth(&token)?),
            None => Ok(client),
        }
    }

    async fn users_with_role(&self, role: Role) -> Result<Vec<User>> {
        let users = self
            .from(&self.collections.users)?
            .select("*")
            .eq("role", role.as_str())
            .order("name", SortOrder::Ascending)
            .execute::<User>()
            .await?;
        Ok(users)
    }

    async fn conditional_insert<T: serde::Serialize + Send + Sync>(
        &self,
        table: &str,
        document: &T,
    ) -> Result<CreateOutcome> {
        match self.from(table)?.insert(document).await {
            Ok(_) => Ok(CreateOutcome::Created),
            Err(err) if err.is_unique_violation() => Ok(CreateOutcome::AlreadyExists),
            Err(err) => {
                warn!(table, error = %err, "conditional create failed");
                Err(err.into())
            }
        }
    }

    async fn update_course(&self, course_id: &str, patch: Value) -> Result<()> {
        let updated = self
            .from(&self.collections.courses)?
            .eq("id", course_id)
            .update(patch)
            .await?;

        // With `return=representation` an empty array means no row matched
        match updated {
            Value::Array(rows) if rows.is_empty() => {
                Err(Error::not_found(format!("Course '{}'", course_id)))
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl DirectoryStore for RestDirectory {
    async fn get_course(&self, course_id: &str) -> Result<Option<Course>> {
        let course = self
            .from(&self.collections.courses)?
            .select("*")
            .eq("id", course_id)
            .execute_one::<Course>()
            .await?;
        Ok(course)
    }

    async fn create_course_conditional(&self, course: &Course) -> Result<CreateOutcome> {
        self.conditional_insert(&self.collections.courses, course)
            .await
    }

    async fn set_course(&self, course: &Course) -> Result<()> {
        self.from(&self.collections.courses)?
            .on_conflict("id")
            .upsert(course)
            .await?;
        Ok(())
    }

    async fn assign_instructor(&self, course_id: &str, instructor_id: &str) -> Result<()> {
        debug!(course_id, instructor_id, "assigning instructor");
        self.update_course(course_id, json!({ "instructorId": instructor_id }))
            .await
    }

    async fn configure_network(
        &self,
        course_id: &str,
        bssid: &str,
        groups: &[String],
    ) -> Result<()> {
        debug!(course_id, bssid, "configuring course network");
        self.update_course(course_id, json!({ "Bssid": bssid, "Groups": groups }))
            .await
    }

    async fn list_instructors(&self) -> Result<Vec<User>> {
        self.users_with_role(Role::Instructor).await
    }

    async fn list_students(&self) -> Result<Vec<User>> {
        self.users_with_role(Role::Student).await
    }

    async fn list_courses(&self) -> Result<Vec<Course>> {
        let courses = self
            .from(&self.collections.courses)?
            .select("*")
            .order("id", SortOrder::Ascending)
            .execute::<Course>()
            .await?;
        Ok(courses)
    }

    async fn get_role(&self, uid: &str) -> Result<Role> {
        let row = self
            .from(&self.collections.users)?
            .select("role")
            .eq("id", uid)
            .execute_one::<Value>()
            .await?;

        let role = row
            .as_ref()
            .and_then(|doc| doc.get("role"))
            .and_then(Value::as_str)
            .ok_or_else(|| Error::account_setup(NO_ROLE_ASSIGNED))?;
        role.parse()
    }

    async fn create_user_record(&self, user: &User) -> Result<()> {
        self.from(&self.collections.users)?
            .on_conflict("id")
            .upsert(user)
            .await?;
        Ok(())
    }

    async fn get_attendance(&self, record_id: &str) -> Result<Option<AttendanceRecord>> {
        let record = self
            .from(&self.collections.attendance)?
            .select("*")
            .eq("id", record_id)
            .execute_one::<AttendanceRecord>()
            .await?;
        Ok(record)
    }

    async fn create_attendance_conditional(
        &self,
        record: &AttendanceRecord,
    ) -> Result<CreateOutcome> {
        self.conditional_insert(&self.collections.attendance, record)
            .await
    }

    async fn list_attendance(&self, course_id: &str) -> Result<Vec<AttendanceRecord>> {
        let records = self
            .from(&self.collections.attendance)?
            .select("*")
            .eq("course", course_id)
            .order("date", SortOrder::Descending)
            .execute::<AttendanceRecord>()
            .await?;
        Ok(records)
    }

    fn use_access_token(&self, token: Option<String>) {
        self.set_access_token(token);
    }
}
