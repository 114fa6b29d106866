//! Wi-Fi attendance client library
//!
//! Students prove they are in the lecture hall by the access point their
//! device is associated with. This crate decides whether a submission is
//! eligible and records at most one attendance per student, course and day
//! in a hosted document store.

pub mod admin;
pub mod config;
pub mod directory;
pub mod error;
pub mod identity;
pub mod ledger;
pub mod models;
pub mod probe;
pub mod session;

use reqwest::Client;
use std::collections::BTreeMap;
use std::sync::Arc;

use wifi_attendance_auth::{Auth, AuthOptions};

use crate::admin::{AdminService, DirectoryOverview};
use crate::config::{AttendanceConfig, ClientOptions};
use crate::directory::{CreateOutcome, DirectoryStore, RestDirectory};
use crate::error::Result;
use crate::identity::{HostedIdentity, IdentityGateway};
use crate::ledger::{AttendanceLedger, AttendanceRequest, Outcome};
use crate::models::{AttendanceRecord, Role, User};
use crate::probe::NetworkProbe;
use crate::session::SessionController;

/// The main entry point for the attendance client
pub struct AttendanceClient {
    config: AttendanceConfig,
    options: ClientOptions,
    identity: Arc<dyn IdentityGateway>,
    directory: Arc<dyn DirectoryStore>,
    ledger: AttendanceLedger,
    admin: AdminService,
}

impl AttendanceClient {
    /// Create a client talking to the hosted identity service and document store
    ///
    /// # Example
    ///
    /// ```
    /// use wifi_attendance::{AttendanceClient, config::{AttendanceConfig, ClientOptions}};
    ///
    /// let config = AttendanceConfig::new("https://your-project.supabase.co", "your-anon-key".to_string()).unwrap();
    /// let client = AttendanceClient::new(config, ClientOptions::default());
    /// ```
    pub fn new(config: AttendanceConfig, options: ClientOptions) -> Self {
        let http_client = Client::new();

        let mut auth = Auth::new(
            config.base_url(),
            &config.anon_key,
            http_client.clone(),
            AuthOptions {
                persist_session: options.persist_session,
                request_timeout: options.request_timeout,
            },
        );
        if let Some(key) = &config.service_role_key {
            auth.init_admin(key);
        }

        let identity: Arc<dyn IdentityGateway> = Arc::new(HostedIdentity::new(auth));
        let directory: Arc<dyn DirectoryStore> = Arc::new(RestDirectory::new(
            &config,
            http_client,
            options.collections.clone(),
            options.request_timeout,
        ));

        Self::with_backends(config, options, identity, directory)
    }

    /// Create a client reading its settings from the environment
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(AttendanceConfig::from_env()?, ClientOptions::default()))
    }

    /// Assemble a client from explicit identity and directory backends
    pub fn with_backends(
        config: AttendanceConfig,
        options: ClientOptions,
        identity: Arc<dyn IdentityGateway>,
        directory: Arc<dyn DirectoryStore>,
    ) -> Self {
        Self {
            ledger: AttendanceLedger::new(directory.clone()),
            admin: AdminService::new(identity.clone(), directory.clone()),
            config,
            options,
            identity,
            directory,
        }
    }

    /// Replace the ledger, e.g. to inject a clock
    pub fn with_ledger(mut self, ledger: AttendanceLedger) -> Self {
        self.ledger = ledger;
        self
    }

    pub fn config(&self) -> &AttendanceConfig {
        &self.config
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    pub fn identity(&self) -> &Arc<dyn IdentityGateway> {
        &self.identity
    }

    pub fn directory(&self) -> &Arc<dyn DirectoryStore> {
        &self.directory
    }

    pub fn ledger(&self) -> &AttendanceLedger {
        &self.ledger
    }

    pub fn admin(&self) -> &AdminService {
        &self.admin
    }

    /// Sign in and resolve the account's role. Returns `(uid, role)`.
    pub async fn login(&self, email: &str, password: &str) -> Result<(String, Role)> {
        let uid = self.identity.authenticate(email, password).await?;
        self.directory.use_access_token(self.identity.access_token());
        let role = self.directory.get_role(&uid).await?;
        Ok((uid, role))
    }

    /// The signed-in account and its role, as the identity service sees it now
    pub async fn current_user(&self) -> Result<(String, Role)> {
        let uid = self.identity.current_user().await?;
        self.directory.use_access_token(self.identity.access_token());
        let role = self.directory.get_role(&uid).await?;
        Ok((uid, role))
    }

    pub async fn logout(&self) -> Result<()> {
        let result = self.identity.sign_out().await;
        self.directory.use_access_token(None);
        result
    }

    pub async fn get_role(&self, uid: &str) -> Result<Role> {
        self.directory.get_role(uid).await
    }

    /// Check eligibility and record attendance
    pub async fn mark_attendance(&self, request: &AttendanceRequest) -> Result<Outcome> {
        self.ledger.evaluate(request).await
    }

    pub async fn create_instructor(&self, email: &str, password: &str, name: &str) -> Result<User> {
        self.admin.create_instructor(email, password, name).await
    }

    pub async fn create_student(
        &self,
        email: &str,
        password: &str,
        name: &str,
        student_id: &str,
    ) -> Result<User> {
        self.admin
            .create_student(email, password, name, student_id)
            .await
    }

    pub async fn add_course(&self, name: &str) -> Result<CreateOutcome> {
        self.admin.add_course(name).await
    }

    pub async fn assign_instructor(&self, course_id: &str, instructor_id: &str) -> Result<()> {
        self.admin.assign_instructor(course_id, instructor_id).await
    }

    pub async fn configure_network(
        &self,
        course_id: &str,
        bssid: &str,
        groups: &[String],
    ) -> Result<()> {
        self.admin.configure_network(course_id, bssid, groups).await
    }

    pub async fn overview(&self) -> Result<DirectoryOverview> {
        self.admin.overview().await
    }

    pub async fn list_attendance(&self, course_id: &str) -> Result<Vec<AttendanceRecord>> {
        self.directory.list_attendance(course_id).await
    }

    /// Per-day attendance counts for a course
    pub async fn attendance_summary(&self, course_id: &str) -> Result<BTreeMap<String, usize>> {
        self.ledger.summary(course_id).await
    }

    /// A session controller sharing this client's backends
    pub fn session(&self, probe: Arc<dyn NetworkProbe>) -> SessionController {
        SessionController::new(
            self.identity.clone(),
            self.directory.clone(),
            self.ledger.clone(),
            probe,
        )
    }
}

/// A convenience module for common imports
pub mod prelude {
    pub use crate::config::{AttendanceConfig, ClientOptions};
    pub use crate::error::{Error, Result};
    pub use crate::ledger::{AttendanceRequest, Outcome, RejectReason};
    pub use crate::models::{AttendanceRecord, Course, Role, User};
    pub use crate::probe::{NetworkProbe, ProbeReading, StaticProbe};
    pub use crate::session::{SessionController, SessionState, StudentContext};
    pub use crate::AttendanceClient;
}
