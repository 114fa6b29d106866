//! Observable session state for a UI
//!
//! Every user action moves [`SessionState`] through `Loading` and then into
//! `Success` or `Error`. The transitions live in [`reduce`];
//! [`SessionController`] runs the actions and publishes each state on a
//! `tokio::sync::watch` channel.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::admin::{AdminService, DirectoryOverview};
use crate::directory::{CreateOutcome, DirectoryStore};
use crate::error::{Error, Result};
use crate::identity::IdentityGateway;
use crate::ledger::{AttendanceLedger, AttendanceRequest, Outcome, RejectReason};
use crate::models::{AttendanceRecord, Role, User};
use crate::probe::{NetworkProbe, ProbeReading, UNKNOWN_SENTINEL};

/// What a successful action produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    LoggedIn { uid: String, role: Role },
    Attendance(AttendanceRecord),
    Message(String),
    Overview(DirectoryOverview),
    Summary(BTreeMap<String, usize>),
}

/// Why an action did not succeed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    /// Input was rejected before anything was sent
    Validation(String),
    /// Identity or store failure, shown verbatim
    Transport(String),
    /// The Wi-Fi reading needs a permission grant; the action resumes once granted
    PermissionRequired,
    /// An eligibility check turned the submission down
    Rejected(RejectReason),
}

impl Failure {
    pub fn message(&self) -> String {
        match self {
            Failure::Validation(msg) | Failure::Transport(msg) => msg.clone(),
            Failure::PermissionRequired => {
                "Location permission is required to verify Wi-Fi".to_string()
            }
            Failure::Rejected(reason) => reason.message().to_string(),
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SessionState {
    #[default]
    Idle,
    Loading,
    Success(Payload),
    Error(Failure),
}

impl SessionState {
    pub fn is_loading(&self) -> bool {
        matches!(self, SessionState::Loading)
    }

    /// Role of the signed-in account, if the last action was a login
    pub fn role(&self) -> Option<Role> {
        match self {
            SessionState::Success(Payload::LoggedIn { role, .. }) => Some(*role),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Started,
    Succeeded(Payload),
    Failed(Failure),
    Cleared,
}

/// Next state after `event`.
///
/// Results only land while an action is in flight; a late result after
/// `Cleared` is dropped. Validation failures may arrive without a preceding
/// `Started`.
pub fn reduce(state: &SessionState, event: Event) -> SessionState {
    match (state, event) {
        (_, Event::Started) => SessionState::Loading,
        (_, Event::Cleared) => SessionState::Idle,
        (SessionState::Loading, Event::Succeeded(payload)) => SessionState::Success(payload),
        (_, Event::Failed(failure @ Failure::Validation(_))) => SessionState::Error(failure),
        (SessionState::Loading, Event::Failed(failure)) => SessionState::Error(failure),
        (current, _) => current.clone(),
    }
}

/// The signed-in student's details stamped onto each record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudentContext {
    pub name: String,
    pub student_id: String,
    pub group: String,
}

impl StudentContext {
    pub fn new(name: &str, student_id: &str, group: &str) -> Self {
        Self {
            name: name.to_string(),
            student_id: student_id.to_string(),
            group: group.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
struct PendingAttendance {
    student: StudentContext,
    course_id: String,
    instructor_name: String,
}

/// Runs user actions and publishes the resulting [`SessionState`]
pub struct SessionController {
    identity: Arc<dyn IdentityGateway>,
    directory: Arc<dyn DirectoryStore>,
    ledger: AttendanceLedger,
    admin: AdminService,
    probe: Arc<dyn NetworkProbe>,
    state: watch::Sender<SessionState>,
    pending: Mutex<Option<PendingAttendance>>,
}

impl SessionController {
    pub fn new(
        identity: Arc<dyn IdentityGateway>,
        directory: Arc<dyn DirectoryStore>,
        ledger: AttendanceLedger,
        probe: Arc<dyn NetworkProbe>,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::Idle);
        Self {
            admin: AdminService::new(identity.clone(), directory.clone()),
            identity,
            directory,
            ledger,
            probe,
            state,
            pending: Mutex::new(None),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Whether an attendance submission is waiting for the permission grant
    pub fn has_pending_attendance(&self) -> bool {
        self.lock_pending().is_some()
    }

    pub fn clear(&self) -> SessionState {
        self.dispatch(Event::Cleared)
    }

    /// Sign in and resolve the account's role
    pub async fn login(&self, email: &str, password: &str) -> SessionState {
        if email.trim().is_empty() || password.trim().is_empty() {
            return self.dispatch(Event::Failed(Failure::Validation(
                "Please enter email and password".to_string(),
            )));
        }
        self.dispatch(Event::Started);

        let result = async {
            let uid = self.identity.authenticate(email.trim(), password).await?;
            self.directory.use_access_token(self.identity.access_token());
            let role = self.directory.get_role(&uid).await?;
            Ok::<_, Error>(Payload::LoggedIn { uid, role })
        }
        .await;

        match result {
            Ok(payload) => self.dispatch(Event::Succeeded(payload)),
            Err(err) => {
                warn!(error = %err, "login failed");
                self.dispatch(Event::Failed(Failure::Transport(format!(
                    "Login failed: {}",
                    err.user_message()
                ))))
            }
        }
    }

    pub async fn logout(&self) -> SessionState {
        self.dispatch(Event::Started);
        let result = self.identity.sign_out().await;
        self.directory.use_access_token(None);
        self.lock_pending().take();
        self.finish(result.map(|_| Payload::Message("Signed out".to_string())))
    }

    /// Read the access point and submit attendance for `course_id`.
    ///
    /// A denied permission parks the submission; [`Self::permission_granted`]
    /// resumes it.
    pub async fn mark_attendance(
        &self,
        student: &StudentContext,
        course_id: &str,
        instructor_name: &str,
    ) -> SessionState {
        let pending = PendingAttendance {
            student: student.clone(),
            course_id: course_id.to_string(),
            instructor_name: instructor_name.to_string(),
        };
        self.attempt(pending, true).await
    }

    /// The user granted the Wi-Fi permission; retry the parked submission once
    pub async fn permission_granted(&self) -> Option<SessionState> {
        let pending = self.lock_pending().take()?;
        debug!(course_id = %pending.course_id, "resuming attendance after permission grant");
        Some(self.attempt(pending, false).await)
    }

    /// The user declined the Wi-Fi permission
    pub fn permission_refused(&self) -> SessionState {
        self.lock_pending().take();
        self.dispatch(Event::Failed(Failure::Validation(
            Failure::PermissionRequired.message(),
        )))
    }

    pub async fn create_instructor(&self, email: &str, password: &str, name: &str) -> SessionState {
        if let Some(state) = self.require_fields(&[email, password, name]) {
            return state;
        }
        self.dispatch(Event::Started);
        let result = self.admin.create_instructor(email, password, name).await;
        self.finish(result.map(|user| created_message(&user)))
    }

    pub async fn create_student(
        &self,
        email: &str,
        password: &str,
        name: &str,
        student_id: &str,
    ) -> SessionState {
        if let Some(state) = self.require_fields(&[email, password, name, student_id]) {
            return state;
        }
        self.dispatch(Event::Started);
        let result = self
            .admin
            .create_student(email, password, name, student_id)
            .await;
        self.finish(result.map(|user| created_message(&user)))
    }

    pub async fn add_course(&self, name: &str) -> SessionState {
        if let Some(state) = self.require_fields(&[name]) {
            return state;
        }
        self.dispatch(Event::Started);
        let result = self.admin.add_course(name).await.map(|outcome| match outcome {
            CreateOutcome::Created => Payload::Message("Course added".to_string()),
            CreateOutcome::AlreadyExists => Payload::Message("Course already exists".to_string()),
        });
        self.finish(result)
    }

    pub async fn assign_instructor(&self, course_id: &str, instructor_id: &str) -> SessionState {
        self.dispatch(Event::Started);
        let result = self.admin.assign_instructor(course_id, instructor_id).await;
        self.finish(result.map(|_| Payload::Message("Instructor assigned".to_string())))
    }

    pub async fn configure_network(
        &self,
        course_id: &str,
        bssid: &str,
        groups: &[String],
    ) -> SessionState {
        if let Some(state) = self.require_fields(&[course_id, bssid]) {
            return state;
        }
        self.dispatch(Event::Started);
        let result = self.admin.configure_network(course_id, bssid, groups).await;
        self.finish(result.map(|_| Payload::Message("Wi-Fi saved".to_string())))
    }

    pub async fn load_overview(&self) -> SessionState {
        self.dispatch(Event::Started);
        let result = self.admin.overview().await;
        self.finish(result.map(Payload::Overview))
    }

    /// Per-day attendance counts for an instructor's course
    pub async fn load_summary(&self, course_id: &str) -> SessionState {
        self.dispatch(Event::Started);
        let result = self.ledger.summary(course_id).await;
        self.finish(result.map(Payload::Summary))
    }

    async fn attempt(&self, pending: PendingAttendance, park_on_denial: bool) -> SessionState {
        self.dispatch(Event::Started);

        let observed = match self.probe.current_access_point().await {
            ProbeReading::PermissionDenied if park_on_denial => {
                info!(course_id = %pending.course_id, "waiting for Wi-Fi permission");
                *self.lock_pending() = Some(pending);
                return self.dispatch(Event::Failed(Failure::PermissionRequired));
            }
            ProbeReading::PermissionDenied => UNKNOWN_SENTINEL.to_string(),
            reading => reading.hardware_id(),
        };

        let request = AttendanceRequest {
            student_name: pending.student.name,
            student_id: pending.student.student_id,
            course_id: pending.course_id,
            instructor_name: pending.instructor_name,
            group: pending.student.group,
            observed_hardware_id: observed,
        };

        match self.ledger.evaluate(&request).await {
            Ok(Outcome::Committed(record)) => {
                self.dispatch(Event::Succeeded(Payload::Attendance(record)))
            }
            Ok(Outcome::Rejected(reason)) => {
                self.dispatch(Event::Failed(Failure::Rejected(reason)))
            }
            Err(err) => self.fail(err),
        }
    }

    fn require_fields(&self, fields: &[&str]) -> Option<SessionState> {
        if fields.iter().any(|field| field.trim().is_empty()) {
            return Some(self.dispatch(Event::Failed(Failure::Validation(
                "Please fill in all fields".to_string(),
            ))));
        }
        None
    }

    fn finish(&self, result: Result<Payload>) -> SessionState {
        match result {
            Ok(payload) => self.dispatch(Event::Succeeded(payload)),
            Err(err) => self.fail(err),
        }
    }

    fn fail(&self, err: Error) -> SessionState {
        warn!(error = %err, "session action failed");
        self.dispatch(Event::Failed(Failure::Transport(err.user_message())))
    }

    fn dispatch(&self, event: Event) -> SessionState {
        self.state.send_modify(|state| *state = reduce(state, event));
        self.state()
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, Option<PendingAttendance>> {
        match self.pending.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn created_message(user: &User) -> Payload {
    Payload::Message(format!("Account created for {} ({})", user.name, user.role))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::InMemoryDirectory;
    use crate::identity::InMemoryIdentity;
    use crate::models::Course;
    use crate::probe::{AccessPoint, StaticProbe};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Denies the first `denials` readings, then reports a fixed access point
    struct GrantAfter {
        denials: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl NetworkProbe for GrantAfter {
        async fn current_access_point(&self) -> ProbeReading {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.denials {
                ProbeReading::PermissionDenied
            } else {
                ProbeReading::Associated(AccessPoint::new("\"Campus\"", "AA:BB:CC:DD:EE:FF"))
            }
        }
    }

    async fn controller(probe: Arc<dyn NetworkProbe>) -> (SessionController, Arc<InMemoryDirectory>) {
        let directory = Arc::new(InMemoryDirectory::new());
        directory
            .set_course(&Course::new("CS101").with_network("aa:bb:cc:dd:ee:ff", &["Gp1"]))
            .await
            .unwrap();
        directory
            .create_user_record(&User::student("uid-1", "Mona", "mona@x.edu", "S1"))
            .await
            .unwrap();

        let identity = Arc::new(InMemoryIdentity::new());
        identity.insert("mona@x.edu", "pw", "uid-1").await;

        let ledger = AttendanceLedger::new(directory.clone());
        (
            SessionController::new(identity, directory.clone(), ledger, probe),
            directory,
        )
    }

    fn mona() -> StudentContext {
        StudentContext::new("Mona", "S1", "Gp1")
    }

    #[test]
    fn late_results_after_clear_are_dropped() {
        let state = reduce(&SessionState::Idle, Event::Started);
        assert!(state.is_loading());
        let state = reduce(&state, Event::Cleared);
        let state = reduce(&state, Event::Succeeded(Payload::Message("late".to_string())));
        assert_eq!(state, SessionState::Idle);
    }

    #[test]
    fn validation_lands_without_start() {
        let state = reduce(
            &SessionState::Idle,
            Event::Failed(Failure::Validation("Please enter email and password".to_string())),
        );
        assert_eq!(
            state,
            SessionState::Error(Failure::Validation("Please enter email and password".to_string()))
        );
    }

    #[tokio::test]
    async fn login_resolves_role() {
        let (session, _) = controller(Arc::new(StaticProbe::associated("Campus", "aa:bb:cc:dd:ee:ff"))).await;

        assert_eq!(
            session.login(" ", "pw").await,
            SessionState::Error(Failure::Validation("Please enter email and password".to_string()))
        );
        assert_eq!(session.login("mona@x.edu", "pw").await.role(), Some(Role::Student));

        match session.login("mona@x.edu", "wrong").await {
            SessionState::Error(Failure::Transport(msg)) => {
                assert_eq!(msg, "Login failed: Invalid email or password")
            }
            other => panic!("unexpected state: {:?}", other),
        }
    }

    #[tokio::test]
    async fn attendance_resumes_once_after_grant() {
        let probe = Arc::new(GrantAfter {
            denials: 1,
            calls: AtomicUsize::new(0),
        });
        let (session, directory) = controller(probe).await;
        let mut updates = session.subscribe();

        let state = session.mark_attendance(&mona(), "CS101", "Dr. Adel").await;
        assert_eq!(state, SessionState::Error(Failure::PermissionRequired));
        assert!(session.has_pending_attendance());
        assert!(updates.has_changed().unwrap());

        let resumed = session.permission_granted().await.unwrap();
        assert!(matches!(resumed, SessionState::Success(Payload::Attendance(_))));
        assert_eq!(directory.attendance_count().await, 1);
        assert!(session.permission_granted().await.is_none());

        let again = session.mark_attendance(&mona(), "CS101", "Dr. Adel").await;
        assert_eq!(again, SessionState::Error(Failure::Rejected(RejectReason::AlreadyMarked)));
    }

    #[tokio::test]
    async fn denied_again_after_grant_is_unreadable() {
        let probe = Arc::new(GrantAfter {
            denials: 2,
            calls: AtomicUsize::new(0),
        });
        let (session, directory) = controller(probe).await;

        session.mark_attendance(&mona(), "CS101", "Dr. Adel").await;
        let state = session.permission_granted().await.unwrap();

        assert_eq!(
            state,
            SessionState::Error(Failure::Rejected(RejectReason::NetworkUnreadable))
        );
        assert!(!session.has_pending_attendance());
        assert_eq!(directory.attendance_count().await, 0);
    }

    #[tokio::test]
    async fn radio_off_is_unreadable_and_not_parked() {
        let (session, directory) = controller(Arc::new(StaticProbe::new(ProbeReading::Unavailable))).await;

        let state = session.mark_attendance(&mona(), "CS101", "Dr. Adel").await;
        assert_eq!(
            state,
            SessionState::Error(Failure::Rejected(RejectReason::NetworkUnreadable))
        );
        assert!(!session.has_pending_attendance());
        assert_eq!(directory.attendance_count().await, 0);
    }

    #[tokio::test]
    async fn store_outage_becomes_error_state() {
        let (session, directory) = controller(Arc::new(StaticProbe::associated("Campus", "aa:bb:cc:dd:ee:ff"))).await;
        directory.set_unreachable(true);

        let state = session.mark_attendance(&mona(), "CS101", "Dr. Adel").await;
        assert_eq!(
            state,
            SessionState::Error(Failure::Transport("Store error: document store unreachable".to_string()))
        );
    }

    #[tokio::test]
    async fn summary_counts_committed_records() {
        let (session, _) = controller(Arc::new(StaticProbe::associated("Campus", "aa:bb:cc:dd:ee:ff"))).await;
        session.mark_attendance(&mona(), "CS101", "Dr. Adel").await;

        match session.load_summary("CS101").await {
            SessionState::Success(Payload::Summary(counts)) => {
                assert_eq!(counts.values().sum::<usize>(), 1)
            }
            other => panic!("unexpected state: {:?}", other),
        }
    }
}
