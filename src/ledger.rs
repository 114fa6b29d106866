//! Attendance eligibility and commit
//!
//! [`AttendanceLedger::evaluate`] runs the checks in a fixed order and stops
//! at the first failure:
//!
//! 1. the course exists
//! 2. the course has an access point configured
//! 3. the observed access point id is a usable reading
//! 4. the observed id matches the course's id (trimmed, case-insensitive)
//! 5. the student's group is allowed
//! 6. no record exists yet for (student, local day, course)
//!
//! Step 6 is a single conditional create on the deterministic record id, so
//! two concurrent submissions for the same triple produce one record.

use chrono::NaiveDate;
use mockable::{Clock, DefaultClock};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

use crate::directory::{CreateOutcome, DirectoryStore};
use crate::error::Result;
use crate::models::{AttendanceRecord, DATE_FORMAT};
use crate::probe::{is_unusable_hardware_id, normalize_hardware_id};

/// Why a submission was turned down
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectReason {
    CourseNotFound,
    CourseMisconfigured,
    NetworkUnreadable,
    NetworkMismatch,
    GroupNotAllowed,
    AlreadyMarked,
}

impl RejectReason {
    pub fn message(&self) -> &'static str {
        match self {
            RejectReason::CourseNotFound => "Course not found",
            RejectReason::CourseMisconfigured => "No Wi-Fi assigned to this course",
            RejectReason::NetworkUnreadable => {
                "Could not read the Wi-Fi access point. Make sure Wi-Fi is on and location permission is granted"
            }
            RejectReason::NetworkMismatch => "You are not connected to the lecture Wi-Fi",
            RejectReason::GroupNotAllowed => "You are not allowed for this group",
            RejectReason::AlreadyMarked => "Attendance already marked",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Result of an attendance submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Committed(AttendanceRecord),
    Rejected(RejectReason),
}

impl Outcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, Outcome::Committed(_))
    }

    pub fn rejection(&self) -> Option<RejectReason> {
        match self {
            Outcome::Rejected(reason) => Some(*reason),
            Outcome::Committed(_) => None,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Outcome::Committed(_) => "Attendance marked successfully",
            Outcome::Rejected(reason) => reason.message(),
        }
    }
}

/// One student's attendance submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttendanceRequest {
    pub student_name: String,
    pub student_id: String,
    pub course_id: String,
    pub instructor_name: String,
    pub group: String,
    /// As reported by the probe, not normalized
    pub observed_hardware_id: String,
}

/// Decides and records attendance
#[derive(Clone)]
pub struct AttendanceLedger {
    directory: Arc<dyn DirectoryStore>,
    clock: Arc<dyn Clock + Send + Sync>,
}

impl AttendanceLedger {
    /// Ledger using the system clock
    pub fn new(directory: Arc<dyn DirectoryStore>) -> Self {
        Self::with_clock(directory, Arc::new(DefaultClock))
    }

    pub fn with_clock(
        directory: Arc<dyn DirectoryStore>,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> Self {
        Self { directory, clock }
    }

    /// The local calendar day records are filed under
    pub fn today(&self) -> NaiveDate {
        self.clock.local().date_naive()
    }

    /// Run the eligibility checks and, if they pass, create the record.
    ///
    /// Rejections are returned as `Ok(Outcome::Rejected(_))`. `Err` means the
    /// store could not be reached or refused the request.
    pub async fn evaluate(&self, request: &AttendanceRequest) -> Result<Outcome> {
        let course = match self.directory.get_course(&request.course_id).await? {
            Some(course) => course,
            None => return Ok(self.reject(request, RejectReason::CourseNotFound)),
        };

        let allowed = match course.allowed_bssid.as_deref().map(normalize_hardware_id) {
            Some(bssid) if !bssid.is_empty() => bssid,
            _ => return Ok(self.reject(request, RejectReason::CourseMisconfigured)),
        };

        if is_unusable_hardware_id(&request.observed_hardware_id) {
            return Ok(self.reject(request, RejectReason::NetworkUnreadable));
        }

        let observed = normalize_hardware_id(&request.observed_hardware_id);
        debug!(observed = %observed, allowed = %allowed, "comparing access points");
        if observed != allowed {
            return Ok(self.reject(request, RejectReason::NetworkMismatch));
        }

        // An empty group list admits nobody
        if !course.allowed_groups.iter().any(|g| *g == request.group) {
            return Ok(self.reject(request, RejectReason::GroupNotAllowed));
        }

        let date = self.today();
        let record = AttendanceRecord {
            record_id: AttendanceRecord::record_id(&request.student_id, date, &request.course_id),
            student_name: request.student_name.clone(),
            student_id: request.student_id.clone(),
            course_id: request.course_id.clone(),
            instructor_name: request.instructor_name.clone(),
            group: request.group.clone(),
            date: date.format(DATE_FORMAT).to_string(),
            observed_bssid: request.observed_hardware_id.clone(),
            timestamp: self.clock.utc(),
        };

        match self.directory.create_attendance_conditional(&record).await? {
            CreateOutcome::Created => {
                info!(record_id = %record.record_id, "attendance committed");
                Ok(Outcome::Committed(record))
            }
            CreateOutcome::AlreadyExists => Ok(self.reject(request, RejectReason::AlreadyMarked)),
        }
    }

    /// Records of a course grouped into per-day counts
    pub async fn summary(&self, course_id: &str) -> Result<BTreeMap<String, usize>> {
        let records = self.directory.list_attendance(course_id).await?;
        Ok(daily_counts(&records))
    }

    fn reject(&self, request: &AttendanceRequest, reason: RejectReason) -> Outcome {
        debug!(
            student_id = %request.student_id,
            course_id = %request.course_id,
            ?reason,
            "attendance rejected"
        );
        Outcome::Rejected(reason)
    }
}

/// Number of records per `date`
pub fn daily_counts(records: &[AttendanceRecord]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for record in records {
        *counts.entry(record.date.clone()).or_insert(0) += 1;
    }
    counts
}
