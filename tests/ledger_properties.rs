use chrono::{DateTime, Local, TimeZone, Utc};
use mockable::Clock;
use std::sync::Arc;

use wifi_attendance::directory::{DirectoryStore, InMemoryDirectory};
use wifi_attendance::ledger::{AttendanceLedger, AttendanceRequest, Outcome, RejectReason};
use wifi_attendance::models::Course;
use wifi_attendance::probe::BROADCAST_PLACEHOLDER;

struct FixtureClock(DateTime<Local>);

impl Clock for FixtureClock {
    fn local(&self) -> DateTime<Local> {
        self.0
    }

    fn utc(&self) -> DateTime<Utc> {
        self.0.with_timezone(&Utc)
    }
}

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// CS101 on AA:BB:CC:DD:EE:FF for Gp1, with the clock on 2024-01-10
async fn cs101() -> (AttendanceLedger, Arc<InMemoryDirectory>) {
    init_logging();
    let directory = Arc::new(InMemoryDirectory::new());
    directory
        .set_course(&Course::new("CS101").with_network("AA:BB:CC:DD:EE:FF", &["Gp1"]))
        .await
        .unwrap();

    let now = Local.with_ymd_and_hms(2024, 1, 10, 10, 0, 0).single().unwrap();
    let ledger = AttendanceLedger::with_clock(directory.clone(), Arc::new(FixtureClock(now)));
    (ledger, directory)
}

fn submission(student_id: &str, observed: &str, group: &str) -> AttendanceRequest {
    AttendanceRequest {
        student_name: "Mona".to_string(),
        student_id: student_id.to_string(),
        course_id: "CS101".to_string(),
        instructor_name: "Dr. Adel".to_string(),
        group: group.to_string(),
        observed_hardware_id: observed.to_string(),
    }
}

#[tokio::test]
async fn first_submission_commits_with_deterministic_id() {
    let (ledger, directory) = cs101().await;

    let outcome = ledger
        .evaluate(&submission("S1", "aa:bb:cc:dd:ee:ff", "Gp1"))
        .await
        .unwrap();

    let record = match outcome {
        Outcome::Committed(record) => record,
        other => panic!("expected commit, got {:?}", other),
    };
    assert_eq!(record.record_id, "S1-2024-01-10-CS101");
    assert!(directory
        .get_attendance("S1-2024-01-10-CS101")
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn second_submission_same_day_is_already_marked() {
    let (ledger, directory) = cs101().await;
    let request = submission("S1", "aa:bb:cc:dd:ee:ff", "Gp1");

    assert!(ledger.evaluate(&request).await.unwrap().is_committed());
    assert_eq!(
        ledger.evaluate(&request).await.unwrap(),
        Outcome::Rejected(RejectReason::AlreadyMarked)
    );
    assert_eq!(directory.attendance_count().await, 1);
}

#[tokio::test]
async fn comparison_ignores_case_and_whitespace_only() {
    let (ledger, _) = cs101().await;

    let observations = ["  AA:bb:CC:dd:EE:ff\t", "aa:bb:cc:dd:ee:f0", "aa-bb-cc-dd-ee-ff"];
    for (i, observed) in observations.into_iter().enumerate() {
        let outcome = ledger
            .evaluate(&submission(&format!("S{}", i), observed, "Gp1"))
            .await
            .unwrap();
        let matches = observed.trim().eq_ignore_ascii_case("aa:bb:cc:dd:ee:ff");
        if matches {
            assert!(outcome.is_committed(), "{:?} should match", observed);
        } else {
            assert_eq!(
                outcome.rejection(),
                Some(RejectReason::NetworkMismatch),
                "{:?} should not match",
                observed
            );
        }
    }
}

#[tokio::test]
async fn placeholder_is_unreadable_even_when_configured() {
    let (ledger, directory) = cs101().await;
    directory
        .set_course(&Course::new("CS101").with_network(BROADCAST_PLACEHOLDER, &["Gp1"]))
        .await
        .unwrap();

    for observed in [BROADCAST_PLACEHOLDER, "", "unknown", " UNKNOWN "] {
        assert_eq!(
            ledger
                .evaluate(&submission("S1", observed, "Gp1"))
                .await
                .unwrap(),
            Outcome::Rejected(RejectReason::NetworkUnreadable)
        );
    }
    assert_eq!(directory.attendance_count().await, 0);
}

#[tokio::test]
async fn unknown_course_never_writes() {
    let (ledger, directory) = cs101().await;
    let mut request = submission("S1", "aa:bb:cc:dd:ee:ff", "Gp1");
    request.course_id = "CS999".to_string();

    assert_eq!(
        ledger.evaluate(&request).await.unwrap(),
        Outcome::Rejected(RejectReason::CourseNotFound)
    );
    assert_eq!(directory.attendance_count().await, 0);
}

#[tokio::test]
async fn group_checked_before_duplicate() {
    let (ledger, _) = cs101().await;
    assert!(ledger
        .evaluate(&submission("S1", "aa:bb:cc:dd:ee:ff", "Gp1"))
        .await
        .unwrap()
        .is_committed());

    assert_eq!(
        ledger
            .evaluate(&submission("S1", "aa:bb:cc:dd:ee:ff", "Gp2"))
            .await
            .unwrap(),
        Outcome::Rejected(RejectReason::GroupNotAllowed)
    );
}

#[tokio::test]
async fn wrong_network_after_marking_is_a_mismatch() {
    let (ledger, directory) = cs101().await;
    assert!(ledger
        .evaluate(&submission("S1", "aa:bb:cc:dd:ee:ff", "Gp1"))
        .await
        .unwrap()
        .is_committed());

    assert_eq!(
        ledger
            .evaluate(&submission("S1", "11:22:33:44:55:66", "Gp1"))
            .await
            .unwrap(),
        Outcome::Rejected(RejectReason::NetworkMismatch)
    );
    assert_eq!(directory.attendance_count().await, 1);
}

#[tokio::test]
async fn configured_bssid_whitespace_is_ignored() {
    let (ledger, directory) = cs101().await;
    directory
        .set_course(&Course::new("CS101").with_network("  AA:BB:CC:DD:EE:FF \n", &["Gp1"]))
        .await
        .unwrap();

    match ledger
        .evaluate(&submission("S1", "aa:bb:cc:dd:ee:ff", "Gp1"))
        .await
        .unwrap()
    {
        Outcome::Committed(record) => assert_eq!(record.record_id, "S1-2024-01-10-CS101"),
        other => panic!("expected commit, got {:?}", other),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_submissions_commit_once() {
    let (ledger, directory) = cs101().await;
    let request = submission("S1", "aa:bb:cc:dd:ee:ff", "Gp1");

    let first = tokio::spawn({
        let ledger = ledger.clone();
        let request = request.clone();
        async move { ledger.evaluate(&request).await }
    });
    let second = tokio::spawn({
        let ledger = ledger.clone();
        let request = request.clone();
        async move { ledger.evaluate(&request).await }
    });
    let (first, second) = tokio::join!(first, second);
    let outcomes = [first.unwrap().unwrap(), second.unwrap().unwrap()];

    assert_eq!(outcomes.iter().filter(|o| o.is_committed()).count(), 1);
    assert_eq!(
        outcomes.iter().filter_map(Outcome::rejection).collect::<Vec<_>>(),
        vec![RejectReason::AlreadyMarked]
    );
    assert_eq!(directory.attendance_count().await, 1);
}

#[tokio::test]
async fn different_students_and_days_are_independent() {
    let (ledger, directory) = cs101().await;
    assert!(ledger
        .evaluate(&submission("S1", "aa:bb:cc:dd:ee:ff", "Gp1"))
        .await
        .unwrap()
        .is_committed());
    assert!(ledger
        .evaluate(&submission("S2", "aa:bb:cc:dd:ee:ff", "Gp1"))
        .await
        .unwrap()
        .is_committed());

    let tomorrow = Local.with_ymd_and_hms(2024, 1, 11, 10, 0, 0).single().unwrap();
    let next_day = AttendanceLedger::with_clock(directory.clone(), Arc::new(FixtureClock(tomorrow)));
    match next_day
        .evaluate(&submission("S1", "aa:bb:cc:dd:ee:ff", "Gp1"))
        .await
        .unwrap()
    {
        Outcome::Committed(record) => assert_eq!(record.record_id, "S1-2024-01-11-CS101"),
        other => panic!("expected commit, got {:?}", other),
    }

    let summary = ledger.summary("CS101").await.unwrap();
    assert_eq!(summary.get("2024-01-10"), Some(&2));
    assert_eq!(summary.get("2024-01-11"), Some(&1));
}
