mod fixtures;

use assert_matches::assert_matches;
use chrono::Duration;
use tokio_test::assert_ok;
use uuid::Uuid;

use appointment_cell::models::*;
use appointment_cell::services::store::AppointmentStore;
use queue_cell::*;
use fixtures::*;

#[tokio::test]
async fn two_patients_are_served_in_check_in_order() {
    let f = QueueFixture::new();
    let (appt_a, entry_a) = f.check_in_new_patient().await;
    let (appt_b, entry_b) = f.check_in_new_patient().await;

    assert_eq!(entry_a.token, 1);
    assert_eq!(entry_b.token, 2);
    assert_eq!(entry_a.status, QueueStatus::Waiting);
    assert_eq!(f.status_of(appt_a.id).await, AppointmentStatus::CheckedIn);

    let called = f.engine.call_next(f.doctor.id, f.doctor_actor()).await.unwrap();
    assert_eq!(called.queue_id, entry_a.queue_id);
    assert_eq!(called.status, QueueStatus::InProgress);
    assert!(called.called_time.is_some());
    assert_eq!(f.status_of(appt_a.id).await, AppointmentStatus::InProgress);

    let done = f
        .engine
        .complete(entry_a.queue_id, Some("stable"), f.doctor_actor())
        .await
        .unwrap();
    assert_eq!(done.status, QueueStatus::Completed);
    let stored_a = f.store.get(appt_a.id).await.unwrap();
    assert_eq!(stored_a.status, AppointmentStatus::Completed);
    assert_eq!(stored_a.clinical_notes.as_deref(), Some("stable"));

    let b_status = f.engine.patient_status(appt_b.id, f.doctor_actor()).await.unwrap();
    assert_eq!(b_status.entry.position, Some(1));

    let called = f.engine.call_next(f.doctor.id, f.doctor_actor()).await.unwrap();
    assert_eq!(called.queue_id, entry_b.queue_id);

    let snapshot = f.engine.snapshot(f.doctor.id, f.doctor_actor()).await.unwrap();
    assert_eq!(snapshot.total_seen_today, 1);
    assert_eq!(snapshot.completed_patients.len(), 1);
    assert_eq!(snapshot.current_patient.unwrap().queue_id, entry_b.queue_id);
}

#[tokio::test]
async fn position_and_wait_follow_waiting_entries() {
    let f = QueueFixture::new();
    f.check_in_new_patient().await;
    f.check_in_new_patient().await;
    let (appt, entry) = f.check_in_new_patient().await;
    assert_eq!(entry.token, 3);

    let status = f.engine.patient_status(appt.id, Actor::Patient(appt.patient_id)).await.unwrap();
    assert_eq!(status.entry.position, Some(3));
    assert_eq!(status.entry.estimated_wait_minutes, Some(60));
    assert_eq!(status.now_serving_token, None);

    // Reading twice changes nothing.
    let again = f.engine.patient_status(appt.id, Actor::Patient(appt.patient_id)).await.unwrap();
    assert_eq!(again.entry.position, status.entry.position);

    f.engine.call_next(f.doctor.id, f.doctor_actor()).await.unwrap();
    let status = f.engine.patient_status(appt.id, Actor::Patient(appt.patient_id)).await.unwrap();
    assert_eq!(status.entry.position, Some(2));
    assert_eq!(status.entry.estimated_wait_minutes, Some(40));
    assert_eq!(status.now_serving_token, Some(1));
}

#[tokio::test]
async fn default_average_applies_when_doctor_has_none() {
    let f = QueueFixture::with_settings(QueueSettings {
        default_consultation_minutes: 12,
        ..Default::default()
    });
    let mut doctor = f.doctor.clone();
    doctor.average_consultation_minutes = None;
    f.directory.upsert(doctor).await;

    let (appt, _) = f.check_in_new_patient().await;
    let status = f.engine.patient_status(appt.id, Actor::Admin).await.unwrap();
    assert_eq!(status.entry.estimated_wait_minutes, Some(12));
}

#[tokio::test]
async fn huge_average_caps_the_wait_estimate() {
    let f = QueueFixture::new();
    f.directory
        .upsert(DoctorProfile {
            average_consultation_minutes: Some(3_000_000_000),
            ..f.doctor.clone()
        })
        .await;
    f.check_in_new_patient().await;
    let (appt, _) = f.check_in_new_patient().await;

    let snapshot = assert_ok!(f.engine.snapshot(f.doctor.id, f.doctor_actor()).await);
    assert_eq!(snapshot.waiting_patients.len(), 2);
    assert_eq!(snapshot.waiting_patients[0].estimated_wait_minutes, Some(3_000_000_000));
    assert_eq!(snapshot.waiting_patients[1].estimated_wait_minutes, Some(u32::MAX));

    let status = assert_ok!(f.engine.patient_status(appt.id, Actor::Admin).await);
    assert_eq!(status.entry.estimated_wait_minutes, Some(u32::MAX));
}

#[tokio::test]
async fn second_check_in_is_rejected_without_new_token() {
    let f = QueueFixture::new();
    let (appt, entry) = f.check_in_new_patient().await;

    assert_matches!(
        f.engine.check_in(appt.id, Actor::Patient(appt.patient_id)).await,
        Err(QueueError::AlreadyCheckedIn)
    );

    let (_, next) = f.check_in_new_patient().await;
    assert_eq!(next.token, entry.token + 1);
}

#[tokio::test]
async fn check_in_only_on_the_appointment_date() {
    let f = QueueFixture::new();
    let patient = Uuid::new_v4();
    let tomorrow = f
        .book_on(patient, today() + Duration::days(1), at(10, 0), AppointmentType::InPerson)
        .await;

    assert_matches!(
        f.engine.check_in(tomorrow.id, Actor::Patient(patient)).await,
        Err(QueueError::InvalidAppointment(_))
    );
    assert_eq!(f.status_of(tomorrow.id).await, AppointmentStatus::Booked);

    f.clock.advance(Duration::days(1));
    let entry = f.engine.check_in(tomorrow.id, Actor::Patient(patient)).await.unwrap();
    assert_eq!(entry.token, 1);
    assert_eq!(entry.date, today() + Duration::days(1));
}

#[tokio::test]
async fn cancelled_appointments_cannot_check_in() {
    let f = QueueFixture::new();
    let patient = Uuid::new_v4();
    let appt = f.book(patient).await;
    f.controller.cancel(appt.id, None, Actor::Patient(patient)).await.unwrap();

    assert_matches!(
        f.engine.check_in(appt.id, Actor::Patient(patient)).await,
        Err(QueueError::InvalidAppointment(_))
    );
}

#[tokio::test]
async fn check_in_window_policy() {
    let f = QueueFixture::with_settings(QueueSettings {
        check_in_policy: CheckInPolicy::OpensBefore { minutes: 30 },
        ..Default::default()
    });
    let patient = Uuid::new_v4();
    let appt = f.book(patient).await;

    assert_matches!(
        f.engine.check_in(appt.id, Actor::Patient(patient)).await,
        Err(QueueError::CheckInNotOpen { opens_at }) if opens_at == at(9, 30)
    );

    f.clock.advance(Duration::minutes(90));
    assert!(f.engine.check_in(appt.id, Actor::Patient(patient)).await.is_ok());
}

#[tokio::test]
async fn call_next_on_empty_queue() {
    let f = QueueFixture::new();
    assert_matches!(
        f.engine.call_next(f.doctor.id, f.doctor_actor()).await,
        Err(QueueError::QueueEmpty)
    );

    let (_, entry) = f.check_in_new_patient().await;
    assert_ok!(f.engine.call_next(f.doctor.id, f.doctor_actor()).await);
    assert_ok!(f.engine.complete(entry.queue_id, Some("ok"), f.doctor_actor()).await);

    assert_matches!(
        f.engine.call_next(f.doctor.id, f.doctor_actor()).await,
        Err(QueueError::QueueEmpty)
    );
    let snapshot = f.engine.snapshot(f.doctor.id, f.doctor_actor()).await.unwrap();
    assert!(snapshot.current_patient.is_none());
    assert_eq!(snapshot.phase(), QueuePhase::Idle);
}

#[tokio::test]
async fn call_next_while_serving_changes_nothing() {
    let f = QueueFixture::new();
    let (_, first) = f.check_in_new_patient().await;
    let (appt_b, second) = f.check_in_new_patient().await;
    f.engine.call_next(f.doctor.id, f.doctor_actor()).await.unwrap();

    assert_matches!(
        f.engine.call_next(f.doctor.id, f.staff_actor()).await,
        Err(QueueError::CurrentPatientActive)
    );

    let snapshot = f.engine.snapshot(f.doctor.id, f.doctor_actor()).await.unwrap();
    assert_eq!(snapshot.current_patient.as_ref().unwrap().queue_id, first.queue_id);
    assert_eq!(snapshot.waiting_patients.len(), 1);
    assert_eq!(snapshot.waiting_patients[0].queue_id, second.queue_id);
    assert_eq!(f.status_of(appt_b.id).await, AppointmentStatus::CheckedIn);
}

#[tokio::test]
async fn complete_requires_notes_and_changes_nothing_without_them() {
    let f = QueueFixture::new();
    let (appt, entry) = f.check_in_new_patient().await;
    f.engine.call_next(f.doctor.id, f.doctor_actor()).await.unwrap();

    for notes in [None, Some(""), Some("   ")] {
        assert_matches!(
            f.engine.complete(entry.queue_id, notes, f.doctor_actor()).await,
            Err(QueueError::Appointment(AppointmentError::NotesRequired))
        );
    }

    assert_eq!(f.status_of(appt.id).await, AppointmentStatus::InProgress);
    let snapshot = f.engine.snapshot(f.doctor.id, f.doctor_actor()).await.unwrap();
    assert_eq!(snapshot.phase(), QueuePhase::Serving);
    assert_eq!(snapshot.total_seen_today, 0);
}

#[tokio::test]
async fn complete_only_the_current_patient() {
    let f = QueueFixture::new();
    let (_, first) = f.check_in_new_patient().await;
    let (_, second) = f.check_in_new_patient().await;

    assert_matches!(
        f.engine.complete(first.queue_id, Some("early"), f.doctor_actor()).await,
        Err(QueueError::NotCurrentPatient(_))
    );

    f.engine.call_next(f.doctor.id, f.doctor_actor()).await.unwrap();
    assert_matches!(
        f.engine.complete(second.queue_id, Some("wrong one"), f.doctor_actor()).await,
        Err(QueueError::NotCurrentPatient(_))
    );
    assert_matches!(
        f.engine.complete(Uuid::new_v4(), Some("nobody"), f.doctor_actor()).await,
        Err(QueueError::EntryNotFound)
    );

    f.engine.complete(first.queue_id, Some("done"), f.doctor_actor()).await.unwrap();
    // Retrying lands on the same entry and does not double count.
    assert_matches!(
        f.engine.complete(first.queue_id, Some("done"), f.doctor_actor()).await,
        Err(QueueError::NotCurrentPatient(_))
    );
    let snapshot = f.engine.snapshot(f.doctor.id, f.doctor_actor()).await.unwrap();
    assert_eq!(snapshot.total_seen_today, 1);
}

#[tokio::test]
async fn snapshot_phases_and_annotations() {
    let f = QueueFixture::new();
    let snapshot = f.engine.snapshot(f.doctor.id, f.doctor_actor()).await.unwrap();
    assert_eq!(snapshot.phase(), QueuePhase::Idle);
    assert_eq!(snapshot.average_consultation_minutes, 20);
    assert_eq!(snapshot.date, today());

    f.check_in_new_patient().await;
    f.check_in_new_patient().await;
    let snapshot = f.engine.snapshot(f.doctor.id, f.staff_actor()).await.unwrap();
    assert_eq!(snapshot.phase(), QueuePhase::AwaitingCall);
    assert_eq!(
        snapshot
            .waiting_patients
            .iter()
            .map(|v| (v.token, v.position, v.estimated_wait_minutes))
            .collect::<Vec<_>>(),
        vec![(1, Some(1), Some(20)), (2, Some(2), Some(40))]
    );
    assert_eq!(snapshot.waiting_patients[0].appointment_time, Some(at(10, 0)));

    f.engine.call_next(f.doctor.id, f.doctor_actor()).await.unwrap();
    let snapshot = f.engine.snapshot(f.doctor.id, Actor::Admin).await.unwrap();
    assert_eq!(snapshot.phase(), QueuePhase::Serving);
    let current = snapshot.current_patient.unwrap();
    assert_eq!(current.position, None);
    assert_eq!(current.estimated_wait_minutes, None);
}

#[tokio::test]
async fn queue_access_is_scoped() {
    let f = QueueFixture::new();
    let (appt, entry) = f.check_in_new_patient().await;

    let stranger_doctor = Actor::Doctor(Uuid::new_v4());
    let other_clinic_staff = Actor::Staff { clinic_id: Some(Uuid::new_v4()) };

    for actor in [stranger_doctor, other_clinic_staff, Actor::Patient(appt.patient_id)] {
        assert_matches!(f.engine.call_next(f.doctor.id, actor).await, Err(QueueError::Forbidden(_)));
        assert_matches!(f.engine.snapshot(f.doctor.id, actor).await, Err(QueueError::Forbidden(_)));
    }

    f.engine.call_next(f.doctor.id, f.doctor_actor()).await.unwrap();
    assert_matches!(
        f.engine.complete(entry.queue_id, Some("x"), stranger_doctor).await,
        Err(QueueError::Forbidden(_))
    );
    assert_matches!(
        f.engine.patient_status(appt.id, Actor::Patient(Uuid::new_v4())).await,
        Err(QueueError::Forbidden(_))
    );

    let outsider = Uuid::new_v4();
    let other = f.book(outsider).await;
    assert_matches!(
        f.engine.check_in(other.id, Actor::Patient(Uuid::new_v4())).await,
        Err(QueueError::Forbidden(_))
    );
    assert!(f.engine.check_in(other.id, f.staff_actor()).await.is_ok());
}

#[tokio::test]
async fn my_status_shows_only_todays_live_entries() {
    let f = QueueFixture::new();
    let patient = Uuid::new_v4();

    assert_matches!(f.engine.my_status(Actor::Patient(patient)).await, Err(QueueError::NoActiveQueueEntry));

    let appt = f.book(patient).await;
    assert_matches!(f.engine.my_status(Actor::Patient(patient)).await, Err(QueueError::NoActiveQueueEntry));

    let entry = f.engine.check_in(appt.id, Actor::Patient(patient)).await.unwrap();
    let statuses = f.engine.my_status(Actor::Patient(patient)).await.unwrap();
    assert_eq!(statuses.len(), 1);
    assert_eq!(statuses[0].entry.queue_id, entry.queue_id);
    assert_eq!(statuses[0].appointment_status, AppointmentStatus::CheckedIn);

    f.engine.call_next(f.doctor.id, f.doctor_actor()).await.unwrap();
    let statuses = f.engine.my_status(Actor::Patient(patient)).await.unwrap();
    assert_eq!(statuses[0].entry.status, QueueStatus::InProgress);

    // An open entry from yesterday never surfaces the next day.
    f.clock.advance(Duration::days(1));
    assert_matches!(f.engine.my_status(Actor::Patient(patient)).await, Err(QueueError::NoActiveQueueEntry));

    assert_matches!(f.engine.my_status(f.doctor_actor()).await, Err(QueueError::Forbidden(_)));
}

#[tokio::test]
async fn store_outage_rolls_back_the_session() {
    let f = QueueFixture::new();
    let patient = Uuid::new_v4();
    let appt = f.book(patient).await;

    f.store.fail_writes(true);
    let err = f.engine.check_in(appt.id, Actor::Patient(patient)).await.unwrap_err();
    assert_matches!(err, QueueError::Appointment(AppointmentError::StoreUnavailable(_)));
    assert_eq!(err.kind(), shared_models::error::ErrorKind::Unavailable);

    f.store.fail_writes(false);
    let entry = f.engine.check_in(appt.id, Actor::Patient(patient)).await.unwrap();
    assert_eq!(entry.token, 1);

    f.store.fail_writes(true);
    assert!(f.engine.call_next(f.doctor.id, f.doctor_actor()).await.is_err());
    f.store.fail_writes(false);

    let snapshot = f.engine.snapshot(f.doctor.id, f.doctor_actor()).await.unwrap();
    assert!(snapshot.current_patient.is_none());
    assert_eq!(snapshot.waiting_patients.len(), 1);
    assert_eq!(f.status_of(appt.id).await, AppointmentStatus::CheckedIn);

    let called = f.engine.call_next(f.doctor.id, f.doctor_actor()).await.unwrap();
    assert_eq!(called.queue_id, entry.queue_id);
}

#[tokio::test]
async fn past_sessions_are_pruned() {
    let f = QueueFixture::new();
    let (_, entry) = f.check_in_new_patient().await;
    assert_eq!(f.engine.session_count().await, 1);

    assert_eq!(f.engine.prune_sessions_before(today()).await, 0);
    assert_eq!(f.engine.prune_sessions_before(today() + Duration::days(1)).await, 1);
    assert_eq!(f.engine.session_count().await, 0);

    assert_matches!(
        f.engine.complete(entry.queue_id, Some("late"), f.doctor_actor()).await,
        Err(QueueError::EntryNotFound)
    );
}

#[tokio::test]
async fn retention_window_decides_what_is_pruned() {
    let f = QueueFixture::new();
    f.check_in_new_patient().await;
    assert_eq!(f.engine.prune_expired(u32::MAX).await, 0);
    assert_eq!(f.engine.prune_expired(1).await, 0);
    assert_eq!(f.engine.session_count().await, 1);

    f.clock.advance(Duration::days(2));
    assert_eq!(f.engine.prune_expired(u32::MAX).await, 0);
    assert_eq!(f.engine.session_count().await, 1);
    assert_eq!(f.engine.prune_expired(1).await, 1);
    assert_eq!(f.engine.session_count().await, 0);
}
