use std::sync::{Arc, Mutex};

use assert_matches::assert_matches;
use async_trait::async_trait;
use chrono::{Days, NaiveDate, NaiveTime, Utc, Weekday};
use uuid::Uuid;

use appointment_cell::models::{
    AppointmentError, AppointmentService, AppointmentServiceArea, CreateAppointmentRequest, GuardedWrite,
    InsertOutcome, NewAppointment, ReschedulePatch, SyncAction,
};
use appointment_cell::services::{
    AppointmentLifecycleManager, AppointmentRepository, InMemoryAppointmentStore, ReminderScheduler,
    SpreadsheetMirror,
};
use availability_cell::services::{AvailabilityCalculator, InMemoryScheduleRepository};
use shared_models::{Appointment, Clinic, Patient, Service, ServiceArea, ServiceSelection};
use shared_utils::test_utils::{time, upcoming_weekday, TestClinic};

const PHONE: &str = "+5511999990000";

struct Fixture {
    clinic: Clinic,
    store: InMemoryAppointmentStore,
    schedule: InMemoryScheduleRepository,
    manager: AppointmentLifecycleManager,
    laser: Service,
    legs: ServiceArea,
    massage: Service,
    monday: NaiveDate,
}

async fn fixture() -> Fixture {
    let clinic = TestClinic::weekdays(10);
    let schedule = InMemoryScheduleRepository::new();
    schedule.add_clinic(clinic.clone()).await;

    let store = InMemoryAppointmentStore::new();
    let laser = TestClinic::service(clinic.id, "Depilacao a laser", 30, 100.0);
    let legs_area = TestClinic::area(clinic.id, "Pernas");
    let legs = TestClinic::service_area(&laser, &legs_area, Some(50), Some(180.0));
    let massage = TestClinic::service(clinic.id, "Massagem", 60, 150.0);
    store.add_service(laser.clone()).await;
    store.add_service(massage.clone()).await;
    store.add_service_area(legs.clone()).await;

    let manager = AppointmentLifecycleManager::new(
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        Arc::new(schedule.clone()),
    );
    let monday = upcoming_weekday(&clinic, Weekday::Mon);

    Fixture {
        clinic,
        store,
        schedule,
        manager,
        laser,
        legs,
        massage,
        monday,
    }
}

fn request(f: &Fixture, selections: Vec<ServiceSelection>, on: NaiveDate, at: NaiveTime) -> CreateAppointmentRequest {
    CreateAppointmentRequest {
        clinic_id: f.clinic.id,
        phone: PHONE.to_string(),
        patient_name: Some("Maria".to_string()),
        selections,
        appointment_date: on,
        start_time: at,
        professional_id: None,
        duration_override: None,
        notes: None,
    }
}

#[tokio::test]
async fn test_create_then_list_then_cancel() {
    let f = fixture().await;
    let appointment = f
        .manager
        .create(&f.clinic, request(&f, vec![ServiceSelection::service(f.massage.id)], f.monday, time(10, 0)))
        .await
        .unwrap();

    assert_eq!(appointment.version, 1);
    assert_eq!(appointment.end_time, time(11, 0));
    assert!(appointment.is_confirmed());

    let active = f.manager.active_appointments_by_phone(&f.clinic, PHONE).await.unwrap();
    assert_eq!(active.iter().map(|a| a.id).collect::<Vec<_>>(), vec![appointment.id]);

    let cancelled = f.manager.cancel(appointment.id).await.unwrap();
    assert!(!cancelled.is_confirmed());

    let active = f.manager.active_appointments_by_phone(&f.clinic, PHONE).await.unwrap();
    assert!(active.is_empty());
}

#[tokio::test]
async fn test_duration_sums_service_area_overrides() {
    let f = fixture().await;
    let appointment = f
        .manager
        .create(
            &f.clinic,
            request(
                &f,
                vec![
                    ServiceSelection::with_area(f.laser.id, f.legs.area_id),
                    ServiceSelection::service(f.massage.id),
                ],
                f.monday,
                time(9, 0),
            ),
        )
        .await
        .unwrap();

    assert_eq!(appointment.duration_minutes, 110);
    assert_eq!(appointment.end_time, time(10, 50));

    let summary = f.manager.summary(&appointment).await.unwrap();
    assert_eq!(summary.description(), "Depilacao a laser - Pernas, Massagem");
}

#[tokio::test]
async fn test_explicit_duration_override_wins() {
    let f = fixture().await;
    let mut req = request(&f, vec![ServiceSelection::service(f.massage.id)], f.monday, time(9, 0));
    req.duration_override = Some(20);

    let appointment = f.manager.create(&f.clinic, req).await.unwrap();
    assert_eq!(appointment.end_time, time(9, 20));
}

#[tokio::test]
async fn test_overlapping_create_fails_with_conflict() {
    let f = fixture().await;
    let massage = vec![ServiceSelection::service(f.massage.id)];
    f.manager
        .create(&f.clinic, request(&f, massage.clone(), f.monday, time(10, 0)))
        .await
        .unwrap();

    for start in [time(9, 30), time(10, 0), time(10, 30)] {
        let result = f.manager.create(&f.clinic, request(&f, massage.clone(), f.monday, start)).await;
        assert_matches!(result, Err(AppointmentError::Conflict { .. }), "start {}", start);
    }

    // touching at 11:00 is fine
    assert!(f
        .manager
        .create(&f.clinic, request(&f, massage, f.monday, time(11, 0)))
        .await
        .is_ok());
}

#[tokio::test]
async fn test_concurrent_creates_for_the_same_slot() {
    let f = fixture().await;
    let first = request(&f, vec![ServiceSelection::service(f.massage.id)], f.monday, time(14, 0));
    let mut second = first.clone();
    second.phone = "+5511888880000".to_string();

    let (a, b) = tokio::join!(f.manager.create(&f.clinic, first), f.manager.create(&f.clinic, second));

    let successes = [&a, &b].iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1);
    assert!(matches!(a, Err(AppointmentError::Conflict { .. })) || matches!(b, Err(AppointmentError::Conflict { .. })));
    assert_eq!(f.store.appointment_count().await, 1);
}

#[tokio::test]
async fn test_reschedule_advances_version_and_keeps_booked_duration() {
    let f = fixture().await;
    let appointment = f
        .manager
        .create(
            &f.clinic,
            request(&f, vec![ServiceSelection::with_area(f.laser.id, f.legs.area_id)], f.monday, time(9, 0)),
        )
        .await
        .unwrap();

    let tuesday = f.monday.checked_add_days(Days::new(1)).unwrap();
    let moved = f.manager.reschedule(appointment.id, tuesday, time(15, 0)).await.unwrap();

    assert_eq!(moved.version, 2);
    assert_eq!(moved.appointment_date, tuesday);
    assert_eq!(moved.end_time, time(15, 50));
    assert!(moved.is_confirmed());
}

#[tokio::test]
async fn test_reschedule_keeps_stored_duration_without_item_rows() {
    let f = fixture().await;
    // laser + massage booked before item rows existed; the base laser service is 30 minutes
    let legacy = TestClinic::confirmed_appointment(f.clinic.id, f.laser.id, f.monday, time(9, 0), time(10, 30));
    f.store.add_appointment(legacy.clone()).await;

    let moved = f.manager.reschedule(legacy.id, f.monday, time(13, 0)).await.unwrap();

    assert_eq!(moved.start_time, time(13, 0));
    assert_eq!(moved.end_time, time(14, 30));
}

#[tokio::test]
async fn test_reschedule_onto_own_slot_is_not_a_conflict() {
    let f = fixture().await;
    let appointment = f
        .manager
        .create(&f.clinic, request(&f, vec![ServiceSelection::service(f.massage.id)], f.monday, time(10, 0)))
        .await
        .unwrap();

    let moved = f.manager.reschedule(appointment.id, f.monday, time(10, 30)).await.unwrap();
    assert_eq!(moved.start_time, time(10, 30));
}

#[tokio::test]
async fn test_reschedule_with_stale_version_fails() {
    let f = fixture().await;
    let appointment = f
        .manager
        .create(&f.clinic, request(&f, vec![ServiceSelection::service(f.massage.id)], f.monday, time(10, 0)))
        .await
        .unwrap();

    // another writer moves the row on
    f.store.bump_version(appointment.id).await;

    let result = f
        .manager
        .reschedule_expecting(appointment.id, appointment.version, f.monday, time(13, 0))
        .await;
    assert_matches!(
        result,
        Err(AppointmentError::OptimisticLock { expected_version: 1, .. })
    );

    let fresh = f.manager.get(appointment.id).await.unwrap();
    let moved = f
        .manager
        .reschedule_expecting(appointment.id, fresh.version, f.monday, time(13, 0))
        .await
        .unwrap();
    assert_eq!(moved.version, fresh.version + 1);
}

#[tokio::test]
async fn test_reschedule_into_taken_slot_fails_with_conflict() {
    let f = fixture().await;
    let massage = vec![ServiceSelection::service(f.massage.id)];
    let first = f
        .manager
        .create(&f.clinic, request(&f, massage.clone(), f.monday, time(9, 0)))
        .await
        .unwrap();
    f.manager
        .create(&f.clinic, request(&f, massage, f.monday, time(13, 0)))
        .await
        .unwrap();

    let result = f.manager.reschedule(first.id, f.monday, time(13, 30)).await;
    assert_matches!(result, Err(AppointmentError::Conflict { .. }));
}

#[tokio::test]
async fn test_cancel_twice_is_not_found() {
    let f = fixture().await;
    let appointment = f
        .manager
        .create(&f.clinic, request(&f, vec![ServiceSelection::service(f.massage.id)], f.monday, time(10, 0)))
        .await
        .unwrap();

    f.manager.cancel(appointment.id).await.unwrap();
    assert_matches!(f.manager.cancel(appointment.id).await, Err(AppointmentError::NotFound(_)));
    assert_matches!(
        f.manager.reschedule(appointment.id, f.monday, time(15, 0)).await,
        Err(AppointmentError::NotFound(_))
    );
}

#[tokio::test]
async fn test_rejects_past_and_far_future_dates() {
    let f = fixture().await;
    let massage = vec![ServiceSelection::service(f.massage.id)];
    let today = f.clinic.local_today(Utc::now());

    let yesterday = today.pred_opt().unwrap();
    assert_matches!(
        f.manager.create(&f.clinic, request(&f, massage.clone(), yesterday, time(10, 0))).await,
        Err(AppointmentError::ValidationError(_))
    );

    let too_far = today.checked_add_days(Days::new(200)).unwrap();
    assert_matches!(
        f.manager.create(&f.clinic, request(&f, massage.clone(), too_far, time(10, 0))).await,
        Err(AppointmentError::ValidationError(_))
    );

    assert_matches!(
        f.manager.create(&f.clinic, request(&f, vec![], f.monday, time(10, 0))).await,
        Err(AppointmentError::ValidationError(_))
    );

    assert_matches!(
        f.manager.create(&f.clinic, request(&f, massage, f.monday, time(23, 30))).await,
        Err(AppointmentError::ValidationError(_))
    );
}

#[tokio::test]
async fn test_calculator_sees_created_bookings() {
    let f = fixture().await;
    let calculator = AvailabilityCalculator::new(Arc::new(f.schedule.clone()), Arc::new(f.store.clone()));
    f.manager
        .create(&f.clinic, request(&f, vec![ServiceSelection::service(f.massage.id)], f.monday, time(10, 0)))
        .await
        .unwrap();

    let slots = calculator.free_slots(f.clinic.id, f.monday, 60).await.unwrap();
    assert_eq!(
        slots,
        vec![time(11, 10), time(12, 20), time(13, 30), time(14, 40), time(15, 50)]
    );
}

#[derive(Default)]
struct RecordingEffects {
    events: Mutex<Vec<String>>,
}

#[async_trait]
impl ReminderScheduler for RecordingEffects {
    async fn schedule(&self, appointment: &Appointment) -> anyhow::Result<()> {
        self.events.lock().unwrap().push(format!("remind {}", appointment.start_time));
        Ok(())
    }

    async fn cancel(&self, _appointment_id: Uuid) -> anyhow::Result<()> {
        anyhow::bail!("reminder service down")
    }
}

#[async_trait]
impl SpreadsheetMirror for RecordingEffects {
    async fn sync(&self, _appointment: &Appointment, action: SyncAction) -> anyhow::Result<()> {
        self.events.lock().unwrap().push(format!("sheet {}", action));
        Ok(())
    }
}

#[tokio::test]
async fn test_side_effect_failures_do_not_fail_the_operation() {
    let f = fixture().await;
    let effects = Arc::new(RecordingEffects::default());
    let manager = AppointmentLifecycleManager::new(
        Arc::new(f.store.clone()),
        Arc::new(f.store.clone()),
        Arc::new(f.schedule.clone()),
    )
    .with_reminders(effects.clone())
    .with_spreadsheet_mirror(effects.clone());

    let appointment = manager
        .create(&f.clinic, request(&f, vec![ServiceSelection::service(f.massage.id)], f.monday, time(10, 0)))
        .await
        .unwrap();
    // the reminder cancel fails but the cancellation stands
    let cancelled = manager.cancel(appointment.id).await.unwrap();
    assert!(!cancelled.is_confirmed());

    let events = effects.events.lock().unwrap().clone();
    assert_eq!(events, vec!["remind 10:00:00", "sheet created", "sheet cancelled"]);
}

/// What happens inside the store right before the guarded reschedule write.
#[derive(Clone)]
enum Interleave {
    Nothing,
    BumpVersion,
    Book(Appointment),
}

/// Delegates to the in-memory store but lets a test fail the booking write
/// or slip another writer in between the read and the guarded update.
#[derive(Clone)]
struct InterleavingRepository {
    inner: InMemoryAppointmentStore,
    before_guarded_write: Interleave,
    reject_booking: bool,
}

impl InterleavingRepository {
    fn new(inner: InMemoryAppointmentStore) -> Self {
        Self {
            inner,
            before_guarded_write: Interleave::Nothing,
            reject_booking: false,
        }
    }
}

#[async_trait]
impl AppointmentRepository for InterleavingRepository {
    async fn find_patient(&self, clinic_id: Uuid, phone: &str) -> Result<Option<Patient>, AppointmentError> {
        self.inner.find_patient(clinic_id, phone).await
    }

    async fn find_or_create_patient(
        &self,
        clinic_id: Uuid,
        phone: &str,
        name: Option<&str>,
    ) -> Result<Patient, AppointmentError> {
        self.inner.find_or_create_patient(clinic_id, phone, name).await
    }

    async fn query_conflicts(
        &self,
        clinic_id: Uuid,
        date: NaiveDate,
        start: NaiveTime,
        end: NaiveTime,
        exclude_id: Option<Uuid>,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        self.inner.query_conflicts(clinic_id, date, start, end, exclude_id).await
    }

    async fn insert(&self, appointment: NewAppointment) -> Result<InsertOutcome, AppointmentError> {
        if self.reject_booking {
            return Err(AppointmentError::DatabaseError(
                "insert into appointment_service_areas violates foreign key".to_string(),
            ));
        }
        self.inner.insert(appointment).await
    }

    async fn find_by_id(&self, appointment_id: Uuid) -> Result<Option<Appointment>, AppointmentError> {
        self.inner.find_by_id(appointment_id).await
    }

    async fn booked_service_areas(&self, appointment_id: Uuid) -> Result<Vec<AppointmentServiceArea>, AppointmentError> {
        self.inner.booked_service_areas(appointment_id).await
    }

    async fn booked_services(&self, appointment_id: Uuid) -> Result<Vec<AppointmentService>, AppointmentError> {
        self.inner.booked_services(appointment_id).await
    }

    async fn update_with_version_guard(
        &self,
        appointment_id: Uuid,
        version: i32,
        patch: ReschedulePatch,
    ) -> Result<GuardedWrite, AppointmentError> {
        match &self.before_guarded_write {
            Interleave::Nothing => {}
            Interleave::BumpVersion => self.inner.bump_version(appointment_id).await,
            Interleave::Book(other) => self.inner.add_appointment(other.clone()).await,
        }
        self.inner.update_with_version_guard(appointment_id, version, patch).await
    }

    async fn cancel_confirmed(&self, appointment_id: Uuid) -> Result<Option<Appointment>, AppointmentError> {
        self.inner.cancel_confirmed(appointment_id).await
    }

    async fn find_active_by_phone(
        &self,
        clinic_id: Uuid,
        phone: &str,
        from: NaiveDate,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        self.inner.find_active_by_phone(clinic_id, phone, from).await
    }
}

fn manager_over(f: &Fixture, repository: InterleavingRepository) -> AppointmentLifecycleManager {
    AppointmentLifecycleManager::new(
        Arc::new(repository),
        Arc::new(f.store.clone()),
        Arc::new(f.schedule.clone()),
    )
}

#[tokio::test]
async fn test_failed_booking_write_leaves_nothing_behind() {
    let f = fixture().await;
    let mut repository = InterleavingRepository::new(f.store.clone());
    repository.reject_booking = true;
    let manager = manager_over(&f, repository);

    let result = manager
        .create(
            &f.clinic,
            request(
                &f,
                vec![
                    ServiceSelection::with_area(f.laser.id, f.legs.area_id),
                    ServiceSelection::service(f.massage.id),
                ],
                f.monday,
                time(9, 0),
            ),
        )
        .await;

    assert_matches!(result, Err(AppointmentError::DatabaseError(_)));
    assert_eq!(f.store.appointment_count().await, 0);
    assert!(f.manager.active_appointments_by_phone(&f.clinic, PHONE).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_booked_items_are_stored_with_the_appointment() {
    let f = fixture().await;
    let appointment = f
        .manager
        .create(
            &f.clinic,
            request(
                &f,
                vec![
                    ServiceSelection::with_area(f.laser.id, f.legs.area_id),
                    ServiceSelection::service(f.massage.id),
                ],
                f.monday,
                time(9, 0),
            ),
        )
        .await
        .unwrap();

    let areas = f.store.booked_service_areas(appointment.id).await.unwrap();
    let services = f.store.booked_services(appointment.id).await.unwrap();
    assert_eq!(areas.len(), 1);
    assert_eq!(areas[0].duration_minutes, 50);
    assert_eq!(services.len(), 1);
    assert_eq!(services[0].service_id, f.massage.id);

    let moved = f.manager.reschedule(appointment.id, f.monday, time(13, 0)).await.unwrap();
    assert_eq!(moved.end_time, time(14, 50));
}

#[tokio::test]
async fn test_version_change_between_read_and_write_is_optimistic_lock() {
    let f = fixture().await;
    let appointment = f
        .manager
        .create(&f.clinic, request(&f, vec![ServiceSelection::service(f.massage.id)], f.monday, time(10, 0)))
        .await
        .unwrap();

    let mut repository = InterleavingRepository::new(f.store.clone());
    repository.before_guarded_write = Interleave::BumpVersion;
    let manager = manager_over(&f, repository);

    let result = manager.reschedule(appointment.id, f.monday, time(14, 0)).await;
    assert_matches!(
        result,
        Err(AppointmentError::OptimisticLock { appointment_id, expected_version: 1 }) if appointment_id == appointment.id
    );

    let stored = f.manager.get(appointment.id).await.unwrap();
    assert_eq!(stored.start_time, time(10, 0));
    assert_eq!(stored.version, 2);
}

#[tokio::test]
async fn test_slot_taken_between_check_and_write_is_conflict() {
    let f = fixture().await;
    let appointment = f
        .manager
        .create(&f.clinic, request(&f, vec![ServiceSelection::service(f.massage.id)], f.monday, time(9, 0)))
        .await
        .unwrap();

    let rival = TestClinic::confirmed_appointment(f.clinic.id, f.massage.id, f.monday, time(13, 30), time(14, 30));
    let mut repository = InterleavingRepository::new(f.store.clone());
    repository.before_guarded_write = Interleave::Book(rival);
    let manager = manager_over(&f, repository);

    let result = manager.reschedule(appointment.id, f.monday, time(13, 0)).await;
    assert_matches!(
        result,
        Err(AppointmentError::Conflict { date, start, end })
            if date == f.monday && start == time(13, 0) && end == time(14, 0)
    );

    let stored = f.manager.get(appointment.id).await.unwrap();
    assert_eq!(stored.start_time, time(9, 0));
    assert_eq!(stored.version, 1);
}
