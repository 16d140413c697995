use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use uuid::Uuid;

use shared_models::{Appointment, FaqEntry, Patient, Service, ServiceArea};

use crate::models::{
    AppointmentError, AppointmentService, AppointmentServiceArea, GuardedWrite, InsertOutcome,
    NewAppointment, ReschedulePatch,
};

/// Durable store of patients and appointments.
///
/// `insert` and `update_with_version_guard` must re-check that no other
/// confirmed appointment overlaps the written interval as part of the same
/// write; the conflict query alone leaves a race window between two writers.
#[async_trait]
pub trait AppointmentRepository: Send + Sync {
    async fn find_patient(&self, clinic_id: Uuid, phone: &str) -> Result<Option<Patient>, AppointmentError>;

    async fn find_or_create_patient(
        &self,
        clinic_id: Uuid,
        phone: &str,
        name: Option<&str>,
    ) -> Result<Patient, AppointmentError>;

    /// Confirmed appointments on `date` overlapping `[start, end)`.
    async fn query_conflicts(
        &self,
        clinic_id: Uuid,
        date: NaiveDate,
        start: NaiveTime,
        end: NaiveTime,
        exclude_id: Option<Uuid>,
    ) -> Result<Vec<Appointment>, AppointmentError>;

    /// Writes the appointment row and its item rows in one transaction;
    /// either all of them are stored or none.
    async fn insert(&self, appointment: NewAppointment) -> Result<InsertOutcome, AppointmentError>;

    async fn find_by_id(&self, appointment_id: Uuid) -> Result<Option<Appointment>, AppointmentError>;

    async fn booked_service_areas(&self, appointment_id: Uuid) -> Result<Vec<AppointmentServiceArea>, AppointmentError>;

    async fn booked_services(&self, appointment_id: Uuid) -> Result<Vec<AppointmentService>, AppointmentError>;

    /// `UPDATE ... WHERE id = ? AND version = ? AND status = 'confirmed'`,
    /// bumping the version on success.
    async fn update_with_version_guard(
        &self,
        appointment_id: Uuid,
        version: i32,
        patch: ReschedulePatch,
    ) -> Result<GuardedWrite, AppointmentError>;

    /// `UPDATE ... WHERE id = ? AND status = 'confirmed'`; `None` when no row matched.
    async fn cancel_confirmed(&self, appointment_id: Uuid) -> Result<Option<Appointment>, AppointmentError>;

    /// Confirmed appointments for the patient on or after `from`, ordered by date and time.
    async fn find_active_by_phone(
        &self,
        clinic_id: Uuid,
        phone: &str,
        from: NaiveDate,
    ) -> Result<Vec<Appointment>, AppointmentError>;
}

/// Read-only catalogue queries shared by booking and the chat flow.
#[async_trait]
pub trait CatalogReader: Send + Sync {
    async fn services(&self, clinic_id: Uuid) -> Result<Vec<Service>, AppointmentError>;

    async fn service(&self, service_id: Uuid) -> Result<Option<Service>, AppointmentError>;

    /// Active areas configured for a service.
    async fn service_areas(&self, service_id: Uuid) -> Result<Vec<ServiceArea>, AppointmentError>;

    async fn service_area(&self, service_id: Uuid, area_id: Uuid) -> Result<Option<ServiceArea>, AppointmentError>;

    async fn faq_entries(&self, clinic_id: Uuid) -> Result<Vec<FaqEntry>, AppointmentError>;
}
