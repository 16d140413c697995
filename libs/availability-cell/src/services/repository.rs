use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use shared_models::{Appointment, Clinic};

use crate::models::{AvailabilityError, AvailabilityException, AvailabilityRule};

/// Read side of a clinic's schedule configuration.
#[async_trait]
pub trait ScheduleRepository: Send + Sync {
    async fn clinic(&self, clinic_id: Uuid) -> Result<Option<Clinic>, AvailabilityError>;

    /// Active rules matching the date's weekday or the exact date.
    async fn rules_for_date(
        &self,
        clinic_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<AvailabilityRule>, AvailabilityError>;

    async fn exception_for_date(
        &self,
        clinic_id: Uuid,
        date: NaiveDate,
    ) -> Result<Option<AvailabilityException>, AvailabilityError>;
}

/// Source of already-booked time. Implemented by whichever store owns the
/// appointments table.
#[async_trait]
pub trait BookedTimeReader: Send + Sync {
    async fn confirmed_on(
        &self,
        clinic_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<Appointment>, AvailabilityError>;
}

#[derive(Default)]
struct ScheduleData {
    clinics: HashMap<Uuid, Clinic>,
    rules: Vec<AvailabilityRule>,
    exceptions: Vec<AvailabilityException>,
    appointments: Vec<Appointment>,
}

/// In-memory schedule store for tests and local runs.
#[derive(Clone, Default)]
pub struct InMemoryScheduleRepository {
    data: Arc<RwLock<ScheduleData>>,
}

impl InMemoryScheduleRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_clinic(&self, clinic: Clinic) {
        self.data.write().await.clinics.insert(clinic.id, clinic);
    }

    pub async fn add_rule(&self, rule: AvailabilityRule) {
        self.data.write().await.rules.push(rule);
    }

    pub async fn add_exception(&self, exception: AvailabilityException) {
        self.data.write().await.exceptions.push(exception);
    }

    /// Booked time served through [`BookedTimeReader`] when no appointment
    /// store is plugged in.
    pub async fn add_appointment(&self, appointment: Appointment) {
        self.data.write().await.appointments.push(appointment);
    }
}

#[async_trait]
impl ScheduleRepository for InMemoryScheduleRepository {
    async fn clinic(&self, clinic_id: Uuid) -> Result<Option<Clinic>, AvailabilityError> {
        Ok(self.data.read().await.clinics.get(&clinic_id).cloned())
    }

    async fn rules_for_date(
        &self,
        clinic_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<AvailabilityRule>, AvailabilityError> {
        let data = self.data.read().await;
        Ok(data
            .rules
            .iter()
            .filter(|rule| rule.clinic_id == clinic_id && rule.is_active && rule.applies_to(date))
            .cloned()
            .collect())
    }

    async fn exception_for_date(
        &self,
        clinic_id: Uuid,
        date: NaiveDate,
    ) -> Result<Option<AvailabilityException>, AvailabilityError> {
        let data = self.data.read().await;
        Ok(data
            .exceptions
            .iter()
            .find(|exception| exception.clinic_id == clinic_id && exception.date == date)
            .cloned())
    }
}

#[async_trait]
impl BookedTimeReader for InMemoryScheduleRepository {
    async fn confirmed_on(
        &self,
        clinic_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<Appointment>, AvailabilityError> {
        let data = self.data.read().await;
        Ok(data
            .appointments
            .iter()
            .filter(|a| a.clinic_id == clinic_id && a.appointment_date == date && a.is_confirmed())
            .cloned()
            .collect())
    }
}
