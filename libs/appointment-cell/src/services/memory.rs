use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use availability_cell::models::AvailabilityError;
use availability_cell::services::BookedTimeReader;
use shared_models::{Appointment, AppointmentStatus, FaqEntry, Patient, Service, ServiceArea};

use crate::models::{
    AppointmentError, AppointmentService, AppointmentServiceArea, GuardedWrite, InsertOutcome,
    NewAppointment, ReschedulePatch,
};
use crate::services::repository::{AppointmentRepository, CatalogReader};

#[derive(Default)]
struct StoreData {
    patients: Vec<Patient>,
    appointments: HashMap<Uuid, Appointment>,
    booked_service_areas: Vec<AppointmentServiceArea>,
    booked_services: Vec<AppointmentService>,
    services: Vec<Service>,
    service_areas: Vec<ServiceArea>,
    faq: Vec<FaqEntry>,
}

impl StoreData {
    fn slot_taken(
        &self,
        clinic_id: Uuid,
        date: NaiveDate,
        start: NaiveTime,
        end: NaiveTime,
        exclude_id: Option<Uuid>,
    ) -> bool {
        self.appointments.values().any(|a| {
            a.clinic_id == clinic_id
                && a.appointment_date == date
                && a.is_confirmed()
                && Some(a.id) != exclude_id
                && a.overlaps(start, end)
        })
    }
}

/// In-memory appointment store and catalogue. Check-and-write happens under
/// one write lock, which gives the same guarantee the SQL functions give.
#[derive(Clone, Default)]
pub struct InMemoryAppointmentStore {
    data: Arc<RwLock<StoreData>>,
}

impl InMemoryAppointmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_service(&self, service: Service) {
        self.data.write().await.services.push(service);
    }

    pub async fn add_service_area(&self, service_area: ServiceArea) {
        self.data.write().await.service_areas.push(service_area);
    }

    pub async fn add_faq(&self, entry: FaqEntry) {
        self.data.write().await.faq.push(entry);
    }

    pub async fn add_appointment(&self, appointment: Appointment) {
        self.data.write().await.appointments.insert(appointment.id, appointment);
    }

    /// Simulates another writer touching the row between read and write.
    pub async fn bump_version(&self, appointment_id: Uuid) {
        if let Some(appointment) = self.data.write().await.appointments.get_mut(&appointment_id) {
            appointment.version += 1;
            appointment.updated_at = Utc::now();
        }
    }

    pub async fn appointment_count(&self) -> usize {
        self.data.read().await.appointments.len()
    }
}

#[async_trait]
impl AppointmentRepository for InMemoryAppointmentStore {
    async fn find_patient(&self, clinic_id: Uuid, phone: &str) -> Result<Option<Patient>, AppointmentError> {
        let data = self.data.read().await;
        Ok(data
            .patients
            .iter()
            .find(|p| p.clinic_id == clinic_id && p.phone == phone)
            .cloned())
    }

    async fn find_or_create_patient(
        &self,
        clinic_id: Uuid,
        phone: &str,
        name: Option<&str>,
    ) -> Result<Patient, AppointmentError> {
        let mut data = self.data.write().await;
        if let Some(existing) = data
            .patients
            .iter()
            .find(|p| p.clinic_id == clinic_id && p.phone == phone)
        {
            return Ok(existing.clone());
        }

        let patient = Patient {
            id: Uuid::new_v4(),
            clinic_id,
            phone: phone.to_string(),
            name: name.map(str::to_string),
            created_at: Utc::now(),
        };
        data.patients.push(patient.clone());
        Ok(patient)
    }

    async fn query_conflicts(
        &self,
        clinic_id: Uuid,
        date: NaiveDate,
        start: NaiveTime,
        end: NaiveTime,
        exclude_id: Option<Uuid>,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let data = self.data.read().await;
        let mut conflicts: Vec<Appointment> = data
            .appointments
            .values()
            .filter(|a| {
                a.clinic_id == clinic_id
                    && a.appointment_date == date
                    && a.is_confirmed()
                    && Some(a.id) != exclude_id
                    && a.overlaps(start, end)
            })
            .cloned()
            .collect();
        conflicts.sort_by_key(|a| a.start_time);
        Ok(conflicts)
    }

    async fn insert(&self, new: NewAppointment) -> Result<InsertOutcome, AppointmentError> {
        let mut data = self.data.write().await;
        if data.slot_taken(new.clinic_id, new.appointment_date, new.start_time, new.end_time, None) {
            return Ok(InsertOutcome::SlotTaken);
        }

        let now = Utc::now();
        let appointment = Appointment {
            id: new.id,
            clinic_id: new.clinic_id,
            patient_id: new.patient_id,
            professional_id: new.professional_id,
            service_id: new.service_id,
            appointment_date: new.appointment_date,
            start_time: new.start_time,
            end_time: new.end_time,
            duration_minutes: new.duration_minutes,
            status: AppointmentStatus::Confirmed,
            version: 1,
            notes: new.notes,
            created_at: now,
            updated_at: now,
        };
        data.appointments.insert(appointment.id, appointment.clone());
        data.booked_service_areas.extend(new.service_areas);
        data.booked_services.extend(new.services);
        Ok(InsertOutcome::Inserted(appointment))
    }

    async fn find_by_id(&self, appointment_id: Uuid) -> Result<Option<Appointment>, AppointmentError> {
        Ok(self.data.read().await.appointments.get(&appointment_id).cloned())
    }

    async fn booked_service_areas(&self, appointment_id: Uuid) -> Result<Vec<AppointmentServiceArea>, AppointmentError> {
        let data = self.data.read().await;
        Ok(data
            .booked_service_areas
            .iter()
            .filter(|row| row.appointment_id == appointment_id)
            .cloned()
            .collect())
    }

    async fn booked_services(&self, appointment_id: Uuid) -> Result<Vec<AppointmentService>, AppointmentError> {
        let data = self.data.read().await;
        Ok(data
            .booked_services
            .iter()
            .filter(|row| row.appointment_id == appointment_id)
            .cloned()
            .collect())
    }

    async fn update_with_version_guard(
        &self,
        appointment_id: Uuid,
        version: i32,
        patch: ReschedulePatch,
    ) -> Result<GuardedWrite, AppointmentError> {
        let mut data = self.data.write().await;

        let clinic_id = match data.appointments.get(&appointment_id) {
            Some(current) if current.version == version && current.is_confirmed() => current.clinic_id,
            _ => return Ok(GuardedWrite::VersionMismatch),
        };

        if data.slot_taken(
            clinic_id,
            patch.appointment_date,
            patch.start_time,
            patch.end_time,
            Some(appointment_id),
        ) {
            return Ok(GuardedWrite::SlotTaken);
        }

        let Some(appointment) = data.appointments.get_mut(&appointment_id) else {
            return Ok(GuardedWrite::VersionMismatch);
        };
        appointment.appointment_date = patch.appointment_date;
        appointment.start_time = patch.start_time;
        appointment.end_time = patch.end_time;
        appointment.version += 1;
        appointment.updated_at = Utc::now();
        Ok(GuardedWrite::Applied(appointment.clone()))
    }

    async fn cancel_confirmed(&self, appointment_id: Uuid) -> Result<Option<Appointment>, AppointmentError> {
        let mut data = self.data.write().await;
        match data.appointments.get_mut(&appointment_id) {
            Some(appointment) if appointment.is_confirmed() => {
                appointment.status = AppointmentStatus::Cancelled;
                appointment.version += 1;
                appointment.updated_at = Utc::now();
                Ok(Some(appointment.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn find_active_by_phone(
        &self,
        clinic_id: Uuid,
        phone: &str,
        from: NaiveDate,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let data = self.data.read().await;
        let Some(patient) = data
            .patients
            .iter()
            .find(|p| p.clinic_id == clinic_id && p.phone == phone)
        else {
            return Ok(Vec::new());
        };

        let mut active: Vec<Appointment> = data
            .appointments
            .values()
            .filter(|a| {
                a.clinic_id == clinic_id
                    && a.patient_id == patient.id
                    && a.is_confirmed()
                    && a.appointment_date >= from
            })
            .cloned()
            .collect();
        active.sort_by_key(|a| (a.appointment_date, a.start_time));
        Ok(active)
    }
}

#[async_trait]
impl CatalogReader for InMemoryAppointmentStore {
    async fn services(&self, clinic_id: Uuid) -> Result<Vec<Service>, AppointmentError> {
        let data = self.data.read().await;
        let mut services: Vec<Service> = data
            .services
            .iter()
            .filter(|s| s.clinic_id == clinic_id && s.is_active)
            .cloned()
            .collect();
        services.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(services)
    }

    async fn service(&self, service_id: Uuid) -> Result<Option<Service>, AppointmentError> {
        let data = self.data.read().await;
        Ok(data.services.iter().find(|s| s.id == service_id).cloned())
    }

    async fn service_areas(&self, service_id: Uuid) -> Result<Vec<ServiceArea>, AppointmentError> {
        let data = self.data.read().await;
        let mut areas: Vec<ServiceArea> = data
            .service_areas
            .iter()
            .filter(|sa| sa.service_id == service_id && sa.is_active)
            .cloned()
            .collect();
        areas.sort_by(|a, b| a.area_name.cmp(&b.area_name));
        Ok(areas)
    }

    async fn service_area(&self, service_id: Uuid, area_id: Uuid) -> Result<Option<ServiceArea>, AppointmentError> {
        let data = self.data.read().await;
        Ok(data
            .service_areas
            .iter()
            .find(|sa| sa.service_id == service_id && sa.area_id == area_id && sa.is_active)
            .cloned())
    }

    async fn faq_entries(&self, clinic_id: Uuid) -> Result<Vec<FaqEntry>, AppointmentError> {
        let data = self.data.read().await;
        let mut entries: Vec<FaqEntry> = data.faq.iter().filter(|f| f.clinic_id == clinic_id).cloned().collect();
        entries.sort_by_key(|f| f.position);
        Ok(entries)
    }
}

#[async_trait]
impl BookedTimeReader for InMemoryAppointmentStore {
    async fn confirmed_on(&self, clinic_id: Uuid, date: NaiveDate) -> Result<Vec<Appointment>, AvailabilityError> {
        let data = self.data.read().await;
        let mut booked: Vec<Appointment> = data
            .appointments
            .values()
            .filter(|a| a.clinic_id == clinic_id && a.appointment_date == date && a.is_confirmed())
            .cloned()
            .collect();
        booked.sort_by_key(|a| a.start_time);
        Ok(booked)
    }
}
