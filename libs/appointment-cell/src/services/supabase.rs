use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use shared_database::supabase::SupabaseClient;
use shared_models::{Appointment, FaqEntry, Patient, Service, ServiceArea};

use crate::models::{
    AppointmentError, AppointmentService, AppointmentServiceArea, GuardedWrite, InsertOutcome,
    NewAppointment, ReschedulePatch,
};
use crate::services::repository::{AppointmentRepository, CatalogReader};

/// Result shape shared by the booking RPC functions in `migrations/`.
#[derive(Debug, Deserialize)]
struct SlotWriteResult {
    outcome: String,
    appointment: Option<Appointment>,
}

pub struct SupabaseAppointmentRepository {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseAppointmentRepository {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    async fn fetch(&self, path: &str) -> Result<Vec<Value>, AppointmentError> {
        self.supabase
            .request(Method::GET, path, None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))
    }

    async fn fetch_one<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<Option<T>, AppointmentError> {
        let rows: Vec<T> = decode(self.fetch(path).await?)?;
        Ok(rows.into_iter().next())
    }

    async fn call_slot_function(&self, function: &str, args: Value) -> Result<SlotWriteResult, AppointmentError> {
        debug!("Calling {} with {}", function, args);
        self.supabase
            .rpc(function, args)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))
    }
}

fn decode<T: serde::de::DeserializeOwned>(rows: Vec<Value>) -> Result<Vec<T>, AppointmentError> {
    rows.into_iter()
        .map(serde_json::from_value)
        .collect::<Result<Vec<T>, _>>()
        .map_err(|e| AppointmentError::DatabaseError(format!("Failed to parse row: {}", e)))
}

fn missing_row(function: &str) -> AppointmentError {
    AppointmentError::DatabaseError(format!("{} reported success without a row", function))
}

#[async_trait]
impl AppointmentRepository for SupabaseAppointmentRepository {
    async fn find_patient(&self, clinic_id: Uuid, phone: &str) -> Result<Option<Patient>, AppointmentError> {
        let path = format!(
            "/rest/v1/patients?clinic_id=eq.{}&phone=eq.{}&limit=1",
            clinic_id,
            urlencoding::encode(phone)
        );
        self.fetch_one(&path).await
    }

    async fn find_or_create_patient(
        &self,
        clinic_id: Uuid,
        phone: &str,
        name: Option<&str>,
    ) -> Result<Patient, AppointmentError> {
        if let Some(patient) = self.find_patient(clinic_id, phone).await? {
            return Ok(patient);
        }

        let body = json!({
            "clinic_id": clinic_id,
            "phone": phone,
            "name": name,
        });

        match self.supabase.write_returning(Method::POST, "/rest/v1/patients", body).await {
            Ok(rows) => decode::<Patient>(rows)?
                .into_iter()
                .next()
                .ok_or_else(|| missing_row("patients insert")),
            Err(e) if e.to_string().contains("Constraint violation") => {
                // another turn created the same (clinic, phone) first
                debug!("Patient {} created concurrently for clinic {}", phone, clinic_id);
                self.find_patient(clinic_id, phone)
                    .await?
                    .ok_or_else(|| AppointmentError::DatabaseError(e.to_string()))
            }
            Err(e) => Err(AppointmentError::DatabaseError(e.to_string())),
        }
    }

    async fn query_conflicts(
        &self,
        clinic_id: Uuid,
        date: NaiveDate,
        start: NaiveTime,
        end: NaiveTime,
        exclude_id: Option<Uuid>,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let mut query_parts = vec![
            format!("clinic_id=eq.{}", clinic_id),
            format!("appointment_date=eq.{}", date),
            "status=eq.confirmed".to_string(),
            format!("start_time=lt.{}", end),
            format!("end_time=gt.{}", start),
        ];
        if let Some(exclude_id) = exclude_id {
            query_parts.push(format!("id=neq.{}", exclude_id));
        }

        let path = format!("/rest/v1/appointments?{}&order=start_time.asc", query_parts.join("&"));
        decode(self.fetch(&path).await?)
    }

    async fn insert(&self, new: NewAppointment) -> Result<InsertOutcome, AppointmentError> {
        let args = json!({
            "p_id": new.id,
            "p_clinic_id": new.clinic_id,
            "p_patient_id": new.patient_id,
            "p_professional_id": new.professional_id,
            "p_service_id": new.service_id,
            "p_appointment_date": new.appointment_date,
            "p_start_time": new.start_time,
            "p_end_time": new.end_time,
            "p_duration_minutes": new.duration_minutes,
            "p_notes": new.notes,
            "p_service_areas": new.service_areas,
            "p_services": new.services,
        });

        let result = self.call_slot_function("book_appointment_slot", args).await?;
        match result.outcome.as_str() {
            "inserted" => result
                .appointment
                .map(InsertOutcome::Inserted)
                .ok_or_else(|| missing_row("book_appointment_slot")),
            "slot_taken" => Ok(InsertOutcome::SlotTaken),
            other => Err(AppointmentError::DatabaseError(format!(
                "Unexpected book_appointment_slot outcome: {}",
                other
            ))),
        }
    }

    async fn find_by_id(&self, appointment_id: Uuid) -> Result<Option<Appointment>, AppointmentError> {
        let path = format!("/rest/v1/appointments?id=eq.{}&limit=1", appointment_id);
        self.fetch_one(&path).await
    }

    async fn booked_service_areas(&self, appointment_id: Uuid) -> Result<Vec<AppointmentServiceArea>, AppointmentError> {
        let path = format!("/rest/v1/appointment_service_areas?appointment_id=eq.{}", appointment_id);
        decode(self.fetch(&path).await?)
    }

    async fn booked_services(&self, appointment_id: Uuid) -> Result<Vec<AppointmentService>, AppointmentError> {
        let path = format!("/rest/v1/appointment_services?appointment_id=eq.{}", appointment_id);
        decode(self.fetch(&path).await?)
    }

    async fn update_with_version_guard(
        &self,
        appointment_id: Uuid,
        version: i32,
        patch: ReschedulePatch,
    ) -> Result<GuardedWrite, AppointmentError> {
        let args = json!({
            "p_appointment_id": appointment_id,
            "p_expected_version": version,
            "p_appointment_date": patch.appointment_date,
            "p_start_time": patch.start_time,
            "p_end_time": patch.end_time,
        });

        let result = self.call_slot_function("reschedule_appointment_slot", args).await?;
        match result.outcome.as_str() {
            "applied" => result
                .appointment
                .map(GuardedWrite::Applied)
                .ok_or_else(|| missing_row("reschedule_appointment_slot")),
            "version_mismatch" => Ok(GuardedWrite::VersionMismatch),
            "slot_taken" => Ok(GuardedWrite::SlotTaken),
            other => Err(AppointmentError::DatabaseError(format!(
                "Unexpected reschedule_appointment_slot outcome: {}",
                other
            ))),
        }
    }

    async fn cancel_confirmed(&self, appointment_id: Uuid) -> Result<Option<Appointment>, AppointmentError> {
        let result = self
            .call_slot_function("cancel_appointment", json!({ "p_appointment_id": appointment_id }))
            .await?;
        match result.outcome.as_str() {
            "cancelled" => Ok(result.appointment),
            "not_found" => Ok(None),
            other => Err(AppointmentError::DatabaseError(format!(
                "Unexpected cancel_appointment outcome: {}",
                other
            ))),
        }
    }

    async fn find_active_by_phone(
        &self,
        clinic_id: Uuid,
        phone: &str,
        from: NaiveDate,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let Some(patient) = self.find_patient(clinic_id, phone).await? else {
            return Ok(Vec::new());
        };

        let path = format!(
            "/rest/v1/appointments?clinic_id=eq.{}&patient_id=eq.{}&status=eq.confirmed&appointment_date=gte.{}&order=appointment_date.asc,start_time.asc",
            clinic_id, patient.id, from
        );
        decode(self.fetch(&path).await?)
    }
}

#[async_trait]
impl CatalogReader for SupabaseAppointmentRepository {
    async fn services(&self, clinic_id: Uuid) -> Result<Vec<Service>, AppointmentError> {
        let path = format!("/rest/v1/services?clinic_id=eq.{}&is_active=eq.true&order=name.asc", clinic_id);
        decode(self.fetch(&path).await?)
    }

    async fn service(&self, service_id: Uuid) -> Result<Option<Service>, AppointmentError> {
        let path = format!("/rest/v1/services?id=eq.{}&limit=1", service_id);
        self.fetch_one(&path).await
    }

    async fn service_areas(&self, service_id: Uuid) -> Result<Vec<ServiceArea>, AppointmentError> {
        let path = format!(
            "/rest/v1/service_area_details?service_id=eq.{}&is_active=eq.true&order=area_name.asc",
            service_id
        );
        decode(self.fetch(&path).await?)
    }

    async fn service_area(&self, service_id: Uuid, area_id: Uuid) -> Result<Option<ServiceArea>, AppointmentError> {
        let path = format!(
            "/rest/v1/service_area_details?service_id=eq.{}&area_id=eq.{}&is_active=eq.true&limit=1",
            service_id, area_id
        );
        self.fetch_one(&path).await
    }

    async fn faq_entries(&self, clinic_id: Uuid) -> Result<Vec<FaqEntry>, AppointmentError> {
        let path = format!("/rest/v1/faq_entries?clinic_id=eq.{}&order=position.asc", clinic_id);
        decode(self.fetch(&path).await?)
    }
}
