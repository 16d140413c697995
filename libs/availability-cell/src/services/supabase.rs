use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Method;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use shared_database::supabase::SupabaseClient;
use shared_models::{day_of_week_index, Appointment, Clinic};

use crate::models::{
    AvailabilityError, AvailabilityException, AvailabilityExceptionRow, AvailabilityRule,
    AvailabilityRuleRow,
};
use crate::services::repository::{BookedTimeReader, ScheduleRepository};

pub struct SupabaseScheduleRepository {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseScheduleRepository {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    async fn fetch(&self, path: &str) -> Result<Vec<Value>, AvailabilityError> {
        self.supabase
            .request(Method::GET, path, None)
            .await
            .map_err(|e| AvailabilityError::DatabaseError(e.to_string()))
    }
}

fn decode<T: serde::de::DeserializeOwned>(rows: Vec<Value>) -> Result<Vec<T>, AvailabilityError> {
    rows.into_iter()
        .map(serde_json::from_value)
        .collect::<Result<Vec<T>, _>>()
        .map_err(|e| AvailabilityError::DatabaseError(format!("Failed to parse row: {}", e)))
}

#[async_trait]
impl ScheduleRepository for SupabaseScheduleRepository {
    async fn clinic(&self, clinic_id: Uuid) -> Result<Option<Clinic>, AvailabilityError> {
        let path = format!("/rest/v1/clinics?id=eq.{}&limit=1", clinic_id);
        let clinics: Vec<Clinic> = decode(self.fetch(&path).await?)?;
        Ok(clinics.into_iter().next())
    }

    async fn rules_for_date(
        &self,
        clinic_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<AvailabilityRule>, AvailabilityError> {
        let path = format!(
            "/rest/v1/availability_rules?clinic_id=eq.{}&is_active=eq.true&or=(day_of_week.eq.{},specific_date.eq.{})&order=start_time.asc",
            clinic_id,
            day_of_week_index(date),
            date
        );
        let rows: Vec<AvailabilityRuleRow> = decode(self.fetch(&path).await?)?;

        // A malformed row only loses its own window; the rest of the day stays bookable.
        let rules = rows
            .into_iter()
            .filter_map(|row| match AvailabilityRule::try_from(row) {
                Ok(rule) => Some(rule),
                Err(e) => {
                    warn!("Skipping invalid availability rule for clinic {}: {}", clinic_id, e);
                    None
                }
            })
            .collect::<Vec<_>>();

        debug!("Loaded {} availability rules for clinic {} on {}", rules.len(), clinic_id, date);
        Ok(rules)
    }

    async fn exception_for_date(
        &self,
        clinic_id: Uuid,
        date: NaiveDate,
    ) -> Result<Option<AvailabilityException>, AvailabilityError> {
        let path = format!(
            "/rest/v1/availability_exceptions?clinic_id=eq.{}&exception_date=eq.{}&limit=1",
            clinic_id, date
        );
        let rows: Vec<AvailabilityExceptionRow> = decode(self.fetch(&path).await?)?;

        rows.into_iter()
            .next()
            .map(AvailabilityException::try_from)
            .transpose()
    }
}

#[async_trait]
impl BookedTimeReader for SupabaseScheduleRepository {
    async fn confirmed_on(
        &self,
        clinic_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<Appointment>, AvailabilityError> {
        let path = format!(
            "/rest/v1/appointments?clinic_id=eq.{}&appointment_date=eq.{}&status=eq.confirmed&order=start_time.asc",
            clinic_id, date
        );
        decode(self.fetch(&path).await?)
    }
}
