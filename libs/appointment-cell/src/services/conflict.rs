use chrono::{NaiveDate, NaiveTime};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use shared_models::Appointment;

use crate::models::{AppointmentError, ConflictCheckResponse};
use crate::services::repository::AppointmentRepository;

pub struct ConflictDetectionService {
    repository: Arc<dyn AppointmentRepository>,
}

impl ConflictDetectionService {
    pub fn new(repository: Arc<dyn AppointmentRepository>) -> Self {
        Self { repository }
    }

    /// Check for confirmed appointments overlapping `[start, end)` on `date`
    pub async fn check_conflicts(
        &self,
        clinic_id: Uuid,
        date: NaiveDate,
        start: NaiveTime,
        end: NaiveTime,
        exclude_appointment_id: Option<Uuid>,
    ) -> Result<ConflictCheckResponse, AppointmentError> {
        debug!("Checking conflicts for clinic {} on {} from {} to {}", clinic_id, date, start, end);

        let candidates = self
            .repository
            .query_conflicts(clinic_id, date, start, end, exclude_appointment_id)
            .await?;

        // The store query is range-based; re-filter so adapters with looser
        // predicates cannot report touching intervals as conflicts.
        let conflicting_appointments: Vec<Appointment> = candidates
            .into_iter()
            .filter(|apt| apt.is_confirmed() && Some(apt.id) != exclude_appointment_id && apt.overlaps(start, end))
            .collect();

        let has_conflict = !conflicting_appointments.is_empty();
        if has_conflict {
            warn!(
                "Conflict detected for clinic {} on {} - {} conflicting appointments",
                clinic_id,
                date,
                conflicting_appointments.len()
            );
        }

        Ok(ConflictCheckResponse {
            has_conflict,
            conflicting_appointments,
        })
    }

    /// Fails with `Conflict` when the interval is not free.
    pub async fn ensure_free(
        &self,
        clinic_id: Uuid,
        date: NaiveDate,
        start: NaiveTime,
        end: NaiveTime,
        exclude_appointment_id: Option<Uuid>,
    ) -> Result<(), AppointmentError> {
        let response = self
            .check_conflicts(clinic_id, date, start, end, exclude_appointment_id)
            .await?;
        if response.has_conflict {
            return Err(AppointmentError::Conflict { date, start, end });
        }
        Ok(())
    }
}
