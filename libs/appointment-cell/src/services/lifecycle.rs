// libs/appointment-cell/src/services/lifecycle.rs
use chrono::{Days, NaiveDate, NaiveTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use availability_cell::services::calculator::DEFAULT_SEARCH_HORIZON_DAYS;
use availability_cell::services::ScheduleRepository;
use shared_models::{minutes_of_day, time_from_minutes, Appointment, Clinic, ServiceSelection};

use crate::models::{
    AppointmentError, AppointmentService, AppointmentServiceArea, AppointmentSummary, BookingQuote,
    CreateAppointmentRequest, GuardedWrite, InsertOutcome, NewAppointment, ReschedulePatch, SyncAction,
};
use crate::services::conflict::ConflictDetectionService;
use crate::services::pricing::PricingService;
use crate::services::repository::{AppointmentRepository, CatalogReader};
use crate::services::side_effects::{ReminderScheduler, SideEffects, SpreadsheetMirror};

/// Creates, reschedules and cancels appointments.
///
/// An appointment is `confirmed` from creation until it is cancelled.
/// Reschedules keep it confirmed and advance `version`. Conflict,
/// NotFound and OptimisticLock are returned to the caller and never retried here.
pub struct AppointmentLifecycleManager {
    repository: Arc<dyn AppointmentRepository>,
    catalog: Arc<dyn CatalogReader>,
    schedule: Arc<dyn ScheduleRepository>,
    conflicts: ConflictDetectionService,
    pricing: PricingService,
    side_effects: SideEffects,
    horizon_days: i64,
}

impl AppointmentLifecycleManager {
    pub fn new(
        repository: Arc<dyn AppointmentRepository>,
        catalog: Arc<dyn CatalogReader>,
        schedule: Arc<dyn ScheduleRepository>,
    ) -> Self {
        Self {
            conflicts: ConflictDetectionService::new(repository.clone()),
            pricing: PricingService::new(catalog.clone()),
            repository,
            catalog,
            schedule,
            side_effects: SideEffects::new(),
            horizon_days: DEFAULT_SEARCH_HORIZON_DAYS,
        }
    }

    pub fn with_reminders(mut self, reminders: Arc<dyn ReminderScheduler>) -> Self {
        self.side_effects = self.side_effects.with_reminders(reminders);
        self
    }

    pub fn with_spreadsheet_mirror(mut self, mirror: Arc<dyn SpreadsheetMirror>) -> Self {
        self.side_effects = self.side_effects.with_spreadsheet(mirror);
        self
    }

    pub fn with_horizon_days(mut self, horizon_days: i64) -> Self {
        self.horizon_days = horizon_days.max(1);
        self
    }

    pub fn catalog(&self) -> Arc<dyn CatalogReader> {
        self.catalog.clone()
    }

    pub async fn clinic(&self, clinic_id: Uuid) -> Result<Clinic, AppointmentError> {
        self.schedule
            .clinic(clinic_id)
            .await?
            .ok_or_else(|| AppointmentError::NotFound(format!("Clinic {}", clinic_id)))
    }

    /// Effective duration and price for a set of selections.
    pub async fn quote(&self, clinic_id: Uuid, selections: &[ServiceSelection]) -> Result<BookingQuote, AppointmentError> {
        self.pricing.quote(clinic_id, selections).await
    }

    // ==============================================================================
    // CREATE
    // ==============================================================================

    pub async fn create(
        &self,
        clinic: &Clinic,
        request: CreateAppointmentRequest,
    ) -> Result<Appointment, AppointmentError> {
        info!(
            "Creating appointment for clinic {} on {} at {}",
            clinic.id, request.appointment_date, request.start_time
        );

        if request.clinic_id != clinic.id {
            return Err(AppointmentError::ValidationError(
                "Request clinic does not match".to_string(),
            ));
        }
        let phone = request.phone.trim();
        if phone.is_empty() {
            return Err(AppointmentError::ValidationError("Phone is required".to_string()));
        }
        self.validate_booking_date(clinic, request.appointment_date, request.start_time)?;

        let patient = self
            .repository
            .find_or_create_patient(clinic.id, phone, request.patient_name.as_deref())
            .await?;

        let quote = self.pricing.quote(clinic.id, &request.selections).await?;
        let duration_minutes = match request.duration_override {
            Some(minutes) if minutes <= 0 => {
                return Err(AppointmentError::ValidationError(format!(
                    "Duration must be positive, got {}",
                    minutes
                )))
            }
            Some(minutes) => minutes,
            None => quote.total_duration_minutes,
        };
        let end_time = end_of_block(request.start_time, duration_minutes)?;

        self.conflicts
            .ensure_free(clinic.id, request.appointment_date, request.start_time, end_time, None)
            .await?;

        // The first item identifies the appointment row; the junction rows carry the rest.
        let primary_service = quote
            .items
            .first()
            .map(|item| item.service_id)
            .ok_or_else(|| AppointmentError::ValidationError("At least one service must be selected".to_string()))?;

        let appointment_id = Uuid::new_v4();
        let (service_areas, services) = booked_items(appointment_id, &quote);
        let new_appointment = NewAppointment {
            id: appointment_id,
            clinic_id: clinic.id,
            patient_id: patient.id,
            professional_id: request.professional_id,
            service_id: primary_service,
            appointment_date: request.appointment_date,
            start_time: request.start_time,
            end_time,
            duration_minutes,
            notes: request.notes,
            service_areas,
            services,
        };

        let appointment = match self.repository.insert(new_appointment).await? {
            InsertOutcome::Inserted(appointment) => appointment,
            InsertOutcome::SlotTaken => {
                warn!(
                    "Slot {} {}-{} taken between check and insert for clinic {}",
                    request.appointment_date, request.start_time, end_time, clinic.id
                );
                return Err(AppointmentError::Conflict {
                    date: request.appointment_date,
                    start: request.start_time,
                    end: end_time,
                });
            }
        };

        self.side_effects.after_write(&appointment, SyncAction::Created).await;

        info!(
            "Appointment {} created for patient {} ({} minutes)",
            appointment.id, patient.id, duration_minutes
        );
        Ok(appointment)
    }

    // ==============================================================================
    // READ
    // ==============================================================================

    pub async fn get(&self, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        self.repository
            .find_by_id(appointment_id)
            .await?
            .ok_or_else(|| AppointmentError::NotFound(format!("Appointment {}", appointment_id)))
    }

    /// Confirmed appointments that have not started yet, soonest first.
    pub async fn active_appointments_by_phone(
        &self,
        clinic: &Clinic,
        phone: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let now = Utc::now();
        let today = clinic.local_today(now);
        let time_now = clinic.local_time(now);

        let appointments = self
            .repository
            .find_active_by_phone(clinic.id, phone.trim(), today)
            .await?
            .into_iter()
            .filter(|a| a.is_confirmed())
            .filter(|a| a.appointment_date > today || a.start_time > time_now)
            .collect::<Vec<_>>();

        debug!("Found {} active appointments for {} at clinic {}", appointments.len(), phone, clinic.id);
        Ok(appointments)
    }

    /// Appointment with the labels of what was booked.
    pub async fn summary(&self, appointment: &Appointment) -> Result<AppointmentSummary, AppointmentError> {
        let areas = self.repository.booked_service_areas(appointment.id).await?;
        let services = self.repository.booked_services(appointment.id).await?;

        let mut item_labels: Vec<String> = areas
            .iter()
            .map(|row| format!("{} - {}", row.service_name, row.area_name))
            .collect();
        item_labels.extend(services.iter().map(|row| row.service_name.clone()));

        if item_labels.is_empty() {
            if let Some(service) = self.catalog.service(appointment.service_id).await? {
                item_labels.push(service.name);
            }
        }

        Ok(AppointmentSummary {
            appointment: appointment.clone(),
            item_labels,
        })
    }

    // ==============================================================================
    // RESCHEDULE
    // ==============================================================================

    /// Moves a confirmed appointment using the version read just now.
    pub async fn reschedule(
        &self,
        appointment_id: Uuid,
        new_date: NaiveDate,
        new_time: NaiveTime,
    ) -> Result<Appointment, AppointmentError> {
        let current = self.confirmed(appointment_id).await?;
        let version = current.version;
        self.apply_reschedule(current, version, new_date, new_time).await
    }

    /// Moves a confirmed appointment only if it is still at `expected_version`.
    pub async fn reschedule_expecting(
        &self,
        appointment_id: Uuid,
        expected_version: i32,
        new_date: NaiveDate,
        new_time: NaiveTime,
    ) -> Result<Appointment, AppointmentError> {
        let current = self.confirmed(appointment_id).await?;
        if current.version != expected_version {
            warn!(
                "Appointment {} is at version {}, caller expected {}",
                appointment_id, current.version, expected_version
            );
            return Err(AppointmentError::OptimisticLock {
                appointment_id,
                expected_version,
            });
        }
        self.apply_reschedule(current, expected_version, new_date, new_time).await
    }

    async fn apply_reschedule(
        &self,
        current: Appointment,
        version: i32,
        new_date: NaiveDate,
        new_time: NaiveTime,
    ) -> Result<Appointment, AppointmentError> {
        info!(
            "Rescheduling appointment {} (v{}) to {} {}",
            current.id, version, new_date, new_time
        );

        let clinic = self.clinic(current.clinic_id).await?;
        self.validate_booking_date(&clinic, new_date, new_time)?;

        let duration_minutes = self.booked_duration(&current).await?;
        let end_time = end_of_block(new_time, duration_minutes)?;

        self.conflicts
            .ensure_free(current.clinic_id, new_date, new_time, end_time, Some(current.id))
            .await?;

        let patch = ReschedulePatch {
            appointment_date: new_date,
            start_time: new_time,
            end_time,
        };

        let updated = match self
            .repository
            .update_with_version_guard(current.id, version, patch)
            .await?
        {
            GuardedWrite::Applied(appointment) => appointment,
            GuardedWrite::VersionMismatch => {
                warn!("Appointment {} changed since version {}", current.id, version);
                return Err(AppointmentError::OptimisticLock {
                    appointment_id: current.id,
                    expected_version: version,
                });
            }
            GuardedWrite::SlotTaken => {
                warn!("Slot {} {}-{} taken during reschedule of {}", new_date, new_time, end_time, current.id);
                return Err(AppointmentError::Conflict {
                    date: new_date,
                    start: new_time,
                    end: end_time,
                });
            }
        };

        self.side_effects.after_write(&updated, SyncAction::Rescheduled).await;

        info!("Appointment {} rescheduled, now at version {}", updated.id, updated.version);
        Ok(updated)
    }

    // ==============================================================================
    // CANCEL
    // ==============================================================================

    pub async fn cancel(&self, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        info!("Cancelling appointment {}", appointment_id);

        let cancelled = self
            .repository
            .cancel_confirmed(appointment_id)
            .await?
            .ok_or_else(|| AppointmentError::NotFound(format!("Confirmed appointment {}", appointment_id)))?;

        self.side_effects.after_write(&cancelled, SyncAction::Cancelled).await;

        info!("Appointment {} cancelled", appointment_id);
        Ok(cancelled)
    }

    // ==============================================================================
    // PRIVATE HELPER METHODS
    // ==============================================================================

    async fn confirmed(&self, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        self.repository
            .find_by_id(appointment_id)
            .await?
            .filter(Appointment::is_confirmed)
            .ok_or_else(|| AppointmentError::NotFound(format!("Confirmed appointment {}", appointment_id)))
    }

    /// Duration of what was booked: service-area rows plus plain service rows,
    /// or the duration stored on the appointment when it has no item rows.
    async fn booked_duration(&self, appointment: &Appointment) -> Result<i32, AppointmentError> {
        let areas = self.repository.booked_service_areas(appointment.id).await?;
        let services = self.repository.booked_services(appointment.id).await?;
        if areas.is_empty() && services.is_empty() {
            debug!(
                "No item rows for appointment {}, keeping stored {} minutes",
                appointment.id, appointment.duration_minutes
            );
            return Ok(appointment.duration_minutes);
        }
        Ok(areas.iter().map(|row| row.duration_minutes).sum::<i32>()
            + services.iter().map(|row| row.duration_minutes).sum::<i32>())
    }

    fn validate_booking_date(&self, clinic: &Clinic, date: NaiveDate, time: NaiveTime) -> Result<(), AppointmentError> {
        let now = Utc::now();
        let today = clinic.local_today(now);

        if date < today || (date == today && time <= clinic.local_time(now)) {
            return Err(AppointmentError::ValidationError(format!(
                "Cannot book in the past: {} {}",
                date, time
            )));
        }

        let horizon = if clinic.max_future_days > 0 {
            self.horizon_days.min(clinic.max_future_days as i64)
        } else {
            self.horizon_days
        };
        if let Some(last) = today.checked_add_days(Days::new(horizon as u64)) {
            if date > last {
                return Err(AppointmentError::ValidationError(format!(
                    "Date {} is beyond the booking horizon ({})",
                    date, last
                )));
            }
        }
        Ok(())
    }
}

/// Item rows written in the same transaction as the appointment row.
fn booked_items(appointment_id: Uuid, quote: &BookingQuote) -> (Vec<AppointmentServiceArea>, Vec<AppointmentService>) {
    let mut area_rows = Vec::new();
    let mut service_rows = Vec::new();

    for item in &quote.items {
        match (item.area_id, &item.area_name) {
            (Some(area_id), Some(area_name)) => area_rows.push(AppointmentServiceArea {
                appointment_id,
                service_id: item.service_id,
                area_id,
                service_name: item.service_name.clone(),
                area_name: area_name.clone(),
                duration_minutes: item.duration_minutes,
                price: item.price,
            }),
            _ => service_rows.push(AppointmentService {
                appointment_id,
                service_id: item.service_id,
                service_name: item.service_name.clone(),
                duration_minutes: item.duration_minutes,
                price: item.price,
            }),
        }
    }
    (area_rows, service_rows)
}

/// End of a block that must finish on the same day.
fn end_of_block(start: NaiveTime, duration_minutes: i32) -> Result<NaiveTime, AppointmentError> {
    if duration_minutes <= 0 {
        return Err(AppointmentError::ValidationError(format!(
            "Duration must be positive, got {}",
            duration_minutes
        )));
    }
    let end = minutes_of_day(start) + duration_minutes;
    if end >= 24 * 60 {
        return Err(AppointmentError::ValidationError(format!(
            "Appointment starting {} for {} minutes ends after midnight",
            start, duration_minutes
        )));
    }
    time_from_minutes(end).ok_or_else(|| AppointmentError::ValidationError(format!("Invalid end time {}", end)))
}
