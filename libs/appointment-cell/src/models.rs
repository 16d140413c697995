// libs/appointment-cell/src/models.rs
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use shared_models::{Appointment, ServiceSelection};

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAppointmentRequest {
    pub clinic_id: Uuid,
    pub phone: String,
    pub patient_name: Option<String>,
    pub selections: Vec<ServiceSelection>,
    pub appointment_date: NaiveDate,
    pub start_time: NaiveTime,
    pub professional_id: Option<Uuid>,
    /// Takes precedence over the catalogue durations when present.
    pub duration_override: Option<i32>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RescheduleAppointmentRequest {
    pub new_date: NaiveDate,
    pub new_time: NaiveTime,
    /// Version the caller last saw; when omitted the current row version is used.
    pub expected_version: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActiveAppointmentsQuery {
    pub clinic_id: Uuid,
    pub phone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteRequest {
    pub clinic_id: Uuid,
    pub selections: Vec<ServiceSelection>,
}

// ==============================================================================
// QUOTE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuoteItem {
    pub service_id: Uuid,
    pub service_name: String,
    pub area_id: Option<Uuid>,
    pub area_name: Option<String>,
    pub duration_minutes: i32,
    pub price: f64,
}

impl QuoteItem {
    pub fn selection(&self) -> ServiceSelection {
        ServiceSelection {
            service_id: self.service_id,
            area_id: self.area_id,
        }
    }

    pub fn label(&self) -> String {
        match &self.area_name {
            Some(area) => format!("{} - {}", self.service_name, area),
            None => self.service_name.clone(),
        }
    }
}

/// Effective duration and price of a set of selections.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BookingQuote {
    pub items: Vec<QuoteItem>,
    pub total_duration_minutes: i32,
    pub total_price: f64,
}

impl BookingQuote {
    pub fn from_items(items: Vec<QuoteItem>) -> Self {
        let total_duration_minutes = items.iter().map(|i| i.duration_minutes).sum();
        let total_price = items.iter().map(|i| i.price).sum();
        Self {
            items,
            total_duration_minutes,
            total_price,
        }
    }

    pub fn selections(&self) -> Vec<ServiceSelection> {
        self.items.iter().map(QuoteItem::selection).collect()
    }
}

// ==============================================================================
// PERSISTENCE MODELS
// ==============================================================================

/// Row to insert together with its booked items; the store assigns
/// version = 1 and status = confirmed. Item rows reference `id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewAppointment {
    pub id: Uuid,
    pub clinic_id: Uuid,
    pub patient_id: Uuid,
    pub professional_id: Option<Uuid>,
    pub service_id: Uuid,
    pub appointment_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub duration_minutes: i32,
    pub notes: Option<String>,
    pub service_areas: Vec<AppointmentServiceArea>,
    pub services: Vec<AppointmentService>,
}

/// Snapshot of one booked (service, area) pair at booking time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppointmentServiceArea {
    pub appointment_id: Uuid,
    pub service_id: Uuid,
    pub area_id: Uuid,
    pub service_name: String,
    pub area_name: String,
    pub duration_minutes: i32,
    pub price: f64,
}

/// Snapshot of one booked service without an area.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppointmentService {
    pub appointment_id: Uuid,
    pub service_id: Uuid,
    pub service_name: String,
    pub duration_minutes: i32,
    pub price: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ReschedulePatch {
    pub appointment_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome {
    Inserted(Appointment),
    SlotTaken,
}

/// Result of an update guarded by `id = ? AND version = ?` that also
/// re-validates the slot at write time.
#[derive(Debug, Clone, PartialEq)]
pub enum GuardedWrite {
    Applied(Appointment),
    VersionMismatch,
    SlotTaken,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictCheckResponse {
    pub has_conflict: bool,
    pub conflicting_appointments: Vec<Appointment>,
}

/// Appointment plus the human-readable names of what was booked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentSummary {
    pub appointment: Appointment,
    pub item_labels: Vec<String>,
}

impl AppointmentSummary {
    pub fn description(&self) -> String {
        self.item_labels.join(", ")
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SyncAction {
    Created,
    Rescheduled,
    Cancelled,
}

impl fmt::Display for SyncAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncAction::Created => write!(f, "created"),
            SyncAction::Rescheduled => write!(f, "rescheduled"),
            SyncAction::Cancelled => write!(f, "cancelled"),
        }
    }
}

// ==============================================================================
// ERROR MODELS
// ==============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AppointmentError {
    #[error("Slot {date} {start}-{end} conflicts with an existing booking")]
    Conflict {
        date: NaiveDate,
        start: NaiveTime,
        end: NaiveTime,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Appointment {appointment_id} changed since version {expected_version}")]
    OptimisticLock {
        appointment_id: Uuid,
        expected_version: i32,
    },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<availability_cell::models::AvailabilityError> for AppointmentError {
    fn from(error: availability_cell::models::AvailabilityError) -> Self {
        use availability_cell::models::AvailabilityError;
        match error {
            AvailabilityError::ClinicNotFound(id) => AppointmentError::NotFound(format!("Clinic {}", id)),
            AvailabilityError::ValidationError(msg) => AppointmentError::ValidationError(msg),
            AvailabilityError::DatabaseError(msg) => AppointmentError::DatabaseError(msg),
        }
    }
}
