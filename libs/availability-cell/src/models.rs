// libs/availability-cell/src/models.rs
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_models::{minutes_of_day, Appointment, Clinic};

// ==============================================================================
// AVAILABILITY RULES
// ==============================================================================

/// When a rule applies. A rule is either recurring on a weekday or pinned to
/// one date, never both.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum RuleSchedule {
    Weekly { day_of_week: i32 },
    FixedDate { date: NaiveDate },
}

#[derive(Debug, Clone, PartialEq)]
pub struct AvailabilityRule {
    pub id: Uuid,
    pub clinic_id: Uuid,
    pub schedule: RuleSchedule,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub is_active: bool,
}

impl AvailabilityRule {
    pub fn is_fixed_date(&self) -> bool {
        matches!(self.schedule, RuleSchedule::FixedDate { .. })
    }

    pub fn applies_to(&self, date: NaiveDate) -> bool {
        match self.schedule {
            RuleSchedule::Weekly { day_of_week } => {
                day_of_week == shared_models::day_of_week_index(date)
            }
            RuleSchedule::FixedDate { date: fixed } => fixed == date,
        }
    }

    pub fn window(&self) -> TimeWindow {
        TimeWindow::from_times(self.start_time, self.end_time)
    }
}

/// Row shape of `availability_rules` as stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityRuleRow {
    pub id: Uuid,
    pub clinic_id: Uuid,
    pub day_of_week: Option<i32>,
    pub specific_date: Option<NaiveDate>,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl TryFrom<AvailabilityRuleRow> for AvailabilityRule {
    type Error = AvailabilityError;

    fn try_from(row: AvailabilityRuleRow) -> Result<Self, Self::Error> {
        let schedule = match (row.day_of_week, row.specific_date) {
            (Some(day_of_week), None) => {
                if !(0..=6).contains(&day_of_week) {
                    return Err(AvailabilityError::ValidationError(format!(
                        "Rule {} has day_of_week {} outside 0..=6",
                        row.id, day_of_week
                    )));
                }
                RuleSchedule::Weekly { day_of_week }
            }
            (None, Some(date)) => RuleSchedule::FixedDate { date },
            (Some(_), Some(_)) => {
                return Err(AvailabilityError::ValidationError(format!(
                    "Rule {} sets both day_of_week and specific_date",
                    row.id
                )))
            }
            (None, None) => {
                return Err(AvailabilityError::ValidationError(format!(
                    "Rule {} sets neither day_of_week nor specific_date",
                    row.id
                )))
            }
        };

        if row.start_time >= row.end_time {
            return Err(AvailabilityError::ValidationError(format!(
                "Rule {} starts at or after its end",
                row.id
            )));
        }

        Ok(AvailabilityRule {
            id: row.id,
            clinic_id: row.clinic_id,
            schedule,
            start_time: row.start_time,
            end_time: row.end_time,
            is_active: row.is_active,
        })
    }
}

// ==============================================================================
// EXCEPTIONS
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionKind {
    Blocked,
    SpecialHours { start: NaiveTime, end: NaiveTime },
}

#[derive(Debug, Clone, PartialEq)]
pub struct AvailabilityException {
    pub id: Uuid,
    pub clinic_id: Uuid,
    pub date: NaiveDate,
    pub kind: ExceptionKind,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExceptionType {
    Blocked,
    SpecialHours,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityExceptionRow {
    pub id: Uuid,
    pub clinic_id: Uuid,
    pub exception_date: NaiveDate,
    pub exception_type: ExceptionType,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub reason: Option<String>,
}

impl TryFrom<AvailabilityExceptionRow> for AvailabilityException {
    type Error = AvailabilityError;

    fn try_from(row: AvailabilityExceptionRow) -> Result<Self, Self::Error> {
        let kind = match row.exception_type {
            ExceptionType::Blocked => ExceptionKind::Blocked,
            ExceptionType::SpecialHours => match (row.start_time, row.end_time) {
                (Some(start), Some(end)) if start < end => ExceptionKind::SpecialHours { start, end },
                _ => {
                    return Err(AvailabilityError::ValidationError(format!(
                        "Special-hours exception {} needs start_time < end_time",
                        row.id
                    )))
                }
            },
        };

        Ok(AvailabilityException {
            id: row.id,
            clinic_id: row.clinic_id,
            date: row.exception_date,
            kind,
            reason: row.reason,
        })
    }
}

// ==============================================================================
// TIME WINDOWS
// ==============================================================================

/// Half-open `[start, end)` span in minutes since midnight. May extend past
/// the day bounds after buffer expansion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TimeWindow {
    pub start: i32,
    pub end: i32,
}

impl TimeWindow {
    pub fn new(start: i32, end: i32) -> Self {
        Self { start, end }
    }

    pub fn from_times(start: NaiveTime, end: NaiveTime) -> Self {
        Self::new(minutes_of_day(start), minutes_of_day(end))
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

/// Everything the calculator needs to decide one date.
#[derive(Debug, Clone)]
pub struct DaySchedule {
    pub clinic: Clinic,
    pub date: NaiveDate,
    pub rules: Vec<AvailabilityRule>,
    pub exception: Option<AvailabilityException>,
    pub appointments: Vec<Appointment>,
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct SlotQuery {
    pub date: NaiveDate,
    pub duration_minutes: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FreeDaysQuery {
    pub duration_minutes: i32,
    pub max_days: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotsResponse {
    pub clinic_id: Uuid,
    pub date: NaiveDate,
    pub duration_minutes: i32,
    pub slots: Vec<NaiveTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FreeDaysResponse {
    pub clinic_id: Uuid,
    pub duration_minutes: i32,
    pub days: Vec<NaiveDate>,
}

// ==============================================================================
// ERROR MODELS
// ==============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum AvailabilityError {
    #[error("Clinic not found: {0}")]
    ClinicNotFound(Uuid),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

fn default_true() -> bool {
    true
}
