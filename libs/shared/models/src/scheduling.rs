use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Timelike, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;
use uuid::Uuid;

// ==============================================================================
// CLINIC
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BusinessHours {
    /// 0 = Sunday ... 6 = Saturday
    pub day_of_week: i32,
    pub open: NaiveTime,
    pub close: NaiveTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Clinic {
    pub id: Uuid,
    pub name: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default)]
    pub buffer_minutes: i32,
    #[serde(default = "default_max_future_days")]
    pub max_future_days: i32,
    #[serde(default)]
    pub business_hours: Vec<BusinessHours>,
}

fn default_timezone() -> String {
    "America/Sao_Paulo".to_string()
}

fn default_max_future_days() -> i32 {
    90
}

impl Clinic {
    pub fn tz(&self) -> Tz {
        self.timezone.parse::<Tz>().unwrap_or_else(|_| {
            warn!("Clinic {} has unknown timezone '{}', using UTC", self.id, self.timezone);
            Tz::UTC
        })
    }

    /// Calendar date at the clinic for the given instant.
    pub fn local_today(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.tz()).date_naive()
    }

    pub fn local_time(&self, now: DateTime<Utc>) -> NaiveTime {
        now.with_timezone(&self.tz()).time()
    }

    pub fn hours_for(&self, date: NaiveDate) -> Option<&BusinessHours> {
        let day = day_of_week_index(date);
        self.business_hours.iter().find(|h| h.day_of_week == day)
    }
}

/// Sunday-based weekday index used by every stored schedule row.
pub fn day_of_week_index(date: NaiveDate) -> i32 {
    match date.weekday() {
        Weekday::Sun => 0,
        Weekday::Mon => 1,
        Weekday::Tue => 2,
        Weekday::Wed => 3,
        Weekday::Thu => 4,
        Weekday::Fri => 5,
        Weekday::Sat => 6,
    }
}

/// Minutes since midnight; schedule arithmetic is done on these to avoid
/// `NaiveTime` wrapping around midnight.
pub fn minutes_of_day(time: NaiveTime) -> i32 {
    (time.hour() * 60 + time.minute()) as i32
}

pub fn time_from_minutes(minutes: i32) -> Option<NaiveTime> {
    if !(0..24 * 60).contains(&minutes) {
        return None;
    }
    NaiveTime::from_hms_opt((minutes / 60) as u32, (minutes % 60) as u32, 0)
}

// ==============================================================================
// PATIENT
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Patient {
    pub id: Uuid,
    pub clinic_id: Uuid,
    pub phone: String,
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ==============================================================================
// APPOINTMENT
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Confirmed,
    Cancelled,
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Confirmed => write!(f, "confirmed"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Appointment {
    pub id: Uuid,
    pub clinic_id: Uuid,
    pub patient_id: Uuid,
    pub professional_id: Option<Uuid>,
    pub service_id: Uuid,
    pub appointment_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub duration_minutes: i32,
    pub status: AppointmentStatus,
    pub version: i32,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    pub fn is_confirmed(&self) -> bool {
        self.status == AppointmentStatus::Confirmed
    }

    /// Half-open interval intersection against `[start, end)` on the same date.
    pub fn overlaps(&self, start: NaiveTime, end: NaiveTime) -> bool {
        intervals_overlap(self.start_time, self.end_time, start, end)
    }
}

/// `[a_start, a_end)` and `[b_start, b_end)` share at least one instant.
pub fn intervals_overlap(
    a_start: NaiveTime,
    a_end: NaiveTime,
    b_start: NaiveTime,
    b_end: NaiveTime,
) -> bool {
    a_start < b_end && b_start < a_end
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_overlap_is_half_open() {
        assert!(!intervals_overlap(t(9, 0), t(10, 0), t(10, 0), t(11, 0)));
        assert!(intervals_overlap(t(9, 0), t(10, 1), t(10, 0), t(11, 0)));
        // containment both ways
        assert!(intervals_overlap(t(9, 0), t(12, 0), t(10, 0), t(11, 0)));
        assert!(intervals_overlap(t(10, 0), t(11, 0), t(9, 0), t(12, 0)));
    }

    #[test]
    fn test_day_of_week_index_is_sunday_based() {
        let sunday = NaiveDate::from_ymd_opt(2026, 10, 18).unwrap();
        let monday = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
        assert_eq!(day_of_week_index(sunday), 0);
        assert_eq!(day_of_week_index(monday), 1);
    }

    #[test]
    fn test_minutes_round_trip_bounds() {
        assert_eq!(minutes_of_day(t(16, 10)), 970);
        assert_eq!(time_from_minutes(970), Some(t(16, 10)));
        assert_eq!(time_from_minutes(24 * 60), None);
        assert_eq!(time_from_minutes(-10), None);
    }

    #[test]
    fn test_local_today_uses_clinic_timezone() {
        let clinic = Clinic {
            id: Uuid::new_v4(),
            name: "Clinica".to_string(),
            timezone: "America/Sao_Paulo".to_string(),
            buffer_minutes: 0,
            max_future_days: 90,
            business_hours: vec![],
        };
        // 01:30 UTC is still the previous evening in Sao Paulo
        let now = DateTime::parse_from_rfc3339("2026-10-20T01:30:00Z").unwrap().with_timezone(&Utc);
        assert_eq!(clinic.local_today(now), NaiveDate::from_ymd_opt(2026, 10, 19).unwrap());
    }
}
