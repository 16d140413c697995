// libs/availability-cell/src/services/calculator.rs
use chrono::{Days, NaiveDate, NaiveTime};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use shared_models::Clinic;

use crate::models::{AvailabilityError, DaySchedule, ExceptionKind, TimeWindow};
use crate::services::repository::{BookedTimeReader, ScheduleRepository};

pub const DEFAULT_SEARCH_HORIZON_DAYS: i64 = 90;

pub struct AvailabilityCalculator {
    schedule: Arc<dyn ScheduleRepository>,
    bookings: Arc<dyn BookedTimeReader>,
    horizon_days: i64,
}

impl AvailabilityCalculator {
    pub fn new(schedule: Arc<dyn ScheduleRepository>, bookings: Arc<dyn BookedTimeReader>) -> Self {
        Self {
            schedule,
            bookings,
            horizon_days: DEFAULT_SEARCH_HORIZON_DAYS,
        }
    }

    pub fn with_horizon_days(mut self, horizon_days: i64) -> Self {
        self.horizon_days = horizon_days.max(1);
        self
    }

    pub async fn clinic(&self, clinic_id: Uuid) -> Result<Clinic, AvailabilityError> {
        self.schedule
            .clinic(clinic_id)
            .await?
            .ok_or(AvailabilityError::ClinicNotFound(clinic_id))
    }

    /// Bookable start times on `date` for a block of `duration_minutes`,
    /// ascending.
    pub async fn free_slots(
        &self,
        clinic_id: Uuid,
        date: NaiveDate,
        duration_minutes: i32,
    ) -> Result<Vec<NaiveTime>, AvailabilityError> {
        validate_duration(duration_minutes)?;
        let clinic = self.clinic(clinic_id).await?;
        let day = self.load_day(clinic, date).await?;

        let slots = free_slots_for_day(&day, duration_minutes);
        debug!("Found {} free slots for clinic {} on {}", slots.len(), clinic_id, date);
        Ok(slots)
    }

    /// Dates from tomorrow onward with at least one free slot, up to
    /// `max_days` results or the search horizon.
    pub async fn free_days(
        &self,
        clinic_id: Uuid,
        duration_minutes: i32,
        max_days: usize,
        today: NaiveDate,
    ) -> Result<Vec<NaiveDate>, AvailabilityError> {
        validate_duration(duration_minutes)?;
        let clinic = self.clinic(clinic_id).await?;
        let horizon = self.horizon_for(&clinic);

        let mut days = Vec::new();
        if max_days == 0 {
            return Ok(days);
        }

        for offset in 1..=horizon {
            let Some(date) = today.checked_add_days(Days::new(offset as u64)) else {
                break;
            };

            let day = self.load_day(clinic.clone(), date).await?;
            if !free_slots_for_day(&day, duration_minutes).is_empty() {
                days.push(date);
                if days.len() >= max_days {
                    break;
                }
            }
        }

        info!(
            "Found {} free days for clinic {} ({} min, horizon {} days)",
            days.len(),
            clinic_id,
            duration_minutes,
            horizon
        );
        Ok(days)
    }

    fn horizon_for(&self, clinic: &Clinic) -> i64 {
        if clinic.max_future_days > 0 {
            self.horizon_days.min(clinic.max_future_days as i64)
        } else {
            self.horizon_days
        }
    }

    async fn load_day(&self, clinic: Clinic, date: NaiveDate) -> Result<DaySchedule, AvailabilityError> {
        let rules = self.schedule.rules_for_date(clinic.id, date).await?;
        let exception = self.schedule.exception_for_date(clinic.id, date).await?;
        let appointments = self.bookings.confirmed_on(clinic.id, date).await?;

        Ok(DaySchedule {
            clinic,
            date,
            rules,
            exception,
            appointments,
        })
    }
}

fn validate_duration(duration_minutes: i32) -> Result<(), AvailabilityError> {
    if duration_minutes <= 0 {
        return Err(AvailabilityError::ValidationError(format!(
            "Duration must be positive, got {}",
            duration_minutes
        )));
    }
    Ok(())
}

// ==============================================================================
// PURE SCHEDULING ARITHMETIC
// ==============================================================================

pub fn free_slots_for_day(day: &DaySchedule, duration_minutes: i32) -> Vec<NaiveTime> {
    if duration_minutes <= 0 {
        return Vec::new();
    }

    let windows = match &day.exception {
        Some(exception) => match exception.kind {
            ExceptionKind::Blocked => return Vec::new(),
            ExceptionKind::SpecialHours { start, end } => vec![TimeWindow::from_times(start, end)],
        },
        None => open_windows(day),
    };
    if windows.is_empty() {
        return Vec::new();
    }

    let buffer = day.clinic.buffer_minutes.max(0);
    let busy: Vec<TimeWindow> = day
        .appointments
        .iter()
        .filter(|a| a.is_confirmed() && a.appointment_date == day.date)
        .map(|a| {
            let window = TimeWindow::from_times(a.start_time, a.end_time);
            TimeWindow::new(window.start - buffer, window.end + buffer)
        })
        .collect();

    let free = subtract_busy(&windows, busy);
    slice_slots(&free, duration_minutes, buffer)
        .into_iter()
        .filter_map(shared_models::time_from_minutes)
        .collect()
}

/// Open windows for the day before exceptions: fixed-date rules win over
/// weekday rules, and business hours apply when no rule matches.
pub fn open_windows(day: &DaySchedule) -> Vec<TimeWindow> {
    let matching = day.rules.iter().filter(|r| r.is_active && r.applies_to(day.date));
    let (fixed, weekly): (Vec<_>, Vec<_>) = matching.partition(|r| r.is_fixed_date());

    let windows: Vec<TimeWindow> = if !fixed.is_empty() {
        fixed.iter().map(|r| r.window()).collect()
    } else if !weekly.is_empty() {
        weekly.iter().map(|r| r.window()).collect()
    } else {
        day.clinic
            .hours_for(day.date)
            .map(|h| vec![TimeWindow::from_times(h.open, h.close)])
            .unwrap_or_default()
    };

    merge_windows(windows)
}

/// Sort and coalesce overlapping or touching windows.
pub fn merge_windows(mut windows: Vec<TimeWindow>) -> Vec<TimeWindow> {
    windows.retain(|w| !w.is_empty());
    windows.sort();

    let mut merged: Vec<TimeWindow> = Vec::with_capacity(windows.len());
    for window in windows {
        match merged.last_mut() {
            Some(last) if window.start <= last.end => last.end = last.end.max(window.end),
            _ => merged.push(window),
        }
    }
    merged
}

/// Interval difference `windows - busy` over a sorted sweep.
pub fn subtract_busy(windows: &[TimeWindow], mut busy: Vec<TimeWindow>) -> Vec<TimeWindow> {
    busy.sort();

    let mut free = Vec::new();
    for window in windows {
        let mut cursor = window.start;
        for interval in &busy {
            if interval.end <= cursor || interval.start >= window.end {
                continue;
            }
            if interval.start > cursor {
                free.push(TimeWindow::new(cursor, interval.start));
            }
            cursor = cursor.max(interval.end);
            if cursor >= window.end {
                break;
            }
        }
        if cursor < window.end {
            free.push(TimeWindow::new(cursor, window.end));
        }
    }
    free
}

/// Candidate starts at `duration + buffer` stride; a start is kept only if
/// `start + duration` fits inside its window.
pub fn slice_slots(free: &[TimeWindow], duration_minutes: i32, buffer_minutes: i32) -> Vec<i32> {
    let stride = duration_minutes + buffer_minutes.max(0);
    let mut starts = Vec::new();
    for window in free {
        let mut start = window.start;
        while start + duration_minutes <= window.end {
            starts.push(start);
            start += stride;
        }
    }
    starts
}
