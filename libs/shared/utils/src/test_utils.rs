use chrono::{Datelike, Days, NaiveDate, NaiveTime, Utc, Weekday};
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::{
    Appointment, AppointmentStatus, Area, BusinessHours, Clinic, FaqEntry, Service, ServiceArea,
};

pub struct TestConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "test-anon-key".to_string(),
        }
    }
}

impl TestConfig {
    pub fn with_url(url: &str) -> Self {
        Self {
            supabase_url: url.to_string(),
            ..Self::default()
        }
    }

    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            supabase_url: self.supabase_url.clone(),
            supabase_anon_key: self.supabase_anon_key.clone(),
            ..AppConfig::default()
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

pub fn time(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).expect("valid test time")
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid test date")
}

/// First `weekday` at least two days after the clinic's local today, so
/// lifecycle tests never collide with "today" validation.
pub fn upcoming_weekday(clinic: &Clinic, weekday: Weekday) -> NaiveDate {
    let mut day = clinic
        .local_today(Utc::now())
        .checked_add_days(Days::new(2))
        .expect("date in range");
    while day.weekday() != weekday {
        day = day.succ_opt().expect("date in range");
    }
    day
}

/// Builders for a small but complete clinic catalogue.
pub struct TestClinic;

impl TestClinic {
    /// Open Monday to Friday 09:00-17:00.
    pub fn weekdays(buffer_minutes: i32) -> Clinic {
        Clinic {
            id: Uuid::new_v4(),
            name: "Clinica Teste".to_string(),
            timezone: "America/Sao_Paulo".to_string(),
            buffer_minutes,
            max_future_days: 90,
            business_hours: (1..=5)
                .map(|day_of_week| BusinessHours {
                    day_of_week,
                    open: time(9, 0),
                    close: time(17, 0),
                })
                .collect(),
        }
    }

    pub fn service(clinic_id: Uuid, name: &str, duration_minutes: i32, price: f64) -> Service {
        Service {
            id: Uuid::new_v4(),
            clinic_id,
            name: name.to_string(),
            duration_minutes,
            price,
            is_active: true,
        }
    }

    pub fn area(clinic_id: Uuid, name: &str) -> Area {
        Area {
            id: Uuid::new_v4(),
            clinic_id,
            name: name.to_string(),
        }
    }

    pub fn service_area(
        service: &Service,
        area: &Area,
        duration_minutes: Option<i32>,
        price: Option<f64>,
    ) -> ServiceArea {
        ServiceArea {
            id: Uuid::new_v4(),
            service_id: service.id,
            area_id: area.id,
            area_name: area.name.clone(),
            duration_minutes,
            price,
            pre_session_instructions: None,
            is_active: true,
        }
    }

    pub fn faq(clinic_id: Uuid, question: &str, answer: &str, position: i32) -> FaqEntry {
        FaqEntry {
            id: Uuid::new_v4(),
            clinic_id,
            question: question.to_string(),
            answer: answer.to_string(),
            position,
        }
    }

    pub fn confirmed_appointment(
        clinic_id: Uuid,
        service_id: Uuid,
        on: NaiveDate,
        start: NaiveTime,
        end: NaiveTime,
    ) -> Appointment {
        let now = Utc::now();
        Appointment {
            id: Uuid::new_v4(),
            clinic_id,
            patient_id: Uuid::new_v4(),
            professional_id: None,
            service_id,
            appointment_date: on,
            start_time: start,
            end_time: end,
            duration_minutes: ((end - start).num_minutes()) as i32,
            status: AppointmentStatus::Confirmed,
            version: 1,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }
}

pub struct MockSupabaseResponses;

impl MockSupabaseResponses {
    pub fn clinic_response(clinic: &Clinic) -> Value {
        json!({
            "id": clinic.id,
            "name": clinic.name,
            "timezone": clinic.timezone,
            "buffer_minutes": clinic.buffer_minutes,
            "max_future_days": clinic.max_future_days,
            "business_hours": clinic.business_hours,
        })
    }

    pub fn weekly_rule_response(clinic_id: Uuid, day_of_week: i32, start: &str, end: &str) -> Value {
        json!({
            "id": Uuid::new_v4(),
            "clinic_id": clinic_id,
            "day_of_week": day_of_week,
            "specific_date": null,
            "start_time": start,
            "end_time": end,
            "is_active": true
        })
    }

    pub fn fixed_rule_response(clinic_id: Uuid, on: NaiveDate, start: &str, end: &str) -> Value {
        json!({
            "id": Uuid::new_v4(),
            "clinic_id": clinic_id,
            "day_of_week": null,
            "specific_date": on,
            "start_time": start,
            "end_time": end,
            "is_active": true
        })
    }

    pub fn appointment_response(appointment: &Appointment) -> Value {
        json!(appointment)
    }

    pub fn error_response(message: &str, code: &str) -> Value {
        json!({
            "message": message,
            "code": code
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_creation() {
        let config = TestConfig::default();
        let app_config = config.to_app_config();

        assert_eq!(app_config.supabase_url, "http://localhost:54321");
        assert_eq!(app_config.supabase_anon_key, "test-anon-key");
        assert!(app_config.is_configured());
    }

    #[test]
    fn test_weekday_clinic_has_five_days() {
        let clinic = TestClinic::weekdays(10);
        assert_eq!(clinic.business_hours.len(), 5);
        assert!(clinic.hours_for(date(2026, 10, 18)).is_none()); // Sunday
        assert!(clinic.hours_for(date(2026, 10, 19)).is_some()); // Monday
    }

    #[test]
    fn test_appointment_fixture_duration() {
        let appointment = TestClinic::confirmed_appointment(
            Uuid::new_v4(),
            Uuid::new_v4(),
            date(2026, 10, 19),
            time(10, 0),
            time(11, 0),
        );
        assert_eq!(appointment.duration_minutes, 60);
        assert_eq!(MockSupabaseResponses::appointment_response(&appointment)["status"], "confirmed");
    }
}
