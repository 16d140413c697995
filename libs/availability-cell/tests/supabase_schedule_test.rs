use std::sync::Arc;

use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use availability_cell::services::{AvailabilityCalculator, SupabaseScheduleRepository};
use shared_database::SupabaseClient;
use shared_utils::test_utils::{date, time, MockSupabaseResponses, TestClinic, TestConfig};

async fn calculator_for(server: &MockServer) -> AvailabilityCalculator {
    let config = TestConfig::with_url(&server.uri()).to_app_config();
    let supabase = Arc::new(SupabaseClient::new(&config));
    let repo = Arc::new(SupabaseScheduleRepository::new(supabase));
    AvailabilityCalculator::new(repo.clone(), repo)
}

#[tokio::test]
async fn test_fixed_date_row_wins_over_weekly_row() {
    let server = MockServer::start().await;
    let clinic = TestClinic::weekdays(0);
    let monday = date(2026, 10, 19);

    Mock::given(method("GET"))
        .and(path("/rest/v1/clinics"))
        .and(query_param("id", format!("eq.{}", clinic.id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::clinic_response(&clinic)
        ])))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/availability_rules"))
        .and(query_param("clinic_id", format!("eq.{}", clinic.id)))
        .and(query_param("or", format!("(day_of_week.eq.1,specific_date.eq.{})", monday)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::weekly_rule_response(clinic.id, 1, "09:00:00", "17:00:00"),
            MockSupabaseResponses::fixed_rule_response(clinic.id, monday, "14:00:00", "16:00:00"),
        ])))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/availability_exceptions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("status", "eq.confirmed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let calculator = calculator_for(&server).await;
    let slots = calculator.free_slots(clinic.id, monday, 60).await.unwrap();

    assert_eq!(slots, vec![time(14, 0), time(15, 0)]);
}

#[tokio::test]
async fn test_blocked_exception_row() {
    let server = MockServer::start().await;
    let clinic = TestClinic::weekdays(0);
    let monday = date(2026, 10, 19);

    Mock::given(method("GET"))
        .and(path("/rest/v1/clinics"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::clinic_response(&clinic)
        ])))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/availability_rules"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/availability_exceptions"))
        .and(query_param("exception_date", format!("eq.{}", monday)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "id": uuid::Uuid::new_v4(),
            "clinic_id": clinic.id,
            "exception_date": monday,
            "exception_type": "BLOCKED",
            "start_time": null,
            "end_time": null,
            "reason": "Feriado"
        }])))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let calculator = calculator_for(&server).await;
    let slots = calculator.free_slots(clinic.id, monday, 30).await.unwrap();

    assert!(slots.is_empty());
}
