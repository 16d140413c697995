use std::sync::Arc;
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use tower::ServiceExt;
use serde_json::{json, Value};
use chrono::Weekday;
use uuid::Uuid;

use appointment_cell::router::appointment_routes;
use appointment_cell::{AppointmentLifecycleManager, InMemoryAppointmentStore};
use availability_cell::InMemoryScheduleRepository;
use shared_models::{Clinic, Service};
use shared_utils::test_utils::{upcoming_weekday, TestClinic};

struct TestApp {
    app: Router,
    clinic: Clinic,
    service: Service,
}

async fn create_test_app() -> TestApp {
    let clinic = TestClinic::weekdays(10);
    let schedule = InMemoryScheduleRepository::new();
    schedule.add_clinic(clinic.clone()).await;

    let store = InMemoryAppointmentStore::new();
    let service = TestClinic::service(clinic.id, "Limpeza de pele", 60, 150.0);
    store.add_service(service.clone()).await;

    let lifecycle = AppointmentLifecycleManager::new(
        Arc::new(store.clone()),
        Arc::new(store),
        Arc::new(schedule),
    );

    TestApp {
        app: appointment_routes(Arc::new(lifecycle)),
        clinic,
        service,
    }
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(match body {
            Some(body) => Body::from(body.to_string()),
            None => Body::empty(),
        })
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

fn booking_body(t: &TestApp, day: chrono::NaiveDate, at: &str) -> Value {
    json!({
        "clinic_id": t.clinic.id,
        "phone": "+5511988887777",
        "patient_name": "Joana",
        "selections": [{ "service_id": t.service.id, "area_id": null }],
        "appointment_date": day,
        "start_time": at
    })
}

#[tokio::test]
async fn test_book_reschedule_cancel_over_http() {
    let t = create_test_app().await;
    let tuesday = upcoming_weekday(&t.clinic, Weekday::Tue);

    let (status, body) = send(&t.app, "POST", "/", Some(booking_body(&t, tuesday, "10:00:00"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["appointment"]["end_time"], "11:00:00");
    let id = body["appointment"]["id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &t.app,
        "PATCH",
        &format!("/{}/reschedule", id),
        Some(json!({ "new_date": tuesday, "new_time": "14:00:00", "expected_version": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["appointment"]["version"], 2);

    let (status, body) = send(
        &t.app,
        "GET",
        &format!("/active?clinic_id={}&phone=%2B5511988887777", t.clinic.id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);

    let (status, _) = send(&t.app, "POST", &format!("/{}/cancel", id), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&t.app, "POST", &format!("/{}/cancel", id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "not_found");
}

#[tokio::test]
async fn test_overlapping_booking_is_409() {
    let t = create_test_app().await;
    let tuesday = upcoming_weekday(&t.clinic, Weekday::Tue);

    let (status, _) = send(&t.app, "POST", "/", Some(booking_body(&t, tuesday, "10:00:00"))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&t.app, "POST", "/", Some(booking_body(&t, tuesday, "10:30:00"))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "conflict");
}

#[tokio::test]
async fn test_stale_version_is_409_stale_version() {
    let t = create_test_app().await;
    let tuesday = upcoming_weekday(&t.clinic, Weekday::Tue);

    let (_, body) = send(&t.app, "POST", "/", Some(booking_body(&t, tuesday, "09:00:00"))).await;
    let id = body["appointment"]["id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &t.app,
        "PATCH",
        &format!("/{}/reschedule", id),
        Some(json!({ "new_date": tuesday, "new_time": "15:00:00", "expected_version": 7 })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "stale_version");
}

#[tokio::test]
async fn test_quote_and_unknown_ids() {
    let t = create_test_app().await;

    let (status, body) = send(
        &t.app,
        "POST",
        "/quote",
        Some(json!({
            "clinic_id": t.clinic.id,
            "selections": [{ "service_id": t.service.id, "area_id": null }]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_duration_minutes"], 60);

    let (status, _) = send(&t.app, "GET", &format!("/{}", Uuid::new_v4()), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(
        &t.app,
        "POST",
        "/quote",
        Some(json!({ "clinic_id": t.clinic.id, "selections": [] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation");
}
