// libs/appointment-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_models::error::AppError;

use crate::models::{
    ActiveAppointmentsQuery, AppointmentError, CreateAppointmentRequest, QuoteRequest,
    RescheduleAppointmentRequest,
};
use crate::services::lifecycle::AppointmentLifecycleManager;

impl From<AppointmentError> for AppError {
    fn from(error: AppointmentError) -> Self {
        match error {
            AppointmentError::Conflict { .. } => AppError::Conflict(error.to_string()),
            AppointmentError::NotFound(msg) => AppError::NotFound(msg),
            AppointmentError::OptimisticLock { .. } => AppError::StaleVersion(error.to_string()),
            AppointmentError::ValidationError(msg) => AppError::ValidationError(msg),
            AppointmentError::DatabaseError(msg) => AppError::Database(msg),
        }
    }
}

#[axum::debug_handler]
pub async fn create_appointment(
    State(lifecycle): State<Arc<AppointmentLifecycleManager>>,
    Json(request): Json<CreateAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let clinic = lifecycle.clinic(request.clinic_id).await?;
    let appointment = lifecycle.create(&clinic, request).await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment booked successfully"
    })))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(lifecycle): State<Arc<AppointmentLifecycleManager>>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let appointment = lifecycle.get(appointment_id).await?;
    let summary = lifecycle.summary(&appointment).await?;

    Ok(Json(json!(summary)))
}

#[axum::debug_handler]
pub async fn reschedule_appointment(
    State(lifecycle): State<Arc<AppointmentLifecycleManager>>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<RescheduleAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let appointment = match request.expected_version {
        Some(version) => {
            lifecycle
                .reschedule_expecting(appointment_id, version, request.new_date, request.new_time)
                .await?
        }
        None => {
            lifecycle
                .reschedule(appointment_id, request.new_date, request.new_time)
                .await?
        }
    };

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment rescheduled successfully"
    })))
}

#[axum::debug_handler]
pub async fn cancel_appointment(
    State(lifecycle): State<Arc<AppointmentLifecycleManager>>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let appointment = lifecycle.cancel(appointment_id).await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment cancelled successfully"
    })))
}

#[axum::debug_handler]
pub async fn get_active_appointments(
    State(lifecycle): State<Arc<AppointmentLifecycleManager>>,
    Query(query): Query<ActiveAppointmentsQuery>,
) -> Result<Json<Value>, AppError> {
    let clinic = lifecycle.clinic(query.clinic_id).await?;
    let appointments = lifecycle
        .active_appointments_by_phone(&clinic, &query.phone)
        .await?;

    Ok(Json(json!({
        "appointments": appointments,
        "total": appointments.len()
    })))
}

#[axum::debug_handler]
pub async fn quote_selections(
    State(lifecycle): State<Arc<AppointmentLifecycleManager>>,
    Json(request): Json<QuoteRequest>,
) -> Result<Json<Value>, AppError> {
    let quote = lifecycle.quote(request.clinic_id, &request.selections).await?;
    Ok(Json(json!(quote)))
}
