// libs/availability-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::Utc;
use uuid::Uuid;

use shared_models::error::AppError;

use crate::models::{AvailabilityError, FreeDaysQuery, FreeDaysResponse, SlotQuery, SlotsResponse};
use crate::services::AvailabilityCalculator;

const DEFAULT_MAX_DAYS: usize = 5;

impl From<AvailabilityError> for AppError {
    fn from(error: AvailabilityError) -> Self {
        match error {
            AvailabilityError::ClinicNotFound(id) => AppError::NotFound(format!("Clinic {} not found", id)),
            AvailabilityError::ValidationError(msg) => AppError::ValidationError(msg),
            AvailabilityError::DatabaseError(msg) => AppError::Database(msg),
        }
    }
}

pub async fn get_free_slots(
    State(calculator): State<Arc<AvailabilityCalculator>>,
    Path(clinic_id): Path<Uuid>,
    Query(query): Query<SlotQuery>,
) -> Result<Json<SlotsResponse>, AppError> {
    let slots = calculator
        .free_slots(clinic_id, query.date, query.duration_minutes)
        .await?;

    Ok(Json(SlotsResponse {
        clinic_id,
        date: query.date,
        duration_minutes: query.duration_minutes,
        slots,
    }))
}

pub async fn get_free_days(
    State(calculator): State<Arc<AvailabilityCalculator>>,
    Path(clinic_id): Path<Uuid>,
    Query(query): Query<FreeDaysQuery>,
) -> Result<Json<FreeDaysResponse>, AppError> {
    let clinic = calculator.clinic(clinic_id).await?;
    let today = clinic.local_today(Utc::now());

    let days = calculator
        .free_days(
            clinic_id,
            query.duration_minutes,
            query.max_days.unwrap_or(DEFAULT_MAX_DAYS),
            today,
        )
        .await?;

    Ok(Json(FreeDaysResponse {
        clinic_id,
        duration_minutes: query.duration_minutes,
        days,
    }))
}
