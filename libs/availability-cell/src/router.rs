// libs/availability-cell/src/router.rs
use std::sync::Arc;

use axum::{routing::get, Router};

use crate::handlers;
use crate::services::AvailabilityCalculator;

pub fn availability_routes(calculator: Arc<AvailabilityCalculator>) -> Router {
    Router::new()
        .route("/{clinic_id}/slots", get(handlers::get_free_slots))
        .route("/{clinic_id}/days", get(handlers::get_free_days))
        .with_state(calculator)
}
