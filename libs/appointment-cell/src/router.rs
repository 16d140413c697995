// libs/appointment-cell/src/router.rs
use std::sync::Arc;

use axum::{
    routing::{get, patch, post},
    Router,
};

use crate::handlers;
use crate::services::lifecycle::AppointmentLifecycleManager;

pub fn appointment_routes(lifecycle: Arc<AppointmentLifecycleManager>) -> Router {
    Router::new()
        .route("/", post(handlers::create_appointment))
        .route("/quote", post(handlers::quote_selections))
        .route("/active", get(handlers::get_active_appointments))
        .route("/{appointment_id}", get(handlers::get_appointment))
        .route("/{appointment_id}/reschedule", patch(handlers::reschedule_appointment))
        .route("/{appointment_id}/cancel", post(handlers::cancel_appointment))
        .with_state(lifecycle)
}
