use std::sync::Arc;

use axum::{routing::get, Router};

use appointment_cell::{appointment_routes, AppointmentLifecycleManager};
use availability_cell::{availability_routes, AvailabilityCalculator};
use conversation_cell::{conversation_routes, ConversationEngine};

pub struct Services {
    pub calculator: Arc<AvailabilityCalculator>,
    pub lifecycle: Arc<AppointmentLifecycleManager>,
    pub engine: Arc<ConversationEngine>,
}

pub fn create_router(services: Services) -> Router {
    Router::new()
        .route("/", get(|| async { "Clinic booking API is running!" }))
        .nest("/availability", availability_routes(services.calculator))
        .nest("/appointments", appointment_routes(services.lifecycle))
        .nest("/webhook", conversation_routes(services.engine))
}
