use std::net::SocketAddr;
use std::sync::Arc;
use dotenv::dotenv;
use tokio::net::TcpListener;
use tower_http::cors::{CorsLayer, Any};
use tower_http::trace::{self, TraceLayer};
use tracing::{Level, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod router;

use appointment_cell::services::{AppointmentRepository, CatalogReader};
use appointment_cell::{AppointmentLifecycleManager, InMemoryAppointmentStore, SupabaseAppointmentRepository};
use availability_cell::services::{BookedTimeReader, ScheduleRepository};
use availability_cell::{AvailabilityCalculator, InMemoryScheduleRepository, SupabaseScheduleRepository};
use conversation_cell::services::{
    ConversationEngine, DefaultTemplates, EngineSettings, HttpMessageSender, InMemorySessionStore,
    MessageSender, RecordingMessageSender, RedisSessionStore, SessionStore,
};
use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Loading Env Vars
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting clinic booking API server");

    let config = AppConfig::from_env();

    // Persistence: Supabase when configured, otherwise process memory
    let (schedule, bookings, appointments, catalog): (
        Arc<dyn ScheduleRepository>,
        Arc<dyn BookedTimeReader>,
        Arc<dyn AppointmentRepository>,
        Arc<dyn CatalogReader>,
    ) = if config.is_configured() {
        let supabase = Arc::new(SupabaseClient::new(&config));
        let schedule = Arc::new(SupabaseScheduleRepository::new(supabase.clone()));
        let repository = Arc::new(SupabaseAppointmentRepository::new(supabase));
        (schedule.clone(), schedule, repository.clone(), repository)
    } else {
        warn!("Supabase not configured, using in-memory stores");
        let schedule = Arc::new(InMemoryScheduleRepository::new());
        let store = Arc::new(InMemoryAppointmentStore::new());
        (schedule, store.clone(), store.clone(), store)
    };

    let sessions: Arc<dyn SessionStore> = if config.redis_url.is_some() {
        Arc::new(RedisSessionStore::new(&config).await?)
    } else {
        warn!("REDIS_URL not set, conversation sessions live in memory");
        Arc::new(InMemorySessionStore::new())
    };

    let sender: Arc<dyn MessageSender> = if config.is_gateway_configured() {
        Arc::new(HttpMessageSender::new(&config)?)
    } else {
        warn!("Message gateway not configured, outbound messages are only recorded");
        Arc::new(RecordingMessageSender::new())
    };

    let calculator = Arc::new(
        AvailabilityCalculator::new(schedule.clone(), bookings)
            .with_horizon_days(config.slot_search_horizon_days),
    );
    let lifecycle = Arc::new(
        AppointmentLifecycleManager::new(appointments, catalog, schedule)
            .with_horizon_days(config.slot_search_horizon_days),
    );
    let engine = Arc::new(
        ConversationEngine::new(
            sessions,
            calculator.clone(),
            lifecycle.clone(),
            Arc::new(DefaultTemplates::new()),
            sender,
        )
        .with_settings(EngineSettings::from_config(&config)),
    );

    // Set up CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build the application router
    let app = router::create_router(router::Services {
        calculator,
        lifecycle,
        engine,
    })
    .layer(
        TraceLayer::new_for_http()
            .make_span_with(trace::DefaultMakeSpan::new()
                .level(Level::INFO))
            .on_response(trace::DefaultOnResponse::new()
                .level(Level::INFO)),
    )
    .layer(cors);

    // Run the server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    info!("Listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
