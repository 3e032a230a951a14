use std::net::SocketAddr;
use std::sync::Arc;
use dotenv::dotenv;
use tokio::net::TcpListener;
use tower_http::cors::{CorsLayer, Any};
use tower_http::trace::{self, TraceLayer};
use tracing::{Level, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod router;

use appointment_cell::{Notifier, SupabaseNotifier, TracingNotifier};
use doctor_cell::{DoctorDirectory, OpenDoctorDirectory, SupabaseDoctorDirectory};
use shared_config::AppConfig;
use shared_database::{BookingStore, MemoryBookingStore, PgBookingStore};

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

    info!("Starting Amae scheduling API server");

    // Load configuration
    let config = Arc::new(AppConfig::from_env());

    let store: Arc<dyn BookingStore> = if config.is_database_configured() {
        Arc::new(PgBookingStore::connect(&config).await?)
    } else {
        warn!("DATABASE_URL is not set; bookings are kept in memory only");
        Arc::new(MemoryBookingStore::new())
    };

    let (directory, notifier): (Arc<dyn DoctorDirectory>, Arc<dyn Notifier>) =
        if config.is_supabase_configured() {
            (
                Arc::new(SupabaseDoctorDirectory::new(&config)),
                Arc::new(SupabaseNotifier::new(&config)),
            )
        } else {
            warn!("Supabase is not configured; every doctor is bookable and notifications are only logged");
            (Arc::new(OpenDoctorDirectory), Arc::new(TracingNotifier))
        };

    // Set up CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build the application router
    let app = router::create_router(config.clone(), store, directory, notifier)
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
