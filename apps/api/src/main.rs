use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use dotenv::dotenv;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{self, TraceLayer};
use tracing::{info, warn, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod router;

use appointment_cell::{
    AppointmentBookingService, AppointmentStore, DoctorDirectory, InMemoryAppointmentStore,
    InMemoryDoctorDirectory,
};
use queue_cell::{QueueEngine, QueueSettings, QueueState};
use shared_config::AppConfig;
use shared_utils::clock::{Clock, SystemClock};

const PRUNE_INTERVAL: Duration = Duration::from_secs(60 * 60);

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

    info!("Starting clinic queue API server");

    // Load configuration
    let config = Arc::new(AppConfig::from_env());

    let directory = match &config.doctor_directory_path {
        Some(path) => InMemoryDoctorDirectory::load_from_file(path)
            .await
            .with_context(|| format!("loading doctor directory from {}", path))?,
        None => {
            warn!("DOCTOR_DIRECTORY_PATH not set, starting with an empty doctor directory");
            InMemoryDoctorDirectory::new()
        }
    };

    let store: Arc<dyn AppointmentStore> = Arc::new(InMemoryAppointmentStore::new());
    let directory: Arc<dyn DoctorDirectory> = Arc::new(directory);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new(config.clinic_offset()));

    let booking = Arc::new(AppointmentBookingService::new(
        store.clone(),
        directory.clone(),
        clock.clone(),
    ));
    let engine = Arc::new(QueueEngine::new(
        store,
        directory,
        clock,
        QueueSettings::from_config(&config),
    ));

    spawn_session_pruning(engine.clone(), config.session_retention_days);

    // Set up CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build the application router
    let app = router::create_router(config.clone(), booking, QueueState::new(engine))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new().level(Level::INFO))
                .on_response(trace::DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors);

    // Run the server
    let addr: SocketAddr = config
        .bind_address
        .parse()
        .with_context(|| format!("invalid APP_BIND_ADDRESS {}", config.bind_address))?;
    info!("Listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

/// Drops doctor-day sessions older than the retention window once an hour.
fn spawn_session_pruning(engine: Arc<QueueEngine>, retention_days: u32) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(PRUNE_INTERVAL);
        loop {
            ticker.tick().await;
            engine.prune_expired(retention_days).await;
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
