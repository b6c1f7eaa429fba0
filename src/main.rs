use axum::routing::get;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use price_watch::app_state::AppState;
use price_watch::config::AppConfig;
use price_watch::db::{self, store::PgJobStore, JobStore};
use price_watch::routes;
use price_watch::services::{
    identity::IdentityService,
    notifier::{LogNotifier, Notifier, WebhookNotifier},
    orchestrator::Orchestrator,
    product_client::ProductApiClient,
    scheduler::DailyTrigger,
};

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing price-watch server");

    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);
    routes::metrics::describe();

    tracing::info!("Connecting to PostgreSQL database");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    tracing::info!("Running database migrations");
    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run database migrations");

    let store: Arc<dyn JobStore> = Arc::new(PgJobStore::new(db_pool));

    let client = ProductApiClient::new(config.client()).expect("Failed to initialize product API client");

    let notifier: Arc<dyn Notifier> = match &config.notify_webhook_url {
        Some(url) => {
            tracing::info!("Reports will be delivered to the configured webhook");
            Arc::new(WebhookNotifier::new(url).expect("Failed to initialize report webhook client"))
        }
        None => {
            tracing::warn!("NOTIFY_WEBHOOK_URL not set, reports will only be logged");
            Arc::new(LogNotifier)
        }
    };

    let orchestrator = Orchestrator::new(store, Arc::new(client), notifier, config.processing());

    tracing::info!("Starting daily trigger");
    let trigger = DailyTrigger::new(orchestrator.clone(), config.system_user_id.clone())
        .await
        .expect("Failed to create scheduler");
    trigger
        .start(config.schedule())
        .await
        .expect("Failed to schedule daily report");

    let state = AppState::new(orchestrator, IdentityService::new(&config.jwt_secret))
        .with_trigger(Arc::new(trigger));

    let app = routes::router(state)
        // Prometheus metrics endpoint (separate state)
        .route(
            "/metrics",
            get(routes::metrics::prometheus_metrics).with_state(prometheus_handle),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(10 * 1024 * 1024)); // 10 MB limit

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await.expect("Server error");
}
