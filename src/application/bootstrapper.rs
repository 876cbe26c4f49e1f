//! Application bootstrapper
//!
//! Wires configuration, the database, the LMS and spreadsheet clients and the
//! background scheduler, then serves the HTTP API.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    http::{header, HeaderValue, Method},
    Router,
};
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::CONFIG;
use crate::db;
use crate::endpoints;
use crate::services::{scheduler, CsvExportSource, GoogleSheetsWriter, LmsClient};
use crate::state::{AppState, Integrations};

/// Bootstrap and run the application
pub async fn run() -> anyhow::Result<()> {
    init_tracing();

    tracing::info!("Starting agency dashboard v{}", CONFIG.version);

    let state = init_services().await?;
    let app = create_app(state);

    serve(app).await
}

/// Initialize tracing/logging
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("agency_dashboard={}", CONFIG.log_level).into());

    let registry = tracing_subscriber::registry().with(filter);
    if CONFIG.log_format.eq_ignore_ascii_case("json") {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_ansi(false))
            .init();
    }
}

/// Initialize all application services
async fn init_services() -> anyhow::Result<AppState> {
    let conn = db::connect().await?;
    tracing::info!("Database connection established");

    if !CONFIG.lms.is_configured() {
        tracing::warn!("LMS_API_KEY / LMS_PRIVATE_KEY not set; logins will fail");
    }
    let integrations = Integrations {
        lms: Arc::new(LmsClient::new(CONFIG.lms.clone())?),
        sheet_source: Arc::new(CsvExportSource::new(&CONFIG.sheets)?),
        sheet_writer: Arc::new(GoogleSheetsWriter::new(&CONFIG.sheets)?),
    };
    if !integrations.sheet_writer.is_configured() {
        tracing::info!("Sheet write-back disabled: no spreadsheet id or service account");
    }

    let state = AppState::new(conn, integrations, &CONFIG);

    // Start periodic task scheduler
    scheduler::start_scheduler(Arc::new(state.db.clone()), state.exam_sync.clone());

    Ok(state)
}

/// CORS for the configured origins, or any origin when none are listed
fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = %o, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    if origins.is_empty() {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    // Credentialed CORS needs explicit lists
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}

/// Create the main application router
fn create_app(state: AppState) -> Router {
    endpoints::create_router(state, &CONFIG.server.static_dir)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&CONFIG.server.allowed_origins))
}

/// Start the HTTP server
async fn serve(app: Router) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", CONFIG.server.host, CONFIG.server.port).parse()?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

