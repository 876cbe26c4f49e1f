pub mod admin;
pub mod auth;
pub mod dashboard;
pub mod exam;
pub mod students;

use std::path::Path;

use axum::{middleware as axum_middleware, Router};
use tower_http::services::{ServeDir, ServeFile};

use crate::config::CONFIG;
use crate::middleware::{require_admin, require_auth, security_headers};
use crate::state::AppState;

/// API routes plus the single-page frontend served from `static_dir`
pub fn create_router(state: AppState, static_dir: &Path) -> Router {
    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/api/health", axum::routing::get(health_check))
        .route("/api/system/version", axum::routing::get(get_version))
        .nest("/api/auth", auth::auth_routes(state.clone()));

    // Protected routes (session required)
    let protected_routes = Router::new()
        .nest("/api", api_routes(state.clone()))
        .layer(axum_middleware::from_fn_with_state(state, require_auth));

    // Unknown paths fall back to index.html so client-side routes load
    let frontend = ServeDir::new(static_dir).fallback(ServeFile::new(static_dir.join("index.html")));

    public_routes
        .merge(protected_routes)
        .fallback_service(frontend)
        .layer(axum_middleware::from_fn(security_headers))
}

/// API routes under /api/* (behind the session check)
fn api_routes(state: AppState) -> Router {
    let admin_routes = Router::new()
        .nest("/exam", exam::exam_admin_routes(state.clone()))
        .nest("/admin", admin::admin_routes(state.clone()))
        .layer(axum_middleware::from_fn(require_admin));

    Router::new()
        .nest("/auth", auth::session_routes(state.clone()))
        .nest("/dashboard", dashboard::dashboard_routes(state.clone()))
        .nest("/students", students::students_routes(state.clone()))
        .nest("/exam", exam::exam_routes(state))
        .merge(admin_routes)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}

/// Version info endpoint
async fn get_version() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "version": CONFIG.version,
        "commit_hash": CONFIG.commit_hash,
        "build_time": CONFIG.build_time,
    }))
}
