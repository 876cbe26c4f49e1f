use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde_json::json;
use validator::Validate;

use crate::error::{AppError, Result};
use crate::middleware::AuthSession;
use crate::models::allowed_user;
use crate::schemas::AddAllowedUser;
use crate::services::allowlist::{add_allowed_user, list_allowed_users, remove_allowed_user};
use crate::state::AppState;

pub fn admin_routes(state: AppState) -> Router {
    Router::new()
        .route("/sync", post(run_exam_sync))
        .route("/allowed-users", get(list_users).post(add_user))
        .route("/allowed-users/{email}", delete(remove_user))
        .with_state(state)
}

/// Run the background exam sync immediately
async fn run_exam_sync(
    State(state): State<AppState>,
    session: AuthSession,
) -> Result<Json<serde_json::Value>> {
    tracing::info!(username = %session.username(), "Manual exam sync requested");
    let cached = state.exam_sync.run().await?;
    Ok(Json(json!({
        "message": "Exam sync completed",
        "cached": cached,
        "status": state.exam_sync.status().await,
    })))
}

async fn list_users(State(state): State<AppState>) -> Result<Json<serde_json::Value>> {
    let users = list_allowed_users(&state.db).await?;
    Ok(Json(json!({
        "total": users.len(),
        "users": users,
    })))
}

async fn add_user(
    State(state): State<AppState>,
    session: AuthSession,
    Json(request): Json<AddAllowedUser>,
) -> Result<(StatusCode, Json<allowed_user::Model>)> {
    request.validate()?;
    let saved = add_allowed_user(
        &state.db,
        &request.email,
        request.name.as_deref(),
        session.username(),
    )
    .await?;
    Ok((StatusCode::CREATED, Json(saved)))
}

async fn remove_user(
    State(state): State<AppState>,
    session: AuthSession,
    Path(email): Path<String>,
) -> Result<Json<serde_json::Value>> {
    if !remove_allowed_user(&state.db, &email).await? {
        return Err(AppError::NotFound(format!("{} is not on the allowlist", email)));
    }
    tracing::info!(email = %email, removed_by = %session.username(), "Allowlist entry removed");
    Ok(Json(json!({"message": "User removed", "email": email.trim().to_lowercase()})))
}
