use axum::{
    extract::State,
    http::{header, HeaderMap},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use validator::Validate;

use crate::error::{AppError, Result};
use crate::middleware::auth::{clear_session_cookie, extract_session_id, session_cookie};
use crate::middleware::{limit_login, AuthSession};
use crate::schemas::{AdminRequest, LoginRequest, SessionResponse};
use crate::services::allowlist::is_user_allowed;
use crate::services::sessions::{create_session, delete_session, mark_admin};
use crate::state::AppState;

/// Login and logout, reachable without a session
pub fn auth_routes(state: AppState) -> Router {
    Router::new()
        .route(
            "/login",
            post(login).layer(middleware::from_fn_with_state(state.clone(), limit_login)),
        )
        .route("/logout", post(logout))
        .with_state(state)
}

/// Routes that operate on the current session
pub fn session_routes(state: AppState) -> Router {
    Router::new()
        .route("/session", get(get_session))
        .route("/refresh", post(refresh_session))
        .route("/admin", post(verify_admin))
        .with_state(state)
}

/// Authenticate against the LMS and open a dashboard session
async fn login(State(state): State<AppState>, Json(request): Json<LoginRequest>) -> Result<Response> {
    request.validate()?;
    let username = request.username.trim();
    let department_id = request.department_id.trim();

    let token = state.lms.authenticate(username, &request.password).await?;

    if !is_user_allowed(&state.db, username).await? {
        tracing::warn!(username, "Login rejected by allowlist");
        return Err(AppError::Forbidden(
            "Account not authorized. Please contact your administrator for access.".to_string(),
        ));
    }

    let department = state.lms.get_department(&token, department_id).await?;
    let session = create_session(
        &state.db,
        username,
        &department,
        &token,
        state.auth.session_ttl_hours,
    )
    .await?;

    let cookie = session_cookie(
        &session.id,
        state.auth.session_ttl_hours * 3600,
        state.auth.cookie_secure,
    );
    Ok(([(header::SET_COOKIE, cookie)], Json(SessionResponse::from(&session))).into_response())
}

async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Result<Response> {
    if let Some(session_id) = extract_session_id(&headers) {
        delete_session(&state.db, &session_id).await?;
        tracing::info!(session_id = %session_id, "Session closed");
    }
    Ok((
        [(header::SET_COOKIE, clear_session_cookie())],
        Json(json!({"message": "Logged out"})),
    )
        .into_response())
}

async fn get_session(session: AuthSession) -> Json<SessionResponse> {
    Json(SessionResponse::from(&session.0))
}

/// Sessions last as long as the LMS token, so refresh only reports the expiry
async fn refresh_session(session: AuthSession) -> Json<serde_json::Value> {
    Json(json!({
        "message": "Session is active",
        "expiresAt": session.0.expires_at,
    }))
}

/// Compare against the configured admin password. Values starting with `$2`
/// are bcrypt hashes.
fn check_admin_password(configured: &str, supplied: &str) -> Result<bool> {
    if configured.starts_with("$2") {
        return Ok(bcrypt::verify(supplied, configured)?);
    }
    let (a, b) = (configured.as_bytes(), supplied.as_bytes());
    let diff = a
        .iter()
        .zip(b.iter())
        .fold(a.len() ^ b.len(), |acc, (x, y)| acc | (x ^ y) as usize);
    Ok(diff == 0)
}

async fn verify_admin(
    State(state): State<AppState>,
    session: AuthSession,
    Json(request): Json<AdminRequest>,
) -> Result<Json<SessionResponse>> {
    let Some(configured) = state.auth.admin_password.as_deref() else {
        return Err(AppError::ServiceUnavailable(
            "Admin access is not configured".to_string(),
        ));
    };

    if !check_admin_password(configured, &request.password)? {
        tracing::warn!(username = %session.username(), "Admin password rejected");
        return Err(AppError::Unauthorized("Invalid admin password".to_string()));
    }

    let updated = mark_admin(&state.db, session.0).await?;
    tracing::info!(username = %updated.username, "Admin access granted");
    Ok(Json(SessionResponse::from(&updated)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_admin_password() {
        assert!(check_admin_password("s3cret", "s3cret").unwrap());
        assert!(!check_admin_password("s3cret", "s3cre").unwrap());
        assert!(!check_admin_password("s3cret", "s3cretx").unwrap());
        assert!(!check_admin_password("s3cret", "").unwrap());
    }

    #[test]
    fn test_bcrypt_admin_password() {
        let hash = bcrypt::hash("s3cret", 4).unwrap();
        assert!(check_admin_password(&hash, "s3cret").unwrap());
        assert!(!check_admin_password(&hash, "wrong").unwrap());
    }
}
