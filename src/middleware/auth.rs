//! Session authentication for API routes
//!
//! The dashboard session id travels in an HttpOnly cookie. The session row
//! holds the LMS bearer token and the department the user signed in to.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::AppError;
use crate::models::session;
use crate::services::sessions::get_active_session;
use crate::state::AppState;

pub const SESSION_COOKIE_NAME: &str = "dashboard_session";

/// Signed-in session stored in request extensions
#[derive(Debug, Clone)]
pub struct AuthSession(pub session::Model);

impl AuthSession {
    pub fn token(&self) -> &str {
        &self.0.lms_token
    }

    pub fn department_id(&self) -> &str {
        &self.0.department_id
    }

    pub fn username(&self) -> &str {
        &self.0.username
    }
}

impl<S: Send + Sync> FromRequestParts<S> for AuthSession {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthSession>()
            .cloned()
            .ok_or_else(|| AppError::Unauthorized("Authentication required".to_string()))
    }
}

/// Cookie carrying a session id
pub fn session_cookie(session_id: &str, max_age_secs: i64, secure: bool) -> HeaderValue {
    let cookie = format!(
        "{}={}; HttpOnly; SameSite=Lax; Path=/; Max-Age={}{}",
        SESSION_COOKIE_NAME,
        session_id,
        max_age_secs,
        if secure { "; Secure" } else { "" }
    );
    HeaderValue::from_str(&cookie).unwrap_or_else(|_| HeaderValue::from_static(""))
}

/// Cookie that clears the session
pub fn clear_session_cookie() -> HeaderValue {
    HeaderValue::from_static("dashboard_session=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0")
}

/// Session id from the Cookie header
pub fn extract_session_id(headers: &HeaderMap) -> Option<String> {
    let cookie_str = headers.get(header::COOKIE)?.to_str().ok()?;
    let prefix = format!("{}=", SESSION_COOKIE_NAME);

    cookie_str
        .split(';')
        .filter_map(|c| c.trim().strip_prefix(prefix.as_str()))
        .find(|v| !v.is_empty())
        .map(str::to_string)
}

/// Reject requests without a live session
pub async fn require_auth(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let Some(session_id) = extract_session_id(req.headers()) else {
        return AppError::Unauthorized("Authentication required".to_string()).into_response();
    };

    let found = match get_active_session(&state.db, &session_id).await {
        Ok(Some(found)) => found,
        Ok(None) => {
            return AppError::Unauthorized("Session expired. Please log in again.".to_string())
                .into_response();
        }
        Err(e) => return e.into_response(),
    };

    req.extensions_mut().insert(AuthSession(found));
    next.run(req).await
}

/// Reject sessions that have not passed the admin password check.
/// Runs inside `require_auth`.
pub async fn require_admin(req: Request, next: Next) -> Response {
    let is_admin = req
        .extensions()
        .get::<AuthSession>()
        .is_some_and(|s| s.0.is_admin);

    if !is_admin {
        return AppError::Forbidden("Admin access required".to_string()).into_response();
    }
    next.run(req).await
}
