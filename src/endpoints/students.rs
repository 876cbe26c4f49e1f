use axum::{
    extract::{Path, Query, State},
    routing::{get, put},
    Json, Router,
};
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use validator::Validate;

use crate::analytics::gaps::{calculate_gap_metrics, GapMetrics};
use crate::analytics::{calculate_readiness, Readiness};
use crate::error::{AppError, Result};
use crate::middleware::AuthSession;
use crate::schemas::{enrollment_views, ContactUpdate, EnrollmentView, ReadinessQuery, StudentDetail};
use crate::services::overrides::{apply_contact_override, contact_overrides, set_contact_override};
use crate::services::roster::{process_user, StudentRecord};
use crate::services::sheets::parse_exam_date;
use crate::state::AppState;

pub fn students_routes(state: AppState) -> Router {
    Router::new()
        .route("/{student_id}", get(get_student))
        .route("/{student_id}/enrollments", get(get_enrollments))
        .route("/{student_id}/readiness", get(get_readiness))
        .route("/{student_id}/contact", put(update_contact))
        .with_state(state)
}

/// A department member with freshly loaded enrollments
async fn load_student(state: &AppState, session: &AuthSession, student_id: &str) -> Result<StudentRecord> {
    let mut user = state
        .roster
        .find_in_department(session.token(), session.department_id(), student_id)
        .await?;
    if let Some(o) = contact_overrides(&state.db).await?.get(&user.id.to_lowercase()) {
        apply_contact_override(&mut user, o);
    }
    Ok(process_user(state.lms.as_ref(), session.token(), user).await?)
}

async fn get_student(
    State(state): State<AppState>,
    session: AuthSession,
    Path(student_id): Path<String>,
) -> Result<Json<StudentDetail>> {
    let record = load_student(&state, &session, &student_id).await?;
    Ok(Json(StudentDetail::from_record(&record, Utc::now())))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentList {
    pub student_id: String,
    pub enrollments: Vec<EnrollmentView>,
    pub total: usize,
}

async fn get_enrollments(
    State(state): State<AppState>,
    session: AuthSession,
    Path(student_id): Path<String>,
) -> Result<Json<EnrollmentList>> {
    let record = load_student(&state, &session, &student_id).await?;
    let enrollments = enrollment_views(&record.enrollments, Utc::now());
    Ok(Json(EnrollmentList {
        student_id: record.user.id,
        total: enrollments.len(),
        enrollments,
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadinessResponse {
    pub student_id: String,
    pub course_type: Option<String>,
    pub days_until_exam: Option<i64>,
    #[serde(flatten)]
    pub readiness: Readiness,
    pub study_gaps: GapMetrics,
}

async fn get_readiness(
    State(state): State<AppState>,
    session: AuthSession,
    Path(student_id): Path<String>,
    Query(query): Query<ReadinessQuery>,
) -> Result<Json<ReadinessResponse>> {
    let days_until_exam = match query.exam_date.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => {
            let date = parse_exam_date(raw)
                .ok_or_else(|| AppError::BadRequest(format!("examDate: cannot parse '{}'", raw)))?;
            Some((date - Utc::now().date_naive()).num_days())
        }
        None => None,
    };
    let course_type = query
        .course_type
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty());

    let record = load_student(&state, &session, &student_id).await?;
    let readiness = calculate_readiness(&record.enrollments, course_type.as_deref(), days_until_exam);

    Ok(Json(ReadinessResponse {
        student_id: record.user.id,
        course_type,
        days_until_exam,
        readiness,
        study_gaps: calculate_gap_metrics(&record.enrollments),
    }))
}

/// Edit contact details in the LMS and remember the edit locally
async fn update_contact(
    State(state): State<AppState>,
    session: AuthSession,
    Path(student_id): Path<String>,
    Json(request): Json<ContactUpdate>,
) -> Result<Json<serde_json::Value>> {
    request.validate()?;
    let update = request.to_user_update();
    if update.is_empty() {
        return Err(AppError::BadRequest("No contact fields to update".to_string()));
    }

    let user = state
        .roster
        .find_in_department(session.token(), session.department_id(), &student_id)
        .await?;

    state.lms.update_user(session.token(), &user.id, &update).await?;
    set_contact_override(&state.db, &user.id, &update, session.username()).await?;
    state.roster.invalidate(session.department_id()).await;

    tracing::info!(
        student_id = %user.id,
        updated_by = %session.username(),
        "Student contact updated"
    );
    Ok(Json(json!({
        "message": "Contact updated",
        "studentId": user.id,
    })))
}
