use std::collections::HashSet;

use axum::{
    extract::{Query, State},
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::analytics::table::{build_table, export_csv, summarize, StudentQuery, Summary};
use crate::error::{AppError, Result};
use crate::middleware::AuthSession;
use crate::schemas::{validate_department_id, StudentView};
use crate::services::roster::{DepartmentLoad, StudentRecord};
use crate::state::AppState;

/// Most departments one aggregate request may load
const MAX_DEPARTMENTS: usize = 10;

pub fn dashboard_routes(state: AppState) -> Router {
    Router::new()
        .route("/summary", get(get_summary))
        .route("/summary/quick", get(get_quick_summary))
        .route("/students", get(list_students))
        .route("/students/quick", get(list_quick_students))
        .route("/sync", post(sync_roster))
        .route("/export", get(export_students))
        .route("/departments", get(load_departments))
        .with_state(state)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentList {
    pub students: Vec<StudentView>,
    pub total: usize,
    pub department_id: String,
}

fn student_list(
    students: &[StudentRecord],
    query: &StudentQuery,
    department_id: &str,
) -> Result<StudentList> {
    let now = Utc::now();
    let rows = build_table(students, query, now)?;
    let students: Vec<StudentView> = rows
        .iter()
        .map(|row| StudentView::from_record(row.record, now))
        .collect();
    Ok(StudentList {
        total: students.len(),
        students,
        department_id: department_id.to_string(),
    })
}

async fn get_summary(State(state): State<AppState>, session: AuthSession) -> Result<Json<Summary>> {
    let students = state
        .roster
        .students(session.token(), session.department_id())
        .await?;
    Ok(Json(summarize(&students, Utc::now())))
}

/// Counts from users alone, before enrollments are loaded
async fn get_quick_summary(
    State(state): State<AppState>,
    session: AuthSession,
) -> Result<Json<Summary>> {
    let students = state
        .roster
        .quick_students(session.token(), session.department_id())
        .await?;
    Ok(Json(summarize(&students, Utc::now())))
}

async fn list_students(
    State(state): State<AppState>,
    session: AuthSession,
    Query(query): Query<StudentQuery>,
) -> Result<Json<StudentList>> {
    let students = state
        .roster
        .students(session.token(), session.department_id())
        .await?;
    Ok(Json(student_list(&students, &query, session.department_id())?))
}

async fn list_quick_students(
    State(state): State<AppState>,
    session: AuthSession,
    Query(query): Query<StudentQuery>,
) -> Result<Json<StudentList>> {
    let students = state
        .roster
        .quick_students(session.token(), session.department_id())
        .await?;
    Ok(Json(student_list(&students, &query, session.department_id())?))
}

/// Drop the cached roster and reload it from the LMS
async fn sync_roster(
    State(state): State<AppState>,
    session: AuthSession,
) -> Result<Json<serde_json::Value>> {
    let students = state
        .roster
        .refresh(session.token(), session.department_id())
        .await?;
    Ok(Json(json!({
        "message": "Roster refreshed",
        "studentCount": students.len(),
        "syncedAt": Utc::now(),
    })))
}

async fn export_students(
    State(state): State<AppState>,
    session: AuthSession,
    Query(query): Query<StudentQuery>,
) -> Result<Response> {
    let students = state
        .roster
        .students(session.token(), session.department_id())
        .await?;
    let rows = build_table(&students, &query, Utc::now())?;
    let csv = export_csv(&rows)?;

    let prefix: String = session.department_id().chars().take(8).collect();
    let disposition = format!("attachment; filename=\"students_export_{}.csv\"", prefix);
    let disposition = HeaderValue::from_str(&disposition)
        .map_err(|e| AppError::Internal(format!("Invalid export filename: {}", e)))?;

    tracing::info!(
        department_id = %session.department_id(),
        rows = rows.len(),
        "Exported student table"
    );
    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("text/csv; charset=utf-8")),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        csv,
    )
        .into_response())
}

#[derive(Debug, Deserialize)]
pub struct DepartmentsQuery {
    pub ids: Option<String>,
}

/// Comma-separated ids, trimmed and de-duplicated in order
fn parse_department_ids(raw: Option<&str>) -> Result<Vec<String>> {
    let mut seen = HashSet::new();
    let ids: Vec<String> = raw
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter(|s| seen.insert(s.to_lowercase()))
        .map(str::to_string)
        .collect();

    if ids.is_empty() {
        return Err(AppError::BadRequest(
            "ids: at least one department id is required".to_string(),
        ));
    }
    if ids.len() > MAX_DEPARTMENTS {
        return Err(AppError::BadRequest(format!(
            "ids: at most {} departments per request",
            MAX_DEPARTMENTS
        )));
    }
    for id in &ids {
        validate_department_id(id)
            .map_err(|_| AppError::BadRequest(format!("ids: invalid department id '{}'", id)))?;
    }
    Ok(ids)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DepartmentsResponse {
    pub departments: Vec<DepartmentLoad>,
    pub students: Vec<StudentView>,
    pub summary: Summary,
}

/// Several departments in one response. A failing department carries its
/// own error instead of failing the request.
async fn load_departments(
    State(state): State<AppState>,
    session: AuthSession,
    Query(query): Query<DepartmentsQuery>,
) -> Result<Json<DepartmentsResponse>> {
    let ids = parse_department_ids(query.ids.as_deref())?;
    let departments = state.roster.load_departments(session.token(), &ids).await;

    let now = Utc::now();
    let combined: Vec<StudentRecord> = departments
        .iter()
        .flat_map(|d| d.students.iter().cloned())
        .collect();
    let summary = summarize(&combined, now);
    let students = build_table(&combined, &StudentQuery::default(), now)?
        .iter()
        .map(|row| StudentView::from_record(row.record, now))
        .collect();

    Ok(Json(DepartmentsResponse {
        departments,
        students,
        summary,
    }))
}
