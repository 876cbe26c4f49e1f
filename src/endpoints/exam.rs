use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use validator::Validate;

use crate::error::{AppError, Result};
use crate::middleware::AuthSession;
use crate::schemas::{build_exam_view, ExamMatch, ExamStudentView, SnapshotView};
use crate::services::exam_sync::SyncStatus;
use crate::services::overrides::{exam_overrides, set_exam_override, ExamOverrideInput};
use crate::services::sheets_writer::{EXAM_DATE_COLUMN, EXAM_TIME_COLUMN, PASS_FAIL_COLUMN};
use crate::services::snapshots::{get_snapshots, HISTORY_LIMIT};
use crate::state::AppState;

pub fn exam_routes(state: AppState) -> Router {
    Router::new()
        .route("/students", get(list_exam_students))
        .route("/sync", post(sync_sheet))
        .route("/sync/status", get(sync_status))
        .route("/students/{email}/snapshots", get(student_snapshots))
        .with_state(state)
}

/// Exam edits. Mounted behind the admin check.
pub fn exam_admin_routes(state: AppState) -> Router {
    Router::new()
        .route("/students/{email}", put(update_exam_student))
        .with_state(state)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamStudentList {
    pub students: Vec<ExamStudentView>,
    pub total: usize,
    pub matched_count: usize,
    pub last_lms_sync: Option<DateTime<Utc>>,
}

/// Sheet rows joined with the session's roster, then with the background
/// sync cache for students outside the department
async fn list_exam_students(
    State(state): State<AppState>,
    session: AuthSession,
) -> Result<Json<ExamStudentList>> {
    let sheet = state.sheets.records().await?;
    let overrides = exam_overrides(&state.db).await?;
    let roster = state
        .roster
        .students(session.token(), session.department_id())
        .await?;

    let by_email: HashMap<String, &crate::services::roster::StudentRecord> =
        roster.iter().map(|r| (r.email_key(), r)).collect();

    let mut matches: HashMap<String, ExamMatch> = HashMap::new();
    for row in sheet.iter() {
        if matches.contains_key(&row.email) {
            continue;
        }
        let record = match by_email.get(&row.email) {
            Some(record) => Arc::new((*record).clone()),
            None => match state.exam_sync.cached_record(&row.email).await {
                Some(record) => record,
                None => continue,
            },
        };
        let department_name = state
            .roster
            .department_name(session.token(), &record.user.department_id)
            .await;
        matches.insert(
            row.email.clone(),
            ExamMatch {
                record,
                department_name,
            },
        );
    }

    let students = build_exam_view(&sheet, &matches, &overrides, Utc::now());
    Ok(Json(ExamStudentList {
        total: students.len(),
        matched_count: students.iter().filter(|s| s.matched).count(),
        students,
        last_lms_sync: state.exam_sync.cache_updated_at().await,
    }))
}

/// Re-read the spreadsheet now
async fn sync_sheet(State(state): State<AppState>) -> Result<Json<serde_json::Value>> {
    let records = state.sheets.refresh().await?;
    Ok(Json(json!({
        "message": "Exam sheet refreshed",
        "count": records.len(),
        "syncedAt": Utc::now(),
    })))
}

async fn sync_status(State(state): State<AppState>) -> Json<SyncStatus> {
    Json(state.exam_sync.status().await)
}

#[derive(Debug, Serialize)]
pub struct SnapshotHistory {
    pub email: String,
    pub snapshots: Vec<SnapshotView>,
}

async fn student_snapshots(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> Result<Json<SnapshotHistory>> {
    let email = email.trim().to_lowercase();
    let snapshots = get_snapshots(&state.db, &email, HISTORY_LIMIT)
        .await?
        .into_iter()
        .map(SnapshotView::from)
        .collect();
    Ok(Json(SnapshotHistory { email, snapshots }))
}

/// Sheet cells written back for an exam edit
fn sheet_fields(input: &ExamOverrideInput) -> Vec<(&'static str, String)> {
    [
        (EXAM_DATE_COLUMN, &input.exam_date),
        (EXAM_TIME_COLUMN, &input.exam_time),
        (PASS_FAIL_COLUMN, &input.pass_fail),
    ]
    .into_iter()
    .filter_map(|(column, value)| value.as_ref().map(|v| (column, v.trim().to_string())))
    .collect()
}

/// Store an exam edit locally, then try to write it to the sheet
async fn update_exam_student(
    State(state): State<AppState>,
    session: AuthSession,
    Path(email): Path<String>,
    Json(input): Json<ExamOverrideInput>,
) -> Result<Json<serde_json::Value>> {
    input.validate()?;
    if input.is_empty() {
        return Err(AppError::BadRequest(
            "Provide at least one of examDate, examTime or passFail".to_string(),
        ));
    }
    let email = email.trim().to_lowercase();
    if email.is_empty() {
        return Err(AppError::BadRequest("email: is required".to_string()));
    }

    let saved = set_exam_override(&state.db, &email, &input).await?;

    let sheet_updated = if state.sheet_writer.is_configured() {
        match state
            .sheet_writer
            .update_exam_row(&email, &sheet_fields(&input))
            .await
        {
            Ok(cells) => {
                tracing::info!(email = %email, cells, "Exam row written to sheet");
                true
            }
            Err(e) => {
                tracing::warn!(email = %email, error = %e, "Sheet write-back failed");
                false
            }
        }
    } else {
        false
    };
    state.sheets.invalidate().await;

    tracing::info!(
        email = %email,
        updated_by = %session.username(),
        sheet_updated,
        "Exam record updated"
    );
    Ok(Json(json!({
        "message": "Exam record updated",
        "override": saved,
        "sheetUpdated": sheet_updated,
    })))
}
