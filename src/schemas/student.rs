use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::analytics::courses::{prelicensing_totals, CourseCategory};
use crate::analytics::format::{
    enrollment_status_text, format_datetime, format_minutes, format_progress, format_relative,
    parse_lms_date, ProgressInfo,
};
use crate::analytics::status::StudentStatus;
use crate::services::lms::{Enrollment, UserUpdate};
use crate::services::roster::StudentRecord;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LastLogin {
    pub raw: Option<String>,
    pub formatted: String,
    pub relative: String,
}

impl LastLogin {
    pub fn new(raw: Option<&str>, now: DateTime<Utc>) -> Self {
        let parsed = raw.and_then(parse_lms_date);
        Self {
            raw: raw.map(str::to_string),
            formatted: format_datetime(parsed),
            relative: format_relative(parsed, now),
        }
    }

    pub fn unknown() -> Self {
        Self {
            raw: None,
            formatted: "N/A".to_string(),
            relative: "N/A".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Minutes {
    pub minutes: i64,
    pub formatted: String,
}

impl From<i64> for Minutes {
    fn from(minutes: i64) -> Self {
        Self {
            minutes,
            formatted: format_minutes(minutes),
        }
    }
}

/// A student row as the dashboard shows it
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentView {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub username: String,
    pub last_login: LastLogin,
    pub status: StudentStatus,
    pub course_name: String,
    pub course_category: CourseCategory,
    pub progress: ProgressInfo,
    pub time_spent: Minutes,
    pub exam_prep_time: Minutes,
    pub enrollment_status: i64,
    pub enrollment_status_text: &'static str,
    pub department_id: String,
}

impl StudentView {
    pub fn from_record(record: &StudentRecord, now: DateTime<Utc>) -> Self {
        let user = &record.user;
        Self {
            id: user.id.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            full_name: user.full_name(),
            email: user.email.clone(),
            phone: user.phone.clone(),
            username: user.username.clone(),
            last_login: LastLogin::new(user.last_login.as_deref(), now),
            status: record.status(now),
            course_name: record.course_name.clone(),
            course_category: CourseCategory::of(&record.course_name),
            progress: format_progress(record.progress),
            time_spent: record.time_spent.into(),
            exam_prep_time: record.exam_prep_minutes.into(),
            enrollment_status: record.enrollment_status,
            enrollment_status_text: enrollment_status_text(record.enrollment_status),
            department_id: user.department_id.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LastAccessed {
    pub formatted: String,
    pub relative: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentView {
    pub id: Option<String>,
    pub course_id: Option<String>,
    pub course_name: String,
    pub progress: ProgressInfo,
    pub time_spent: Minutes,
    pub status: i64,
    pub status_text: &'static str,
    pub enrolled_date: String,
    pub completed_date: String,
    pub last_accessed: LastAccessed,
}

impl EnrollmentView {
    pub fn new(e: &Enrollment, now: DateTime<Utc>) -> Self {
        let date = |raw: Option<&str>| raw.and_then(parse_lms_date);
        let enrolled = date(e.date_added.as_deref().or(e.date_started.as_deref()));
        let accessed = date(e.last_accessed());
        Self {
            id: e.id.clone(),
            course_id: e.course_id.clone(),
            course_name: if e.course_name.is_empty() {
                "Unknown Course".to_string()
            } else {
                e.course_name.clone()
            },
            progress: format_progress(e.progress),
            time_spent: e.time_spent.into(),
            status: e.status,
            status_text: enrollment_status_text(e.status),
            enrolled_date: format_datetime(enrolled),
            completed_date: format_datetime(date(e.date_completed.as_deref())),
            last_accessed: LastAccessed {
                formatted: format_datetime(accessed),
                relative: format_relative(accessed, now),
            },
        }
    }
}

/// In-progress enrollments first, then by progress descending
pub fn enrollment_views(enrollments: &[Enrollment], now: DateTime<Utc>) -> Vec<EnrollmentView> {
    let mut views: Vec<EnrollmentView> = enrollments.iter().map(|e| EnrollmentView::new(e, now)).collect();
    views.sort_by(|a, b| {
        (a.status != 1)
            .cmp(&(b.status != 1))
            .then_with(|| b.progress.value.total_cmp(&a.progress.value))
    });
    views
}

/// Student detail with totals across all pre-licensing material
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentDetail {
    #[serde(flatten)]
    pub student: StudentView,
    pub enrollments: Vec<EnrollmentView>,
    pub total_enrollments: usize,
    pub completed_enrollments: usize,
}

impl StudentDetail {
    pub fn from_record(record: &StudentRecord, now: DateTime<Utc>) -> Self {
        let totals = prelicensing_totals(&record.enrollments);
        let mut summary = record.clone();
        summary.progress = totals.average_progress;
        summary.time_spent = totals.time_spent;
        summary.course_name = totals.course_name;
        summary.enrollment_status = totals.status;

        Self {
            student: StudentView::from_record(&summary, now),
            enrollments: enrollment_views(&record.enrollments, now),
            total_enrollments: record.enrollments.len(),
            completed_enrollments: record.enrollments.iter().filter(|e| e.is_completed()).count(),
        }
    }
}

/// Names are trimmed before they reach the LMS, so whitespace-only is empty
fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("must not be blank".into());
        return Err(err);
    }
    Ok(())
}

/// Contact edit. Omitted fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ContactUpdate {
    #[validate(
        length(max = 100, message = "must be at most 100 characters"),
        custom(function = "validate_not_blank")
    )]
    pub first_name: Option<String>,
    #[validate(
        length(max = 100, message = "must be at most 100 characters"),
        custom(function = "validate_not_blank")
    )]
    pub last_name: Option<String>,
    #[validate(email(message = "must be a valid email address"))]
    pub email: Option<String>,
    #[validate(length(max = 30, message = "must be at most 30 characters"))]
    pub phone: Option<String>,
}

impl ContactUpdate {
    /// Trimmed LMS update
    pub fn to_user_update(&self) -> UserUpdate {
        let clean = |v: &Option<String>| v.as_ref().map(|s| s.trim().to_string());
        UserUpdate {
            first_name: clean(&self.first_name),
            last_name: clean(&self.last_name),
            email_address: clean(&self.email),
            phone: clean(&self.phone),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadinessQuery {
    pub course_type: Option<String>,
    pub exam_date: Option<String>,
}
