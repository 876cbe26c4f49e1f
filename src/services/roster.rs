//! Department rosters
//!
//! Loads every student in a department together with their enrollments,
//! derives the dashboard figures for each one, and caches the result per
//! department for a few minutes. Enrollment fetches run with bounded
//! concurrency.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures_util::{stream, StreamExt};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::analytics::courses::{exam_prep_minutes, find_primary_course};
use crate::analytics::format::format_progress;
use crate::analytics::status::{
    display_status, is_enrollment_expired, status_from_last_login, StudentStatus,
};
use crate::config::lms::LmsConfig;
use crate::db::DbConn;
use crate::error::{AppError, Result};
use crate::services::lms::{Enrollment, LmsApi, LmsError, LmsUser};
use crate::services::overrides::{apply_contact_override, contact_overrides};

/// A student with the figures derived from their enrollments
#[derive(Debug, Clone, PartialEq)]
pub struct StudentRecord {
    pub user: LmsUser,
    pub enrollments: Vec<Enrollment>,
    pub primary_index: Option<usize>,
    pub course_name: String,
    pub progress: f64,
    pub time_spent: i64,
    pub exam_prep_minutes: i64,
    pub enrollment_status: i64,
}

impl StudentRecord {
    pub fn from_enrollments(user: LmsUser, enrollments: Vec<Enrollment>) -> Self {
        let primary = find_primary_course(&enrollments);
        let enrollment_status = primary
            .index
            .map(|i| enrollments[i].status)
            .unwrap_or(0);
        Self {
            exam_prep_minutes: exam_prep_minutes(&enrollments),
            primary_index: primary.index,
            course_name: primary.display_name,
            progress: primary.progress,
            time_spent: primary.time_spent,
            enrollment_status,
            user,
            enrollments,
        }
    }

    /// Placeholder shown while enrollments are still loading
    pub fn basic(user: LmsUser) -> Self {
        Self {
            user,
            enrollments: Vec::new(),
            primary_index: None,
            course_name: "Loading...".to_string(),
            progress: 0.0,
            time_spent: 0,
            exam_prep_minutes: 0,
            enrollment_status: 0,
        }
    }

    pub fn primary(&self) -> Option<&Enrollment> {
        self.primary_index.and_then(|i| self.enrollments.get(i))
    }

    pub fn email_key(&self) -> String {
        self.user.email.trim().to_lowercase()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        is_enrollment_expired(self.enrollment_status, self.primary(), now)
    }

    /// Label from login recency alone
    pub fn login_status(&self, now: DateTime<Utc>) -> StudentStatus {
        status_from_last_login(self.user.last_login.as_deref(), now)
    }

    /// Label shown in tables
    pub fn status(&self, now: DateTime<Utc>) -> StudentStatus {
        display_status(
            format_progress(self.progress).value,
            self.is_expired(now),
            self.user.last_login.as_deref(),
            now,
        )
    }
}

/// Fetch one student's enrollments and derive their record.
/// Session expiry propagates; any other failure leaves the student without enrollments.
pub async fn process_user(
    lms: &dyn LmsApi,
    token: &str,
    user: LmsUser,
) -> std::result::Result<StudentRecord, LmsError> {
    let enrollments = match lms.get_enrollments(token, &user.id).await {
        Ok(list) => list,
        Err(LmsError::Unauthorized) => return Err(LmsError::Unauthorized),
        Err(e) => {
            tracing::warn!(user_id = %user.id, error = %e, "Failed to load enrollments");
            Vec::new()
        }
    };
    Ok(StudentRecord::from_enrollments(user, enrollments))
}

/// Process many users with at most `concurrency` requests in flight
pub async fn process_users(
    lms: &dyn LmsApi,
    token: &str,
    users: Vec<LmsUser>,
    concurrency: usize,
) -> std::result::Result<Vec<StudentRecord>, LmsError> {
    let total = users.len();
    let results: Vec<_> = stream::iter(users)
        .map(|user| process_user(lms, token, user))
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    let records = results.into_iter().collect::<std::result::Result<Vec<_>, _>>()?;
    tracing::debug!(total, processed = records.len(), "Processed students");
    Ok(records)
}

/// One department's load result in a multi-department request
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DepartmentLoad {
    pub id: String,
    pub name: String,
    #[serde(skip)]
    pub students: Arc<Vec<StudentRecord>>,
    pub student_count: usize,
    pub error: Option<String>,
}

struct CachedRoster {
    students: Arc<Vec<StudentRecord>>,
    fetched_at: Instant,
}

/// Cached access to department rosters
#[derive(Clone)]
pub struct RosterService {
    lms: Arc<dyn LmsApi>,
    db: DbConn,
    cache: Arc<RwLock<HashMap<String, CachedRoster>>>,
    department_names: Arc<RwLock<HashMap<String, String>>>,
    ttl: Duration,
    concurrency: usize,
}

impl RosterService {
    pub fn new(lms: Arc<dyn LmsApi>, db: DbConn, config: &LmsConfig) -> Self {
        Self {
            lms,
            db,
            cache: Arc::new(RwLock::new(HashMap::new())),
            department_names: Arc::new(RwLock::new(HashMap::new())),
            ttl: Duration::from_secs(config.cache_ttl_secs),
            concurrency: config.concurrency,
        }
    }

    pub fn lms(&self) -> &Arc<dyn LmsApi> {
        &self.lms
    }

    async fn cached(&self, department_id: &str) -> Option<Arc<Vec<StudentRecord>>> {
        let cache = self.cache.read().await;
        cache
            .get(department_id)
            .filter(|entry| entry.fetched_at.elapsed() < self.ttl)
            .map(|entry| entry.students.clone())
    }

    /// Full roster, served from cache while fresh
    pub async fn students(&self, token: &str, department_id: &str) -> Result<Arc<Vec<StudentRecord>>> {
        if let Some(students) = self.cached(department_id).await {
            tracing::debug!(department_id, "Using cached roster");
            return Ok(students);
        }

        let students = Arc::new(self.fetch_students(token, department_id).await?);
        self.cache.write().await.insert(
            department_id.to_string(),
            CachedRoster {
                students: students.clone(),
                fetched_at: Instant::now(),
            },
        );
        Ok(students)
    }

    /// Drop the cached roster and load a fresh one
    pub async fn refresh(&self, token: &str, department_id: &str) -> Result<Arc<Vec<StudentRecord>>> {
        self.invalidate(department_id).await;
        self.students(token, department_id).await
    }

    pub async fn invalidate(&self, department_id: &str) {
        if self.cache.write().await.remove(department_id).is_some() {
            tracing::info!(department_id, "Invalidated roster cache");
        }
    }

    /// Users without enrollments for a fast first paint. Reuses a fresh full roster.
    pub async fn quick_students(
        &self,
        token: &str,
        department_id: &str,
    ) -> Result<Arc<Vec<StudentRecord>>> {
        if let Some(students) = self.cached(department_id).await {
            return Ok(students);
        }

        let users = self.lms.list_department_users(token, department_id).await?;
        let mut records: Vec<StudentRecord> = users.into_iter().map(StudentRecord::basic).collect();
        self.apply_overrides(&mut records).await?;
        Ok(Arc::new(records))
    }

    /// Uncached load of a department roster
    pub async fn fetch_students(&self, token: &str, department_id: &str) -> Result<Vec<StudentRecord>> {
        let started = Instant::now();
        let users = self.lms.list_department_users(token, department_id).await?;
        let total = users.len();

        let mut records = process_users(self.lms.as_ref(), token, users, self.concurrency).await?;
        self.apply_overrides(&mut records).await?;

        tracing::info!(
            department_id,
            students = total,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Loaded department roster"
        );
        Ok(records)
    }

    async fn apply_overrides(&self, records: &mut [StudentRecord]) -> Result<()> {
        let overrides = contact_overrides(&self.db).await?;
        if overrides.is_empty() {
            return Ok(());
        }
        for record in records.iter_mut() {
            if let Some(o) = overrides.get(&record.user.id.to_lowercase()) {
                apply_contact_override(&mut record.user, o);
            }
        }
        Ok(())
    }

    /// Verify a student belongs to the department (case-insensitive id match)
    pub async fn find_in_department(
        &self,
        token: &str,
        department_id: &str,
        student_id: &str,
    ) -> Result<LmsUser> {
        let wanted = student_id.trim().to_lowercase();

        let found = match self.cached(department_id).await {
            Some(students) => students
                .iter()
                .find(|s| s.user.id.to_lowercase() == wanted)
                .map(|s| s.user.clone()),
            None => {
                let mut users = self.lms.list_department_users(token, department_id).await?;
                users
                    .iter()
                    .position(|u| u.id.to_lowercase() == wanted)
                    .map(|i| users.swap_remove(i))
            }
        };

        found.ok_or_else(|| AppError::NotFound("Student not found in your department".to_string()))
    }

    /// Department display name, cached. Lookup failures yield "Unknown".
    pub async fn department_name(&self, token: &str, department_id: &str) -> String {
        if department_id.is_empty() {
            return "Unknown".to_string();
        }
        if let Some(name) = self.department_names.read().await.get(department_id) {
            return name.clone();
        }

        let name = match self.lms.get_department(token, department_id).await {
            Ok(dept) => dept.name,
            Err(e) => {
                tracing::debug!(department_id, error = %e, "Department name lookup failed");
                "Unknown".to_string()
            }
        };
        self.department_names
            .write()
            .await
            .insert(department_id.to_string(), name.clone());
        name
    }

    /// Load several departments concurrently. Failures are reported per department.
    pub async fn load_departments(&self, token: &str, department_ids: &[String]) -> Vec<DepartmentLoad> {
        let loads = department_ids.iter().map(|id| async move {
            let name = self.department_name(token, id).await;
            match self.students(token, id).await {
                Ok(students) => DepartmentLoad {
                    id: id.clone(),
                    name,
                    student_count: students.len(),
                    students,
                    error: None,
                },
                Err(e) => {
                    tracing::warn!(department_id = %id, error = %e, "Department load failed");
                    DepartmentLoad {
                        id: id.clone(),
                        name,
                        students: Arc::new(Vec::new()),
                        student_count: 0,
                        error: Some(e.to_string()),
                    }
                }
            }
        });
        futures_util::future::join_all(loads).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn user(id: &str) -> LmsUser {
        LmsUser {
            id: id.to_string(),
            email: format!("{}@Example.com", id),
            ..Default::default()
        }
    }

    #[test]
    fn test_record_from_enrollments() {
        let enrollments = vec![
            Enrollment {
                course_name: "Practice Exam".to_string(),
                time_spent: 40,
                ..Default::default()
            },
            Enrollment {
                course_name: "Iowa Pre-License Course".to_string(),
                progress: 55.0,
                time_spent: 300,
                status: 1,
                ..Default::default()
            },
        ];
        let record = StudentRecord::from_enrollments(user("u1"), enrollments);

        assert_eq!(record.primary_index, Some(1));
        assert_eq!(record.course_name, "Iowa Pre-License Course");
        assert_eq!(record.progress, 55.0);
        assert_eq!(record.time_spent, 300);
        assert_eq!(record.exam_prep_minutes, 40);
        assert_eq!(record.enrollment_status, 1);
        assert_eq!(record.email_key(), "u1@example.com");
    }

    #[test]
    fn test_basic_record() {
        let record = StudentRecord::basic(user("u2"));
        assert_eq!(record.course_name, "Loading...");
        assert!(record.primary().is_none());
    }

    #[test]
    fn test_status_uses_rounded_progress_and_expiry() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        let mut record = StudentRecord::from_enrollments(
            user("u3"),
            vec![Enrollment {
                course_name: "Pre-License Course".to_string(),
                progress: 99.96,
                status: 4,
                ..Default::default()
            }],
        );
        assert_eq!(record.status(now), StudentStatus::Complete);

        record.progress = 50.0;
        assert_eq!(record.status(now), StudentStatus::CourseExpired);
        assert_eq!(record.login_status(now), StudentStatus::Abandoned);
    }
}
