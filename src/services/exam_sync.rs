//! Background exam sync
//!
//! Signs in to the LMS with a service account, looks up every student in the
//! exam sheet by email, caches their processed records so the exam view can
//! show progress for students outside the viewer's department, and stores a
//! study snapshot for each of them.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::{stream, StreamExt};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};

use crate::config::sync::SyncConfig;
use crate::db::DbConn;
use crate::error::{AppError, Result};
use crate::services::lms::{LmsApi, LmsError};
use crate::services::roster::{process_user, StudentRecord};
use crate::services::sheets::{ExamRecord, SheetService};
use crate::services::snapshots::{cleanup_old_snapshots, compute_snapshot_metrics, save_snapshots};

/// Scheduler state reported by `GET /api/exam/sync/status`
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub enabled: bool,
    pub interval_hours: u64,
    pub last_sync: Option<DateTime<Utc>>,
    pub last_result: Option<String>,
    pub last_cached: usize,
    pub next_run: Option<DateTime<Utc>>,
}

/// LMS records of exam students keyed by email. `None` means not found in the LMS.
#[derive(Debug, Default)]
struct ExamCache {
    records: HashMap<String, Option<Arc<StudentRecord>>>,
    updated_at: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct ExamSyncService {
    lms: Arc<dyn LmsApi>,
    sheets: SheetService,
    db: DbConn,
    config: SyncConfig,
    concurrency: usize,
    cache: Arc<RwLock<ExamCache>>,
    status: Arc<RwLock<SyncStatus>>,
    running: Arc<Mutex<()>>,
}

impl ExamSyncService {
    pub fn new(
        lms: Arc<dyn LmsApi>,
        sheets: SheetService,
        db: DbConn,
        config: SyncConfig,
        concurrency: usize,
    ) -> Self {
        let enabled = config.credentials().is_some();
        let status = SyncStatus {
            enabled,
            interval_hours: config.interval_hours,
            next_run: enabled
                .then(|| Utc::now() + chrono::Duration::seconds(config.initial_delay_secs as i64)),
            ..Default::default()
        };
        Self {
            lms,
            sheets,
            db,
            config,
            concurrency,
            cache: Arc::new(RwLock::new(ExamCache::default())),
            status: Arc::new(RwLock::new(status)),
            running: Arc::new(Mutex::new(())),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.credentials().is_some()
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub async fn status(&self) -> SyncStatus {
        self.status.read().await.clone()
    }

    pub async fn set_next_run(&self, at: DateTime<Utc>) {
        self.status.write().await.next_run = Some(at);
    }

    /// Cached LMS record for an email, if the last sync found one
    pub async fn cached_record(&self, email: &str) -> Option<Arc<StudentRecord>> {
        self.cache
            .read()
            .await
            .records
            .get(&email.trim().to_lowercase())
            .cloned()
            .flatten()
    }

    pub async fn cache_updated_at(&self) -> Option<DateTime<Utc>> {
        self.cache.read().await.updated_at
    }

    /// Run one sync and record the outcome. Concurrent calls wait for the running one.
    pub async fn run(&self) -> Result<usize> {
        let _guard = self.running.lock().await;
        tracing::info!("Starting exam sync");

        let outcome = self.sync_once().await;

        let mut status = self.status.write().await;
        status.last_sync = Some(Utc::now());
        match &outcome {
            Ok(cached) => {
                status.last_result = Some("success".to_string());
                status.last_cached = *cached;
                tracing::info!(cached, "Exam sync completed");
            }
            Err(e) => {
                status.last_result = Some(format!("error: {}", e));
                status.last_cached = 0;
                tracing::error!(error = %e, "Exam sync failed");
            }
        }
        outcome
    }

    async fn sync_once(&self) -> Result<usize> {
        let (username, password) = self.config.credentials().ok_or_else(|| {
            AppError::ServiceUnavailable(
                "Sync is disabled. Set SYNC_LMS_USERNAME and SYNC_LMS_PASSWORD.".to_string(),
            )
        })?;

        let sheet = self.sheets.refresh().await?;
        if sheet.is_empty() {
            tracing::info!("No students in exam sheet");
            return Ok(0);
        }

        let token = self.lms.authenticate(username, password).await?;
        let results = lookup_students(self.lms.as_ref(), &token, &sheet, self.concurrency).await?;

        let found = results.iter().filter(|(_, r)| r.is_some()).count();
        tracing::info!(found, total = sheet.len(), "Looked up exam students");

        let mut snapshots = Vec::new();
        for (email, record) in &results {
            let Some(record) = record else { continue };
            if record.enrollments.is_empty() {
                continue;
            }
            let course = sheet
                .iter()
                .find(|r| &r.email == email)
                .map(|r| r.course.as_str())
                .filter(|c| !c.is_empty());
            snapshots.push((email.clone(), compute_snapshot_metrics(&record.enrollments, course)));
        }

        {
            let mut cache = self.cache.write().await;
            cache.records = results
                .into_iter()
                .map(|(email, record)| (email, record.map(Arc::new)))
                .collect();
            cache.updated_at = Some(Utc::now());
        }

        // Snapshot storage is best effort
        if let Err(e) = save_snapshots(&self.db, snapshots).await {
            tracing::warn!(error = %e, "Failed to save study snapshots");
        }
        if let Err(e) = cleanup_old_snapshots(&self.db, self.config.snapshot_retention_days).await {
            tracing::warn!(error = %e, "Failed to clean up study snapshots");
        }

        Ok(found)
    }
}

/// Find each sheet student in the LMS and load their enrollments
async fn lookup_students(
    lms: &dyn LmsApi,
    token: &str,
    sheet: &[ExamRecord],
    concurrency: usize,
) -> std::result::Result<Vec<(String, Option<StudentRecord>)>, LmsError> {
    let lookups = stream::iter(sheet.iter().cloned())
        .map(|row| async move {
            let user = match lms.find_user_by_email(token, &row.email, Some(&row.name)).await {
                Ok(user) => user,
                Err(LmsError::Unauthorized) => return Err(LmsError::Unauthorized),
                Err(e) => {
                    tracing::warn!(email = %row.email, error = %e, "LMS lookup failed");
                    None
                }
            };
            let record = match user {
                Some(user) => Some(process_user(lms, token, user).await?),
                None => None,
            };
            Ok((row.email, record))
        })
        .buffer_unordered(concurrency.max(1))
        .collect::<Vec<_>>()
        .await;

    lookups.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connect_with_url;
    use crate::services::lms::{Department, Enrollment, LmsUser, UserUpdate};
    use crate::services::sheets::{SheetError, SheetSource};
    use crate::services::snapshots::get_snapshots;
    use async_trait::async_trait;
    use std::time::Duration;

    struct OneStudentLms;

    #[async_trait]
    impl LmsApi for OneStudentLms {
        async fn authenticate(
            &self,
            _username: &str,
            _password: &str,
        ) -> std::result::Result<String, LmsError> {
            Ok("svc-token".to_string())
        }

        async fn get_department(
            &self,
            _token: &str,
            department_id: &str,
        ) -> std::result::Result<Department, LmsError> {
            Ok(Department::placeholder(department_id))
        }

        async fn list_department_users(
            &self,
            _token: &str,
            _department_id: &str,
        ) -> std::result::Result<Vec<LmsUser>, LmsError> {
            Ok(Vec::new())
        }

        async fn get_user(
            &self,
            _token: &str,
            user_id: &str,
        ) -> std::result::Result<LmsUser, LmsError> {
            Err(LmsError::NotFound(user_id.to_string()))
        }

        async fn update_user(
            &self,
            _token: &str,
            user_id: &str,
            _update: &UserUpdate,
        ) -> std::result::Result<LmsUser, LmsError> {
            Err(LmsError::NotFound(user_id.to_string()))
        }

        async fn find_user_by_email(
            &self,
            _token: &str,
            email: &str,
            _name_hint: Option<&str>,
        ) -> std::result::Result<Option<LmsUser>, LmsError> {
            Ok((email == "kim@example.com").then(|| LmsUser {
                id: "u-kim".to_string(),
                email: email.to_string(),
                ..Default::default()
            }))
        }

        async fn get_enrollments(
            &self,
            _token: &str,
            _user_id: &str,
        ) -> std::result::Result<Vec<Enrollment>, LmsError> {
            Ok(vec![Enrollment {
                course_name: "Life Practice Exam".to_string(),
                status: 2,
                progress: 100.0,
                score: Some(90.0),
                ..Default::default()
            }])
        }
    }

    struct TwoRowSheet;

    #[async_trait]
    impl SheetSource for TwoRowSheet {
        async fn fetch_csv(&self) -> std::result::Result<String, SheetError> {
            Ok("Student Name,Email,Course\nKim Park,kim@example.com,Life\nLee Ortiz,lee@example.com,Life\n".to_string())
        }
    }

    async fn service(config: SyncConfig) -> ExamSyncService {
        let db = connect_with_url("sqlite::memory:").await.unwrap();
        let sheets = SheetService::new(Arc::new(TwoRowSheet), Duration::from_secs(300));
        ExamSyncService::new(Arc::new(OneStudentLms), sheets, db, config, 4)
    }

    #[tokio::test]
    async fn test_run_caches_found_students_and_saves_snapshots() {
        let sync = service(SyncConfig {
            username: Some("svc".to_string()),
            password: Some("pw".to_string()),
            ..Default::default()
        })
        .await;

        assert_eq!(sync.run().await.unwrap(), 1);

        let kim = sync.cached_record("KIM@example.com").await.unwrap();
        assert_eq!(kim.user.id, "u-kim");
        assert!(sync.cached_record("lee@example.com").await.is_none());
        assert!(sync.cache_updated_at().await.is_some());

        let status = sync.status().await;
        assert_eq!(status.last_result.as_deref(), Some("success"));
        assert_eq!(status.last_cached, 1);

        let snapshots = get_snapshots(&sync.db, "kim@example.com", 10).await.unwrap();
        assert_eq!(snapshots.len(), 1);
    }

    #[tokio::test]
    async fn test_run_without_credentials_records_error() {
        let sync = service(SyncConfig::default()).await;

        assert!(matches!(sync.run().await, Err(AppError::ServiceUnavailable(_))));
        let status = sync.status().await;
        assert!(!status.enabled);
        assert!(status.last_result.unwrap().starts_with("error"));
    }
}
