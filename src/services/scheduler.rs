//! Periodic task scheduler
//!
//! Runs background tasks on fixed intervals. Add new tasks by implementing
//! the `PeriodicTask` trait and listing them in `start_scheduler`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::DatabaseConnection;
use tokio::time::{interval_at, Instant};

use super::exam_sync::ExamSyncService;
use super::sessions::cleanup_expired_sessions;
use super::snapshots::cleanup_old_snapshots;

#[async_trait]
pub trait PeriodicTask: Send + Sync {
    /// Task name for logging
    fn name(&self) -> &'static str;

    fn interval(&self) -> Duration;

    /// Delay before the first run. Defaults to one full interval.
    fn initial_delay(&self) -> Duration {
        self.interval()
    }

    async fn run(&self, db: &DatabaseConnection) -> anyhow::Result<()>;
}

/// Start all periodic tasks
pub fn start_scheduler(db: Arc<DatabaseConnection>, exam_sync: ExamSyncService) {
    let retention_days = exam_sync.config().snapshot_retention_days;
    let mut tasks: Vec<Box<dyn PeriodicTask>> = vec![
        Box::new(SessionCleanupTask),
        Box::new(SnapshotRetentionTask { retention_days }),
    ];

    if exam_sync.is_enabled() {
        tasks.push(Box::new(ExamSyncTask { service: exam_sync }));
    } else {
        tracing::info!("Exam sync disabled: SYNC_LMS_USERNAME / SYNC_LMS_PASSWORD not set");
    }

    for task in tasks {
        let db = db.clone();
        tokio::spawn(async move {
            run_task(task, db).await;
        });
    }

    tracing::info!("Periodic task scheduler started");
}

async fn run_task(task: Box<dyn PeriodicTask>, db: Arc<DatabaseConnection>) {
    let mut ticker = interval_at(Instant::now() + task.initial_delay(), task.interval());

    loop {
        ticker.tick().await;

        tracing::debug!(task = task.name(), "Running periodic task");

        match task.run(&db).await {
            Ok(()) => {
                tracing::debug!(task = task.name(), "Periodic task completed");
            }
            Err(e) => {
                tracing::error!(task = task.name(), error = %e, "Periodic task failed");
            }
        }
    }
}

// ============================================================================
// Exam Sync Task
// ============================================================================

/// Refreshes the exam cache and records study snapshots
pub struct ExamSyncTask {
    pub service: ExamSyncService,
}

impl ExamSyncTask {
    fn next_run_in(&self, delay: Duration) -> chrono::DateTime<Utc> {
        Utc::now() + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::hours(1))
    }
}

#[async_trait]
impl PeriodicTask for ExamSyncTask {
    fn name(&self) -> &'static str {
        "exam_sync"
    }

    fn interval(&self) -> Duration {
        Duration::from_secs(self.service.config().interval_hours * 60 * 60)
    }

    fn initial_delay(&self) -> Duration {
        Duration::from_secs(self.service.config().initial_delay_secs)
    }

    async fn run(&self, _db: &DatabaseConnection) -> anyhow::Result<()> {
        // Record the next run first so a failure still reports it
        self.service
            .set_next_run(self.next_run_in(self.interval()))
            .await;
        self.service.run().await?;
        Ok(())
    }
}

// ============================================================================
// Snapshot Retention Task
// ============================================================================

struct SnapshotRetentionTask {
    retention_days: i64,
}

#[async_trait]
impl PeriodicTask for SnapshotRetentionTask {
    fn name(&self) -> &'static str {
        "snapshot_retention"
    }

    fn interval(&self) -> Duration {
        Duration::from_secs(24 * 60 * 60)
    }

    async fn run(&self, db: &DatabaseConnection) -> anyhow::Result<()> {
        cleanup_old_snapshots(db, self.retention_days).await?;
        Ok(())
    }
}

// ============================================================================
// Session Cleanup Task
// ============================================================================

/// Deletes expired dashboard sessions
struct SessionCleanupTask;

#[async_trait]
impl PeriodicTask for SessionCleanupTask {
    fn name(&self) -> &'static str {
        "session_cleanup"
    }

    fn interval(&self) -> Duration {
        Duration::from_secs(60 * 60) // Every hour
    }

    async fn run(&self, db: &DatabaseConnection) -> anyhow::Result<()> {
        cleanup_expired_sessions(db).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_initial_delay_is_interval() {
        assert_eq!(SessionCleanupTask.initial_delay(), Duration::from_secs(3600));
        let retention = SnapshotRetentionTask { retention_days: 90 };
        assert_eq!(retention.initial_delay(), retention.interval());
    }
}
