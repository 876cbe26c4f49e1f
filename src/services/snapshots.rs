//! Study progress snapshots
//!
//! Each exam sync stores one row per matched student so progress can be
//! charted over time.

use chrono::{DateTime, Duration, Utc};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set};

use crate::analytics::courses::{
    is_exam_prep, is_health_video, is_life_video, is_practice_exam, is_prelicensing, is_state_law,
};
use crate::analytics::format::round1;
use crate::analytics::gaps::calculate_gap_metrics;
use crate::analytics::readiness::{calculate_readiness, consecutive_passing, practice_attempts};
use crate::db::DbConn;
use crate::error::Result;
use crate::models::prelude::*;
use crate::models::study_snapshot;
use crate::services::lms::Enrollment;

pub const HISTORY_LIMIT: u64 = 50;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SnapshotMetrics {
    pub total_time_min: i64,
    pub prelicense_progress: f64,
    pub exam_prep_progress: f64,
    pub practice_scores: String,
    pub consecutive_passing: i64,
    pub readiness_status: String,
    pub criteria_met: String,
    pub gap_count: i64,
    pub gap_total_days: i64,
    pub largest_gap_days: i64,
    pub life_video_min: i64,
    pub health_video_min: i64,
    pub state_law_min: i64,
    pub state_law_completions: i64,
}

fn average(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        round1(values.iter().sum::<f64>() / values.len() as f64)
    }
}

pub fn compute_snapshot_metrics(enrollments: &[Enrollment], course_type: Option<&str>) -> SnapshotMetrics {
    let mut metrics = SnapshotMetrics::default();
    let mut prelicense_time = 0;
    let mut prep_time = 0;
    let mut prelicense_progress = Vec::new();
    let mut prep_progress = Vec::new();

    for e in enrollments {
        let name = e.course_name.as_str();
        if is_prelicensing(name) {
            prelicense_time += e.time_spent;
            prelicense_progress.push(e.progress);
        }
        if is_exam_prep(name) && !is_practice_exam(name) {
            prep_time += e.time_spent;
            prep_progress.push(e.progress);
        }
        if is_state_law(name) {
            metrics.state_law_min += e.time_spent;
            if e.is_completed() {
                metrics.state_law_completions += 1;
            }
        }
        if is_life_video(name) {
            metrics.life_video_min += e.time_spent;
        }
        if is_health_video(name) {
            metrics.health_video_min += e.time_spent;
        }
    }

    let scores: Vec<f64> = practice_attempts(enrollments)
        .iter()
        .map(|e| e.practice_score())
        .collect();

    let readiness = calculate_readiness(enrollments, course_type, None);
    let gaps = calculate_gap_metrics(enrollments);

    metrics.total_time_min = prelicense_time + prep_time;
    metrics.prelicense_progress = average(&prelicense_progress);
    metrics.exam_prep_progress = average(&prep_progress);
    metrics.practice_scores = scores
        .iter()
        .map(|s| format!("{:.1}", s))
        .collect::<Vec<_>>()
        .join(", ");
    metrics.consecutive_passing = consecutive_passing(&scores) as i64;
    metrics.readiness_status = readiness.status.as_str().to_string();
    metrics.criteria_met = format!("{}/{}", readiness.criteria_met, readiness.criteria_total);
    metrics.gap_count = gaps.study_gap_count;
    metrics.gap_total_days = gaps.total_gap_days;
    metrics.largest_gap_days = gaps.largest_gap_days;
    metrics
}

fn to_active_model(email: &str, at: DateTime<Utc>, m: SnapshotMetrics) -> study_snapshot::ActiveModel {
    study_snapshot::ActiveModel {
        email: Set(email.trim().to_lowercase()),
        snapshot_at: Set(at),
        total_time_min: Set(m.total_time_min),
        prelicense_progress: Set(m.prelicense_progress),
        exam_prep_progress: Set(m.exam_prep_progress),
        practice_scores: Set(m.practice_scores),
        consecutive_passing: Set(m.consecutive_passing),
        readiness_status: Set(m.readiness_status),
        criteria_met: Set(m.criteria_met),
        gap_count: Set(m.gap_count),
        gap_total_days: Set(m.gap_total_days),
        largest_gap_days: Set(m.largest_gap_days),
        life_video_min: Set(m.life_video_min),
        health_video_min: Set(m.health_video_min),
        state_law_min: Set(m.state_law_min),
        state_law_completions: Set(m.state_law_completions),
        ..Default::default()
    }
}

/// Store one snapshot per email, all stamped with the same time
pub async fn save_snapshots(db: &DbConn, batch: Vec<(String, SnapshotMetrics)>) -> Result<usize> {
    if batch.is_empty() {
        return Ok(0);
    }
    let now = Utc::now();
    let count = batch.len();
    let rows: Vec<_> = batch
        .into_iter()
        .map(|(email, metrics)| to_active_model(&email, now, metrics))
        .collect();

    StudySnapshot::insert_many(rows).exec(db).await?;
    tracing::info!(count, "Saved study snapshots");
    Ok(count)
}

/// Snapshot history for a student, newest first
pub async fn get_snapshots(db: &DbConn, email: &str, limit: u64) -> Result<Vec<study_snapshot::Model>> {
    Ok(StudySnapshot::find()
        .filter(study_snapshot::Column::Email.eq(email.trim().to_lowercase()))
        .order_by_desc(study_snapshot::Column::SnapshotAt)
        .order_by_desc(study_snapshot::Column::Id)
        .limit(limit)
        .all(db)
        .await?)
}

pub async fn cleanup_old_snapshots(db: &DbConn, retention_days: i64) -> Result<u64> {
    let cutoff = Utc::now() - Duration::days(retention_days);
    let result = StudySnapshot::delete_many()
        .filter(study_snapshot::Column::SnapshotAt.lt(cutoff))
        .exec(db)
        .await?;
    if result.rows_affected > 0 {
        tracing::info!(
            deleted = result.rows_affected,
            retention_days,
            "Cleaned up old study snapshots"
        );
    }
    Ok(result.rows_affected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connect_with_url;
    use sea_orm::ActiveModelTrait;

    fn enrollment(name: &str, minutes: i64, progress: f64, status: i64, date: &str) -> Enrollment {
        Enrollment {
            course_name: name.to_string(),
            time_spent: minutes,
            progress,
            status,
            date_started: Some(date.to_string()),
            ..Default::default()
        }
    }

    fn sample() -> Vec<Enrollment> {
        vec![
            enrollment("Ohio Pre-License Course", 600, 80.0, 1, "2025-01-01"),
            enrollment("Exam Prep Study Guide", 120, 50.0, 1, "2025-01-02"),
            enrollment("Practice Exam 1", 30, 90.0, 2, "2025-01-05"),
            enrollment("Practice Exam 2", 30, 70.0, 2, "2025-01-03"),
            enrollment("Ohio State Law", 100, 100.0, 3, "2025-01-10"),
            enrollment("Life Video Series", 40, 100.0, 2, "2025-01-11"),
        ]
    }

    #[test]
    fn test_compute_metrics() {
        let m = compute_snapshot_metrics(&sample(), Some("Life"));

        assert_eq!(m.total_time_min, 720);
        assert_eq!(m.prelicense_progress, 80.0);
        assert_eq!(m.exam_prep_progress, 50.0);
        assert_eq!(m.practice_scores, "90.0, 70.0");
        assert_eq!(m.consecutive_passing, 1);
        assert_eq!(m.state_law_min, 100);
        assert_eq!(m.state_law_completions, 1);
        assert_eq!(m.life_video_min, 40);
        assert_eq!(m.health_video_min, 0);
        assert_eq!(m.criteria_met.split('/').nth(1), Some("4"));
        assert!(m.gap_count >= 1);
    }

    #[test]
    fn test_compute_metrics_empty() {
        let m = compute_snapshot_metrics(&[], None);
        assert_eq!(m.total_time_min, 0);
        assert_eq!(m.practice_scores, "");
        assert_eq!(m.readiness_status, "RED");
        assert_eq!(m.criteria_met, "0/4");
    }

    #[tokio::test]
    async fn test_save_and_read_history() {
        let db = connect_with_url("sqlite::memory:").await.unwrap();
        let metrics = compute_snapshot_metrics(&sample(), None);

        let saved = save_snapshots(
            &db,
            vec![
                ("A@example.com".to_string(), metrics.clone()),
                ("b@example.com".to_string(), metrics),
            ],
        )
        .await
        .unwrap();
        assert_eq!(saved, 2);
        assert_eq!(save_snapshots(&db, Vec::new()).await.unwrap(), 0);

        let history = get_snapshots(&db, "a@example.com", HISTORY_LIMIT).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].total_time_min, 720);
    }

    #[tokio::test]
    async fn test_cleanup_old_snapshots() {
        let db = connect_with_url("sqlite::memory:").await.unwrap();
        to_active_model("old@example.com", Utc::now() - Duration::days(120), SnapshotMetrics::default())
            .insert(&db)
            .await
            .unwrap();
        to_active_model("new@example.com", Utc::now(), SnapshotMetrics::default())
            .insert(&db)
            .await
            .unwrap();

        assert_eq!(cleanup_old_snapshots(&db, 90).await.unwrap(), 1);
        assert_eq!(get_snapshots(&db, "new@example.com", 10).await.unwrap().len(), 1);
    }
}
