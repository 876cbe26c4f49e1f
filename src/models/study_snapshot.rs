use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Point-in-time study metrics for one exam student
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "study_snapshots")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub email: String,
    pub snapshot_at: DateTimeUtc,
    pub total_time_min: i64,
    pub prelicense_progress: f64,
    pub exam_prep_progress: f64,
    /// Most recent practice scores, comma separated
    pub practice_scores: String,
    pub consecutive_passing: i64,
    pub readiness_status: String,
    /// e.g. "3/4"
    pub criteria_met: String,
    pub gap_count: i64,
    pub gap_total_days: i64,
    pub largest_gap_days: i64,
    pub life_video_min: i64,
    pub health_video_min: i64,
    pub state_law_min: i64,
    pub state_law_completions: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
