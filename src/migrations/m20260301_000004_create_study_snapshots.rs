//! Migration: Create study_snapshots table

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(StudySnapshots::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(StudySnapshots::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(StudySnapshots::Email).string().not_null())
                    .col(
                        ColumnDef::new(StudySnapshots::SnapshotAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(big_int(StudySnapshots::TotalTimeMin))
                    .col(double(StudySnapshots::PrelicenseProgress))
                    .col(double(StudySnapshots::ExamPrepProgress))
                    .col(
                        ColumnDef::new(StudySnapshots::PracticeScores)
                            .string()
                            .not_null()
                            .default(""),
                    )
                    .col(big_int(StudySnapshots::ConsecutivePassing))
                    .col(ColumnDef::new(StudySnapshots::ReadinessStatus).string().not_null())
                    .col(ColumnDef::new(StudySnapshots::CriteriaMet).string().not_null())
                    .col(big_int(StudySnapshots::GapCount))
                    .col(big_int(StudySnapshots::GapTotalDays))
                    .col(big_int(StudySnapshots::LargestGapDays))
                    .col(big_int(StudySnapshots::LifeVideoMin))
                    .col(big_int(StudySnapshots::HealthVideoMin))
                    .col(big_int(StudySnapshots::StateLawMin))
                    .col(big_int(StudySnapshots::StateLawCompletions))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_study_snapshots_email")
                    .table(StudySnapshots::Table)
                    .col(StudySnapshots::Email)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_study_snapshots_snapshot_at")
                    .table(StudySnapshots::Table)
                    .col(StudySnapshots::SnapshotAt)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(StudySnapshots::Table).if_exists().to_owned())
            .await
    }
}

fn big_int(col: StudySnapshots) -> ColumnDef {
    ColumnDef::new(col).big_integer().not_null().default(0).to_owned()
}

fn double(col: StudySnapshots) -> ColumnDef {
    ColumnDef::new(col).double().not_null().default(0.0).to_owned()
}

#[derive(Iden, Clone, Copy)]
pub enum StudySnapshots {
    Table,
    Id,
    Email,
    #[iden = "snapshot_at"]
    SnapshotAt,
    #[iden = "total_time_min"]
    TotalTimeMin,
    #[iden = "prelicense_progress"]
    PrelicenseProgress,
    #[iden = "exam_prep_progress"]
    ExamPrepProgress,
    #[iden = "practice_scores"]
    PracticeScores,
    #[iden = "consecutive_passing"]
    ConsecutivePassing,
    #[iden = "readiness_status"]
    ReadinessStatus,
    #[iden = "criteria_met"]
    CriteriaMet,
    #[iden = "gap_count"]
    GapCount,
    #[iden = "gap_total_days"]
    GapTotalDays,
    #[iden = "largest_gap_days"]
    LargestGapDays,
    #[iden = "life_video_min"]
    LifeVideoMin,
    #[iden = "health_video_min"]
    HealthVideoMin,
    #[iden = "state_law_min"]
    StateLawMin,
    #[iden = "state_law_completions"]
    StateLawCompletions,
}
