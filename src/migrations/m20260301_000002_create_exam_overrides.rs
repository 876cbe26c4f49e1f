//! Migration: Create exam_overrides table

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ExamOverrides::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ExamOverrides::Email)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ExamOverrides::PassFail)
                            .string()
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(ExamOverrides::ExamDate)
                            .string()
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(ExamOverrides::ExamTime)
                            .string()
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(ExamOverrides::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ExamOverrides::Table).if_exists().to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum ExamOverrides {
    Table,
    Email,
    #[iden = "pass_fail"]
    PassFail,
    #[iden = "exam_date"]
    ExamDate,
    #[iden = "exam_time"]
    ExamTime,
    #[iden = "updated_at"]
    UpdatedAt,
}
