//! Migration: Create contact_overrides table

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ContactOverrides::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ContactOverrides::StudentId)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ContactOverrides::FirstName).string().null())
                    .col(ColumnDef::new(ContactOverrides::LastName).string().null())
                    .col(ColumnDef::new(ContactOverrides::Email).string().null())
                    .col(ColumnDef::new(ContactOverrides::Phone).string().null())
                    .col(ColumnDef::new(ContactOverrides::UpdatedBy).string().not_null())
                    .col(
                        ColumnDef::new(ContactOverrides::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(
                Table::drop()
                    .table(ContactOverrides::Table)
                    .if_exists()
                    .to_owned(),
            )
            .await
    }
}

#[derive(Iden)]
pub enum ContactOverrides {
    Table,
    #[iden = "student_id"]
    StudentId,
    #[iden = "first_name"]
    FirstName,
    #[iden = "last_name"]
    LastName,
    Email,
    Phone,
    #[iden = "updated_by"]
    UpdatedBy,
    #[iden = "updated_at"]
    UpdatedAt,
}
