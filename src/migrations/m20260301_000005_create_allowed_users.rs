//! Migration: Create allowed_users table

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(AllowedUsers::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(AllowedUsers::Email)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(AllowedUsers::Name).string().null())
                    .col(ColumnDef::new(AllowedUsers::AddedBy).string().not_null())
                    .col(
                        ColumnDef::new(AllowedUsers::AddedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(AllowedUsers::Active)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(AllowedUsers::Table).if_exists().to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum AllowedUsers {
    Table,
    Email,
    Name,
    #[iden = "added_by"]
    AddedBy,
    #[iden = "added_at"]
    AddedAt,
    Active,
}
