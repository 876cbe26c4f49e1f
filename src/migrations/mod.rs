pub use sea_orm_migration::prelude::*;

mod m20260301_000001_create_sessions;
mod m20260301_000002_create_exam_overrides;
mod m20260301_000003_create_contact_overrides;
mod m20260301_000004_create_study_snapshots;
mod m20260301_000005_create_allowed_users;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260301_000001_create_sessions::Migration),
            Box::new(m20260301_000002_create_exam_overrides::Migration),
            Box::new(m20260301_000003_create_contact_overrides::Migration),
            Box::new(m20260301_000004_create_study_snapshots::Migration),
            Box::new(m20260301_000005_create_allowed_users::Migration),
        ]
    }
}
