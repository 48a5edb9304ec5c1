//! Database migrations for the syncbridge engine.

pub use sea_orm_migration::prelude::*;

mod m2026_01_10_000100_create_credentials;
mod m2026_01_10_000200_create_sync_jobs;
mod m2026_01_10_000300_create_sync_logs;
mod m2026_01_10_000400_create_entity_links;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2026_01_10_000100_create_credentials::Migration),
            Box::new(m2026_01_10_000200_create_sync_jobs::Migration),
            Box::new(m2026_01_10_000300_create_sync_logs::Migration),
            Box::new(m2026_01_10_000400_create_entity_links::Migration),
        ]
    }
}
