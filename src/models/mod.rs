//! SeaORM entity models for the sync engine tables.

pub mod credential;
pub mod entity_link;
pub mod sync_job;
pub mod sync_log;
