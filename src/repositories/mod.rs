//! Repository layer wrapping SeaORM access to the engine tables.

pub mod credential;
pub mod entity_link;
pub mod sync_job;
pub mod sync_log;

pub use credential::CredentialRepository;
pub use entity_link::EntityLinkRepository;
pub use sync_job::SyncJobRepository;
pub use sync_log::{NewSyncLog, SyncLogRepository};
