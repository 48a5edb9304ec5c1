//! Credential entity model
//!
//! One row per remote service holding the OAuth client id and the
//! AES-256-GCM ciphertext of the client secret and token pair. Token
//! columns are only ever written by the token manager and never leave
//! the process decrypted except transiently in memory; the model
//! deliberately does not implement `Serialize`.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "credentials")]
pub struct Model {
    /// Service slug (primary key, one credential per service)
    #[sea_orm(primary_key, auto_increment = false)]
    pub service: String,

    /// OAuth client id
    pub client_id: String,

    /// Encrypted OAuth client secret
    pub client_secret_ciphertext: Vec<u8>,

    /// Encrypted access token, absent until first authorization
    pub access_token_ciphertext: Option<Vec<u8>>,

    /// Encrypted refresh token
    pub refresh_token_ciphertext: Option<Vec<u8>>,

    /// Absolute expiry of the stored access token
    pub access_token_expires_at: Option<DateTimeWithTimeZone>,

    /// Stamped on every successful token storage
    pub last_synced_at: Option<DateTimeWithTimeZone>,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
