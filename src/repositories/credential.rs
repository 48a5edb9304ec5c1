//! # Credential Repository
//!
//! Storage for per-service OAuth credentials. Secrets and tokens are
//! AES-256-GCM encrypted before they reach the database and decrypted
//! only transiently in memory; nothing leaves this module in plaintext
//! except through the explicit `decrypt_*` accessors.

use chrono::{Duration, Utc};
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set};

use crate::crypto::{CryptoKey, decrypt_secret, encrypt_secret};
use crate::error::EngineError;
use crate::models::credential::{ActiveModel, Entity, Model};
use crate::services::ServiceId;

/// Repository for credential rows, owning the encryption key.
pub struct CredentialRepository {
    db: DatabaseConnection,
    key: CryptoKey,
}

impl CredentialRepository {
    pub fn new(db: DatabaseConnection, key: CryptoKey) -> Self {
        Self { db, key }
    }

    /// Find the credential row for a service.
    pub async fn find(&self, service: ServiceId) -> Result<Option<Model>, EngineError> {
        let row = Entity::find_by_id(service.as_str()).one(&self.db).await?;
        Ok(row)
    }

    /// Create or update the OAuth client registration for a service.
    pub async fn upsert_client(
        &self,
        service: ServiceId,
        client_id: &str,
        client_secret: &str,
    ) -> Result<Model, EngineError> {
        let now = Utc::now().fixed_offset();
        let secret_ciphertext = encrypt_secret(&self.key, service, client_secret)?;

        if let Some(existing) = self.find(service).await? {
            let mut active: ActiveModel = existing.into();
            active.client_id = Set(client_id.to_string());
            active.client_secret_ciphertext = Set(secret_ciphertext);
            active.updated_at = Set(now);
            let updated = active.update(&self.db).await?;
            return Ok(updated);
        }

        let row = ActiveModel {
            service: Set(service.as_str().to_string()),
            client_id: Set(client_id.to_string()),
            client_secret_ciphertext: Set(secret_ciphertext),
            access_token_ciphertext: Set(None),
            refresh_token_ciphertext: Set(None),
            access_token_expires_at: Set(None),
            last_synced_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let inserted = row.insert(&self.db).await?;
        Ok(inserted)
    }

    /// Persist a fresh token pair for a service.
    ///
    /// Both ciphertexts are produced before any write so a crypto failure
    /// leaves the row untouched. The refresh token is only overwritten
    /// when the grant rotated it. Successful storage stamps
    /// `last_synced_at` for operational dashboards.
    pub async fn store_tokens(
        &self,
        service: ServiceId,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_in_secs: i64,
    ) -> Result<Model, EngineError> {
        let existing = self
            .find(service)
            .await?
            .ok_or(EngineError::NotAuthenticated(service))?;

        let access_ciphertext = encrypt_secret(&self.key, service, access_token)?;
        let refresh_ciphertext = refresh_token
            .map(|token| encrypt_secret(&self.key, service, token))
            .transpose()?;

        let now = Utc::now();
        let expires_at = now + Duration::seconds(expires_in_secs);

        let mut active: ActiveModel = existing.into();
        active.access_token_ciphertext = Set(Some(access_ciphertext));
        if let Some(ciphertext) = refresh_ciphertext {
            active.refresh_token_ciphertext = Set(Some(ciphertext));
        }
        active.access_token_expires_at = Set(Some(expires_at.fixed_offset()));
        active.last_synced_at = Set(Some(now.fixed_offset()));
        active.updated_at = Set(now.fixed_offset());

        let updated = active.update(&self.db).await?;
        Ok(updated)
    }

    /// Drop the stored token pair for a service, keeping the client
    /// registration.
    pub async fn clear_tokens(&self, service: ServiceId) -> Result<(), EngineError> {
        let Some(existing) = self.find(service).await? else {
            return Ok(());
        };

        let mut active: ActiveModel = existing.into();
        active.access_token_ciphertext = Set(None);
        active.refresh_token_ciphertext = Set(None);
        active.access_token_expires_at = Set(None);
        active.updated_at = Set(Utc::now().fixed_offset());
        active.update(&self.db).await?;

        Ok(())
    }

    /// Decrypt the stored client secret.
    pub fn decrypt_client_secret(&self, credential: &Model) -> Result<String, EngineError> {
        let service: ServiceId = credential
            .service
            .parse()
            .map_err(|_| EngineError::UnknownEntityType(credential.service.clone()))?;
        Ok(decrypt_secret(
            &self.key,
            service,
            &credential.client_secret_ciphertext,
        )?)
    }

    /// Decrypt the stored access token, if any.
    pub fn decrypt_access_token(&self, credential: &Model) -> Result<Option<String>, EngineError> {
        self.decrypt_optional(credential, credential.access_token_ciphertext.as_deref())
    }

    /// Decrypt the stored refresh token, if any.
    pub fn decrypt_refresh_token(&self, credential: &Model) -> Result<Option<String>, EngineError> {
        self.decrypt_optional(credential, credential.refresh_token_ciphertext.as_deref())
    }

    fn decrypt_optional(
        &self,
        credential: &Model,
        ciphertext: Option<&[u8]>,
    ) -> Result<Option<String>, EngineError> {
        let Some(ciphertext) = ciphertext else {
            return Ok(None);
        };
        let service: ServiceId = credential
            .service
            .parse()
            .map_err(|_| EngineError::UnknownEntityType(credential.service.clone()))?;
        Ok(Some(decrypt_secret(&self.key, service, ciphertext)?))
    }
}
