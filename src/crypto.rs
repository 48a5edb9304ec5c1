//! Token encryption module using AES-256-GCM
//!
//! This module provides encryption and decryption utilities for the OAuth
//! client secrets and tokens stored in the credentials table, using
//! AES-256-GCM with additional authenticated data (AAD) binding each
//! ciphertext to its service.

#![allow(deprecated)]

use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, AeadCore, KeyInit, OsRng, Payload},
};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::services::ServiceId;

const VERSION_ENCRYPTED: u8 = 0x01;
const VERSION_FIELD_LEN: usize = 1;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const MIN_ENCRYPTED_LEN: usize = VERSION_FIELD_LEN + NONCE_LEN + TAG_LEN;

/// Crypto error types
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),
    #[error("invalid ciphertext format")]
    InvalidFormat,
    #[error("empty ciphertext")]
    EmptyCiphertext,
}

/// Secure wrapper for encryption keys with zeroization
#[derive(Debug, Clone, Zeroize, ZeroizeOnDrop)]
pub struct ZeroizingKey(Vec<u8>);

/// Type alias for crypto keys
pub type CryptoKey = ZeroizingKey;

impl CryptoKey {
    /// Create a new crypto key from bytes
    pub fn new(bytes: Vec<u8>) -> Result<Self, CryptoError> {
        if bytes.len() != 32 {
            return Err(CryptoError::EncryptionFailed(
                "Invalid key length: expected 32 bytes".to_string(),
            ));
        }
        Ok(ZeroizingKey(bytes))
    }

    /// Get the key as bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Encrypt bytes using AES-256-GCM
pub fn encrypt_bytes(
    key: &CryptoKey,
    aad: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher_key = Key::<Aes256Gcm>::from_slice(key.as_bytes());
    let cipher = Aes256Gcm::new(cipher_key);

    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let mut ciphertext = cipher
        .encrypt(
            &nonce,
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

    // Prepend version byte and nonce to ciphertext
    let mut result = Vec::with_capacity(VERSION_FIELD_LEN + NONCE_LEN + ciphertext.len());
    result.push(VERSION_ENCRYPTED);
    result.extend_from_slice(&nonce);
    result.append(&mut ciphertext);

    Ok(result)
}

/// Decrypt bytes using AES-256-GCM
///
/// Unversioned payloads are rejected outright; every stored secret must
/// carry the version marker.
pub fn decrypt_bytes(
    key: &CryptoKey,
    aad: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    if ciphertext.is_empty() {
        return Err(CryptoError::EmptyCiphertext);
    }

    if ciphertext[0] != VERSION_ENCRYPTED {
        return Err(CryptoError::InvalidFormat);
    }

    // Validate minimum length (version + nonce + tag)
    if ciphertext.len() < MIN_ENCRYPTED_LEN {
        return Err(CryptoError::InvalidFormat);
    }

    let nonce = Nonce::from_slice(&ciphertext[VERSION_FIELD_LEN..VERSION_FIELD_LEN + NONCE_LEN]);
    let tag_and_ct = &ciphertext[VERSION_FIELD_LEN + NONCE_LEN..];

    debug_assert!(tag_and_ct.len() >= TAG_LEN);

    let cipher_key = Key::<Aes256Gcm>::from_slice(key.as_bytes());
    let cipher = Aes256Gcm::new(cipher_key);

    cipher
        .decrypt(
            nonce,
            Payload {
                msg: tag_and_ct,
                aad,
            },
        )
        .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))
}

/// Encrypt a secret string for a service, binding the ciphertext to it
pub fn encrypt_secret(
    key: &CryptoKey,
    service: ServiceId,
    plaintext: &str,
) -> Result<Vec<u8>, CryptoError> {
    encrypt_bytes(key, service.as_str().as_bytes(), plaintext.as_bytes())
}

/// Decrypt a service-bound secret back to a string
pub fn decrypt_secret(
    key: &CryptoKey,
    service: ServiceId,
    ciphertext: &[u8],
) -> Result<String, CryptoError> {
    let bytes = decrypt_bytes(key, service.as_str().as_bytes(), ciphertext)?;
    String::from_utf8(bytes)
        .map_err(|e| CryptoError::DecryptionFailed(format!("Invalid UTF-8: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> CryptoKey {
        CryptoKey::new(vec![0u8; 32]).expect("valid test key")
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let key = test_key();
        let aad = b"test-aad";
        let plaintext = b"secret message";

        let encrypted = encrypt_bytes(&key, aad, plaintext).expect("encryption succeeds");
        let decrypted = decrypt_bytes(&key, aad, &encrypted).expect("decryption succeeds");

        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_different_aad_fails() {
        let key = test_key();
        let plaintext = b"secret message";

        let encrypted = encrypt_bytes(&key, b"aad-1", plaintext).expect("encryption succeeds");
        let result = decrypt_bytes(&key, b"aad-2", &encrypted);

        assert!(result.is_err());
    }

    #[test]
    fn test_modified_ciphertext_fails() {
        let key = test_key();
        let aad = b"test-aad";

        let mut encrypted =
            encrypt_bytes(&key, aad, b"secret message").expect("encryption succeeds");
        encrypted[13] ^= 0x01;

        assert!(decrypt_bytes(&key, aad, &encrypted).is_err());
    }

    #[test]
    fn test_empty_plaintext_works() {
        let key = test_key();
        let aad = b"test-aad";

        let encrypted = encrypt_bytes(&key, aad, b"").expect("encryption succeeds");
        let decrypted = decrypt_bytes(&key, aad, &encrypted).expect("decryption succeeds");

        assert!(decrypted.is_empty());
    }

    #[test]
    fn test_nonce_uniqueness() {
        let key = test_key();
        let aad = b"test-aad";
        let plaintext = b"secret message";

        let encrypted1 = encrypt_bytes(&key, aad, plaintext).expect("encryption succeeds");
        let encrypted2 = encrypt_bytes(&key, aad, plaintext).expect("encryption succeeds");

        // Nonces (bytes 1-13) should be different
        assert_ne!(&encrypted1[1..13], &encrypted2[1..13]);
        assert_eq!(
            decrypt_bytes(&key, aad, &encrypted1).expect("decryption succeeds"),
            plaintext
        );
        assert_eq!(
            decrypt_bytes(&key, aad, &encrypted2).expect("decryption succeeds"),
            plaintext
        );
    }

    #[test]
    fn test_unversioned_payload_rejected() {
        let key = test_key();
        let result = decrypt_bytes(&key, b"test-aad", b"plaintext-without-marker");
        assert!(matches!(result, Err(CryptoError::InvalidFormat)));
    }

    #[test]
    fn test_empty_ciphertext_rejected() {
        let key = test_key();
        let result = decrypt_bytes(&key, b"test-aad", b"");
        assert!(matches!(result, Err(CryptoError::EmptyCiphertext)));
    }

    #[test]
    fn test_insufficient_ciphertext_length() {
        let key = test_key();
        let short_ciphertext = vec![VERSION_ENCRYPTED, 0x02];

        let result = decrypt_bytes(&key, b"test-aad", &short_ciphertext);
        assert!(matches!(result, Err(CryptoError::InvalidFormat)));
    }

    #[test]
    fn test_invalid_key_length_rejected() {
        assert!(CryptoKey::new(vec![0u8; 16]).is_err());
        assert!(CryptoKey::new(vec![0u8; 64]).is_err());
    }

    #[test]
    fn test_service_bound_secret() {
        let key = test_key();

        let encrypted =
            encrypt_secret(&key, ServiceId::Crm, "refresh-token-1").expect("encryption succeeds");
        let decrypted =
            decrypt_secret(&key, ServiceId::Crm, &encrypted).expect("decryption succeeds");
        assert_eq!(decrypted, "refresh-token-1");

        // Ciphertext bound to one service must not decrypt for another
        assert!(decrypt_secret(&key, ServiceId::Books, &encrypted).is_err());
    }
}
