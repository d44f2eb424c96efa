//! AES-256-GCM encryption for third-party credentials.
//!
//! Developer API keys embedded in automation listings and OAuth tokens of
//! connected accounts are stored encrypted. The wire format is
//! `hex(iv):hex(tag):hex(ciphertext)` with a 16-byte IV, compatible with
//! the tokens already in the database.

use std::collections::BTreeMap;

use aes_gcm::aead::consts::U16;
use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::aes::Aes256;
use aes_gcm::AesGcm;
use rand::Rng;

use crate::error::CoreError;
use crate::hashing::hex;

const IV_SIZE: usize = 16;
const TAG_SIZE: usize = 16;
const KEY_SIZE: usize = 32;

type Cipher = AesGcm<Aes256, U16>;

/// Encrypts and decrypts credential strings with a single process-wide key.
#[derive(Clone)]
pub struct Encryptor {
    cipher: Cipher,
}

impl std::fmt::Debug for Encryptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Encryptor(..)")
    }
}

impl Encryptor {
    /// Build from a 64-character hex key (`ENCRYPTION_KEY`).
    pub fn from_hex(key_hex: &str) -> Result<Self, CoreError> {
        let key = hex::decode(key_hex.trim())
            .filter(|k| k.len() == KEY_SIZE)
            .ok_or_else(|| {
                CoreError::Validation(
                    "ENCRYPTION_KEY must be 64 hexadecimal characters".into(),
                )
            })?;
        let cipher = Cipher::new_from_slice(&key)
            .map_err(|e| CoreError::Internal(format!("Failed to create cipher: {e}")))?;
        Ok(Self { cipher })
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, CoreError> {
        let mut iv = [0u8; IV_SIZE];
        rand::rng().fill(&mut iv);
        let sealed = self
            .cipher
            .encrypt(GenericArray::from_slice(&iv), plaintext.as_bytes())
            .map_err(|e| CoreError::Internal(format!("Encryption failed: {e}")))?;
        let (ciphertext, tag) = sealed.split_at(sealed.len() - TAG_SIZE);
        Ok(format!(
            "{}:{}:{}",
            hex::encode(iv),
            hex::encode(tag),
            hex::encode(ciphertext)
        ))
    }

    pub fn decrypt(&self, encrypted: &str) -> Result<String, CoreError> {
        let malformed = || CoreError::Validation("Malformed encrypted value".into());

        let mut parts = encrypted.split(':');
        let (Some(iv), Some(tag), Some(ciphertext), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(malformed());
        };
        let iv = hex::decode(iv).filter(|v| v.len() == IV_SIZE).ok_or_else(malformed)?;
        let tag = hex::decode(tag).filter(|t| t.len() == TAG_SIZE).ok_or_else(malformed)?;
        let mut sealed = hex::decode(ciphertext).ok_or_else(malformed)?;
        sealed.extend_from_slice(&tag);

        let plaintext = self
            .cipher
            .decrypt(GenericArray::from_slice(&iv), sealed.as_slice())
            .map_err(|_| CoreError::Validation("Encrypted value failed authentication".into()))?;
        String::from_utf8(plaintext)
            .map_err(|_| CoreError::Validation("Decrypted value is not UTF-8".into()))
    }

    /// Encrypt every non-empty value; empty values pass through.
    pub fn encrypt_map(
        &self,
        values: &BTreeMap<String, String>,
    ) -> Result<BTreeMap<String, String>, CoreError> {
        values
            .iter()
            .map(|(k, v)| {
                let sealed = if v.is_empty() { String::new() } else { self.encrypt(v)? };
                Ok((k.clone(), sealed))
            })
            .collect()
    }

    pub fn decrypt_map(
        &self,
        values: &BTreeMap<String, String>,
    ) -> Result<BTreeMap<String, String>, CoreError> {
        values
            .iter()
            .map(|(k, v)| {
                let opened = if v.is_empty() { String::new() } else { self.decrypt(v)? };
                Ok((k.clone(), opened))
            })
            .collect()
    }
}
