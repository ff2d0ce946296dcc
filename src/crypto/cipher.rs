//! Field-level authenticated encryption
//!
//! AES-256-GCM with a fresh random 96-bit nonce per call. The caller-supplied
//! context string is bound as associated data, so a ciphertext written for one
//! column cannot be replayed into another.

#![allow(deprecated)] // generic-array from_slice during the 1.x migration

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng, Payload},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::config::ComplianceConfig;
use crate::error::{Error, Result};

/// Nonce length in bytes
pub const IV_LEN: usize = 12;

/// GCM tag length in bytes
pub const TAG_LEN: usize = 16;

/// Uniform message for every authentication failure
const AUTH_FAILED: &str = "ciphertext failed authentication";

/// Ciphertext of a single PII string.
///
/// Stored as `base64(iv):base64(tag):base64(ciphertext)`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EncryptedField {
    iv: [u8; IV_LEN],
    tag: [u8; TAG_LEN],
    ciphertext: Vec<u8>,
}

impl EncryptedField {
    /// Assemble a field from its raw parts
    pub fn from_parts(iv: [u8; IV_LEN], tag: [u8; TAG_LEN], ciphertext: Vec<u8>) -> Self {
        Self { iv, tag, ciphertext }
    }

    pub fn iv(&self) -> &[u8; IV_LEN] {
        &self.iv
    }

    pub fn tag(&self) -> &[u8; TAG_LEN] {
        &self.tag
    }

    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }

    #[cfg(test)]
    pub(crate) fn parts_mut(&mut self) -> (&mut [u8; IV_LEN], &mut [u8; TAG_LEN], &mut Vec<u8>) {
        (&mut self.iv, &mut self.tag, &mut self.ciphertext)
    }

    /// Storage encoding
    pub fn to_storage_string(&self) -> String {
        format!(
            "{}:{}:{}",
            general_purpose::STANDARD.encode(self.iv),
            general_purpose::STANDARD.encode(self.tag),
            general_purpose::STANDARD.encode(&self.ciphertext)
        )
    }
}

impl FromStr for EncryptedField {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let malformed = || Error::Decryption("malformed encrypted field".to_string());

        let mut parts = s.split(':');
        let (iv, tag, ciphertext) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(iv), Some(tag), Some(ct), None) => (iv, tag, ct),
            _ => return Err(malformed()),
        };

        let iv: [u8; IV_LEN] = general_purpose::STANDARD
            .decode(iv)
            .map_err(|_| malformed())?
            .try_into()
            .map_err(|_| malformed())?;
        let tag: [u8; TAG_LEN] = general_purpose::STANDARD
            .decode(tag)
            .map_err(|_| malformed())?
            .try_into()
            .map_err(|_| malformed())?;
        let ciphertext = general_purpose::STANDARD
            .decode(ciphertext)
            .map_err(|_| malformed())?;

        Ok(Self { iv, tag, ciphertext })
    }
}

impl TryFrom<String> for EncryptedField {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<EncryptedField> for String {
    fn from(field: EncryptedField) -> Self {
        field.to_storage_string()
    }
}

// Ciphertext is opaque; keep it out of logs
impl fmt::Debug for EncryptedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptedField")
            .field("len", &self.ciphertext.len())
            .finish()
    }
}

/// Authenticated cipher for PII columns
#[derive(Clone)]
pub struct FieldCipher {
    cipher: Aes256Gcm,
}

impl FieldCipher {
    /// Build the cipher from a raw 32-byte key
    pub fn new(key: &[u8]) -> Result<Self> {
        let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| {
            Error::Configuration(format!(
                "encryption key must be {} bytes",
                crate::config::ENCRYPTION_KEY_BYTES
            ))
        })?;
        Ok(Self { cipher })
    }

    /// Build the cipher from the injected configuration
    pub fn from_config(config: &ComplianceConfig) -> Result<Self> {
        let key = config.key_bytes()?;
        Self::new(&key)
    }

    /// Encrypt `plaintext`, binding `context` as associated data
    pub fn encrypt(&self, plaintext: &str, context: &str) -> Result<EncryptedField> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let mut sealed = self
            .cipher
            .encrypt(
                &nonce,
                Payload {
                    msg: plaintext.as_bytes(),
                    aad: context.as_bytes(),
                },
            )
            .map_err(|_| Error::Configuration("encryption failed".to_string()))?;

        // aes-gcm appends the tag to the ciphertext
        let tag_start = sealed.len() - TAG_LEN;
        let tag: [u8; TAG_LEN] = sealed[tag_start..]
            .try_into()
            .map_err(|_| Error::Configuration("unexpected tag length".to_string()))?;
        sealed.truncate(tag_start);

        let mut iv = [0u8; IV_LEN];
        iv.copy_from_slice(nonce.as_slice());

        Ok(EncryptedField {
            iv,
            tag,
            ciphertext: sealed,
        })
    }

    /// Decrypt a field; fails closed on any mismatch
    pub fn decrypt(&self, field: &EncryptedField, context: &str) -> Result<String> {
        let mut sealed = Vec::with_capacity(field.ciphertext.len() + TAG_LEN);
        sealed.extend_from_slice(&field.ciphertext);
        sealed.extend_from_slice(&field.tag);

        let plaintext = self
            .cipher
            .decrypt(
                Nonce::from_slice(&field.iv),
                Payload {
                    msg: &sealed,
                    aad: context.as_bytes(),
                },
            )
            .map_err(|_| Error::Decryption(AUTH_FAILED.to_string()))?;

        String::from_utf8(plaintext)
            .map_err(|_| Error::Decryption("plaintext is not valid UTF-8".to_string()))
    }

    /// Decrypt straight from the storage encoding
    pub fn decrypt_stored(&self, stored: &str, context: &str) -> Result<String> {
        let field: EncryptedField = stored.parse()?;
        self.decrypt(&field, context)
    }
}

impl fmt::Debug for FieldCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldCipher").field("algorithm", &"AES-256-GCM").finish()
    }
}
