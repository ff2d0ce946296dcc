//! One-way salted hashing of searchable identifiers
//!
//! HMAC-SHA256 keyed by a per-purpose secret salt. The output is
//! deterministic so it can back equality lookups, and cannot be reversed or
//! brute-forced from a phone-number dictionary without the salt.

use ring::hmac;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::config::ComplianceConfig;
use crate::error::{Error, Result};

/// Which salt an identifier is hashed under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HashPurpose {
    /// Phone numbers and other contact addresses
    Phone,
    /// National ID numbers
    NationalId,
}

/// Hex-encoded HMAC-SHA256 digest
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HashedIdentifier(String);

impl HashedIdentifier {
    /// Digest length in hex characters
    pub const HEX_LEN: usize = 64;

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for HashedIdentifier {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        if value.len() == Self::HEX_LEN && value.bytes().all(|b| b.is_ascii_hexdigit()) {
            Ok(Self(value.to_ascii_lowercase()))
        } else {
            Err(Error::Validation(format!(
                "hashed identifier must be {} hex characters",
                Self::HEX_LEN
            )))
        }
    }
}

impl From<HashedIdentifier> for String {
    fn from(hash: HashedIdentifier) -> Self {
        hash.0
    }
}

impl fmt::Display for HashedIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for HashedIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HashedIdentifier({}..)", &self.0[..8.min(self.0.len())])
    }
}

/// Hash `plaintext` under `salt`
pub fn hash_identifier(plaintext: &str, salt: &str) -> HashedIdentifier {
    let key = hmac::Key::new(hmac::HMAC_SHA256, salt.as_bytes());
    let tag = hmac::sign(&key, plaintext.as_bytes());
    HashedIdentifier(hex::encode(tag.as_ref()))
}

/// SHA-256 of a message body. Only the digest is ever stored.
pub fn content_digest(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Holds one HMAC key per purpose, derived once from configuration
#[derive(Clone)]
pub struct IdentifierHasher {
    phone_key: hmac::Key,
    national_id_key: hmac::Key,
}

impl IdentifierHasher {
    /// Build from explicit salts; identical salts are refused
    pub fn new(phone_salt: &str, national_id_salt: &str) -> Result<Self> {
        if phone_salt == national_id_salt {
            return Err(Error::Configuration(
                "phone and national-ID hash salts must differ".to_string(),
            ));
        }

        Ok(Self {
            phone_key: hmac::Key::new(hmac::HMAC_SHA256, phone_salt.as_bytes()),
            national_id_key: hmac::Key::new(hmac::HMAC_SHA256, national_id_salt.as_bytes()),
        })
    }

    /// Build from the injected configuration
    pub fn from_config(config: &ComplianceConfig) -> Result<Self> {
        Self::new(&config.phone_salt(), &config.id_salt())
    }

    pub fn hash(&self, plaintext: &str, purpose: HashPurpose) -> HashedIdentifier {
        let key = match purpose {
            HashPurpose::Phone => &self.phone_key,
            HashPurpose::NationalId => &self.national_id_key,
        };
        HashedIdentifier(hex::encode(hmac::sign(key, plaintext.as_bytes()).as_ref()))
    }

    pub fn hash_phone(&self, phone: &str) -> HashedIdentifier {
        self.hash(phone, HashPurpose::Phone)
    }

    pub fn hash_national_id(&self, id_number: &str) -> HashedIdentifier {
        self.hash(id_number, HashPurpose::NationalId)
    }
}

impl fmt::Debug for IdentifierHasher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentifierHasher")
            .field("algorithm", &"HMAC-SHA256")
            .finish()
    }
}
