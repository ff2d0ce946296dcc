//! Crypto Core
//!
//! Authenticated encryption of PII strings and salted hashing of searchable
//! identifiers. Both are pure functions over their inputs and a key injected
//! at startup, so they run in parallel without locking.

pub mod cipher;
pub mod hashing;

pub use cipher::{EncryptedField, FieldCipher, IV_LEN, TAG_LEN};
pub use hashing::{content_digest, hash_identifier, HashPurpose, HashedIdentifier, IdentifierHasher};

/// Associated-data tags, one per encrypted column
pub mod context {
    pub const NAME: &str = "name";
    pub const PHONE: &str = "phone";
    pub const EMAIL: &str = "email";
    pub const NATIONAL_ID: &str = "national_id";
    pub const ADDRESS: &str = "address";
}
