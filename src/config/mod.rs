//! Engine configuration: secrets, retention window and report limits.

pub mod loader;
pub mod types;

pub use loader::ConfigLoader;
pub use types::{ComplianceConfig, DEV_ID_HASH_SALT, DEV_PHONE_HASH_SALT, ENCRYPTION_KEY_BYTES};
