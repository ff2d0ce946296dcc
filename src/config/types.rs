use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::error::{Error, Result};

/// Salt used for phone hashes when none is provisioned. Not secure.
pub const DEV_PHONE_HASH_SALT: &str = "dev-insecure-phone-salt";

/// Salt used for national-ID hashes when none is provisioned. Not secure.
pub const DEV_ID_HASH_SALT: &str = "dev-insecure-id-salt";

/// AES-256 key size in bytes
pub const ENCRYPTION_KEY_BYTES: usize = 32;

/// Engine configuration, built once at process start and injected by reference.
#[derive(Debug)]
pub struct ComplianceConfig {
    /// Hex-encoded 32-byte symmetric key
    pub encryption_key: Option<SecretString>,

    /// Salt for phone-number hashes
    pub phone_hash_salt: Option<SecretString>,

    /// Salt for national-ID hashes
    pub id_hash_salt: Option<SecretString>,

    /// Mandated communication retention window in years
    pub communication_retention_years: u32,

    /// Default row cap for access reports
    pub report_limit: usize,

    /// Retention period stated in export bundles
    pub retention_statement: String,

    /// Legal basis citation attached to export bundles
    pub legal_citation: String,

    /// PostgreSQL connection string
    pub database_url: Option<String>,
}

impl Default for ComplianceConfig {
    fn default() -> Self {
        Self {
            encryption_key: None,
            phone_hash_salt: None,
            id_hash_salt: None,
            communication_retention_years: 3,
            report_limit: 1000,
            retention_statement:
                "Personal data is retained while the account is active; communication metadata for 3 years"
                    .to_string(),
            legal_citation: "POPIA Section 23 (access to personal information)".to_string(),
            database_url: None,
        }
    }
}

impl ComplianceConfig {
    /// Create a configuration with the given hex-encoded key and defaults elsewhere
    pub fn new(encryption_key_hex: impl Into<String>) -> Self {
        Self {
            encryption_key: Some(SecretString::from(encryption_key_hex.into())),
            ..Self::default()
        }
    }

    /// Provision the identifier hash salts
    pub fn with_salts(mut self, phone_salt: impl Into<String>, id_salt: impl Into<String>) -> Self {
        self.phone_hash_salt = Some(SecretString::from(phone_salt.into()));
        self.id_hash_salt = Some(SecretString::from(id_salt.into()));
        self
    }

    /// Override the communication retention window
    pub fn with_retention_years(mut self, years: u32) -> Self {
        self.communication_retention_years = years;
        self
    }

    /// Decode the symmetric key. Absence or a wrong length is fatal.
    pub fn key_bytes(&self) -> Result<zeroize::Zeroizing<Vec<u8>>> {
        let encoded = self
            .encryption_key
            .as_ref()
            .ok_or_else(|| Error::Configuration("encryption key is not set".to_string()))?;

        let bytes = hex::decode(encoded.expose_secret().trim())
            .map(zeroize::Zeroizing::new)
            .map_err(|_| Error::Configuration("encryption key is not valid hex".to_string()))?;

        if bytes.len() != ENCRYPTION_KEY_BYTES {
            return Err(Error::Configuration(format!(
                "encryption key must be {} bytes, got {}",
                ENCRYPTION_KEY_BYTES,
                bytes.len()
            )));
        }

        Ok(bytes)
    }

    /// Phone salt, or the development default when none is provisioned
    pub fn phone_salt(&self) -> String {
        provisioned(&self.phone_hash_salt)
            .unwrap_or(DEV_PHONE_HASH_SALT)
            .to_string()
    }

    /// National-ID salt, or the development default when none is provisioned
    pub fn id_salt(&self) -> String {
        provisioned(&self.id_hash_salt)
            .unwrap_or(DEV_ID_HASH_SALT)
            .to_string()
    }

    /// Whether either salt is still the insecure development default.
    /// An empty salt counts as not provisioned.
    pub fn uses_dev_salts(&self) -> bool {
        provisioned(&self.phone_hash_salt).is_none() || provisioned(&self.id_hash_salt).is_none()
    }

    /// Check everything that can be checked without touching storage
    pub fn validate(&self) -> Result<()> {
        self.key_bytes()?;

        if self.phone_salt() == self.id_salt() {
            return Err(Error::Configuration(
                "phone and national-ID hash salts must differ".to_string(),
            ));
        }

        if self.communication_retention_years == 0 {
            return Err(Error::Configuration(
                "communication retention window must be at least one year".to_string(),
            ));
        }

        if self.report_limit == 0 {
            return Err(Error::Configuration("report limit must be positive".to_string()));
        }

        Ok(())
    }
}

fn provisioned(configured: &Option<SecretString>) -> Option<&str> {
    configured
        .as_ref()
        .map(|salt| salt.expose_secret())
        .filter(|salt| !salt.is_empty())
}

/// Raw, string-typed view used while merging configuration sources
#[derive(Debug, Default, Deserialize)]
pub(crate) struct RawComplianceConfig {
    pub encryption_key: Option<String>,
    pub phone_hash_salt: Option<String>,
    pub id_hash_salt: Option<String>,
    pub communication_retention_years: Option<u32>,
    pub report_limit: Option<usize>,
    pub retention_statement: Option<String>,
    pub legal_citation: Option<String>,
    pub database_url: Option<String>,
}

impl From<RawComplianceConfig> for ComplianceConfig {
    fn from(raw: RawComplianceConfig) -> Self {
        let defaults = ComplianceConfig::default();
        Self {
            encryption_key: raw.encryption_key.map(SecretString::from),
            phone_hash_salt: raw.phone_hash_salt.map(SecretString::from),
            id_hash_salt: raw.id_hash_salt.map(SecretString::from),
            communication_retention_years: raw
                .communication_retention_years
                .unwrap_or(defaults.communication_retention_years),
            report_limit: raw.report_limit.unwrap_or(defaults.report_limit),
            retention_statement: raw
                .retention_statement
                .unwrap_or(defaults.retention_statement),
            legal_citation: raw.legal_citation.unwrap_or(defaults.legal_citation),
            database_url: raw.database_url,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

    #[test]
    fn test_missing_key_is_configuration_error() {
        let config = ComplianceConfig::default();
        assert!(matches!(config.key_bytes(), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_short_key_is_rejected() {
        let config = ComplianceConfig::new("0011223344");
        assert!(matches!(config.key_bytes(), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_non_hex_key_is_rejected() {
        let config = ComplianceConfig::new("z".repeat(64));
        assert!(matches!(config.key_bytes(), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_valid_key_decodes() {
        let config = ComplianceConfig::new(KEY);
        assert_eq!(config.key_bytes().unwrap().len(), ENCRYPTION_KEY_BYTES);
    }

    #[test]
    fn test_dev_salts_are_used_when_unset() {
        let config = ComplianceConfig::new(KEY);
        assert!(config.uses_dev_salts());
        assert_eq!(config.phone_salt(), DEV_PHONE_HASH_SALT);
        assert_eq!(config.id_salt(), DEV_ID_HASH_SALT);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_salt_counts_as_dev_default() {
        let config = ComplianceConfig::new(KEY).with_salts("", "id-salt");
        assert!(config.uses_dev_salts());
        assert_eq!(config.phone_salt(), DEV_PHONE_HASH_SALT);
        assert_eq!(config.id_salt(), "id-salt");
    }

    #[test]
    fn test_identical_salts_fail_validation() {
        let config = ComplianceConfig::new(KEY).with_salts("same", "same");
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_debug_does_not_leak_secrets() {
        let config = ComplianceConfig::new(KEY).with_salts("phone-secret", "id-secret");
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains(KEY));
        assert!(!rendered.contains("phone-secret"));
    }
}
