use super::types::{ComplianceConfig, RawComplianceConfig};
use crate::error::Result;
use config::{Config, Environment, File};

/// Configuration loader with builder pattern
pub struct ConfigLoader {
    config_file: Option<String>,
    load_env: bool,
    env_prefix: String,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self {
            config_file: None,
            load_env: false,
            env_prefix: "PII".to_string(),
        }
    }

    /// Load configuration from file
    pub fn load_from_file(mut self, path: Option<&str>) -> Self {
        self.config_file = path.map(String::from);
        self
    }

    /// Load configuration from environment variables (`PII_ENCRYPTION_KEY`, ...)
    pub fn load_from_env(mut self) -> Self {
        self.load_env = true;
        self
    }

    /// Use a different environment prefix
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Build and validate the final configuration
    pub fn build(self) -> Result<ComplianceConfig> {
        let mut builder = Config::builder();

        if let Some(config_path) = &self.config_file {
            builder = builder.add_source(File::with_name(config_path).required(false));
        } else {
            builder = builder
                .add_source(File::with_name("pii-compliance").required(false))
                .add_source(File::with_name("config/pii-compliance").required(false));
        }

        if self.load_env {
            // Values stay strings: salts and keys must come through byte-identical
            builder = builder
                .add_source(Environment::with_prefix(&self.env_prefix).prefix_separator("_"));
        }

        let raw: RawComplianceConfig = builder.build()?.try_deserialize()?;
        let config = ComplianceConfig::from(raw);
        config.validate()?;

        Ok(config)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::io::Write;

    #[test]
    fn test_load_from_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
encryption_key = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f"
phone_hash_salt = "phone"
id_hash_salt = "id"
communication_retention_years = 5
"#
        )
        .unwrap();

        let config = ConfigLoader::new()
            .load_from_file(file.path().to_str())
            .build()
            .unwrap();

        assert_eq!(config.communication_retention_years, 5);
        assert_eq!(config.report_limit, 1000);
        assert!(!config.uses_dev_salts());
    }

    #[test]
    fn test_numeric_env_secrets_are_kept_verbatim() {
        // Prefix unique to this test so parallel tests never see these variables
        let key = "0123456789012345678901234567890123456789012345678901234567890123";
        std::env::set_var("PIIVERBATIM_ENCRYPTION_KEY", key);
        std::env::set_var("PIIVERBATIM_PHONE_HASH_SALT", "0042");
        std::env::set_var("PIIVERBATIM_ID_HASH_SALT", "1e3");
        std::env::set_var("PIIVERBATIM_REPORT_LIMIT", "25");

        let config = ConfigLoader::new()
            .with_env_prefix("PIIVERBATIM")
            .load_from_env()
            .build()
            .unwrap();

        assert_eq!(config.phone_salt(), "0042");
        assert_eq!(config.id_salt(), "1e3");
        assert_eq!(config.report_limit, 25);
        assert_eq!(config.key_bytes().unwrap().as_slice(), hex::decode(key).unwrap().as_slice());
        assert!(!config.uses_dev_salts());
    }

    #[test]
    fn test_missing_key_fails_build() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "report_limit = 10").unwrap();

        let result = ConfigLoader::new()
            .load_from_file(file.path().to_str())
            .build();

        assert!(matches!(result, Err(Error::Configuration(_))));
    }
}
