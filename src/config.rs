//! Vault registry configuration
//!
//! Configurations are plain JSON documents. Loading validates them, so a
//! [`RegistryConfig`] that was read successfully can always be turned into
//! a registry.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{VaultError, VaultResult};
use crate::recovery::{RecoveryLevel, RecoveryPolicy, MAX_RECOVERABLE_DAYS};

/// Base URI of the vault created when nothing else is configured
pub const DEFAULT_VAULT_URI: &str = "https://localhost:8443";

const URI_SCHEME: &str = "https://";

/// One vault to create at start-up
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultConfig {
    pub base_uri: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default = "default_recovery_level")]
    pub recovery_level: RecoveryLevel,
    #[serde(default = "default_recoverable_days")]
    pub recoverable_days: Option<u32>,
}

fn default_recovery_level() -> RecoveryLevel {
    RecoveryLevel::Recoverable
}

fn default_recoverable_days() -> Option<u32> {
    Some(MAX_RECOVERABLE_DAYS)
}

impl VaultConfig {
    /// A `Recoverable` vault with 90 days of retention
    pub fn new(base_uri: &str) -> Self {
        Self {
            base_uri: base_uri.to_string(),
            aliases: Vec::new(),
            recovery_level: default_recovery_level(),
            recoverable_days: default_recoverable_days(),
        }
    }

    pub fn with_alias(mut self, alias: &str) -> Self {
        self.aliases.push(alias.to_string());
        self
    }

    pub fn with_recovery(mut self, level: RecoveryLevel, recoverable_days: Option<u32>) -> Self {
        self.recovery_level = level;
        self.recoverable_days = recoverable_days;
        self
    }

    /// Recovery policy described by this configuration
    pub fn recovery_policy(&self) -> VaultResult<RecoveryPolicy> {
        RecoveryPolicy::new(self.recovery_level, self.recoverable_days)
            .map_err(|e| VaultError::configuration("recoverable_days", &e.to_string()))
    }

    pub fn validate(&self) -> VaultResult<()> {
        validate_uri("base_uri", &self.base_uri)?;
        for alias in &self.aliases {
            validate_uri("aliases", alias)?;
        }
        self.recovery_policy()?;
        Ok(())
    }
}

/// Vaults of a registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    pub vaults: Vec<VaultConfig>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            vaults: vec![VaultConfig::new(DEFAULT_VAULT_URI)],
        }
    }
}

impl RegistryConfig {
    /// Parse and validate a JSON configuration
    ///
    /// # Examples
    ///
    /// ```
    /// use vaultsim::config::RegistryConfig;
    ///
    /// let config = RegistryConfig::from_json(
    ///     r#"{"vaults": [{"base_uri": "https://vault.localhost:8443", "aliases": ["https://alias.localhost:8443"]}]}"#,
    /// )
    /// .unwrap();
    /// assert_eq!(config.vaults[0].recoverable_days, Some(90));
    /// ```
    pub fn from_json(json: &str) -> VaultResult<Self> {
        let config: RegistryConfig =
            serde_json::from_str(json).map_err(|e| VaultError::configuration("json", &e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read a JSON configuration file
    pub fn from_file<P: AsRef<Path>>(path: P) -> VaultResult<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)?;
        log::debug!("Loaded registry configuration from {}", path.display());
        Self::from_json(&json)
    }

    pub fn to_json(&self) -> VaultResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check every vault and reject URIs or aliases used twice
    pub fn validate(&self) -> VaultResult<()> {
        let mut seen = HashSet::new();
        for vault in &self.vaults {
            vault.validate()?;
            for uri in std::iter::once(&vault.base_uri).chain(&vault.aliases) {
                if !seen.insert(uri.as_str()) {
                    return Err(VaultError::configuration(
                        "vaults",
                        &format!("{} is configured more than once", uri),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Check that `uri` is an https URI with a host
pub(crate) fn validate_uri(setting: &str, uri: &str) -> VaultResult<()> {
    match uri.strip_prefix(URI_SCHEME) {
        Some(host) if !host.is_empty() && !host.contains('/') => Ok(()),
        _ => Err(VaultError::configuration(
            setting,
            &format!("{} must be an https:// URI without a path", uri),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = RegistryConfig::default();
        assert_eq!(config.vaults.len(), 1);
        assert_eq!(config.vaults[0].base_uri, DEFAULT_VAULT_URI);
        let policy = config.vaults[0].recovery_policy().unwrap();
        assert_eq!(policy.level(), RecoveryLevel::Recoverable);
        assert_eq!(policy.recoverable_days(), Some(90));
    }

    #[test]
    fn test_validation_failures() {
        let cases = [
            r#"{"vaults": [{"base_uri": "http://localhost:8443"}]}"#,
            r#"{"vaults": [{"base_uri": "https://a.localhost"}, {"base_uri": "https://a.localhost"}]}"#,
            r#"{"vaults": [{"base_uri": "https://a.localhost", "aliases": ["https://b.localhost"]}, {"base_uri": "https://b.localhost"}]}"#,
            r#"{"vaults": [{"base_uri": "https://a.localhost", "recovery_level": "CustomizedRecoverable", "recoverable_days": 3}]}"#,
            r#"{"vaults": [{"base_uri": "https://a.localhost", "recovery_level": "Purgeable"}]}"#,
            r#"{"vaults": "nope"}"#,
        ];
        for json in cases {
            let err = RegistryConfig::from_json(json).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Configuration, "{}", json);
        }

        // Purgeable vaults take no retention days
        let json = r#"{"vaults": [{"base_uri": "https://a.localhost", "recovery_level": "Purgeable", "recoverable_days": null}]}"#;
        assert!(RegistryConfig::from_json(json).is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let config = RegistryConfig {
            vaults: vec![
                VaultConfig::new("https://one.localhost:8443").with_alias("https://alias.localhost:8443"),
                VaultConfig::new("https://two.localhost:8443")
                    .with_recovery(RecoveryLevel::CustomizedRecoverablePurgeable, Some(7)),
            ],
        };

        // Write it out and read it back
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(config.to_json().unwrap().as_bytes()).unwrap();
        let loaded = RegistryConfig::from_file(file.path()).unwrap();
        assert_eq!(loaded, config);

        let missing = file.path().with_extension("missing");
        assert!(RegistryConfig::from_file(missing).is_err());
    }
}
