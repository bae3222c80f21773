/*!
 * vaultsim: an in-memory key vault emulator
 *
 * This crate emulates a managed key vault for local development and tests.
 * It keeps everything in memory and offers:
 *
 * - Versioned keys (RSA, EC, AES) with sign/verify, encrypt/decrypt and wrap/unwrap
 * - Versioned secrets with content types
 * - Certificates backed by a managed key and secret, issued self-signed or
 *   merged from an external issuer
 * - Soft delete, recovery and purge governed by the vault recovery level
 * - Key rotation and certificate lifetime policies
 * - Opaque backups that restore into any vault
 * - A virtual clock per vault that can be shifted forward to simulate time
 *
 * # Example
 *
 * ```
 * use vaultsim::prelude::*;
 *
 * fn main() -> Result<(), VaultError> {
 *     let mut registry = VaultRegistry::from_config(&RegistryConfig::default())?;
 *     let vault = registry.find(DEFAULT_VAULT_URI)?;
 *
 *     let secret = vault
 *         .write()?
 *         .secrets
 *         .create_secret("database-password", SecretCreateInput::new("hunter2"))?;
 *     assert_eq!(vault.read()?.secrets.get(&secret)?.value(), "hunter2");
 *
 *     registry.time_shift(None, 86_400, false)?;
 *     Ok(())
 * }
 * ```
 */

/// Backups of keys, secrets and certificates
pub mod backup;

/// Certificate policies, issuance, import and lifetime actions
pub mod certificates;

/// Shiftable time source
pub mod clock;

/// Registry configuration
pub mod config;

/// Entity identifiers and attributes
pub mod entity;

/// Common error types
pub mod error;

/// Key entities and cryptographic operations
pub mod keys;

/// Recovery levels and retention
pub mod recovery;

/// Registry of vaults
pub mod registry;

/// Key rotation policies
pub mod rotation;

/// Secret entities
pub mod secrets;

/// Versioned entity storage with soft delete
pub mod store;

/// A single vault and its time shift
pub mod vault;

// Re-export main types for convenience
pub use clock::VirtualClock;
pub use config::{RegistryConfig, VaultConfig, DEFAULT_VAULT_URI};
pub use error::{ErrorKind, VaultError, VaultResult};
pub use recovery::{RecoveryLevel, RecoveryPolicy};
pub use registry::VaultRegistry;
pub use vault::{TimeShiftReport, Vault, VaultState};

/// The types needed by most users of the emulator.
pub mod prelude {
    pub use crate::backup::{CertificateBackup, KeyBackup, SecretBackup};
    pub use crate::certificates::{CertificateImportInput, CertificatePolicy};
    pub use crate::entity::EntityAttributes;
    pub use crate::keys::{
        EncryptionAlgorithm, KeyCreateInput, KeyCurve, KeyImportInput, KeyOperation, KeyType,
        SignatureAlgorithm,
    };
    pub use crate::rotation::{KeyLifetimeAction, KeyLifetimeActionTrigger, Period, RotationPolicy};
    pub use crate::secrets::SecretCreateInput;
    pub use crate::{
        ErrorKind, RecoveryLevel, RecoveryPolicy, RegistryConfig, TimeShiftReport, Vault, VaultConfig,
        VaultError, VaultRegistry, VaultResult, VaultState, VirtualClock, DEFAULT_VAULT_URI,
    };
}
