use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use log::{debug, info};

use crate::backup::{
    backup_certificate, backup_key, backup_secret, restore_certificate, restore_key, restore_secret,
    CertificateBackup, KeyBackup, SecretBackup,
};
use crate::certificates::{CertificateImportInput, CertificatePolicy, CertificateVault};
use crate::clock::VirtualClock;
use crate::entity::{CertificateEntityId, KeyEntityId, SecretEntityId, VersionedCertificateEntityId};
use crate::error::{VaultError, VaultResult};
use crate::keys::KeyVault;
use crate::recovery::RecoveryPolicy;
use crate::secrets::SecretVault;

/// Work done by one time shift of a vault
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeShiftReport {
    /// Deleted entity chains dropped because their purge date passed
    pub purged: usize,
    pub rotations: usize,
    pub renewals: usize,
    pub regenerated: usize,
}

impl TimeShiftReport {
    pub(crate) fn merge(&mut self, other: TimeShiftReport) {
        self.purged += other.purged;
        self.rotations += other.rotations;
        self.renewals += other.renewals;
        self.regenerated += other.regenerated;
    }
}

/// The stores of one vault
#[derive(Debug, Clone)]
pub struct VaultState {
    pub keys: KeyVault,
    pub secrets: SecretVault,
    pub certificates: CertificateVault,
}

impl VaultState {
    pub fn new(base_uri: &str, recovery: RecoveryPolicy, clock: VirtualClock) -> Self {
        Self {
            keys: KeyVault::new(base_uri, recovery.clone(), clock.clone()),
            secrets: SecretVault::new(base_uri, recovery.clone(), clock.clone()),
            certificates: CertificateVault::new(base_uri, recovery, clock),
        }
    }

    pub fn create_certificate(
        &mut self,
        name: &str,
        policy: CertificatePolicy,
    ) -> VaultResult<VersionedCertificateEntityId> {
        self.certificates
            .create_certificate(&mut self.keys, &mut self.secrets, name, policy)
    }

    pub fn import_certificate(
        &mut self,
        name: &str,
        input: CertificateImportInput,
    ) -> VaultResult<VersionedCertificateEntityId> {
        self.certificates
            .import_certificate(&mut self.keys, &mut self.secrets, name, input)
    }

    pub fn merge_certificate(&mut self, name: &str, content: &[u8]) -> VaultResult<VersionedCertificateEntityId> {
        self.certificates
            .merge_certificate(&mut self.keys, &mut self.secrets, name, content)
    }

    pub fn delete_certificate(&mut self, id: &CertificateEntityId) -> VaultResult<()> {
        self.certificates
            .delete_certificate(&mut self.keys, &mut self.secrets, id)
    }

    pub fn recover_certificate(&mut self, id: &CertificateEntityId) -> VaultResult<()> {
        self.certificates
            .recover_certificate(&mut self.keys, &mut self.secrets, id)
    }

    pub fn purge_certificate(&mut self, id: &CertificateEntityId) -> VaultResult<()> {
        self.certificates
            .purge_certificate(&mut self.keys, &mut self.secrets, id)
    }

    pub fn backup_key(&self, id: &KeyEntityId) -> VaultResult<KeyBackup> {
        backup_key(&self.keys, id)
    }

    pub fn restore_key(&mut self, backup: KeyBackup) -> VaultResult<KeyEntityId> {
        restore_key(&mut self.keys, backup)
    }

    pub fn backup_secret(&self, id: &SecretEntityId) -> VaultResult<SecretBackup> {
        backup_secret(&self.secrets, id)
    }

    pub fn restore_secret(&mut self, backup: SecretBackup) -> VaultResult<SecretEntityId> {
        restore_secret(&mut self.secrets, backup)
    }

    pub fn backup_certificate(&self, id: &CertificateEntityId) -> VaultResult<CertificateBackup> {
        backup_certificate(&self.keys, &self.secrets, &self.certificates, id)
    }

    pub fn restore_certificate(&mut self, backup: CertificateBackup) -> VaultResult<CertificateEntityId> {
        restore_certificate(&mut self.keys, &mut self.secrets, &mut self.certificates, backup)
    }

    /// Catch up with the clock: purge expired deletions, then run missed
    /// rotations and renewals, optionally re-issuing certificates
    pub fn catch_up(&mut self, regenerate_certificates: bool) -> VaultResult<TimeShiftReport> {
        let mut report = TimeShiftReport {
            purged: self.keys.store_mut().purge_expired().len()
                + self.secrets.store_mut().purge_expired().len()
                + self.certificates.store_mut().purge_expired().len(),
            ..TimeShiftReport::default()
        };
        report.rotations = self.keys.perform_missed_rotations()?;
        report.renewals = self
            .certificates
            .perform_missed_renewals(&mut self.keys, &mut self.secrets)?;
        if regenerate_certificates {
            report.regenerated = self
                .certificates
                .regenerate_certificates(&self.keys, &mut self.secrets)?;
        }
        Ok(report)
    }
}

/// One emulated vault, shared between callers
///
/// # Examples
///
/// ```
/// use vaultsim::keys::{KeyCreateInput, KeyType};
/// use vaultsim::recovery::RecoveryPolicy;
/// use vaultsim::vault::Vault;
///
/// let vault = Vault::new("https://localhost:8443", RecoveryPolicy::default());
/// let id = vault
///     .write()
///     .unwrap()
///     .keys
///     .create_key("k1", KeyCreateInput::new(KeyType::Ec))
///     .unwrap();
/// assert_eq!(vault.read().unwrap().keys.versions(&id.entity_id()).unwrap().len(), 1);
/// ```
#[derive(Debug)]
pub struct Vault {
    base_uri: String,
    recovery: RecoveryPolicy,
    clock: VirtualClock,
    created_on: DateTime<Utc>,
    state: RwLock<VaultState>,
}

impl Vault {
    /// Create an empty vault following the wall clock
    pub fn new(base_uri: &str, recovery: RecoveryPolicy) -> Self {
        Self::with_clock(base_uri, recovery, VirtualClock::system())
    }

    /// Create an empty vault driven by `clock`
    pub fn with_clock(base_uri: &str, recovery: RecoveryPolicy, clock: VirtualClock) -> Self {
        debug!("Creating vault {} ({})", base_uri, recovery.level());
        Self {
            base_uri: base_uri.to_string(),
            created_on: clock.now(),
            state: RwLock::new(VaultState::new(base_uri, recovery.clone(), clock.clone())),
            recovery,
            clock,
        }
    }

    pub fn base_uri(&self) -> &str {
        &self.base_uri
    }

    pub fn recovery(&self) -> &RecoveryPolicy {
        &self.recovery
    }

    pub fn clock(&self) -> &VirtualClock {
        &self.clock
    }

    pub fn created_on(&self) -> DateTime<Utc> {
        self.created_on
    }

    /// Shared access to the stores
    pub fn read(&self) -> VaultResult<RwLockReadGuard<'_, VaultState>> {
        self.state
            .read()
            .map_err(|_| VaultError::lock_poisoned(&self.base_uri))
    }

    /// Exclusive access to the stores
    pub fn write(&self) -> VaultResult<RwLockWriteGuard<'_, VaultState>> {
        self.state
            .write()
            .map_err(|_| VaultError::lock_poisoned(&self.base_uri))
    }

    /// Advance the vault's clock and apply everything that became due
    ///
    /// # Arguments
    ///
    /// * `seconds` - Positive number of seconds to move forward
    /// * `regenerate_certificates` - Re-issue the X.509 material of every
    ///   active certificate after the shift
    ///
    /// # Returns
    ///
    /// What the shift purged, rotated, renewed and regenerated
    pub fn time_shift(&self, seconds: i64, regenerate_certificates: bool) -> VaultResult<TimeShiftReport> {
        let mut state = self.write()?;
        self.clock.shift(seconds)?;
        let report = state.catch_up(regenerate_certificates)?;
        info!(
            "Shifted vault {} by {} seconds: {} purged, {} rotations, {} renewals, {} regenerated",
            self.base_uri, seconds, report.purged, report.rotations, report.renewals, report.regenerated
        );
        Ok(report)
    }

    /// Number of active keys, secrets and certificates, managed ones excluded
    pub fn entity_counts(&self) -> VaultResult<BTreeMap<&'static str, usize>> {
        let state = self.read()?;
        Ok(BTreeMap::from([
            ("keys", state.keys.list().len()),
            ("secrets", state.secrets.list().len()),
            ("certificates", state.certificates.list().len()),
        ]))
    }
}
