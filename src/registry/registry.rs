use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{info, warn};

use crate::clock::VirtualClock;
use crate::config::{validate_uri, RegistryConfig};
use crate::error::{error_codes, VaultError, VaultResult};
use crate::recovery::RecoveryPolicy;
use crate::vault::{TimeShiftReport, Vault};

/// Deletion metadata of a vault
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VaultDeletion {
    pub deleted_date: DateTime<Utc>,
    pub scheduled_purge_date: DateTime<Utc>,
}

#[derive(Debug)]
struct VaultSlot {
    vault: Arc<Vault>,
    aliases: BTreeSet<String>,
    deletion: Option<VaultDeletion>,
}

/// Every vault of one emulator instance
#[derive(Debug, Default)]
pub struct VaultRegistry {
    slots: Vec<Option<VaultSlot>>,
    /// Base URIs and aliases to slot positions
    index: HashMap<String, usize>,
}

impl VaultRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry with the configured vaults, each on its own wall clock
    pub fn from_config(config: &RegistryConfig) -> VaultResult<Self> {
        Self::from_config_with_clocks(config, VirtualClock::system)
    }

    /// Build a registry with the configured vaults, taking clocks from `clocks`
    pub fn from_config_with_clocks<F>(config: &RegistryConfig, mut clocks: F) -> VaultResult<Self>
    where
        F: FnMut() -> VirtualClock,
    {
        config.validate()?;
        let mut registry = Self::new();
        for vault in &config.vaults {
            registry.create_vault_with_clock(&vault.base_uri, vault.recovery_policy()?, clocks())?;
            for alias in &vault.aliases {
                registry.add_alias(&vault.base_uri, alias)?;
            }
        }
        Ok(registry)
    }

    /// Create a vault following the wall clock
    pub fn create_vault(&mut self, base_uri: &str, recovery: RecoveryPolicy) -> VaultResult<Arc<Vault>> {
        self.create_vault_with_clock(base_uri, recovery, VirtualClock::system())
    }

    /// Create a vault driven by `clock`
    ///
    /// # Returns
    ///
    /// The new vault, or `AlreadyExists` when the URI is used by any vault,
    /// deleted ones included, or by an alias
    pub fn create_vault_with_clock(
        &mut self,
        base_uri: &str,
        recovery: RecoveryPolicy,
        clock: VirtualClock,
    ) -> VaultResult<Arc<Vault>> {
        validate_uri("base_uri", base_uri)
            .map_err(|_| VaultError::invalid_argument("base_uri", "an https:// URI without a path", base_uri))?;
        self.ensure_uri_free(base_uri)?;

        let vault = Arc::new(Vault::with_clock(base_uri, recovery, clock));
        self.slots.push(Some(VaultSlot {
            vault: Arc::clone(&vault),
            aliases: BTreeSet::new(),
            deletion: None,
        }));
        self.index.insert(base_uri.to_string(), self.slots.len() - 1);
        info!("Created vault {} ({})", base_uri, vault.recovery().level());
        Ok(vault)
    }

    /// Active vault reachable by base URI or alias
    pub fn find(&self, uri: &str) -> VaultResult<Arc<Vault>> {
        match self.slot(uri) {
            Some(slot) if slot.deletion.is_none() => Ok(Arc::clone(&slot.vault)),
            _ => Err(VaultError::vault_not_found(uri)),
        }
    }

    /// Deleted vault reachable by base URI or alias
    pub fn find_deleted(&self, uri: &str) -> VaultResult<(Arc<Vault>, VaultDeletion)> {
        match self.slot(uri) {
            Some(VaultSlot {
                vault,
                deletion: Some(deletion),
                ..
            }) => Ok((Arc::clone(vault), *deletion)),
            _ => Err(VaultError::vault_not_found(uri)),
        }
    }

    /// Active vaults in creation order
    pub fn list(&self) -> Vec<Arc<Vault>> {
        self.slots
            .iter()
            .flatten()
            .filter(|slot| slot.deletion.is_none())
            .map(|slot| Arc::clone(&slot.vault))
            .collect()
    }

    /// Deleted vaults in creation order
    pub fn list_deleted(&self) -> Vec<(Arc<Vault>, VaultDeletion)> {
        self.slots
            .iter()
            .flatten()
            .filter_map(|slot| slot.deletion.map(|deletion| (Arc::clone(&slot.vault), deletion)))
            .collect()
    }

    /// Aliases of the vault reachable by `uri`
    pub fn aliases(&self, uri: &str) -> VaultResult<Vec<String>> {
        self.slot(uri)
            .map(|slot| slot.aliases.iter().cloned().collect())
            .ok_or_else(|| VaultError::vault_not_found(uri))
    }

    /// Make an active vault reachable under `alias`
    pub fn add_alias(&mut self, uri: &str, alias: &str) -> VaultResult<()> {
        validate_uri("alias", alias)
            .map_err(|_| VaultError::invalid_argument("alias", "an https:// URI without a path", alias))?;
        let position = self.active_position(uri)?;
        self.ensure_uri_free(alias)?;

        self.index.insert(alias.to_string(), position);
        if let Some(slot) = self.slots[position].as_mut() {
            slot.aliases.insert(alias.to_string());
            info!("Added alias {} to vault {}", alias, slot.vault.base_uri());
        }
        Ok(())
    }

    pub fn remove_alias(&mut self, uri: &str, alias: &str) -> VaultResult<()> {
        let position = self.active_position(uri)?;
        let slot = self.slots[position]
            .as_mut()
            .ok_or_else(|| VaultError::vault_not_found(uri))?;
        if !slot.aliases.remove(alias) {
            return Err(VaultError::not_found("alias", alias));
        }
        self.index.remove(alias);
        info!("Removed alias {} from vault {}", alias, slot.vault.base_uri());
        Ok(())
    }

    /// Soft-delete a vault
    ///
    /// Vaults with a `ProtectedSubscription` recovery level cannot be deleted.
    pub fn delete_vault(&mut self, uri: &str) -> VaultResult<()> {
        let position = self.active_position(uri)?;
        let slot = self.slots[position]
            .as_mut()
            .ok_or_else(|| VaultError::vault_not_found(uri))?;
        let recovery = slot.vault.recovery();
        if recovery.level().is_subscription_protected() {
            return Err(VaultError::illegal_state(
                "delete vault",
                &format!("vault {} is protected by its subscription", uri),
                error_codes::VAULT_DELETE_NOT_ALLOWED,
            ));
        }

        let now = slot.vault.clock().now();
        slot.deletion = Some(VaultDeletion {
            deleted_date: now,
            scheduled_purge_date: recovery.scheduled_purge_date(now),
        });
        info!("Deleted vault {}", slot.vault.base_uri());
        Ok(())
    }

    pub fn recover_vault(&mut self, uri: &str) -> VaultResult<()> {
        let slot = self.deleted_slot_mut(uri)?;
        slot.deletion = None;
        info!("Recovered vault {}", slot.vault.base_uri());
        Ok(())
    }

    /// Permanently remove a deleted vault, freeing its URI and aliases
    pub fn purge_vault(&mut self, uri: &str) -> VaultResult<()> {
        self.deleted_slot_mut(uri)?;
        let position = self.index.get(uri).copied().ok_or_else(|| VaultError::vault_not_found(uri))?;
        if let Some(slot) = self.slots[position].take() {
            self.index.remove(slot.vault.base_uri());
            for alias in &slot.aliases {
                self.index.remove(alias);
            }
            info!("Purged vault {}", slot.vault.base_uri());
        }
        Ok(())
    }

    /// Shift the clock of one vault, or of every vault, and apply what became due
    ///
    /// # Arguments
    ///
    /// * `uri` - Vault to shift, or `None` for all of them
    /// * `seconds` - Positive number of seconds
    /// * `regenerate_certificates` - Re-issue certificates of the shifted vaults
    ///
    /// # Returns
    ///
    /// The summed report of the shifted active vaults
    pub fn time_shift(
        &mut self,
        uri: Option<&str>,
        seconds: i64,
        regenerate_certificates: bool,
    ) -> VaultResult<TimeShiftReport> {
        let mut report = TimeShiftReport::default();
        match uri {
            Some(uri) => report.merge(self.find(uri)?.time_shift(seconds, regenerate_certificates)?),
            None => {
                for slot in self.slots.iter().flatten() {
                    if slot.deletion.is_none() {
                        report.merge(slot.vault.time_shift(seconds, regenerate_certificates)?);
                    } else {
                        slot.vault.clock().shift(seconds)?;
                    }
                }
            }
        }
        self.purge_expired_vaults();
        Ok(report)
    }

    fn purge_expired_vaults(&mut self) {
        let expired: Vec<String> = self
            .slots
            .iter()
            .flatten()
            .filter(|slot| {
                slot.deletion
                    .map_or(false, |deletion| deletion.scheduled_purge_date < slot.vault.clock().now())
            })
            .map(|slot| slot.vault.base_uri().to_string())
            .collect();
        for uri in expired {
            if let Err(e) = self.purge_vault(&uri) {
                warn!("Failed to purge expired vault {}: {}", uri, e);
            }
        }
    }

    fn slot(&self, uri: &str) -> Option<&VaultSlot> {
        self.index
            .get(uri)
            .and_then(|&position| self.slots.get(position))
            .and_then(Option::as_ref)
    }

    fn active_position(&self, uri: &str) -> VaultResult<usize> {
        match self.index.get(uri) {
            Some(&position) if self.slots[position].as_ref().map_or(false, |slot| slot.deletion.is_none()) => {
                Ok(position)
            }
            _ => Err(VaultError::vault_not_found(uri)),
        }
    }

    fn deleted_slot_mut(&mut self, uri: &str) -> VaultResult<&mut VaultSlot> {
        let position = self.index.get(uri).copied();
        match position.and_then(|position| self.slots[position].as_mut()) {
            Some(slot) if slot.deletion.is_some() => Ok(slot),
            _ => Err(VaultError::vault_not_found(uri)),
        }
    }

    fn ensure_uri_free(&self, uri: &str) -> VaultResult<()> {
        if self.index.contains_key(uri) {
            return Err(VaultError::AlreadyExists {
                entity: "vault".to_string(),
                id: uri.to_string(),
                error_code: error_codes::VAULT_ALREADY_EXISTS,
            });
        }
        Ok(())
    }
}
