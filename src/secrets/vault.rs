use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use log::info;

use crate::clock::VirtualClock;
use crate::entity::{SecretEntityId, VaultEntity, VersionedSecretEntityId};
use crate::error::{error_codes, VaultError, VaultResult};
use crate::recovery::RecoveryPolicy;
use crate::store::{validate_window, VersionedEntityStore};

use super::entity::SecretEntity;

/// Request to create a secret version
#[derive(Debug, Clone, Default)]
pub struct SecretCreateInput {
    pub value: String,
    pub content_type: Option<String>,
    pub enabled: Option<bool>,
    pub not_before: Option<DateTime<Utc>>,
    pub expires_on: Option<DateTime<Utc>>,
    pub tags: BTreeMap<String, String>,
}

impl SecretCreateInput {
    pub fn new(value: &str) -> Self {
        Self {
            value: value.to_string(),
            ..Default::default()
        }
    }

    pub fn with_content_type(mut self, content_type: &str) -> Self {
        self.content_type = Some(content_type.to_string());
        self
    }

    pub fn with_expiry(mut self, not_before: Option<DateTime<Utc>>, expires_on: Option<DateTime<Utc>>) -> Self {
        self.not_before = not_before;
        self.expires_on = expires_on;
        self
    }

    pub fn with_tag(mut self, key: &str, value: &str) -> Self {
        self.tags.insert(key.to_string(), value.to_string());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = Some(false);
        self
    }
}

/// Secrets of one vault
#[derive(Debug, Clone)]
pub struct SecretVault {
    store: VersionedEntityStore<SecretEntity>,
}

impl SecretVault {
    pub fn new(vault_uri: &str, recovery: RecoveryPolicy, clock: VirtualClock) -> Self {
        Self {
            store: VersionedEntityStore::new(vault_uri, recovery, clock),
        }
    }

    pub fn store(&self) -> &VersionedEntityStore<SecretEntity> {
        &self.store
    }

    pub(crate) fn store_mut(&mut self) -> &mut VersionedEntityStore<SecretEntity> {
        &mut self.store
    }

    pub fn entity_id(&self, name: &str) -> VaultResult<SecretEntityId> {
        self.store.entity_id(name)
    }

    /// Store a new secret version
    ///
    /// # Arguments
    ///
    /// * `name` - Secret name; an active name gets a new version
    /// * `input` - Value, content type and attributes
    ///
    /// # Returns
    ///
    /// The id of the new version
    pub fn create_secret(&mut self, name: &str, input: SecretCreateInput) -> VaultResult<VersionedSecretEntityId> {
        validate_window(input.not_before, input.expires_on)?;
        if self.is_managed_name(name) {
            return Err(managed_error("create", &self.entity_id(name)?));
        }

        self.store.create_version(name, |id, mut attributes| {
            attributes.enabled = input.enabled.unwrap_or(true);
            attributes.not_before = input.not_before;
            attributes.expires_on = input.expires_on;
            attributes.tags = input.tags;
            Ok(SecretEntity::new(id, attributes, input.value, input.content_type))
        })
    }

    /// Store a secret version owned by a certificate
    pub(crate) fn create_managed_at(
        &mut self,
        name: &str,
        version: &str,
        created_on: DateTime<Utc>,
        value: String,
        content_type: &str,
        expiry: (Option<DateTime<Utc>>, Option<DateTime<Utc>>),
    ) -> VaultResult<VersionedSecretEntityId> {
        self.store.create_version_at(name, Some(version), created_on, |id, mut attributes| {
            attributes.not_before = expiry.0;
            attributes.expires_on = expiry.1;
            attributes.managed = true;
            Ok(SecretEntity::new(id, attributes, value, Some(content_type.to_string())))
        })
    }

    /// Swap the value of a managed version, keeping its timestamps
    pub(crate) fn replace_value(&mut self, id: &VersionedSecretEntityId, value: String) -> VaultResult<()> {
        let mut secret = self.store.get(id)?.clone();
        secret.set_value(value);
        self.store.replace(secret)
    }

    pub fn get(&self, id: &VersionedSecretEntityId) -> VaultResult<&SecretEntity> {
        self.store.get(id)
    }

    pub fn get_deleted(&self, id: &VersionedSecretEntityId) -> VaultResult<&SecretEntity> {
        self.store.get_deleted(id)
    }

    pub fn latest(&self, id: &SecretEntityId) -> VaultResult<&SecretEntity> {
        self.store.latest_entity(id)
    }

    pub fn versions(&self, id: &SecretEntityId) -> VaultResult<Vec<String>> {
        self.store.versions(id)
    }

    pub fn list(&self) -> Vec<&SecretEntity> {
        self.store.list_latest_non_managed()
    }

    pub fn list_deleted(&self) -> Vec<&SecretEntity> {
        self.store.list_deleted_latest_non_managed()
    }

    /// Soft-delete a secret that is not owned by a certificate
    pub fn delete_secret(&mut self, id: &SecretEntityId) -> VaultResult<()> {
        if self.store.latest_entity(id)?.attributes().managed {
            return Err(managed_error("delete", id));
        }
        self.store.delete(id)
    }

    pub fn recover_secret(&mut self, id: &SecretEntityId) -> VaultResult<()> {
        if self.is_deleted_managed(id) {
            return Err(managed_error("recover", id));
        }
        self.store.recover(id)
    }

    pub fn purge_secret(&mut self, id: &SecretEntityId) -> VaultResult<()> {
        if self.is_deleted_managed(id) {
            return Err(managed_error("purge", id));
        }
        self.store.purge(id)?;
        info!("Secret {} purged", id);
        Ok(())
    }

    pub fn set_enabled(&mut self, id: &VersionedSecretEntityId, enabled: bool) -> VaultResult<()> {
        self.store.set_enabled(id, enabled)
    }

    pub fn set_expiry(
        &mut self,
        id: &VersionedSecretEntityId,
        not_before: Option<DateTime<Utc>>,
        expires_on: Option<DateTime<Utc>>,
    ) -> VaultResult<()> {
        self.store.set_expiry(id, not_before, expires_on)
    }

    pub fn add_tags(&mut self, id: &VersionedSecretEntityId, tags: &BTreeMap<String, String>) -> VaultResult<()> {
        self.store.add_tags(id, tags)
    }

    pub fn clear_tags(&mut self, id: &VersionedSecretEntityId) -> VaultResult<()> {
        self.store.clear_tags(id)
    }

    fn is_managed_name(&self, name: &str) -> bool {
        self.store
            .entity_id(name)
            .and_then(|id| self.store.latest_entity(&id).map(|e| e.attributes().managed))
            .unwrap_or(false)
    }

    fn is_deleted_managed(&self, id: &SecretEntityId) -> bool {
        self.store
            .deleted()
            .latest_entity(id)
            .map(|e| e.attributes().managed)
            .unwrap_or(false)
    }
}

fn managed_error(operation: &str, id: &SecretEntityId) -> VaultError {
    VaultError::invalid_operation(
        operation,
        &format!("secret {} is managed by a certificate", id),
        error_codes::MANAGED_ENTITY,
    )
}
