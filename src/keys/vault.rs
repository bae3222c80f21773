use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use log::{debug, info};

use crate::clock::VirtualClock;
use crate::entity::{EntityAttributes, KeyEntityId, VaultEntity, VersionedKeyEntityId};
use crate::error::{error_codes, VaultError, VaultResult};
use crate::recovery::RecoveryPolicy;
use crate::rotation::RotationPolicy;
use crate::store::{validate_window, VersionedEntityStore};

use super::entity::KeyEntity;
use super::jwk::JsonWebKey;
use super::material::{KeyCreationInput, KeyMaterial};
use super::types::{EncryptionAlgorithm, KeyCurve, KeyOperation, KeyType, SignatureAlgorithm};

/// Request to create a key version
#[derive(Debug, Clone, Default)]
pub struct KeyCreateInput {
    pub key_type: Option<KeyType>,
    pub key_size: Option<u32>,
    pub curve: Option<KeyCurve>,
    /// Empty means every operation the key type supports
    pub operations: Vec<KeyOperation>,
    pub enabled: Option<bool>,
    pub not_before: Option<DateTime<Utc>>,
    pub expires_on: Option<DateTime<Utc>>,
    pub tags: BTreeMap<String, String>,
}

impl KeyCreateInput {
    pub fn new(key_type: KeyType) -> Self {
        Self {
            key_type: Some(key_type),
            ..Default::default()
        }
    }

    pub fn with_key_size(mut self, key_size: u32) -> Self {
        self.key_size = Some(key_size);
        self
    }

    pub fn with_curve(mut self, curve: KeyCurve) -> Self {
        self.curve = Some(curve);
        self
    }

    pub fn with_operations(mut self, operations: &[KeyOperation]) -> Self {
        self.operations = operations.to_vec();
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

    fn creation_input(&self) -> VaultResult<KeyCreationInput> {
        let key_type = self
            .key_type
            .ok_or_else(|| VaultError::invalid_argument("key_type", "a key type", "none"))?;
        Ok(KeyCreationInput {
            key_type,
            key_size: self.key_size,
            curve: self.curve,
        })
    }
}

/// Request to import existing key material
#[derive(Debug, Clone)]
pub struct KeyImportInput {
    pub key: JsonWebKey,
    /// Requests the HSM variant of the JWK's key type
    pub hsm: Option<bool>,
    pub enabled: Option<bool>,
    pub not_before: Option<DateTime<Utc>>,
    pub expires_on: Option<DateTime<Utc>>,
    pub tags: BTreeMap<String, String>,
}

impl KeyImportInput {
    pub fn new(key: JsonWebKey) -> Self {
        Self {
            key,
            hsm: None,
            enabled: None,
            not_before: None,
            expires_on: None,
            tags: BTreeMap::new(),
        }
    }

    pub fn with_hsm(mut self, hsm: bool) -> Self {
        self.hsm = Some(hsm);
        self
    }

    /// Key type after applying the HSM flag
    fn resolved_key_type(&self) -> VaultResult<KeyType> {
        let kty = self.key.kty;
        match self.hsm {
            None => Ok(kty),
            Some(true) => Ok(kty.with_hsm(true)),
            Some(false) if kty.is_hsm() => Err(VaultError::invalid_argument_with_code(
                "hsm",
                &format!("true or absent for {} keys", kty),
                "false",
                error_codes::INVALID_KEY_PARAMETERS,
            )),
            Some(false) => Ok(kty),
        }
    }
}

/// Keys of one vault plus their rotation policies
#[derive(Debug, Clone)]
pub struct KeyVault {
    store: VersionedEntityStore<KeyEntity>,
    rotation_policies: BTreeMap<String, RotationPolicy>,
}

impl KeyVault {
    pub fn new(vault_uri: &str, recovery: RecoveryPolicy, clock: VirtualClock) -> Self {
        Self {
            store: VersionedEntityStore::new(vault_uri, recovery, clock),
            rotation_policies: BTreeMap::new(),
        }
    }

    pub fn store(&self) -> &VersionedEntityStore<KeyEntity> {
        &self.store
    }

    pub(crate) fn store_mut(&mut self) -> &mut VersionedEntityStore<KeyEntity> {
        &mut self.store
    }

    pub fn entity_id(&self, name: &str) -> VaultResult<KeyEntityId> {
        self.store.entity_id(name)
    }

    /// Generate a new key version
    ///
    /// # Arguments
    ///
    /// * `name` - Key name; an active name gets a new version
    /// * `input` - Type, size or curve, operations and attributes
    ///
    /// # Returns
    ///
    /// The id of the new version
    pub fn create_key(&mut self, name: &str, input: KeyCreateInput) -> VaultResult<VersionedKeyEntityId> {
        self.ensure_name_not_managed(name, "create")?;
        let now = self.store.clock().now();
        self.create_key_at(name, None, now, input)
    }

    /// Generate a key version with an explicit token and creation time
    pub(crate) fn create_key_at(
        &mut self,
        name: &str,
        version: Option<&str>,
        created_on: DateTime<Utc>,
        input: KeyCreateInput,
    ) -> VaultResult<VersionedKeyEntityId> {
        validate_window(input.not_before, input.expires_on)?;
        let creation = input.creation_input()?;
        let material = KeyMaterial::generate(&creation)?;
        let expires_on = self.policy_expiry(name, created_on, input.expires_on)?;

        self.store.create_version_at(name, version, created_on, |id, attributes| {
            let attributes = apply_attributes(
                attributes,
                input.enabled,
                input.not_before,
                expires_on,
                input.tags,
                false,
            );
            KeyEntity::new(id, attributes, creation.key_type, material, &input.operations)
        })
    }

    /// Import key material from a JWK as a new version
    pub fn import_key(&mut self, name: &str, input: KeyImportInput) -> VaultResult<VersionedKeyEntityId> {
        self.ensure_name_not_managed(name, "import")?;
        validate_window(input.not_before, input.expires_on)?;
        let key_type = input.resolved_key_type()?;
        let material = input.key.to_material()?;
        let now = self.store.clock().now();
        let expires_on = self.policy_expiry(name, now, input.expires_on)?;

        let id = self.store.create_version_at(name, None, now, |id, attributes| {
            let attributes = apply_attributes(
                attributes,
                input.enabled,
                input.not_before,
                expires_on,
                input.tags,
                false,
            );
            KeyEntity::new(id, attributes, key_type, material, &input.key.key_ops)
        })?;
        info!("Imported {} key {}", key_type, id);
        Ok(id)
    }

    /// Store key material owned by a certificate
    pub(crate) fn import_managed_material(
        &mut self,
        name: &str,
        version: &str,
        created_on: DateTime<Utc>,
        key_type: KeyType,
        material: KeyMaterial,
        expiry: (Option<DateTime<Utc>>, Option<DateTime<Utc>>),
    ) -> VaultResult<VersionedKeyEntityId> {
        self.store.create_version_at(name, Some(version), created_on, |id, attributes| {
            let attributes = apply_attributes(attributes, Some(true), expiry.0, expiry.1, BTreeMap::new(), true);
            KeyEntity::new(id, attributes, key_type, material, &[])
        })
    }

    pub fn get(&self, id: &VersionedKeyEntityId) -> VaultResult<&KeyEntity> {
        self.store.get(id)
    }

    pub fn latest(&self, id: &KeyEntityId) -> VaultResult<&KeyEntity> {
        self.store.latest_entity(id)
    }

    pub fn versions(&self, id: &KeyEntityId) -> VaultResult<Vec<String>> {
        self.store.versions(id)
    }

    pub fn list(&self) -> Vec<&KeyEntity> {
        self.store.list_latest_non_managed()
    }

    pub fn list_deleted(&self) -> Vec<&KeyEntity> {
        self.store.list_deleted_latest_non_managed()
    }

    /// Soft-delete a key that is not owned by a certificate
    pub fn delete_key(&mut self, id: &KeyEntityId) -> VaultResult<()> {
        self.ensure_not_managed(id, "delete")?;
        self.store.delete(id)
    }

    pub fn recover_key(&mut self, id: &KeyEntityId) -> VaultResult<()> {
        if let Ok(latest) = self.store.deleted().latest_entity(id) {
            if latest.attributes().managed {
                return Err(managed_error("recover", id));
            }
        }
        self.store.recover(id)
    }

    /// Purge a deleted key together with its rotation policy
    pub fn purge_key(&mut self, id: &KeyEntityId) -> VaultResult<()> {
        if let Ok(latest) = self.store.deleted().latest_entity(id) {
            if latest.attributes().managed {
                return Err(managed_error("purge", id));
            }
        }
        self.store.purge(id)?;
        self.rotation_policies.remove(id.name());
        Ok(())
    }

    pub fn set_enabled(&mut self, id: &VersionedKeyEntityId, enabled: bool) -> VaultResult<()> {
        self.store.set_enabled(id, enabled)
    }

    pub fn set_expiry(
        &mut self,
        id: &VersionedKeyEntityId,
        not_before: Option<DateTime<Utc>>,
        expires_on: Option<DateTime<Utc>>,
    ) -> VaultResult<()> {
        self.store.set_expiry(id, not_before, expires_on)
    }

    pub fn add_tags(&mut self, id: &VersionedKeyEntityId, tags: &BTreeMap<String, String>) -> VaultResult<()> {
        self.store.add_tags(id, tags)
    }

    pub fn clear_tags(&mut self, id: &VersionedKeyEntityId) -> VaultResult<()> {
        self.store.clear_tags(id)
    }

    /// Replace the allowed operations of a version
    ///
    /// Operations the key type cannot perform are dropped.
    pub fn set_key_operations(&mut self, id: &VersionedKeyEntityId, operations: &[KeyOperation]) -> VaultResult<()> {
        self.store.update(id, |key| {
            key.set_operations(operations);
            Ok(())
        })
    }

    /// Create a new version with fresh material of the same shape as the latest one
    pub fn rotate_key(&mut self, id: &KeyEntityId) -> VaultResult<VersionedKeyEntityId> {
        let now = self.store.clock().now();
        self.rotate_key_at(id, now)
    }

    fn rotate_key_at(&mut self, id: &KeyEntityId, created_on: DateTime<Utc>) -> VaultResult<VersionedKeyEntityId> {
        self.ensure_not_managed(id, "rotate")?;
        let latest = self.store.latest_entity(id)?;
        let creation = latest.material().creation_input(latest.key_type());
        let mut input = KeyCreateInput {
            key_type: Some(creation.key_type),
            key_size: creation.key_size,
            curve: creation.curve,
            operations: latest.operations().to_vec(),
            tags: latest.attributes().tags.clone(),
            ..Default::default()
        };
        input.enabled = Some(true);

        let new_id = self.create_key_at(id.name(), None, created_on, input)?;
        info!("Rotated key {} to version {}", id, new_id.version());
        Ok(new_id)
    }

    /// Rotation policy of an active key, if one is set
    pub fn rotation_policy(&self, id: &KeyEntityId) -> VaultResult<Option<&RotationPolicy>> {
        self.store.latest_entity(id)?;
        Ok(self.rotation_policies.get(id.name()))
    }

    /// Validate and attach a rotation policy, updating an existing one in place
    pub fn set_rotation_policy(&mut self, mut policy: RotationPolicy) -> VaultResult<RotationPolicy> {
        let id = policy.id.clone();
        self.ensure_not_managed(&id, "set rotation policy")?;
        let latest_expiry = self.store.latest_entity(&id)?.attributes().expires_on;

        let now = self.store.clock().now();
        policy.created_on = now;
        policy.updated_on = now;
        policy.validate(latest_expiry)?;

        let stored = if let Some(existing) = self.rotation_policies.get_mut(id.name()) {
            existing.update_from(&policy, now);
            existing.clone()
        } else {
            self.rotation_policies.insert(id.name().to_string(), policy.clone());
            policy
        };
        info!("Set rotation policy of key {}", id);
        Ok(stored)
    }

    /// Attach a policy taken from a backup, keeping its timestamps
    pub(crate) fn restore_rotation_policy(&mut self, policy: RotationPolicy) {
        self.rotation_policies.insert(policy.id.name().to_string(), policy);
    }

    /// Rotate every active key whose policy triggered before the current time
    ///
    /// # Returns
    ///
    /// Number of versions created
    pub fn perform_missed_rotations(&mut self) -> VaultResult<usize> {
        let now = self.store.clock().now();
        let mut rotations = 0;
        let policies: Vec<RotationPolicy> = self.rotation_policies.values().cloned().collect();
        for policy in policies {
            let latest_created = match self.store.latest_entity(&policy.id) {
                Ok(latest) => latest.attributes().created_on,
                Err(_) => continue,
            };
            for instant in policy.missed_rotations(latest_created, now)? {
                self.rotate_key_at(&policy.id, instant)?;
                rotations += 1;
            }
        }
        if rotations > 0 {
            debug!("Performed {} missed key rotations", rotations);
        }
        Ok(rotations)
    }

    pub fn encrypt(
        &self,
        id: &VersionedKeyEntityId,
        algorithm: EncryptionAlgorithm,
        plaintext: &[u8],
        iv: Option<&[u8]>,
    ) -> VaultResult<Vec<u8>> {
        self.store.get(id)?.encrypt(algorithm, plaintext, iv)
    }

    pub fn decrypt(
        &self,
        id: &VersionedKeyEntityId,
        algorithm: EncryptionAlgorithm,
        ciphertext: &[u8],
        iv: Option<&[u8]>,
    ) -> VaultResult<Vec<u8>> {
        self.store.get(id)?.decrypt(algorithm, ciphertext, iv)
    }

    pub fn wrap_key(
        &self,
        id: &VersionedKeyEntityId,
        algorithm: EncryptionAlgorithm,
        key: &[u8],
        iv: Option<&[u8]>,
    ) -> VaultResult<Vec<u8>> {
        self.store.get(id)?.wrap_key(algorithm, key, iv)
    }

    pub fn unwrap_key(
        &self,
        id: &VersionedKeyEntityId,
        algorithm: EncryptionAlgorithm,
        wrapped: &[u8],
        iv: Option<&[u8]>,
    ) -> VaultResult<Vec<u8>> {
        self.store.get(id)?.unwrap_key(algorithm, wrapped, iv)
    }

    pub fn sign(&self, id: &VersionedKeyEntityId, algorithm: SignatureAlgorithm, digest: &[u8]) -> VaultResult<Vec<u8>> {
        self.store.get(id)?.sign(algorithm, digest)
    }

    pub fn verify(
        &self,
        id: &VersionedKeyEntityId,
        algorithm: SignatureAlgorithm,
        digest: &[u8],
        signature: &[u8],
    ) -> VaultResult<bool> {
        self.store.get(id)?.verify(algorithm, digest, signature)
    }

    /// Public JWK of a version
    pub fn export_public(&self, id: &VersionedKeyEntityId) -> VaultResult<JsonWebKey> {
        Ok(self.store.get(id)?.to_jwk())
    }

    fn policy_expiry(
        &self,
        name: &str,
        created_on: DateTime<Utc>,
        requested: Option<DateTime<Utc>>,
    ) -> VaultResult<Option<DateTime<Utc>>> {
        match self.rotation_policies.get(name) {
            Some(policy) if self.store.contains_name(name) => Ok(Some(policy.expiry_for(created_on)?)),
            _ => Ok(requested),
        }
    }

    fn ensure_name_not_managed(&self, name: &str, operation: &str) -> VaultResult<()> {
        let id = self.store.entity_id(name)?;
        match self.store.latest_entity(&id) {
            Ok(latest) if latest.attributes().managed => Err(managed_error(operation, &id)),
            _ => Ok(()),
        }
    }

    fn ensure_not_managed(&self, id: &KeyEntityId, operation: &str) -> VaultResult<()> {
        if self.store.latest_entity(id)?.attributes().managed {
            return Err(managed_error(operation, id));
        }
        Ok(())
    }
}

fn managed_error(operation: &str, id: &KeyEntityId) -> VaultError {
    VaultError::invalid_operation(
        operation,
        &format!("key {} is managed by a certificate", id),
        error_codes::MANAGED_ENTITY,
    )
}

fn apply_attributes(
    mut attributes: EntityAttributes,
    enabled: Option<bool>,
    not_before: Option<DateTime<Utc>>,
    expires_on: Option<DateTime<Utc>>,
    tags: BTreeMap<String, String>,
    managed: bool,
) -> EntityAttributes {
    attributes.enabled = enabled.unwrap_or(true);
    attributes.not_before = not_before;
    attributes.expires_on = expires_on;
    attributes.tags = tags;
    attributes.managed = managed;
    attributes
}
