use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use log::{debug, info};

use crate::clock::VirtualClock;
use crate::entity::{
    generate_version, validate_name, validate_version, EntityAttributes, EntityId, EntityKind,
    VaultEntity, VersionedEntityId,
};
use crate::error::{error_codes, VaultError, VaultResult};
use crate::recovery::RecoveryPolicy;

use super::Partition;

/// Versioned storage of one entity family within a vault
#[derive(Debug, Clone)]
pub struct VersionedEntityStore<E: VaultEntity> {
    vault_uri: String,
    recovery: RecoveryPolicy,
    clock: VirtualClock,
    active: Partition<E>,
    deleted: Partition<E>,
}

impl<E: VaultEntity> VersionedEntityStore<E> {
    /// Create an empty store for the vault at `vault_uri`
    pub fn new(vault_uri: &str, recovery: RecoveryPolicy, clock: VirtualClock) -> Self {
        Self {
            vault_uri: vault_uri.to_string(),
            recovery,
            clock,
            active: Partition::new(),
            deleted: Partition::new(),
        }
    }

    pub fn vault_uri(&self) -> &str {
        &self.vault_uri
    }

    pub fn recovery(&self) -> &RecoveryPolicy {
        &self.recovery
    }

    pub fn clock(&self) -> &VirtualClock {
        &self.clock
    }

    /// Active partition view
    pub fn active(&self) -> &Partition<E> {
        &self.active
    }

    /// Deleted partition view
    pub fn deleted(&self) -> &Partition<E> {
        &self.deleted
    }

    /// Build an identifier for `name` in this vault
    pub fn entity_id(&self, name: &str) -> VaultResult<EntityId<E::Kind>> {
        EntityId::new(&self.vault_uri, name)
    }

    /// Create a new version of `name` stamped with the current time
    ///
    /// Creating over an active name appends a version; creating over a
    /// deleted name fails with `AlreadyExists` until it is recovered or purged.
    ///
    /// # Arguments
    ///
    /// * `name` - Entity name
    /// * `build` - Builds the entity from its fresh id and attributes
    ///
    /// # Returns
    ///
    /// The id of the new version
    pub fn create_version<F>(&mut self, name: &str, build: F) -> VaultResult<VersionedEntityId<E::Kind>>
    where
        F: FnOnce(VersionedEntityId<E::Kind>, EntityAttributes) -> VaultResult<E>,
    {
        let now = self.clock.now();
        self.create_version_at(name, None, now, build)
    }

    /// Create a new version with an explicit token and creation time
    pub fn create_version_at<F>(
        &mut self,
        name: &str,
        version: Option<&str>,
        created_on: DateTime<Utc>,
        build: F,
    ) -> VaultResult<VersionedEntityId<E::Kind>>
    where
        F: FnOnce(VersionedEntityId<E::Kind>, EntityAttributes) -> VaultResult<E>,
    {
        validate_name(name)?;
        self.purge_expired();
        self.ensure_not_deleted(name)?;

        let entity_id = self.entity_id(name)?;
        let id = match version {
            Some(token) => {
                validate_version(token)?;
                let id = entity_id.with_version(token);
                if self.active.contains_entity(&id) {
                    return Err(VaultError::already_exists(E::Kind::NAME, &id.to_string()));
                }
                id
            }
            None => self.fresh_version(&entity_id),
        };

        let entity = build(id.clone(), EntityAttributes::new(created_on))?;
        if entity.id() != &id {
            return Err(VaultError::illegal_state(
                "create version",
                "built entity does not carry the allocated id",
                error_codes::INCONSISTENT_STATE,
            ));
        }

        debug!("Created {} version {}", E::Kind::NAME, id);
        self.active.push(entity);
        Ok(id)
    }

    /// Append a fully formed entity, keeping its version token and timestamps
    pub fn import_version(&mut self, entity: E) -> VaultResult<()> {
        let id = entity.id().clone();
        if id.vault() != self.vault_uri {
            return Err(VaultError::invalid_argument(
                "vault",
                &self.vault_uri,
                id.vault(),
            ));
        }
        validate_name(id.name())?;
        validate_version(id.version())?;
        self.purge_expired();
        self.ensure_not_deleted(id.name())?;
        if self.active.contains_entity(&id) {
            return Err(VaultError::already_exists(E::Kind::NAME, &id.to_string()));
        }

        let mut entity = entity;
        entity.attributes_mut().clear_deletion();
        debug!("Imported {} version {}", E::Kind::NAME, id);
        self.active.push(entity);
        Ok(())
    }

    /// Read an active version
    pub fn get(&self, id: &VersionedEntityId<E::Kind>) -> VaultResult<&E> {
        self.active.get(id)
    }

    /// Read a deleted version
    pub fn get_deleted(&self, id: &VersionedEntityId<E::Kind>) -> VaultResult<&E> {
        self.deleted.get(id)
    }

    pub fn versions(&self, id: &EntityId<E::Kind>) -> VaultResult<Vec<String>> {
        self.active.versions(id)
    }

    pub fn latest_version(&self, id: &EntityId<E::Kind>) -> VaultResult<VersionedEntityId<E::Kind>> {
        self.active.latest_version(id)
    }

    pub fn latest_entity(&self, id: &EntityId<E::Kind>) -> VaultResult<&E> {
        self.active.latest_entity(id)
    }

    pub fn chain(&self, id: &EntityId<E::Kind>) -> VaultResult<&[E]> {
        self.active.chain(id)
    }

    pub fn list_latest_non_managed(&self) -> Vec<&E> {
        self.active.list_latest_non_managed()
    }

    pub fn list_deleted_latest_non_managed(&self) -> Vec<&E> {
        self.deleted.list_latest_non_managed()
    }

    /// Whether `name` is active
    pub fn contains_name(&self, name: &str) -> bool {
        self.active.contains_name(name)
    }

    /// Whether `name` is soft-deleted
    pub fn contains_deleted_name(&self, name: &str) -> bool {
        self.deleted.contains_name(name)
    }

    pub fn contains_entity(&self, id: &VersionedEntityId<E::Kind>) -> bool {
        self.active.contains_entity(id)
    }

    /// Move the whole chain of `id` to the deleted partition
    pub fn delete(&mut self, id: &EntityId<E::Kind>) -> VaultResult<()> {
        let mut chain = self
            .active
            .remove_chain(id.name())
            .ok_or_else(|| VaultError::not_found(E::Kind::NAME, &id.to_string()))?;

        let now = self.clock.now();
        let purge_date = self.recovery.scheduled_purge_date(now);
        for entity in chain.iter_mut() {
            entity.attributes_mut().mark_deleted(now, purge_date);
        }

        info!("Deleted {} {} (scheduled purge {})", E::Kind::NAME, id, purge_date.to_rfc3339());
        self.deleted.insert_chain(id.name().to_string(), chain);
        Ok(())
    }

    /// Move the whole chain of `id` back to the active partition
    pub fn recover(&mut self, id: &EntityId<E::Kind>) -> VaultResult<()> {
        self.purge_expired();
        let mut chain = self
            .deleted
            .remove_chain(id.name())
            .ok_or_else(|| VaultError::not_found(E::Kind::NAME, &id.to_string()))?;

        for entity in chain.iter_mut() {
            entity.attributes_mut().clear_deletion();
        }

        info!("Recovered {} {}", E::Kind::NAME, id);
        self.active.insert_chain(id.name().to_string(), chain);
        Ok(())
    }

    /// Permanently drop a deleted chain
    pub fn purge(&mut self, id: &EntityId<E::Kind>) -> VaultResult<()> {
        self.purge_expired();
        if !self.deleted.contains_name(id.name()) {
            return Err(VaultError::not_found(E::Kind::NAME, &id.to_string()));
        }
        if !self.recovery.is_purgeable() {
            return Err(VaultError::illegal_state(
                &format!("purge {}", id),
                &format!("recovery level {} does not allow purging", self.recovery.level()),
                error_codes::PURGE_NOT_ALLOWED,
            ));
        }

        self.deleted.remove_chain(id.name());
        info!("Purged {} {}", E::Kind::NAME, id);
        Ok(())
    }

    /// Drop deleted chains whose scheduled purge date has passed
    ///
    /// # Returns
    ///
    /// The names that were purged
    pub fn purge_expired(&mut self) -> Vec<String> {
        let now = self.clock.now();
        let mut purged = Vec::new();
        self.deleted.retain(|name, chain| {
            let expired = chain
                .first()
                .and_then(|e| e.attributes().scheduled_purge_date)
                .map(|date| date < now)
                .unwrap_or(false);
            if expired {
                purged.push(name.clone());
            }
            !expired
        });
        for name in &purged {
            info!("Purged expired {} {}", E::Kind::NAME, name);
        }
        purged
    }

    /// Apply `f` to a copy of an active version and commit it on success
    ///
    /// `updated_on` is set to the current time after `f` returns.
    pub fn update<F>(&mut self, id: &VersionedEntityId<E::Kind>, f: F) -> VaultResult<()>
    where
        F: FnOnce(&mut E) -> VaultResult<()>,
    {
        let mut copy = self.active.get(id)?.clone();
        f(&mut copy)?;
        copy.attributes_mut().updated_on = self.clock.now();

        let slot = self.active.get_mut(id)?;
        *slot = copy;
        Ok(())
    }

    pub fn set_enabled(&mut self, id: &VersionedEntityId<E::Kind>, enabled: bool) -> VaultResult<()> {
        self.update(id, |e| {
            e.attributes_mut().enabled = enabled;
            Ok(())
        })
    }

    /// Set the validity window of a version
    pub fn set_expiry(
        &mut self,
        id: &VersionedEntityId<E::Kind>,
        not_before: Option<DateTime<Utc>>,
        expires_on: Option<DateTime<Utc>>,
    ) -> VaultResult<()> {
        validate_window(not_before, expires_on)?;
        self.update(id, |e| {
            let attributes = e.attributes_mut();
            attributes.not_before = not_before;
            attributes.expires_on = expires_on;
            Ok(())
        })
    }

    pub fn add_tags(
        &mut self,
        id: &VersionedEntityId<E::Kind>,
        tags: &BTreeMap<String, String>,
    ) -> VaultResult<()> {
        self.update(id, |e| {
            e.attributes_mut()
                .tags
                .extend(tags.iter().map(|(k, v)| (k.clone(), v.clone())));
            Ok(())
        })
    }

    pub fn clear_tags(&mut self, id: &VersionedEntityId<E::Kind>) -> VaultResult<()> {
        self.update(id, |e| {
            e.attributes_mut().tags.clear();
            Ok(())
        })
    }

    pub(crate) fn set_managed(&mut self, id: &VersionedEntityId<E::Kind>, managed: bool) -> VaultResult<()> {
        self.update(id, |e| {
            e.attributes_mut().managed = managed;
            Ok(())
        })
    }

    /// Overwrite an active version without touching `updated_on`
    pub(crate) fn replace(&mut self, entity: E) -> VaultResult<()> {
        let id = entity.id().clone();
        let slot = self.active.get_mut(&id)?;
        *slot = entity;
        Ok(())
    }

    fn ensure_not_deleted(&self, name: &str) -> VaultResult<()> {
        if self.deleted.contains_name(name) {
            let id = self.entity_id(name)?;
            return Err(VaultError::deleted_entity_exists(E::Kind::NAME, &id.to_string()));
        }
        Ok(())
    }

    fn fresh_version(&self, entity_id: &EntityId<E::Kind>) -> VersionedEntityId<E::Kind> {
        loop {
            let id = entity_id.with_version(&generate_version());
            if !self.active.contains_entity(&id) {
                return id;
            }
        }
    }
}

/// Check that `not_before` does not lie after `expires_on`
pub fn validate_window(
    not_before: Option<DateTime<Utc>>,
    expires_on: Option<DateTime<Utc>>,
) -> VaultResult<()> {
    if let (Some(nb), Some(exp)) = (not_before, expires_on) {
        if nb > exp {
            return Err(VaultError::invalid_argument(
                "not_before",
                &format!("a time not after expires_on ({})", exp.to_rfc3339()),
                &nb.to_rfc3339(),
            ));
        }
    }
    Ok(())
}
