use std::collections::BTreeMap;

use crate::entity::{EntityId, EntityKind, VaultEntity, VersionedEntityId};
use crate::error::{error_codes, VaultError, VaultResult};

/// One side of a store: name to version chain, oldest version first
#[derive(Debug, Clone)]
pub struct Partition<E: VaultEntity> {
    chains: BTreeMap<String, Vec<E>>,
}

impl<E: VaultEntity> Default for Partition<E> {
    fn default() -> Self {
        Self {
            chains: BTreeMap::new(),
        }
    }
}

impl<E: VaultEntity> Partition<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.chains.contains_key(name)
    }

    pub fn contains_entity(&self, id: &VersionedEntityId<E::Kind>) -> bool {
        self.chains
            .get(id.name())
            .map(|chain| chain.iter().any(|e| e.id().version() == id.version()))
            .unwrap_or(false)
    }

    /// Version chain of a name, oldest first
    pub fn chain(&self, id: &EntityId<E::Kind>) -> VaultResult<&[E]> {
        self.chains
            .get(id.name())
            .map(Vec::as_slice)
            .ok_or_else(|| VaultError::not_found(E::Kind::NAME, &id.to_string()))
    }

    pub fn get(&self, id: &VersionedEntityId<E::Kind>) -> VaultResult<&E> {
        self.chains
            .get(id.name())
            .and_then(|chain| chain.iter().find(|e| e.id().version() == id.version()))
            .ok_or_else(|| VaultError::NotFound {
                entity: E::Kind::NAME.to_string(),
                id: id.to_string(),
                error_code: error_codes::VERSION_NOT_FOUND,
            })
    }

    pub(crate) fn get_mut(&mut self, id: &VersionedEntityId<E::Kind>) -> VaultResult<&mut E> {
        let not_found = || VaultError::NotFound {
            entity: E::Kind::NAME.to_string(),
            id: id.to_string(),
            error_code: error_codes::VERSION_NOT_FOUND,
        };
        self.chains
            .get_mut(id.name())
            .and_then(|chain| chain.iter_mut().find(|e| e.id().version() == id.version()))
            .ok_or_else(not_found)
    }

    /// Version tokens of a name in creation order
    pub fn versions(&self, id: &EntityId<E::Kind>) -> VaultResult<Vec<String>> {
        Ok(self
            .chain(id)?
            .iter()
            .map(|e| e.id().version().to_string())
            .collect())
    }

    pub fn latest_entity(&self, id: &EntityId<E::Kind>) -> VaultResult<&E> {
        self.chain(id)?
            .last()
            .ok_or_else(|| VaultError::not_found(E::Kind::NAME, &id.to_string()))
    }

    pub fn latest_version(&self, id: &EntityId<E::Kind>) -> VaultResult<VersionedEntityId<E::Kind>> {
        Ok(self.latest_entity(id)?.id().clone())
    }

    /// Latest version of every name that is not owned by a certificate
    pub fn list_latest_non_managed(&self) -> Vec<&E> {
        self.chains
            .values()
            .filter_map(|chain| chain.last())
            .filter(|e| !e.attributes().managed)
            .collect()
    }

    /// Latest version of every name
    pub fn list_latest(&self) -> Vec<&E> {
        self.chains.values().filter_map(|chain| chain.last()).collect()
    }

    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.chains.keys()
    }

    pub fn len(&self) -> usize {
        self.chains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }

    pub(crate) fn push(&mut self, entity: E) {
        self.chains
            .entry(entity.id().name().to_string())
            .or_default()
            .push(entity);
    }

    pub(crate) fn insert_chain(&mut self, name: String, chain: Vec<E>) {
        self.chains.insert(name, chain);
    }

    pub(crate) fn remove_chain(&mut self, name: &str) -> Option<Vec<E>> {
        self.chains.remove(name)
    }

    pub(crate) fn retain<F>(&mut self, f: F)
    where
        F: FnMut(&String, &mut Vec<E>) -> bool,
    {
        self.chains.retain(f);
    }
}
