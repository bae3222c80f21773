use std::collections::BTreeMap;
use std::fmt;
use std::fmt::Debug;
use std::hash::Hash;
use std::marker::PhantomData;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{error_codes, VaultError, VaultResult};

/// Maximum length of an entity name
pub const MAX_NAME_LENGTH: usize = 127;

/// Length of a version token
pub const VERSION_LENGTH: usize = 32;

/// Marker trait for the three entity families held by a vault
pub trait EntityKind:
    Debug + Clone + Copy + PartialEq + Eq + PartialOrd + Ord + Hash + Default + Send + Sync + 'static
{
    /// Singular name used in messages
    const NAME: &'static str;

    /// Path segment used in identifier URIs
    const PATH: &'static str;
}

/// Marker for key entities
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct KeyKind;

/// Marker for secret entities
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SecretKind;

/// Marker for certificate entities
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct CertificateKind;

impl EntityKind for KeyKind {
    const NAME: &'static str = "key";
    const PATH: &'static str = "keys";
}

impl EntityKind for SecretKind {
    const NAME: &'static str = "secret";
    const PATH: &'static str = "secrets";
}

impl EntityKind for CertificateKind {
    const NAME: &'static str = "certificate";
    const PATH: &'static str = "certificates";
}

/// Check that `name` is a legal entity name
///
/// Names are 1 to 127 characters of ASCII letters, digits and dashes.
pub fn validate_name(name: &str) -> VaultResult<()> {
    let valid = !name.is_empty()
        && name.len() <= MAX_NAME_LENGTH
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
    if !valid {
        return Err(VaultError::invalid_argument_with_code(
            "name",
            "1-127 characters of letters, digits and '-'",
            name,
            error_codes::INVALID_NAME,
        ));
    }
    Ok(())
}

/// Check that `version` is a 32 character lowercase hex token
pub fn validate_version(version: &str) -> VaultResult<()> {
    let valid = version.len() == VERSION_LENGTH
        && version.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c));
    if !valid {
        return Err(VaultError::invalid_argument_with_code(
            "version",
            "32 lowercase hexadecimal characters",
            version,
            error_codes::INVALID_NAME,
        ));
    }
    Ok(())
}

/// Generate a fresh random version token
pub fn generate_version() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Identifies an entity family across all of its versions
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct EntityId<K: EntityKind> {
    vault: String,
    name: String,
    #[serde(skip)]
    kind: PhantomData<K>,
}

impl<K: EntityKind> EntityId<K> {
    /// Create an identifier, validating the name
    pub fn new(vault: &str, name: &str) -> VaultResult<Self> {
        validate_name(name)?;
        Ok(Self {
            vault: vault.to_string(),
            name: name.to_string(),
            kind: PhantomData,
        })
    }

    pub fn vault(&self) -> &str {
        &self.vault
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attach a version token to this identifier
    pub fn with_version(&self, version: &str) -> VersionedEntityId<K> {
        VersionedEntityId {
            vault: self.vault.clone(),
            name: self.name.clone(),
            version: version.to_string(),
            kind: PhantomData,
        }
    }
}

impl<K: EntityKind> fmt::Display for EntityId<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.vault, K::PATH, self.name)
    }
}

/// Identifies one version of an entity
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct VersionedEntityId<K: EntityKind> {
    vault: String,
    name: String,
    version: String,
    #[serde(skip)]
    kind: PhantomData<K>,
}

impl<K: EntityKind> VersionedEntityId<K> {
    /// Create a versioned identifier, validating name and version token
    pub fn new(vault: &str, name: &str, version: &str) -> VaultResult<Self> {
        validate_version(version)?;
        Ok(EntityId::new(vault, name)?.with_version(version))
    }

    pub fn vault(&self) -> &str {
        &self.vault
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// The unversioned identifier of this entity family
    pub fn entity_id(&self) -> EntityId<K> {
        EntityId {
            vault: self.vault.clone(),
            name: self.name.clone(),
            kind: PhantomData,
        }
    }
}

impl<K: EntityKind> fmt::Display for VersionedEntityId<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}/{}", self.vault, K::PATH, self.name, self.version)
    }
}

pub type KeyEntityId = EntityId<KeyKind>;
pub type VersionedKeyEntityId = VersionedEntityId<KeyKind>;
pub type SecretEntityId = EntityId<SecretKind>;
pub type VersionedSecretEntityId = VersionedEntityId<SecretKind>;
pub type CertificateEntityId = EntityId<CertificateKind>;
pub type VersionedCertificateEntityId = VersionedEntityId<CertificateKind>;

/// Attributes shared by every entity version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityAttributes {
    pub created_on: DateTime<Utc>,
    pub updated_on: DateTime<Utc>,
    pub not_before: Option<DateTime<Utc>>,
    pub expires_on: Option<DateTime<Utc>>,
    pub enabled: bool,
    pub tags: BTreeMap<String, String>,
    /// Set when a certificate owns this key or secret
    pub managed: bool,
    pub deleted_date: Option<DateTime<Utc>>,
    pub scheduled_purge_date: Option<DateTime<Utc>>,
}

impl EntityAttributes {
    /// Fresh attributes for a version created at `created_on`
    pub fn new(created_on: DateTime<Utc>) -> Self {
        Self {
            created_on,
            updated_on: created_on,
            not_before: None,
            expires_on: None,
            enabled: true,
            tags: BTreeMap::new(),
            managed: false,
            deleted_date: None,
            scheduled_purge_date: None,
        }
    }

    /// Whether the version carries deletion metadata
    pub fn is_deleted(&self) -> bool {
        self.deleted_date.is_some()
    }

    pub(crate) fn mark_deleted(&mut self, deleted_date: DateTime<Utc>, scheduled_purge_date: DateTime<Utc>) {
        self.deleted_date = Some(deleted_date);
        self.scheduled_purge_date = Some(scheduled_purge_date);
    }

    pub(crate) fn clear_deletion(&mut self) {
        self.deleted_date = None;
        self.scheduled_purge_date = None;
    }

    /// Copy of the attributes without deletion metadata
    pub fn without_deletion(&self) -> Self {
        let mut attributes = self.clone();
        attributes.clear_deletion();
        attributes
    }
}

/// Common view of keys, secrets and certificates held by a store
pub trait VaultEntity: Clone + Debug {
    type Kind: EntityKind;

    fn id(&self) -> &VersionedEntityId<Self::Kind>;

    fn attributes(&self) -> &EntityAttributes;

    fn attributes_mut(&mut self) -> &mut EntityAttributes;
}
