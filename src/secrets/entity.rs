use std::fmt;

use crate::entity::{EntityAttributes, SecretKind, VaultEntity, VersionedSecretEntityId};

/// One version of a secret
#[derive(Clone, PartialEq, Eq)]
pub struct SecretEntity {
    id: VersionedSecretEntityId,
    attributes: EntityAttributes,
    value: String,
    content_type: Option<String>,
}

impl SecretEntity {
    pub fn new(
        id: VersionedSecretEntityId,
        attributes: EntityAttributes,
        value: String,
        content_type: Option<String>,
    ) -> Self {
        Self {
            id,
            attributes,
            value,
            content_type,
        }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub(crate) fn set_value(&mut self, value: String) {
        self.value = value;
    }
}

// Never print secret values in logs
impl fmt::Debug for SecretEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretEntity")
            .field("id", &self.id)
            .field("attributes", &self.attributes)
            .field("value", &"[REDACTED]")
            .field("content_type", &self.content_type)
            .finish()
    }
}

impl VaultEntity for SecretEntity {
    type Kind = SecretKind;

    fn id(&self) -> &VersionedSecretEntityId {
        &self.id
    }

    fn attributes(&self) -> &EntityAttributes {
        &self.attributes
    }

    fn attributes_mut(&mut self) -> &mut EntityAttributes {
        &mut self.attributes
    }
}
