use std::fmt;

use serde::{Deserialize, Serialize};

use crate::certificates::{CertificateEntity, CertificatePolicy, CertificateState, LifetimeActionPolicy};
use crate::entity::{
    EntityAttributes, VaultEntity, VersionedCertificateEntityId, VersionedKeyEntityId, VersionedSecretEntityId,
};
use crate::error::{error_codes, VaultError, VaultResult};
use crate::keys::{JsonWebKey, KeyEntity, KeyOperation, KeyType};
use crate::rotation::RotationPolicy;
use crate::secrets::SecretEntity;

/// DER members as standard base64 strings
mod der_base64 {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(bytes) => serializer.serialize_some(&base64::encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|text| base64::decode(text).map_err(serde::de::Error::custom))
            .transpose()
    }
}

pub(crate) fn invalid_backup(expected: &str, actual: &str) -> VaultError {
    VaultError::invalid_argument_with_code("backup", expected, actual, error_codes::INVALID_BACKUP)
}

/// One key version, private material included
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyVersionSnapshot {
    pub id: VersionedKeyEntityId,
    pub attributes: EntityAttributes,
    pub key_type: KeyType,
    pub key: JsonWebKey,
    pub operations: Vec<KeyOperation>,
}

impl KeyVersionSnapshot {
    pub fn capture(entity: &KeyEntity) -> Self {
        Self {
            id: entity.id().clone(),
            attributes: entity.attributes().without_deletion(),
            key_type: entity.key_type(),
            key: entity.to_private_jwk(),
            operations: entity.operations().to_vec(),
        }
    }

    /// Rebuild the version inside the vault at `vault`
    pub(crate) fn into_entity(self, vault: &str) -> VaultResult<KeyEntity> {
        let id = VersionedKeyEntityId::new(vault, self.id.name(), self.id.version())?;
        let material = self.key.to_material()?;
        KeyEntity::from_snapshot(id, self.attributes, self.key_type, material, self.operations)
    }
}

impl fmt::Debug for KeyVersionSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyVersionSnapshot")
            .field("id", &self.id)
            .field("attributes", &self.attributes)
            .field("key_type", &self.key_type)
            .field("key", &"[REDACTED]")
            .field("operations", &self.operations)
            .finish()
    }
}

/// One secret version
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretVersionSnapshot {
    pub id: VersionedSecretEntityId,
    pub attributes: EntityAttributes,
    pub value: String,
    #[serde(default)]
    pub content_type: Option<String>,
}

impl SecretVersionSnapshot {
    pub fn capture(entity: &SecretEntity) -> Self {
        Self {
            id: entity.id().clone(),
            attributes: entity.attributes().without_deletion(),
            value: entity.value().to_string(),
            content_type: entity.content_type().map(str::to_string),
        }
    }

    pub(crate) fn into_entity(self, vault: &str) -> VaultResult<SecretEntity> {
        let id = VersionedSecretEntityId::new(vault, self.id.name(), self.id.version())?;
        Ok(SecretEntity::new(id, self.attributes, self.value, self.content_type))
    }
}

impl fmt::Debug for SecretVersionSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretVersionSnapshot")
            .field("id", &self.id)
            .field("attributes", &self.attributes)
            .field("value", &"[REDACTED]")
            .field("content_type", &self.content_type)
            .finish()
    }
}

/// One certificate version with the key and secret versions it links to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateVersionSnapshot {
    pub id: VersionedCertificateEntityId,
    pub attributes: EntityAttributes,
    pub policy: CertificatePolicy,
    pub state: CertificateState,
    #[serde(default, with = "der_base64")]
    pub certificate_der: Option<Vec<u8>>,
    #[serde(default, with = "der_base64")]
    pub csr_der: Option<Vec<u8>>,
    pub key: KeyVersionSnapshot,
    #[serde(default)]
    pub secret: Option<SecretVersionSnapshot>,
}

impl CertificateVersionSnapshot {
    pub fn capture(entity: &CertificateEntity, key: &KeyEntity, secret: Option<&SecretEntity>) -> Self {
        Self {
            id: entity.id().clone(),
            attributes: entity.attributes().without_deletion(),
            policy: entity.policy().clone(),
            state: entity.state(),
            certificate_der: entity.certificate_der().map(<[u8]>::to_vec),
            csr_der: entity.csr_der().map(<[u8]>::to_vec),
            key: KeyVersionSnapshot::capture(key),
            secret: secret.map(SecretVersionSnapshot::capture),
        }
    }

    /// Rebuild the certificate, key and secret versions inside `vault`
    pub(crate) fn into_entities(self, vault: &str) -> VaultResult<(CertificateEntity, KeyEntity, Option<SecretEntity>)> {
        let id = VersionedCertificateEntityId::new(vault, self.id.name(), self.id.version())?;
        let key = self.key.into_entity(vault)?;
        let secret = self.secret.map(|secret| secret.into_entity(vault)).transpose()?;

        let certificate = match (self.state, self.certificate_der, &secret) {
            (CertificateState::Completed, Some(der), Some(secret)) => CertificateEntity::completed(
                id,
                self.attributes,
                self.policy,
                key.id().clone(),
                secret.id().clone(),
                der,
                self.csr_der,
            ),
            (CertificateState::Pending, None, None) => {
                let csr_der = self
                    .csr_der
                    .ok_or_else(|| invalid_backup("a CSR for a pending certificate", "none"))?;
                CertificateEntity::pending(id, self.attributes, self.policy, key.id().clone(), csr_der)
            }
            (state, _, _) => {
                return Err(invalid_backup(
                    "certificate content matching its state",
                    &format!("inconsistent {:?} version {}", state, self.id),
                ))
            }
        };
        Ok((certificate, key, secret))
    }
}

/// Every version of a key plus its rotation policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyBackup {
    pub versions: Vec<KeyVersionSnapshot>,
    #[serde(default)]
    pub rotation_policy: Option<RotationPolicy>,
}

/// Every version of a secret
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretBackup {
    pub versions: Vec<SecretVersionSnapshot>,
}

/// Every version of a certificate plus its lifetime action policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateBackup {
    pub versions: Vec<CertificateVersionSnapshot>,
    #[serde(default)]
    pub lifetime_policy: Option<LifetimeActionPolicy>,
}
