use crate::entity::{EntityAttributes, KeyKind, VaultEntity, VersionedKeyEntityId};
use crate::error::{error_codes, VaultError, VaultResult};

use super::engine::{Encryptable, Signable};
use super::jwk::JsonWebKey;
use super::material::KeyMaterial;
use super::types::{EncryptionAlgorithm, KeyCurve, KeyOperation, KeyType, SignatureAlgorithm};

/// One version of a key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEntity {
    id: VersionedKeyEntityId,
    attributes: EntityAttributes,
    key_type: KeyType,
    material: KeyMaterial,
    operations: Vec<KeyOperation>,
}

impl KeyEntity {
    /// Create a key version
    ///
    /// Operations the material cannot perform are dropped. An empty
    /// operation list grants everything the material supports.
    pub fn new(
        id: VersionedKeyEntityId,
        attributes: EntityAttributes,
        key_type: KeyType,
        material: KeyMaterial,
        operations: &[KeyOperation],
    ) -> VaultResult<Self> {
        if !material.matches_type(key_type) {
            return Err(VaultError::invalid_argument_with_code(
                "key_type",
                "a type matching the key material",
                key_type.as_str(),
                error_codes::INVALID_KEY_PARAMETERS,
            ));
        }
        let operations = filter_operations(&material, operations);
        Ok(Self {
            id,
            attributes,
            key_type,
            material,
            operations,
        })
    }

    /// Rebuild a version exactly as it was captured, operations included
    pub(crate) fn from_snapshot(
        id: VersionedKeyEntityId,
        attributes: EntityAttributes,
        key_type: KeyType,
        material: KeyMaterial,
        operations: Vec<KeyOperation>,
    ) -> VaultResult<Self> {
        if !material.matches_type(key_type) {
            return Err(VaultError::invalid_argument_with_code(
                "key_type",
                "a type matching the key material",
                key_type.as_str(),
                error_codes::INVALID_KEY_PARAMETERS,
            ));
        }
        Ok(Self {
            id,
            attributes,
            key_type,
            material,
            operations,
        })
    }

    pub fn key_type(&self) -> KeyType {
        self.key_type
    }

    pub fn material(&self) -> &KeyMaterial {
        &self.material
    }

    pub fn operations(&self) -> &[KeyOperation] {
        &self.operations
    }

    pub fn key_size(&self) -> Option<u32> {
        self.material.key_size()
    }

    pub fn curve(&self) -> Option<KeyCurve> {
        self.material.curve()
    }

    pub(crate) fn set_operations(&mut self, operations: &[KeyOperation]) {
        self.operations = filter_operations(&self.material, operations);
    }

    /// Public JWK of this version, keyed by its full id
    pub fn to_jwk(&self) -> JsonWebKey {
        let mut jwk = JsonWebKey::from_material(&self.material, self.key_type, false);
        jwk.kid = Some(self.id.to_string());
        jwk.key_ops = self.operations.clone();
        jwk
    }

    /// JWK including private members, used for backups
    pub fn to_private_jwk(&self) -> JsonWebKey {
        let mut jwk = JsonWebKey::from_material(&self.material, self.key_type, true);
        jwk.kid = Some(self.id.to_string());
        jwk.key_ops = self.operations.clone();
        jwk
    }

    pub fn encrypt(
        &self,
        algorithm: EncryptionAlgorithm,
        plaintext: &[u8],
        iv: Option<&[u8]>,
    ) -> VaultResult<Vec<u8>> {
        self.check_operation(KeyOperation::Encrypt)?;
        self.material.encrypt(algorithm, plaintext, iv)
    }

    pub fn decrypt(
        &self,
        algorithm: EncryptionAlgorithm,
        ciphertext: &[u8],
        iv: Option<&[u8]>,
    ) -> VaultResult<Vec<u8>> {
        self.check_operation(KeyOperation::Decrypt)?;
        self.material.decrypt(algorithm, ciphertext, iv)
    }

    /// Wrap another key's bytes with an encryption algorithm
    pub fn wrap_key(
        &self,
        algorithm: EncryptionAlgorithm,
        key: &[u8],
        iv: Option<&[u8]>,
    ) -> VaultResult<Vec<u8>> {
        self.check_operation(KeyOperation::WrapKey)?;
        self.material.encrypt(algorithm, key, iv)
    }

    pub fn unwrap_key(
        &self,
        algorithm: EncryptionAlgorithm,
        wrapped: &[u8],
        iv: Option<&[u8]>,
    ) -> VaultResult<Vec<u8>> {
        self.check_operation(KeyOperation::UnwrapKey)?;
        self.material.decrypt(algorithm, wrapped, iv)
    }

    pub fn sign(&self, algorithm: SignatureAlgorithm, digest: &[u8]) -> VaultResult<Vec<u8>> {
        self.check_operation(KeyOperation::Sign)?;
        self.material.sign(algorithm, digest)
    }

    pub fn verify(&self, algorithm: SignatureAlgorithm, digest: &[u8], signature: &[u8]) -> VaultResult<bool> {
        self.check_operation(KeyOperation::Verify)?;
        self.material.verify(algorithm, digest, signature)
    }

    fn check_operation(&self, operation: KeyOperation) -> VaultResult<()> {
        if !self.attributes.enabled {
            return Err(VaultError::invalid_operation(
                operation.as_str(),
                &format!("key {} is disabled", self.id),
                error_codes::KEY_DISABLED,
            ));
        }
        if !self.operations.contains(&operation) {
            return Err(VaultError::invalid_operation(
                operation.as_str(),
                &format!("operation not allowed for key {}", self.id),
                error_codes::OPERATION_NOT_ALLOWED,
            ));
        }
        Ok(())
    }
}

fn filter_operations(material: &KeyMaterial, requested: &[KeyOperation]) -> Vec<KeyOperation> {
    let supported = material.supported_operations();
    if requested.is_empty() {
        return supported;
    }
    let mut operations: Vec<KeyOperation> = requested
        .iter()
        .copied()
        .filter(|op| supported.contains(op))
        .collect();
    operations.sort();
    operations.dedup();
    operations
}

impl VaultEntity for KeyEntity {
    type Kind = KeyKind;

    fn id(&self) -> &VersionedKeyEntityId {
        &self.id
    }

    fn attributes(&self) -> &EntityAttributes {
        &self.attributes
    }

    fn attributes_mut(&mut self) -> &mut EntityAttributes {
        &mut self.attributes
    }
}
