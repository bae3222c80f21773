use std::collections::HashSet;

use log::info;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::certificates::CertificateVault;
use crate::entity::{
    CertificateEntityId, EntityId, EntityKind, KeyEntityId, SecretEntityId, VaultEntity, VersionedEntityId,
};
use crate::error::{error_codes, VaultError, VaultResult};
use crate::keys::KeyVault;
use crate::secrets::SecretVault;
use crate::store::VersionedEntityStore;

use super::snapshot::{
    invalid_backup, CertificateBackup, CertificateVersionSnapshot, KeyBackup, KeyVersionSnapshot, SecretBackup,
    SecretVersionSnapshot,
};

/// Serialize a backup into opaque bytes
pub fn encode<T: Serialize>(backup: &T) -> VaultResult<Vec<u8>> {
    Ok(serde_json::to_vec(backup)?)
}

/// Read a backup produced by [`encode`]
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> VaultResult<T> {
    serde_json::from_slice(bytes).map_err(|e| invalid_backup("an encoded backup", &e.to_string()))
}

/// Capture every active version of a key that is not owned by a certificate
pub fn backup_key(keys: &KeyVault, id: &KeyEntityId) -> VaultResult<KeyBackup> {
    let chain = keys.store().chain(id)?;
    ensure_not_managed(chain.last().map(|latest| latest.attributes().managed), id)?;

    let backup = KeyBackup {
        versions: chain.iter().map(KeyVersionSnapshot::capture).collect(),
        rotation_policy: keys.rotation_policy(id)?.cloned(),
    };
    info!("Backed up key {} ({} versions)", id, backup.versions.len());
    Ok(backup)
}

/// Restore a key backup under its original name
///
/// # Arguments
///
/// * `keys` - Key store of the target vault
/// * `backup` - Versions of exactly one key name
///
/// # Returns
///
/// The id of the restored key, or `AlreadyExists` when the name is taken
/// by an active or deleted key
pub fn restore_key(keys: &mut KeyVault, backup: KeyBackup) -> VaultResult<KeyEntityId> {
    let name = single_name(backup.versions.iter().map(|version| &version.id))?;
    let target = keys.entity_id(&name)?;
    ensure_name_free(keys.store_mut(), &target)?;

    if let Some(policy) = &backup.rotation_policy {
        ensure_policy_name(policy.id.name(), &name)?;
        let latest_expiry = backup.versions.last().and_then(|latest| latest.attributes.expires_on);
        policy.validate(latest_expiry)?;
    }

    let vault = keys.store().vault_uri().to_string();
    let entities = backup
        .versions
        .into_iter()
        .map(|version| version.into_entity(&vault))
        .collect::<VaultResult<Vec<_>>>()?;
    let count = entities.len();
    for entity in entities {
        keys.store_mut().import_version(entity)?;
    }
    if let Some(mut policy) = backup.rotation_policy {
        policy.id = target.clone();
        keys.restore_rotation_policy(policy);
    }

    info!("Restored key {} ({} versions)", target, count);
    Ok(target)
}

/// Capture every active version of a secret that is not owned by a certificate
pub fn backup_secret(secrets: &SecretVault, id: &SecretEntityId) -> VaultResult<SecretBackup> {
    let chain = secrets.store().chain(id)?;
    ensure_not_managed(chain.last().map(|latest| latest.attributes().managed), id)?;

    let backup = SecretBackup {
        versions: chain.iter().map(SecretVersionSnapshot::capture).collect(),
    };
    info!("Backed up secret {} ({} versions)", id, backup.versions.len());
    Ok(backup)
}

pub fn restore_secret(secrets: &mut SecretVault, backup: SecretBackup) -> VaultResult<SecretEntityId> {
    let name = single_name(backup.versions.iter().map(|version| &version.id))?;
    let target = secrets.entity_id(&name)?;
    ensure_name_free(secrets.store_mut(), &target)?;

    let vault = secrets.store().vault_uri().to_string();
    let entities = backup
        .versions
        .into_iter()
        .map(|version| version.into_entity(&vault))
        .collect::<VaultResult<Vec<_>>>()?;
    let count = entities.len();
    for entity in entities {
        secrets.store_mut().import_version(entity)?;
    }

    info!("Restored secret {} ({} versions)", target, count);
    Ok(target)
}

/// Capture every active version of a certificate with its keys and secrets
pub fn backup_certificate(
    keys: &KeyVault,
    secrets: &SecretVault,
    certificates: &CertificateVault,
    id: &CertificateEntityId,
) -> VaultResult<CertificateBackup> {
    let chain = certificates.store().chain(id)?;
    let mut versions = Vec::with_capacity(chain.len());
    for certificate in chain {
        let key = keys.get(certificate.key_id())?;
        let secret = certificate
            .secret_id()
            .map(|secret_id| secrets.get(secret_id))
            .transpose()?;
        versions.push(CertificateVersionSnapshot::capture(certificate, key, secret));
    }

    let backup = CertificateBackup {
        versions,
        lifetime_policy: certificates.lifetime_action_policy(id)?.cloned(),
    };
    info!("Backed up certificate {} ({} versions)", id, backup.versions.len());
    Ok(backup)
}

/// Restore a certificate backup together with its keys and secrets
///
/// The name must be free in the key, secret and certificate stores.
pub fn restore_certificate(
    keys: &mut KeyVault,
    secrets: &mut SecretVault,
    certificates: &mut CertificateVault,
    backup: CertificateBackup,
) -> VaultResult<CertificateEntityId> {
    let name = single_name(backup.versions.iter().map(|version| &version.id))?;
    for version in &backup.versions {
        ensure_policy_name(version.key.id.name(), &name)?;
        if let Some(secret) = &version.secret {
            ensure_policy_name(secret.id.name(), &name)?;
        }
        version.policy.validate()?;
    }

    let target = certificates.entity_id(&name)?;
    let key_id = keys.entity_id(&name)?;
    let secret_id = secrets.entity_id(&name)?;
    ensure_name_free(certificates.store_mut(), &target)?;
    ensure_name_free(keys.store_mut(), &key_id)?;
    ensure_name_free(secrets.store_mut(), &secret_id)?;

    if let (Some(policy), Some(latest)) = (&backup.lifetime_policy, backup.versions.last()) {
        ensure_policy_name(policy.id.name(), &name)?;
        policy.validate(latest.policy.validity_months, latest.policy.issuer)?;
    }

    let vault = certificates.store().vault_uri().to_string();
    let entities = backup
        .versions
        .into_iter()
        .map(|version| version.into_entities(&vault))
        .collect::<VaultResult<Vec<_>>>()?;
    let count = entities.len();

    // Renewals that reuse their key share one key version
    let mut restored_keys = HashSet::new();
    for (certificate, key, secret) in entities {
        if restored_keys.insert(key.id().version().to_string()) {
            keys.store_mut().import_version(key)?;
        }
        if let Some(secret) = secret {
            secrets.store_mut().import_version(secret)?;
        }
        certificates.store_mut().import_version(certificate)?;
    }
    if let Some(mut policy) = backup.lifetime_policy {
        policy.id = target.clone();
        certificates.restore_lifetime_policy(policy);
    }

    info!("Restored certificate {} ({} versions)", target, count);
    Ok(target)
}

/// Name shared by every snapshot; one vault, one name and no repeated versions
fn single_name<'a, K, I>(ids: I) -> VaultResult<String>
where
    K: EntityKind + 'a,
    I: Iterator<Item = &'a VersionedEntityId<K>>,
{
    let mut vault_and_name: Option<(&str, &str)> = None;
    let mut versions = HashSet::new();
    for id in ids {
        match vault_and_name {
            None => vault_and_name = Some((id.vault(), id.name())),
            Some((vault, _)) if vault != id.vault() => {
                return Err(invalid_backup(&format!("versions of vault {}", vault), id.vault()))
            }
            Some((_, name)) if name != id.name() => {
                return Err(invalid_backup(&format!("versions of {}", name), id.name()))
            }
            Some(_) => {}
        }
        if !versions.insert(id.version()) {
            return Err(invalid_backup("distinct versions", id.version()));
        }
    }

    vault_and_name
        .map(|(_, name)| name.to_string())
        .ok_or_else(|| invalid_backup("at least one version", "none"))
}

fn ensure_policy_name(actual: &str, expected: &str) -> VaultResult<()> {
    if actual != expected {
        return Err(invalid_backup(&format!("entries of {}", expected), actual));
    }
    Ok(())
}

fn ensure_name_free<E: VaultEntity>(store: &mut VersionedEntityStore<E>, id: &EntityId<E::Kind>) -> VaultResult<()> {
    store.purge_expired();
    if store.contains_name(id.name()) {
        return Err(VaultError::already_exists(E::Kind::NAME, &id.to_string()));
    }
    if store.contains_deleted_name(id.name()) {
        return Err(VaultError::deleted_entity_exists(E::Kind::NAME, &id.to_string()));
    }
    Ok(())
}

fn ensure_not_managed<K: EntityKind>(managed: Option<bool>, id: &EntityId<K>) -> VaultResult<()> {
    if managed == Some(true) {
        return Err(VaultError::invalid_operation(
            "backup",
            &format!("{} is managed by a certificate", id),
            error_codes::MANAGED_ENTITY,
        ));
    }
    Ok(())
}
