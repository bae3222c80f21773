use super::*;
use chrono::{DateTime, TimeZone, Utc};

use crate::certificates::{CertificatePolicy, CertificateVault};
use crate::clock::VirtualClock;
use crate::entity::VaultEntity;
use crate::error::{error_codes, ErrorKind};
use crate::keys::{KeyCreateInput, KeyCurve, KeyOperation, KeyType, KeyVault, SignatureAlgorithm};
use crate::recovery::{RecoveryLevel, RecoveryPolicy};
use crate::rotation::{KeyLifetimeAction, KeyLifetimeActionTrigger, Period, RotationPolicy};
use crate::secrets::{SecretCreateInput, SecretVault};

const VAULT: &str = "https://localhost:8443";
const OTHER_VAULT: &str = "https://other.localhost:8443";

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap()
}

fn purgeable() -> RecoveryPolicy {
    RecoveryPolicy::new(RecoveryLevel::RecoverablePurgeable, Some(90)).unwrap()
}

fn key_vault(uri: &str) -> (KeyVault, VirtualClock) {
    let clock = VirtualClock::fixed(start());
    (KeyVault::new(uri, purgeable(), clock.clone()), clock)
}

/// Key with three versions created a minute apart
fn key_with_versions(keys: &mut KeyVault, clock: &VirtualClock) -> crate::entity::KeyEntityId {
    let input = KeyCreateInput::new(KeyType::Ec)
        .with_curve(KeyCurve::P256)
        .with_operations(&[KeyOperation::Sign, KeyOperation::Verify])
        .with_tag("team", "vault");
    let first = keys.create_key("k1", input.clone()).unwrap();
    clock.shift(60).unwrap();
    keys.create_key("k1", input.clone()).unwrap();
    clock.shift(60).unwrap();
    keys.create_key("k1", input.disabled()).unwrap();
    first.entity_id()
}

#[test]
fn test_key_backup_restores_versions_in_order() {
    let (mut keys, clock) = key_vault(VAULT);
    let id = key_with_versions(&mut keys, &clock);
    let versions = keys.versions(&id).unwrap();
    let backup = backup_key(&keys, &id).unwrap();
    assert_eq!(backup.versions.len(), 3);

    keys.delete_key(&id).unwrap();
    keys.purge_key(&id).unwrap();
    clock.shift(3_600).unwrap();

    let restored = restore_key(&mut keys, backup.clone()).unwrap();
    assert_eq!(restored, id);
    assert_eq!(keys.versions(&id).unwrap(), versions);
    for (snapshot, version) in backup.versions.iter().zip(&versions) {
        let entity = keys.get(&id.with_version(version)).unwrap();
        assert_eq!(entity.attributes(), &snapshot.attributes);
        assert_eq!(entity.operations(), snapshot.operations.as_slice());
    }

    // Backing up the restored key gives the same backup
    assert_eq!(backup_key(&keys, &id).unwrap(), backup);
}

#[test]
fn test_restored_key_material_still_signs() {
    let (mut keys, clock) = key_vault(VAULT);
    let id = key_with_versions(&mut keys, &clock);
    let latest = keys.store().latest_version(&id).unwrap();
    let first = id.with_version(&keys.versions(&id).unwrap()[0]);
    let digest = [7u8; 32];
    let signature = keys
        .sign(&first, SignatureAlgorithm::Es256, &digest)
        .unwrap();

    let encoded = encode(&backup_key(&keys, &id).unwrap()).unwrap();
    let (mut other, _) = key_vault(OTHER_VAULT);
    let restored = restore_key(&mut other, decode(&encoded).unwrap()).unwrap();
    assert_eq!(restored.vault(), OTHER_VAULT);

    let moved = restored.with_version(first.version());
    assert!(other
        .verify(&moved, SignatureAlgorithm::Es256, &digest, &signature)
        .unwrap());
    assert!(!other.latest(&restored).unwrap().attributes().enabled);
    assert_eq!(other.latest(&restored).unwrap().id().version(), latest.version());
}

#[test]
fn test_restore_rejects_taken_names() {
    let (mut keys, clock) = key_vault(VAULT);
    let id = key_with_versions(&mut keys, &clock);
    let backup = backup_key(&keys, &id).unwrap();

    let err = restore_key(&mut keys, backup.clone()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);

    keys.delete_key(&id).unwrap();
    let err = restore_key(&mut keys, backup).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    assert_eq!(err.error_code(), error_codes::ENTITY_DELETED);
}

#[test]
fn test_restore_rejects_malformed_backups() {
    let (mut keys, clock) = key_vault(VAULT);
    let empty = KeyBackup {
        versions: Vec::new(),
        rotation_policy: None,
    };
    let err = restore_key(&mut keys, empty).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert_eq!(err.error_code(), error_codes::INVALID_BACKUP);

    let k1 = key_with_versions(&mut keys, &clock);
    let k2 = keys.create_key("k2", KeyCreateInput::new(KeyType::Ec)).unwrap();
    let mut mixed = backup_key(&keys, &k1).unwrap();
    mixed.versions.extend(backup_key(&keys, &k2.entity_id()).unwrap().versions);
    keys.delete_key(&k1).unwrap();
    keys.purge_key(&k1).unwrap();
    let err = restore_key(&mut keys, mixed.clone()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    // Duplicated versions
    let mut duplicated = mixed;
    duplicated.versions.truncate(1);
    duplicated.versions.push(duplicated.versions[0].clone());
    let err = restore_key(&mut keys, duplicated).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert!(!keys.store().contains_name("k1"));

    let err = decode::<KeyBackup>(b"not a backup").unwrap_err();
    assert_eq!(err.error_code(), error_codes::INVALID_BACKUP);
}

#[test]
fn test_rotation_policy_travels_with_the_key() {
    let (mut keys, clock) = key_vault(VAULT);
    let id = key_with_versions(&mut keys, &clock);
    let policy = RotationPolicy::new(
        id.clone(),
        start(),
        Period::days(60),
        vec![KeyLifetimeAction::rotate(KeyLifetimeActionTrigger::time_after_create(Period::days(30)))],
    );
    keys.set_rotation_policy(policy).unwrap();
    let backup = backup_key(&keys, &id).unwrap();
    assert!(backup.rotation_policy.is_some());

    keys.delete_key(&id).unwrap();
    keys.purge_key(&id).unwrap();
    assert!(keys.rotation_policy(&id).is_err());

    let mut broken = backup.clone();
    if let Some(policy) = broken.rotation_policy.as_mut() {
        policy.expiry_time = Period::days(10);
    }
    let err = restore_key(&mut keys, broken).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidPolicy);
    assert!(!keys.store().contains_name("k1"));

    restore_key(&mut keys, backup.clone()).unwrap();
    assert_eq!(keys.rotation_policy(&id).unwrap(), backup.rotation_policy.as_ref());
}

#[test]
fn test_secret_backup_round_trip() {
    let clock = VirtualClock::fixed(start());
    let mut secrets = SecretVault::new(VAULT, purgeable(), clock.clone());
    let first = secrets
        .create_secret("s1", SecretCreateInput::new("one").with_content_type("text/plain"))
        .unwrap();
    clock.shift(5).unwrap();
    secrets
        .create_secret("s1", SecretCreateInput::new("two").with_tag("k", "v"))
        .unwrap();
    let id = first.entity_id();

    let bytes = encode(&backup_secret(&secrets, &id).unwrap()).unwrap();
    secrets.delete_secret(&id).unwrap();
    secrets.purge_secret(&id).unwrap();

    restore_secret(&mut secrets, decode(&bytes).unwrap()).unwrap();
    let restored = secrets.get(&first).unwrap();
    assert_eq!(restored.value(), "one");
    assert_eq!(restored.content_type(), Some("text/plain"));
    assert_eq!(secrets.latest(&id).unwrap().value(), "two");
    assert_eq!(encode(&backup_secret(&secrets, &id).unwrap()).unwrap(), bytes);
}

#[test]
fn test_certificate_backup_round_trip() {
    let clock = VirtualClock::fixed(start());
    let mut keys = KeyVault::new(VAULT, purgeable(), clock.clone());
    let mut secrets = SecretVault::new(VAULT, purgeable(), clock.clone());
    let mut certificates = CertificateVault::new(VAULT, purgeable(), clock.clone());
    let policy = CertificatePolicy::new("CN=backup.example.com").with_ec_key(KeyCurve::P256, false);
    let first = certificates
        .create_certificate(&mut keys, &mut secrets, "c1", policy.clone())
        .unwrap();
    clock.shift(60).unwrap();
    certificates
        .create_certificate(&mut keys, &mut secrets, "c1", policy)
        .unwrap();
    let id = first.entity_id();

    // Managed keys and secrets are only backed up through their certificate
    let key_id = keys.entity_id("c1").unwrap();
    assert_eq!(
        backup_key(&keys, &key_id).unwrap_err().error_code(),
        error_codes::MANAGED_ENTITY
    );

    let backup = backup_certificate(&keys, &secrets, &certificates, &id).unwrap();
    assert_eq!(backup.versions.len(), 2);
    assert!(backup.lifetime_policy.is_some());
    let bytes = encode(&backup).unwrap();

    let mut fresh_keys = KeyVault::new(VAULT, purgeable(), clock.clone());
    let mut fresh_secrets = SecretVault::new(VAULT, purgeable(), clock.clone());
    let mut fresh_certificates = CertificateVault::new(VAULT, purgeable(), clock.clone());
    let restored = restore_certificate(
        &mut fresh_keys,
        &mut fresh_secrets,
        &mut fresh_certificates,
        decode(&bytes).unwrap(),
    )
    .unwrap();

    assert_eq!(fresh_certificates.get(&first).unwrap(), certificates.get(&first).unwrap());
    assert_eq!(fresh_keys.versions(&key_id).unwrap(), keys.versions(&key_id).unwrap());
    assert!(fresh_keys.latest(&key_id).unwrap().attributes().managed);
    assert!(fresh_keys.list().is_empty());
    assert_eq!(
        backup_certificate(&fresh_keys, &fresh_secrets, &fresh_certificates, &restored).unwrap(),
        backup
    );

    // The original vault still holds the name
    let err = restore_certificate(&mut keys, &mut secrets, &mut certificates, backup).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);
}

#[test]
fn test_snapshots_redact_material() {
    let (mut keys, clock) = key_vault(VAULT);
    let id = key_with_versions(&mut keys, &clock);
    let backup = backup_key(&keys, &id).unwrap();
    let printed = format!("{:?}", backup);
    assert!(printed.contains("[REDACTED]"));
    assert!(!printed.contains("JsonWebKey"));
}
