use super::*;
use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::clock::VirtualClock;
use crate::entity::{generate_version, VaultEntity};
use crate::error::{error_codes, ErrorKind};
use crate::recovery::{RecoveryLevel, RecoveryPolicy};

const VAULT: &str = "https://localhost:8443";

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

fn vault_with(recovery: RecoveryPolicy) -> (SecretVault, VirtualClock) {
    let clock = VirtualClock::fixed(start());
    (SecretVault::new(VAULT, recovery, clock.clone()), clock)
}

#[test]
fn test_delete_and_recover_secret() {
    let (mut secrets, _) = vault_with(RecoveryPolicy::default());
    let id = secrets
        .create_secret("s1", SecretCreateInput::new("lowkey-vault").with_tag("env", "test"))
        .unwrap();
    let entity_id = id.entity_id();

    secrets.delete_secret(&entity_id).unwrap();
    assert!(secrets.get(&id).is_err());
    assert!(secrets.list().is_empty());

    // The deleted view carries the deletion metadata
    let deleted = secrets.get_deleted(&id).unwrap();
    assert_eq!(deleted.attributes().deleted_date, Some(start()));
    assert_eq!(deleted.attributes().scheduled_purge_date, Some(start() + Duration::days(90)));
    assert_eq!(secrets.list_deleted().len(), 1);

    secrets.recover_secret(&entity_id).unwrap();
    let recovered = secrets.get(&id).unwrap();
    assert_eq!(recovered.value(), "lowkey-vault");
    assert_eq!(recovered.attributes().tags.get("env").map(String::as_str), Some("test"));
    assert!(!recovered.attributes().is_deleted());
}

#[test]
fn test_create_over_deleted_name_fails() {
    let (mut secrets, _) = vault_with(RecoveryPolicy::default());
    let first = secrets.create_secret("s1", SecretCreateInput::new("one")).unwrap();
    let second = secrets.create_secret("s1", SecretCreateInput::new("two")).unwrap();

    // Active names simply get another version
    assert_eq!(
        secrets.versions(&first.entity_id()).unwrap(),
        vec![first.version().to_string(), second.version().to_string()]
    );
    assert_eq!(secrets.latest(&first.entity_id()).unwrap().value(), "two");

    secrets.delete_secret(&first.entity_id()).unwrap();
    let err = secrets.create_secret("s1", SecretCreateInput::new("three")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);
}

#[test]
fn test_purge_depends_on_recovery_level() {
    let (mut secrets, _) = vault_with(RecoveryPolicy::default());
    let id = secrets.create_secret("s1", SecretCreateInput::new("value")).unwrap();
    secrets.delete_secret(&id.entity_id()).unwrap();
    let err = secrets.purge_secret(&id.entity_id()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IllegalState);
    assert_eq!(secrets.list_deleted().len(), 1);

    let purgeable = RecoveryPolicy::new(RecoveryLevel::RecoverablePurgeable, Some(90)).unwrap();
    let (mut secrets, _) = vault_with(purgeable);
    let id = secrets.create_secret("s1", SecretCreateInput::new("value")).unwrap();
    secrets.delete_secret(&id.entity_id()).unwrap();
    secrets.purge_secret(&id.entity_id()).unwrap();
    assert!(secrets.list_deleted().is_empty());

    // The name is free again
    assert!(secrets.create_secret("s1", SecretCreateInput::new("again")).is_ok());
}

#[test]
fn test_expired_deletions_are_purged_on_access() {
    let policy = RecoveryPolicy::new(RecoveryLevel::CustomizedRecoverable, Some(7)).unwrap();
    let (mut secrets, clock) = vault_with(policy);
    let id = secrets.create_secret("s1", SecretCreateInput::new("value")).unwrap();
    secrets.delete_secret(&id.entity_id()).unwrap();

    clock.shift(8 * 86_400).unwrap();
    let err = secrets.recover_secret(&id.entity_id()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(secrets.create_secret("s1", SecretCreateInput::new("new")).is_ok());
}

#[test]
fn test_attribute_updates() {
    let (mut secrets, clock) = vault_with(RecoveryPolicy::default());
    let id = secrets
        .create_secret("s1", SecretCreateInput::new("value").with_content_type("text/plain"))
        .unwrap();
    clock.shift(10).unwrap();

    secrets.set_enabled(&id, false).unwrap();
    let secret = secrets.get(&id).unwrap();
    assert!(!secret.attributes().enabled);
    assert_eq!(secret.attributes().updated_on, start() + Duration::seconds(10));
    assert_eq!(secret.attributes().created_on, start());
    assert_eq!(secret.content_type(), Some("text/plain"));

    // A window ending before it starts is rejected without a change
    let err = secrets
        .set_expiry(&id, Some(start() + Duration::days(2)), Some(start() + Duration::days(1)))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert_eq!(secrets.get(&id).unwrap().attributes().expires_on, None);

    let mut tags = std::collections::BTreeMap::new();
    tags.insert("a".to_string(), "1".to_string());
    secrets.add_tags(&id, &tags).unwrap();
    assert_eq!(secrets.get(&id).unwrap().attributes().tags.len(), 1);
    secrets.clear_tags(&id).unwrap();
    assert!(secrets.get(&id).unwrap().attributes().tags.is_empty());
}

#[test]
fn test_managed_secrets_are_protected() {
    let (mut secrets, _) = vault_with(RecoveryPolicy::default());
    let version = generate_version();
    let id = secrets
        .create_managed_at("cert", &version, start(), "bundle".to_string(), "application/x-pem-file", (None, None))
        .unwrap();
    assert_eq!(id.version(), version);

    // Hidden from listings and closed to direct lifecycle calls
    assert!(secrets.list().is_empty());
    let err = secrets.delete_secret(&id.entity_id()).unwrap_err();
    assert_eq!(err.error_code(), error_codes::MANAGED_ENTITY);
    let err = secrets.create_secret("cert", SecretCreateInput::new("x")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidOperation);

    secrets.replace_value(&id, "refreshed".to_string()).unwrap();
    let secret = secrets.get(&id).unwrap();
    assert_eq!(secret.value(), "refreshed");
    assert_eq!(secret.attributes().updated_on, start());
}

#[test]
fn test_debug_output_redacts_value() {
    let (mut secrets, _) = vault_with(RecoveryPolicy::default());
    let id = secrets.create_secret("s1", SecretCreateInput::new("hunter2")).unwrap();
    let debug = format!("{:?}", secrets.get(&id).unwrap());
    assert!(debug.contains("[REDACTED]"));
    assert!(!debug.contains("hunter2"));
}
