use super::*;
use std::collections::BTreeMap;

use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::clock::VirtualClock;
use crate::entity::{EntityAttributes, SecretKind, VaultEntity, VersionedEntityId};
use crate::error::{error_codes, ErrorKind};
use crate::recovery::{RecoveryLevel, RecoveryPolicy};

const VAULT: &str = "https://localhost:8443";

#[derive(Debug, Clone, PartialEq)]
struct Note {
    id: VersionedEntityId<SecretKind>,
    attributes: EntityAttributes,
    text: String,
}

impl VaultEntity for Note {
    type Kind = SecretKind;

    fn id(&self) -> &VersionedEntityId<SecretKind> {
        &self.id
    }

    fn attributes(&self) -> &EntityAttributes {
        &self.attributes
    }

    fn attributes_mut(&mut self) -> &mut EntityAttributes {
        &mut self.attributes
    }
}

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

fn store_with(policy: RecoveryPolicy) -> (VersionedEntityStore<Note>, VirtualClock) {
    let clock = VirtualClock::fixed(start());
    (VersionedEntityStore::new(VAULT, policy, clock.clone()), clock)
}

fn add(store: &mut VersionedEntityStore<Note>, name: &str, text: &str) -> VersionedEntityId<SecretKind> {
    store
        .create_version(name, |id, attributes| {
            Ok(Note {
                id,
                attributes,
                text: text.to_string(),
            })
        })
        .unwrap()
}

#[test]
fn test_create_appends_versions_in_order() {
    let (mut store, clock) = store_with(RecoveryPolicy::default());

    // Create three versions at distinct instants
    let v1 = add(&mut store, "n1", "one");
    clock.shift(10).unwrap();
    let v2 = add(&mut store, "n1", "two");
    clock.shift(10).unwrap();
    let v3 = add(&mut store, "n1", "three");

    let id = store.entity_id("n1").unwrap();
    let versions = store.versions(&id).unwrap();
    assert_eq!(
        versions,
        vec![v1.version().to_string(), v2.version().to_string(), v3.version().to_string()]
    );
    assert_eq!(store.latest_version(&id).unwrap(), v3);
    assert_eq!(store.get(&v2).unwrap().text, "two");
    assert_eq!(store.get(&v2).unwrap().attributes.created_on, start() + Duration::seconds(10));
}

#[test]
fn test_create_over_deleted_name_fails() {
    let (mut store, _) = store_with(RecoveryPolicy::default());
    add(&mut store, "n1", "one");
    let id = store.entity_id("n1").unwrap();
    store.delete(&id).unwrap();

    let result = store.create_version("n1", |id, attributes| {
        Ok(Note {
            id,
            attributes,
            text: "again".to_string(),
        })
    });
    let err = result.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    assert_eq!(err.error_code(), error_codes::ENTITY_DELETED);
}

#[test]
fn test_delete_and_recover_round_trip() {
    let (mut store, clock) = store_with(RecoveryPolicy::default());
    add(&mut store, "n1", "one");
    add(&mut store, "n1", "two");
    let id = store.entity_id("n1").unwrap();
    let before = store.chain(&id).unwrap().to_vec();

    // Delete moves the chain and stamps deletion metadata
    store.delete(&id).unwrap();
    assert!(!store.contains_name("n1"));
    assert!(store.contains_deleted_name("n1"));
    let deleted = store.deleted().latest_entity(&id).unwrap();
    assert_eq!(deleted.attributes.deleted_date, Some(clock.now()));
    assert_eq!(deleted.attributes.scheduled_purge_date, Some(clock.now() + Duration::days(90)));
    assert!(store.get(before[0].id()).is_err());
    assert!(store.get_deleted(before[0].id()).is_ok());

    // Recover restores the exact chain
    store.recover(&id).unwrap();
    assert_eq!(store.chain(&id).unwrap(), before.as_slice());
    assert!(!store.contains_deleted_name("n1"));
}

#[test]
fn test_purge_requires_purgeable_level() {
    let (mut store, _) = store_with(RecoveryPolicy::default());
    add(&mut store, "n1", "one");
    let id = store.entity_id("n1").unwrap();
    store.delete(&id).unwrap();

    let err = store.purge(&id).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IllegalState);

    // The deleted chain is intact and recoverable
    assert!(store.contains_deleted_name("n1"));
    store.recover(&id).unwrap();
    assert!(store.contains_name("n1"));
}

#[test]
fn test_purge_under_purgeable_level() {
    let policy = RecoveryPolicy::new(RecoveryLevel::RecoverablePurgeable, Some(90)).unwrap();
    let (mut store, _) = store_with(policy);
    add(&mut store, "n1", "one");
    let id = store.entity_id("n1").unwrap();

    // Purging an active name is not possible
    assert_eq!(store.purge(&id).unwrap_err().kind(), ErrorKind::NotFound);

    store.delete(&id).unwrap();
    store.purge(&id).unwrap();
    assert!(!store.contains_deleted_name("n1"));

    // The name is free again
    add(&mut store, "n1", "fresh");
    assert_eq!(store.versions(&id).unwrap().len(), 1);
}

#[test]
fn test_expired_deleted_chains_are_purged() {
    let policy = RecoveryPolicy::new(RecoveryLevel::CustomizedRecoverable, Some(7)).unwrap();
    let (mut store, clock) = store_with(policy);
    add(&mut store, "n1", "one");
    let id = store.entity_id("n1").unwrap();
    store.delete(&id).unwrap();

    clock.shift(7 * 86_400 + 1).unwrap();
    assert_eq!(store.purge_expired(), vec!["n1".to_string()]);
    assert_eq!(store.recover(&id).unwrap_err().kind(), ErrorKind::NotFound);
}

#[test]
fn test_attribute_mutators() {
    let (mut store, clock) = store_with(RecoveryPolicy::default());
    let v1 = add(&mut store, "n1", "one");
    clock.shift(60).unwrap();

    store.set_enabled(&v1, false).unwrap();
    let mut tags = BTreeMap::new();
    tags.insert("env".to_string(), "test".to_string());
    store.add_tags(&v1, &tags).unwrap();

    let note = store.get(&v1).unwrap();
    assert!(!note.attributes.enabled);
    assert_eq!(note.attributes.tags, tags);
    assert_eq!(note.attributes.updated_on, start() + Duration::seconds(60));
    assert_eq!(note.attributes.created_on, start());

    store.clear_tags(&v1).unwrap();
    assert!(store.get(&v1).unwrap().attributes.tags.is_empty());

    // An inverted window is rejected and nothing changes
    let later = start() + Duration::days(2);
    let err = store.set_expiry(&v1, Some(later), Some(start())).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert!(store.get(&v1).unwrap().attributes.not_before.is_none());
}

#[test]
fn test_failed_update_leaves_entity_untouched() {
    let (mut store, _) = store_with(RecoveryPolicy::default());
    let v1 = add(&mut store, "n1", "one");

    let result = store.update(&v1, |note| {
        note.text = "changed".to_string();
        Err(crate::error::VaultError::invalid_argument("text", "anything", "changed"))
    });
    assert!(result.is_err());
    assert_eq!(store.get(&v1).unwrap().text, "one");
}

#[test]
fn test_listing_skips_managed_entities() {
    let (mut store, _) = store_with(RecoveryPolicy::default());
    add(&mut store, "plain", "one");
    let managed = add(&mut store, "owned", "two");
    store.set_managed(&managed, true).unwrap();

    let listed: Vec<String> = store
        .list_latest_non_managed()
        .iter()
        .map(|n| n.id.name().to_string())
        .collect();
    assert_eq!(listed, vec!["plain".to_string()]);
}

#[test]
fn test_explicit_versions_and_imports() {
    let (mut store, _) = store_with(RecoveryPolicy::default());
    let token = "0123456789abcdef0123456789abcdef";
    let id = store
        .create_version_at("n1", Some(token), start() - Duration::days(3), |id, attributes| {
            Ok(Note {
                id,
                attributes,
                text: "old".to_string(),
            })
        })
        .unwrap();
    assert_eq!(id.version(), token);
    assert_eq!(store.get(&id).unwrap().attributes.created_on, start() - Duration::days(3));

    // Reusing the token is a collision
    let duplicate = store.get(&id).unwrap().clone();
    assert_eq!(store.import_version(duplicate).unwrap_err().kind(), ErrorKind::AlreadyExists);

    // Imports from another vault are rejected
    let mut foreign = store.get(&id).unwrap().clone();
    foreign.id = VersionedEntityId::new("https://other:8443", "n1", "ffffffffffffffffffffffffffffffff").unwrap();
    assert_eq!(store.import_version(foreign).unwrap_err().kind(), ErrorKind::InvalidArgument);
}

#[test]
fn test_invalid_names_rejected() {
    let (mut store, _) = store_with(RecoveryPolicy::default());
    let result = store.create_version("bad name", |id, attributes| {
        Ok(Note {
            id,
            attributes,
            text: String::new(),
        })
    });
    assert_eq!(result.unwrap_err().kind(), ErrorKind::InvalidArgument);
}
