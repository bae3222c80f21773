use super::*;
use chrono::{DateTime, Duration, TimeZone, Utc};
use sha2::{Digest, Sha256, Sha384, Sha512};

use crate::clock::VirtualClock;
use crate::entity::VaultEntity;
use crate::error::{error_codes, ErrorKind};
use crate::recovery::RecoveryPolicy;
use crate::rotation::{KeyLifetimeAction, KeyLifetimeActionTrigger, Period, RotationPolicy};

const VAULT: &str = "https://localhost:8443";

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

fn vault() -> (KeyVault, VirtualClock) {
    let clock = VirtualClock::fixed(start());
    (KeyVault::new(VAULT, RecoveryPolicy::default(), clock.clone()), clock)
}

fn sha256(data: &[u8]) -> Vec<u8> {
    Sha256::digest(data).to_vec()
}

#[test]
fn test_ec_sign_and_verify_per_curve() {
    let (mut keys, _) = vault();
    let data = b"lowkey";
    let cases = [
        (KeyCurve::P256, Sha256::digest(data).to_vec()),
        (KeyCurve::P256K, Sha256::digest(data).to_vec()),
        (KeyCurve::P384, Sha384::digest(data).to_vec()),
        (KeyCurve::P521, Sha512::digest(data).to_vec()),
    ];

    for (index, (curve, digest)) in cases.into_iter().enumerate() {
        let id = keys
            .create_key(&format!("ec-{}", index), KeyCreateInput::new(KeyType::Ec).with_curve(curve))
            .unwrap_or_else(|_| panic!("create {}", curve));
        let algorithm = curve.signature_algorithm();

        // Sign the digest and check the raw r || s length
        let signature = keys.sign(&id, algorithm, &digest).unwrap();
        assert_eq!(signature.len(), curve.coordinate_length() * 2);

        assert!(keys.verify(&id, algorithm, &digest, &signature).unwrap());

        // A different digest does not verify
        let mut other = digest.clone();
        other[0] ^= 0xff;
        assert!(!keys.verify(&id, algorithm, &other, &signature).unwrap());
    }
}

#[test]
fn test_ec_rejects_mismatched_curve_and_encryption() {
    let (mut keys, _) = vault();
    let id = keys.create_key("ec", KeyCreateInput::new(KeyType::Ec)).unwrap();
    let digest = sha256(b"data");

    let err = keys.sign(&id, SignatureAlgorithm::Es384, &sha384_like()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidOperation);

    // EC keys never get encrypt in their operation list
    let err = keys.encrypt(&id, EncryptionAlgorithm::RsaOaep, b"data", None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidOperation);

    // Malformed signatures are a plain mismatch
    assert!(!keys.verify(&id, SignatureAlgorithm::Es256, &digest, b"short").unwrap());
}

fn sha384_like() -> Vec<u8> {
    Sha384::digest(b"data").to_vec()
}

#[test]
fn test_digest_length_is_checked() {
    let (mut keys, _) = vault();
    let id = keys.create_key("ec", KeyCreateInput::new(KeyType::EcHsm)).unwrap();

    let err = keys.sign(&id, SignatureAlgorithm::Es256, &[0u8; 20]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert_eq!(err.error_code(), error_codes::INVALID_DIGEST_LENGTH);
}

#[test]
fn test_rsa_encrypt_decrypt_and_sign() {
    let (mut keys, _) = vault();
    let id = keys.create_key("rsa", KeyCreateInput::new(KeyType::Rsa)).unwrap();
    assert_eq!(keys.get(&id).unwrap().key_size(), Some(2048));

    for algorithm in [
        EncryptionAlgorithm::RsaOaep,
        EncryptionAlgorithm::RsaOaep256,
        EncryptionAlgorithm::Rsa15,
    ] {
        let ciphertext = keys.encrypt(&id, algorithm, b"lowkey-vault", None).unwrap();
        assert_eq!(keys.decrypt(&id, algorithm, &ciphertext, None).unwrap(), b"lowkey-vault");
    }

    let digest = sha256(b"lowkey");
    for algorithm in [SignatureAlgorithm::Rs256, SignatureAlgorithm::Ps256] {
        let signature = keys.sign(&id, algorithm, &digest).unwrap();
        assert!(keys.verify(&id, algorithm, &digest, &signature).unwrap());
        assert!(!keys.verify(&id, algorithm, &sha256(b"other"), &signature).unwrap());
    }

    // AES algorithms are not available on RSA keys
    let err = keys.encrypt(&id, EncryptionAlgorithm::A256CbcPad, b"x", Some(&[0u8; 16])).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidOperation);
}

#[test]
fn test_rsa_encryption_per_key_size() {
    let (mut keys, _) = vault();
    let algorithms = [
        EncryptionAlgorithm::RsaOaep,
        EncryptionAlgorithm::RsaOaep256,
        EncryptionAlgorithm::Rsa15,
    ];

    for bits in RSA_KEY_SIZES {
        let id = keys
            .create_key(&format!("rsa-{}", bits), KeyCreateInput::new(KeyType::Rsa).with_key_size(bits))
            .unwrap();
        assert_eq!(keys.get(&id).unwrap().key_size(), Some(bits));

        for algorithm in algorithms {
            for plaintext in [&b""[..], b"lowkey-vault", &[0xa5u8; 64]] {
                let ciphertext = keys.encrypt(&id, algorithm, plaintext, None).unwrap();
                assert_eq!(ciphertext.len(), bits as usize / 8, "{} {}", bits, algorithm);
                assert_eq!(keys.decrypt(&id, algorithm, &ciphertext, None).unwrap(), plaintext);
            }
        }
    }
}

#[test]
fn test_rsa_signatures_per_digest() {
    let (mut keys, _) = vault();
    let id = keys.create_key("rsa", KeyCreateInput::new(KeyType::Rsa)).unwrap();
    let other = keys.create_key("rsa-other", KeyCreateInput::new(KeyType::Rsa)).unwrap();
    let data = b"lowkey";
    let cases = [
        (SignatureAlgorithm::Rs256, Sha256::digest(data).to_vec()),
        (SignatureAlgorithm::Rs384, Sha384::digest(data).to_vec()),
        (SignatureAlgorithm::Rs512, Sha512::digest(data).to_vec()),
        (SignatureAlgorithm::Ps256, Sha256::digest(data).to_vec()),
        (SignatureAlgorithm::Ps384, Sha384::digest(data).to_vec()),
        (SignatureAlgorithm::Ps512, Sha512::digest(data).to_vec()),
    ];

    for (algorithm, digest) in cases {
        let signature = keys.sign(&id, algorithm, &digest).unwrap();
        assert!(keys.verify(&id, algorithm, &digest, &signature).unwrap(), "{}", algorithm);
        assert!(!keys.verify(&other, algorithm, &digest, &signature).unwrap(), "{}", algorithm);

        let mut tampered = digest.clone();
        tampered[0] ^= 0x01;
        assert!(!keys.verify(&id, algorithm, &tampered, &signature).unwrap(), "{}", algorithm);
    }

    // A digest for another hash size is refused before signing
    let err = keys.sign(&id, SignatureAlgorithm::Rs384, &sha256(data)).unwrap_err();
    assert_eq!(err.error_code(), error_codes::INVALID_DIGEST_LENGTH);
}

#[test]
fn test_ec_signature_from_another_key_does_not_verify() {
    let (mut keys, _) = vault();
    let data = b"lowkey";
    let cases = [
        (KeyCurve::P256, Sha256::digest(data).to_vec()),
        (KeyCurve::P256K, Sha256::digest(data).to_vec()),
        (KeyCurve::P384, Sha384::digest(data).to_vec()),
        (KeyCurve::P521, Sha512::digest(data).to_vec()),
    ];

    for (curve, digest) in cases {
        let signer = keys
            .create_key(&format!("signer-{}", curve), KeyCreateInput::new(KeyType::Ec).with_curve(curve))
            .unwrap();
        let stranger = keys
            .create_key(&format!("stranger-{}", curve), KeyCreateInput::new(KeyType::Ec).with_curve(curve))
            .unwrap();
        let algorithm = curve.signature_algorithm();

        let signature = keys.sign(&signer, algorithm, &digest).unwrap();
        assert!(keys.verify(&signer, algorithm, &digest, &signature).unwrap(), "{}", curve);
        assert!(!keys.verify(&stranger, algorithm, &digest, &signature).unwrap(), "{}", curve);
    }
}

#[test]
fn test_rsa_wrap_and_unwrap() {
    let (mut keys, _) = vault();
    let id = keys.create_key("wrapper", KeyCreateInput::new(KeyType::RsaHsm)).unwrap();

    let wrapped = keys.wrap_key(&id, EncryptionAlgorithm::RsaOaep256, &[7u8; 32], None).unwrap();
    let unwrapped = keys.unwrap_key(&id, EncryptionAlgorithm::RsaOaep256, &wrapped, None).unwrap();
    assert_eq!(unwrapped, vec![7u8; 32]);
}

#[test]
fn test_aes_cbc_round_trips() {
    let (mut keys, _) = vault();
    let iv = [3u8; 16];

    for (bits, plain, padded) in [
        (128, EncryptionAlgorithm::A128Cbc, EncryptionAlgorithm::A128CbcPad),
        (192, EncryptionAlgorithm::A192Cbc, EncryptionAlgorithm::A192CbcPad),
        (256, EncryptionAlgorithm::A256Cbc, EncryptionAlgorithm::A256CbcPad),
    ] {
        let id = keys
            .create_key(&format!("aes-{}", bits), KeyCreateInput::new(KeyType::OctHsm).with_key_size(bits))
            .unwrap();

        let ciphertext = keys.encrypt(&id, padded, b"lowkey-vault", Some(&iv)).unwrap();
        assert_eq!(ciphertext.len(), 16);
        assert_eq!(keys.decrypt(&id, padded, &ciphertext, Some(&iv)).unwrap(), b"lowkey-vault");

        // Zero padding strips the trailing zeros again
        let ciphertext = keys.encrypt(&id, plain, b"lowkey-vault", Some(&iv)).unwrap();
        assert_eq!(keys.decrypt(&id, plain, &ciphertext, Some(&iv)).unwrap(), b"lowkey-vault");
    }
}

#[test]
fn test_aes_parameter_checks() {
    let (mut keys, _) = vault();
    let id = keys.create_key("aes", KeyCreateInput::new(KeyType::OctHsm)).unwrap();

    // Missing and short IVs
    let err = keys.encrypt(&id, EncryptionAlgorithm::A256CbcPad, b"x", None).unwrap_err();
    assert_eq!(err.error_code(), error_codes::INVALID_IV);
    let err = keys.encrypt(&id, EncryptionAlgorithm::A256CbcPad, b"x", Some(&[0u8; 8])).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    // Algorithm for another key size
    let err = keys.encrypt(&id, EncryptionAlgorithm::A128CbcPad, b"x", Some(&[0u8; 16])).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    // AES keys cannot sign
    let err = keys.sign(&id, SignatureAlgorithm::Rs256, &sha256(b"x")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidOperation);
}

#[test]
fn test_plain_oct_keys_are_rejected() {
    let (mut keys, _) = vault();
    let err = keys.create_key("oct", KeyCreateInput::new(KeyType::Oct)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    let err = keys
        .create_key("rsa", KeyCreateInput::new(KeyType::Rsa).with_key_size(1024))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[test]
fn test_operation_and_enabled_checks() {
    let (mut keys, _) = vault();
    let id = keys
        .create_key(
            "ec",
            KeyCreateInput::new(KeyType::Ec).with_operations(&[KeyOperation::Verify, KeyOperation::Encrypt]),
        )
        .unwrap();

    // Unsupported operations are filtered out
    assert_eq!(keys.get(&id).unwrap().operations(), &[KeyOperation::Verify]);

    let err = keys.sign(&id, SignatureAlgorithm::Es256, &sha256(b"x")).unwrap_err();
    assert_eq!(err.error_code(), error_codes::OPERATION_NOT_ALLOWED);

    keys.set_key_operations(&id, &[KeyOperation::Sign, KeyOperation::Verify]).unwrap();
    assert!(keys.sign(&id, SignatureAlgorithm::Es256, &sha256(b"x")).is_ok());

    keys.set_enabled(&id, false).unwrap();
    let err = keys.sign(&id, SignatureAlgorithm::Es256, &sha256(b"x")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidOperation);
    assert_eq!(err.error_code(), error_codes::KEY_DISABLED);
}

#[test]
fn test_jwk_export_and_import() {
    let (mut keys, _) = vault();
    let id = keys
        .create_key("source", KeyCreateInput::new(KeyType::Ec).with_curve(KeyCurve::P384))
        .unwrap();

    // The public JWK carries coordinates but no private scalar
    let public = keys.export_public(&id).unwrap();
    assert_eq!(public.crv, Some(KeyCurve::P384));
    assert!(public.d.is_none());
    assert_eq!(public.x.as_ref().map(Vec::len), Some(48));

    let json = serde_json::to_string(&public).unwrap();
    assert!(json.contains("\"kty\":\"EC\""));
    assert!(!json.contains("\"d\""));

    // Import the private form under another name as HSM
    let private = keys.get(&id).unwrap().to_private_jwk();
    let imported = keys
        .import_key("copy", KeyImportInput::new(private.clone()).with_hsm(true))
        .unwrap();
    let copy = keys.get(&imported).unwrap();
    assert_eq!(copy.key_type(), KeyType::EcHsm);
    assert_eq!(copy.material(), keys.get(&id).unwrap().material());

    // HSM key types cannot be downgraded
    let mut hsm_jwk = private;
    hsm_jwk.kty = KeyType::EcHsm;
    let err = keys
        .import_key("copy2", KeyImportInput::new(hsm_jwk).with_hsm(false))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[test]
fn test_jwk_base64url_members() {
    let mut jwk = JsonWebKey::new(KeyType::OctHsm);
    jwk.k = Some(vec![0xfb; 16]);
    let json = serde_json::to_string(&jwk).unwrap();
    assert!(json.contains("\"k\":\"-_v7-_v7-_v7-_v7-_v7-w\""));

    let parsed: JsonWebKey = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, jwk);
    assert!(matches!(parsed.to_material().unwrap(), KeyMaterial::Aes(_)));
}

#[test]
fn test_rotate_copies_operations_and_tags() {
    let (mut keys, clock) = vault();
    let first = keys
        .create_key(
            "rotating",
            KeyCreateInput::new(KeyType::Ec)
                .with_operations(&[KeyOperation::Sign])
                .with_tag("team", "core")
                .disabled(),
        )
        .unwrap();
    clock.shift(60).unwrap();

    let entity_id = first.entity_id();
    let second = keys.rotate_key(&entity_id).unwrap();
    assert_ne!(first, second);

    let rotated = keys.get(&second).unwrap();
    assert_eq!(rotated.operations(), &[KeyOperation::Sign]);
    assert_eq!(rotated.attributes().tags.get("team").map(String::as_str), Some("core"));
    assert!(rotated.attributes().enabled);
    assert_ne!(rotated.material(), keys.get(&first).unwrap().material());
    assert_eq!(keys.versions(&entity_id).unwrap().len(), 2);
}

#[test]
fn test_rotation_policy_lifecycle() {
    let (mut keys, clock) = vault();
    let first = keys.create_key("k1", KeyCreateInput::new(KeyType::Ec)).unwrap();
    let entity_id = first.entity_id();
    assert!(keys.rotation_policy(&entity_id).unwrap().is_none());

    let policy = RotationPolicy::new(
        entity_id.clone(),
        start(),
        Period::days(60),
        vec![KeyLifetimeAction::rotate(KeyLifetimeActionTrigger::time_after_create(Period::days(30)))],
    );
    let stored = keys.set_rotation_policy(policy.clone()).unwrap();
    assert_eq!(stored.created_on, start());

    // Updating keeps the creation time
    clock.shift(3600).unwrap();
    let mut updated = policy;
    updated.expiry_time = Period::days(90);
    let stored = keys.set_rotation_policy(updated).unwrap();
    assert_eq!(stored.created_on, start());
    assert_eq!(stored.updated_on, start() + Duration::hours(1));
    assert_eq!(stored.expiry_time, Period::days(90));

    // New versions take their expiry from the policy
    let second = keys.rotate_key(&entity_id).unwrap();
    let created = keys.get(&second).unwrap().attributes().created_on;
    assert_eq!(keys.get(&second).unwrap().attributes().expires_on, Some(created + Duration::days(90)));
}

#[test]
fn test_missed_rotations_create_versions() {
    let (mut keys, clock) = vault();
    let first = keys.create_key("k1", KeyCreateInput::new(KeyType::Ec)).unwrap();
    let entity_id = first.entity_id();
    let policy = RotationPolicy::new(
        entity_id.clone(),
        start(),
        Period::days(60),
        vec![KeyLifetimeAction::rotate(KeyLifetimeActionTrigger::time_after_create(Period::days(30)))],
    );
    keys.set_rotation_policy(policy).unwrap();

    clock.shift(65 * 86_400).unwrap();
    assert_eq!(keys.perform_missed_rotations().unwrap(), 2);

    let versions = keys.versions(&entity_id).unwrap();
    assert_eq!(versions.len(), 3);
    let latest = keys.latest(&entity_id).unwrap();
    assert_eq!(latest.attributes().created_on, start() + Duration::days(60));

    // A second pass has nothing left to do
    assert_eq!(keys.perform_missed_rotations().unwrap(), 0);
}

#[test]
fn test_invalid_rotation_policy_is_rejected() {
    let (mut keys, _) = vault();
    let first = keys.create_key("k1", KeyCreateInput::new(KeyType::Ec)).unwrap();
    let policy = RotationPolicy::new(
        first.entity_id(),
        start(),
        Period::days(60),
        vec![KeyLifetimeAction::rotate(KeyLifetimeActionTrigger::time_before_expiry(Period::days(30)))],
    );

    // The latest version has no expiry
    let err = keys.set_rotation_policy(policy).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidPolicy);
    assert!(keys.rotation_policy(&first.entity_id()).unwrap().is_none());
}

#[test]
fn test_delete_recover_purge_keys() {
    let (mut keys, _) = vault();
    let id = keys.create_key("k1", KeyCreateInput::new(KeyType::Ec)).unwrap();
    let entity_id = id.entity_id();

    keys.delete_key(&entity_id).unwrap();
    assert!(keys.get(&id).is_err());
    assert_eq!(keys.list_deleted().len(), 1);
    assert_eq!(keys.purge_key(&entity_id).unwrap_err().kind(), ErrorKind::IllegalState);

    keys.recover_key(&entity_id).unwrap();
    assert!(keys.get(&id).is_ok());
    assert_eq!(keys.list().len(), 1);
}
