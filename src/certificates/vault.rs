use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};

use crate::clock::VirtualClock;
use crate::entity::{
    generate_version, validate_name, CertificateEntityId, EntityId, VaultEntity, VersionedCertificateEntityId,
    VersionedKeyEntityId,
};
use crate::error::{error_codes, VaultError, VaultResult};
use crate::keys::{KeyMaterial, KeyType, KeyVault};
use crate::recovery::RecoveryPolicy;
use crate::secrets::SecretVault;
use crate::store::VersionedEntityStore;

use super::entity::{CertificateEntity, CertificateState};
use super::generator::{certificate_signing_request, issue_self_signed, validity_window};
use super::lifetime::LifetimeActionPolicy;
use super::package::{certificate_der_from_bytes, package_certificate, parse_bundle, CertificateDetails};
use super::policy::{parse_subject, CertAuthorityType, CertContentType, CertificatePolicy};

/// Request to import an existing certificate with its private key
#[derive(Debug, Clone, Default)]
pub struct CertificateImportInput {
    /// PEM text, or a PKCS#12 archive either raw or base64 encoded
    pub content: Vec<u8>,
    pub password: Option<String>,
    /// Expected policy; must agree with the certificate when given
    pub policy: Option<CertificatePolicy>,
    pub enabled: Option<bool>,
    pub tags: BTreeMap<String, String>,
}

impl CertificateImportInput {
    pub fn new(content: &[u8]) -> Self {
        Self {
            content: content.to_vec(),
            ..Default::default()
        }
    }

    pub fn with_password(mut self, password: &str) -> Self {
        self.password = Some(password.to_string());
        self
    }

    pub fn with_policy(mut self, policy: CertificatePolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn with_tag(mut self, key: &str, value: &str) -> Self {
        self.tags.insert(key.to_string(), value.to_string());
        self
    }
}

/// Key used for an issuance
enum IssuanceKey {
    Generate(KeyMaterial),
    Reuse(VersionedKeyEntityId),
}

/// Certificates of one vault plus their lifetime action policies
///
/// Every operation that touches the backing key or secret takes the
/// vault's key and secret stores explicitly.
#[derive(Debug, Clone)]
pub struct CertificateVault {
    store: VersionedEntityStore<CertificateEntity>,
    lifetime_policies: BTreeMap<String, LifetimeActionPolicy>,
}

impl CertificateVault {
    pub fn new(vault_uri: &str, recovery: RecoveryPolicy, clock: VirtualClock) -> Self {
        Self {
            store: VersionedEntityStore::new(vault_uri, recovery, clock),
            lifetime_policies: BTreeMap::new(),
        }
    }

    pub fn store(&self) -> &VersionedEntityStore<CertificateEntity> {
        &self.store
    }

    pub(crate) fn store_mut(&mut self) -> &mut VersionedEntityStore<CertificateEntity> {
        &mut self.store
    }

    pub fn entity_id(&self, name: &str) -> VaultResult<CertificateEntityId> {
        self.store.entity_id(name)
    }

    /// Create a certificate version, with its key and secret, from a policy
    ///
    /// Self-signed policies complete synchronously. Policies with an unknown
    /// issuer stop in the pending state with a key and a CSR.
    ///
    /// # Arguments
    ///
    /// * `keys` - Key store of the same vault
    /// * `secrets` - Secret store of the same vault
    /// * `name` - Shared name of the certificate, key and secret
    /// * `policy` - Issuance policy
    ///
    /// # Returns
    ///
    /// The id of the new certificate version
    pub fn create_certificate(
        &mut self,
        keys: &mut KeyVault,
        secrets: &mut SecretVault,
        name: &str,
        policy: CertificatePolicy,
    ) -> VaultResult<VersionedCertificateEntityId> {
        policy.validate()?;
        self.ensure_backing_available(keys, secrets, name)?;

        let now = self.store.clock().now();
        let material = KeyMaterial::generate(&policy.key_creation_input())?;
        let id = self.issue_version(keys, secrets, name, &policy, IssuanceKey::Generate(material), now)?;

        self.ensure_lifetime_policy(&id, policy.issuer, now);
        info!("Created certificate {} ({})", id, policy.issuer);
        Ok(id)
    }

    /// Import a certificate and its private key from PEM or PKCS#12
    pub fn import_certificate(
        &mut self,
        keys: &mut KeyVault,
        secrets: &mut SecretVault,
        name: &str,
        input: CertificateImportInput,
    ) -> VaultResult<VersionedCertificateEntityId> {
        let bundle = parse_bundle(&input.content, input.password.as_deref())?;
        let material = bundle.key.ok_or_else(|| {
            VaultError::invalid_argument_with_code(
                "content",
                "a bundle containing the private key",
                "certificate only",
                error_codes::INVALID_CERTIFICATE_DATA,
            )
        })?;
        let details = CertificateDetails::parse(&bundle.certificate_der)?;
        ensure_key_matches(&material, &details)?;

        let derived = derive_policy(&details, &material, bundle.content_type)?;
        let policy = match input.policy {
            Some(expected) => merge_policies(derived, &expected)?,
            None => derived,
        };
        policy.validate()?;
        self.ensure_backing_available(keys, secrets, name)?;

        let now = self.store.clock().now();
        let version = self.fresh_version(keys, secrets, name)?;
        let csr_der = certificate_signing_request(&policy, &material)?;
        let value = package_certificate(
            policy.content_type,
            &bundle.certificate_der,
            policy.exportable.then_some(&material),
        )?;
        let window = (Some(details.not_before), Some(details.not_after));

        let key_id = keys.import_managed_material(name, &version, now, policy.key_type, material, window)?;
        let secret_id =
            secrets.create_managed_at(name, &version, now, value, policy.content_type.mime_type(), window)?;
        let issuer = policy.issuer;
        let id = self.store.create_version_at(name, Some(&version), now, |id, mut attributes| {
            attributes.not_before = window.0;
            attributes.expires_on = window.1;
            attributes.enabled = input.enabled.unwrap_or(true);
            attributes.tags = input.tags;
            Ok(CertificateEntity::completed(
                id,
                attributes,
                policy,
                key_id,
                secret_id,
                bundle.certificate_der,
                Some(csr_der),
            ))
        })?;

        self.ensure_lifetime_policy(&id, issuer, now);
        info!("Imported certificate {} (serial {})", id, details.serial_number_hex());
        Ok(id)
    }

    /// Complete a pending certificate with an externally signed certificate
    ///
    /// The merged certificate must carry the public key of the pending key.
    pub fn merge_certificate(
        &mut self,
        keys: &mut KeyVault,
        secrets: &mut SecretVault,
        name: &str,
        content: &[u8],
    ) -> VaultResult<VersionedCertificateEntityId> {
        let entity_id = self.store.entity_id(name)?;
        let pending = self.store.latest_entity(&entity_id)?.clone();
        if pending.state() != CertificateState::Pending {
            return Err(VaultError::invalid_operation(
                "merge certificate",
                &format!("certificate {} is not pending", entity_id),
                error_codes::OPERATION_NOT_ALLOWED,
            ));
        }

        let certificate_der = certificate_der_from_bytes(content)?;
        let details = CertificateDetails::parse(&certificate_der)?;
        let material = keys.get(pending.key_id())?.material();
        ensure_key_matches(material, &details)?;

        let policy = pending.policy();
        let value = package_certificate(
            policy.content_type,
            &certificate_der,
            policy.exportable.then_some(material),
        )?;
        let now = self.store.clock().now();
        let window = (Some(details.not_before), Some(details.not_after));
        let secret_id = secrets.create_managed_at(
            name,
            pending.id().version(),
            now,
            value,
            policy.content_type.mime_type(),
            window,
        )?;

        self.store.update(pending.id(), |certificate| {
            certificate.set_issued(secret_id, certificate_der, None);
            let attributes = certificate.attributes_mut();
            attributes.not_before = window.0;
            attributes.expires_on = window.1;
            Ok(())
        })?;
        info!("Merged certificate {}", pending.id());
        Ok(pending.id().clone())
    }

    pub fn get(&self, id: &VersionedCertificateEntityId) -> VaultResult<&CertificateEntity> {
        self.store.get(id)
    }

    pub fn get_deleted(&self, id: &VersionedCertificateEntityId) -> VaultResult<&CertificateEntity> {
        self.store.get_deleted(id)
    }

    pub fn latest(&self, id: &CertificateEntityId) -> VaultResult<&CertificateEntity> {
        self.store.latest_entity(id)
    }

    pub fn versions(&self, id: &CertificateEntityId) -> VaultResult<Vec<String>> {
        self.store.versions(id)
    }

    pub fn list(&self) -> Vec<&CertificateEntity> {
        self.store.list_latest_non_managed()
    }

    pub fn list_deleted(&self) -> Vec<&CertificateEntity> {
        self.store.list_deleted_latest_non_managed()
    }

    /// Soft-delete a certificate together with its key and secret
    pub fn delete_certificate(
        &mut self,
        keys: &mut KeyVault,
        secrets: &mut SecretVault,
        id: &CertificateEntityId,
    ) -> VaultResult<()> {
        self.store.delete(id)?;
        if keys.store().contains_name(id.name()) {
            let key_id = keys.entity_id(id.name())?;
            keys.store_mut().delete(&key_id)?;
        }
        if secrets.store().contains_name(id.name()) {
            let secret_id = secrets.entity_id(id.name())?;
            secrets.store_mut().delete(&secret_id)?;
        }
        Ok(())
    }

    /// Recover a deleted certificate together with its key and secret
    pub fn recover_certificate(
        &mut self,
        keys: &mut KeyVault,
        secrets: &mut SecretVault,
        id: &CertificateEntityId,
    ) -> VaultResult<()> {
        self.store.recover(id)?;
        if keys.store().contains_deleted_name(id.name()) {
            let key_id = keys.entity_id(id.name())?;
            keys.store_mut().recover(&key_id)?;
        }
        if secrets.store().contains_deleted_name(id.name()) {
            let secret_id = secrets.entity_id(id.name())?;
            secrets.store_mut().recover(&secret_id)?;
        }
        Ok(())
    }

    /// Purge a deleted certificate together with its key, secret and lifetime policy
    pub fn purge_certificate(
        &mut self,
        keys: &mut KeyVault,
        secrets: &mut SecretVault,
        id: &CertificateEntityId,
    ) -> VaultResult<()> {
        self.store.purge(id)?;
        if keys.store().contains_deleted_name(id.name()) {
            let key_id = keys.entity_id(id.name())?;
            keys.store_mut().purge(&key_id)?;
        }
        if secrets.store().contains_deleted_name(id.name()) {
            let secret_id = secrets.entity_id(id.name())?;
            secrets.store_mut().purge(&secret_id)?;
        }
        self.lifetime_policies.remove(id.name());
        Ok(())
    }

    pub fn set_enabled(&mut self, id: &VersionedCertificateEntityId, enabled: bool) -> VaultResult<()> {
        self.store.set_enabled(id, enabled)
    }

    pub fn add_tags(&mut self, id: &VersionedCertificateEntityId, tags: &BTreeMap<String, String>) -> VaultResult<()> {
        self.store.add_tags(id, tags)
    }

    pub fn clear_tags(&mut self, id: &VersionedCertificateEntityId) -> VaultResult<()> {
        self.store.clear_tags(id)
    }

    /// Replace the issuance policy used by future renewals
    pub fn set_issuance_policy(&mut self, id: &CertificateEntityId, policy: CertificatePolicy) -> VaultResult<()> {
        policy.validate()?;
        if let Some(lifetime) = self.lifetime_policies.get(id.name()) {
            lifetime.validate(policy.validity_months, policy.issuer)?;
        }
        let latest = self.store.latest_version(id)?;
        self.store.update(&latest, |certificate| {
            certificate.set_policy(policy);
            Ok(())
        })
    }

    /// Lifetime action policy of an active certificate, if one is set
    pub fn lifetime_action_policy(&self, id: &CertificateEntityId) -> VaultResult<Option<&LifetimeActionPolicy>> {
        if !self.store.contains_name(id.name()) {
            return Err(VaultError::not_found("certificate", &id.to_string()));
        }
        Ok(self.lifetime_policies.get(id.name()))
    }

    /// Set or update the lifetime action policy of a certificate
    ///
    /// # Returns
    ///
    /// The stored policy
    pub fn set_lifetime_action_policy(&mut self, mut policy: LifetimeActionPolicy) -> VaultResult<LifetimeActionPolicy> {
        let latest = self.store.latest_entity(&policy.id)?;
        let issuance = latest.policy();
        policy.validate(issuance.validity_months, issuance.issuer)?;

        let now = self.store.clock().now();
        let name = policy.id.name().to_string();
        if let Some(existing) = self.lifetime_policies.get_mut(&name) {
            existing.update_from(&policy, now);
            return Ok(existing.clone());
        }
        policy.created_on = now;
        policy.updated_on = now;
        self.lifetime_policies.insert(name, policy.clone());
        Ok(policy)
    }

    pub(crate) fn restore_lifetime_policy(&mut self, policy: LifetimeActionPolicy) {
        self.lifetime_policies.insert(policy.id.name().to_string(), policy);
    }

    /// Renew every completed certificate whose auto-renew trigger fired before now
    ///
    /// # Returns
    ///
    /// Number of certificate versions created
    pub fn perform_missed_renewals(&mut self, keys: &mut KeyVault, secrets: &mut SecretVault) -> VaultResult<usize> {
        let now = self.store.clock().now();
        let policies: Vec<LifetimeActionPolicy> = self
            .lifetime_policies
            .values()
            .filter(|policy| policy.is_auto_renew())
            .cloned()
            .collect();

        let mut renewals = 0;
        for policy in policies {
            let latest = match self.store.latest_entity(&policy.id) {
                Ok(latest) if latest.state() == CertificateState::Completed => latest,
                _ => continue,
            };
            let start = latest.attributes().not_before.unwrap_or(latest.attributes().created_on);
            let months = latest.policy().validity_months;
            for instant in policy.missed_renewals(start, months, now)? {
                self.renew_at(keys, secrets, &policy.id, instant)?;
                renewals += 1;
            }
        }
        if renewals > 0 {
            info!("Performed {} missed certificate renewals", renewals);
        }
        Ok(renewals)
    }

    /// Re-issue the X.509 material of every active self-signed certificate
    ///
    /// Versions keep their key and validity window; the linked secrets get
    /// the new package. Deleted certificates are skipped.
    pub fn regenerate_certificates(&mut self, keys: &KeyVault, secrets: &mut SecretVault) -> VaultResult<usize> {
        for name in self.store.deleted().names() {
            warn!("Skipping regeneration of deleted certificate {}", name);
        }

        let versions: Vec<CertificateEntity> = self
            .store
            .active()
            .names()
            .filter_map(|name| self.store.entity_id(name).ok())
            .filter_map(|id| self.store.chain(&id).ok().map(|chain| chain.to_vec()))
            .flatten()
            .collect();

        let mut regenerated = 0;
        for mut certificate in versions {
            let secret_id = match certificate.secret_id() {
                Some(secret_id) if certificate.state() == CertificateState::Completed => secret_id.clone(),
                _ => continue,
            };
            if certificate.policy().issuer != CertAuthorityType::SelfSigned {
                debug!("Certificate {} has an external issuer, not regenerated", certificate.id());
                continue;
            }

            let material = keys.get(certificate.key_id())?.material();
            let attributes = certificate.attributes();
            let start = attributes.not_before.unwrap_or(attributes.created_on);
            let issued = issue_self_signed(certificate.policy(), material, start)?;
            let value = package_certificate(
                certificate.policy().content_type,
                &issued.certificate_der,
                certificate.policy().exportable.then_some(material),
            )?;

            secrets.replace_value(&secret_id, value)?;
            certificate.set_issued(secret_id, issued.certificate_der, Some(issued.csr_der));
            debug!("Regenerated certificate {}", certificate.id());
            self.store.replace(certificate)?;
            regenerated += 1;
        }
        Ok(regenerated)
    }

    fn renew_at(
        &mut self,
        keys: &mut KeyVault,
        secrets: &mut SecretVault,
        id: &CertificateEntityId,
        instant: DateTime<Utc>,
    ) -> VaultResult<VersionedCertificateEntityId> {
        let latest = self.store.latest_entity(id)?;
        let policy = latest.policy().clone();
        let key = if policy.reuse_key_on_renewal {
            IssuanceKey::Reuse(latest.key_id().clone())
        } else {
            IssuanceKey::Generate(KeyMaterial::generate(&policy.key_creation_input())?)
        };

        let renewed = self.issue_version(keys, secrets, id.name(), &policy, key, instant)?;
        info!("Renewed certificate {} as version {}", id, renewed.version());
        Ok(renewed)
    }

    /// Store the key, secret and certificate of one issuance under a shared token
    fn issue_version(
        &mut self,
        keys: &mut KeyVault,
        secrets: &mut SecretVault,
        name: &str,
        policy: &CertificatePolicy,
        key: IssuanceKey,
        created_on: DateTime<Utc>,
    ) -> VaultResult<VersionedCertificateEntityId> {
        let version = self.fresh_version(keys, secrets, name)?;
        let (start, end) = validity_window(created_on, policy.validity_months)?;
        let window = (Some(start), Some(end));

        let material = match &key {
            IssuanceKey::Generate(material) => material.clone(),
            IssuanceKey::Reuse(key_id) => keys.get(key_id)?.material().clone(),
        };

        // Everything that can fail on bad input happens before the first write
        let issued = match policy.issuer {
            CertAuthorityType::SelfSigned => {
                let issued = issue_self_signed(policy, &material, created_on)?;
                let value = package_certificate(
                    policy.content_type,
                    &issued.certificate_der,
                    policy.exportable.then_some(&material),
                )?;
                Some((issued, value))
            }
            CertAuthorityType::Unknown => None,
        };
        let csr_der = match &issued {
            Some((issued, _)) => issued.csr_der.clone(),
            None => certificate_signing_request(policy, &material)?,
        };

        let key_id = match key {
            IssuanceKey::Generate(material) => {
                keys.import_managed_material(name, &version, created_on, policy.key_type, material, window)?
            }
            IssuanceKey::Reuse(key_id) => {
                keys.store_mut().update(&key_id, |key| {
                    key.attributes_mut().expires_on = Some(end);
                    Ok(())
                })?;
                key_id
            }
        };

        let policy = policy.clone();
        match issued {
            Some((issued, value)) => {
                let secret_id = secrets.create_managed_at(
                    name,
                    &version,
                    created_on,
                    value,
                    policy.content_type.mime_type(),
                    window,
                )?;
                self.store.create_version_at(name, Some(&version), created_on, |id, mut attributes| {
                    attributes.not_before = window.0;
                    attributes.expires_on = window.1;
                    Ok(CertificateEntity::completed(
                        id,
                        attributes,
                        policy,
                        key_id,
                        secret_id,
                        issued.certificate_der,
                        Some(csr_der),
                    ))
                })
            }
            None => self.store.create_version_at(name, Some(&version), created_on, |id, attributes| {
                Ok(CertificateEntity::pending(id, attributes, policy, key_id, csr_der))
            }),
        }
    }

    /// Reject names whose key or secret exists outside of a certificate, or is deleted
    fn ensure_backing_available(&mut self, keys: &mut KeyVault, secrets: &mut SecretVault, name: &str) -> VaultResult<()> {
        validate_name(name)?;
        self.store.purge_expired();
        keys.store_mut().purge_expired();
        secrets.store_mut().purge_expired();

        if self.store.contains_deleted_name(name) {
            return Err(VaultError::deleted_entity_exists("certificate", &self.entity_id(name)?.to_string()));
        }
        let key_id = keys.entity_id(name)?;
        if keys.store().contains_deleted_name(name) {
            return Err(VaultError::deleted_entity_exists("key", &key_id.to_string()));
        }
        if let Ok(latest) = keys.latest(&key_id) {
            if !latest.attributes().managed {
                return Err(VaultError::already_exists("key", &key_id.to_string()));
            }
        }
        let secret_id = secrets.entity_id(name)?;
        if secrets.store().contains_deleted_name(name) {
            return Err(VaultError::deleted_entity_exists("secret", &secret_id.to_string()));
        }
        if let Ok(latest) = secrets.latest(&secret_id) {
            if !latest.attributes().managed {
                return Err(VaultError::already_exists("secret", &secret_id.to_string()));
            }
        }
        Ok(())
    }

    /// Version token unused by the key, secret and certificate chains of `name`
    fn fresh_version(&self, keys: &KeyVault, secrets: &SecretVault, name: &str) -> VaultResult<String> {
        let vault = self.store.vault_uri();
        loop {
            let version = generate_version();
            let taken = self.store.contains_entity(&EntityId::new(vault, name)?.with_version(&version))
                || keys.store().contains_entity(&EntityId::new(vault, name)?.with_version(&version))
                || secrets.store().contains_entity(&EntityId::new(vault, name)?.with_version(&version));
            if !taken {
                return Ok(version);
            }
        }
    }

    fn ensure_lifetime_policy(&mut self, id: &VersionedCertificateEntityId, issuer: CertAuthorityType, now: DateTime<Utc>) {
        self.lifetime_policies
            .entry(id.name().to_string())
            .or_insert_with(|| LifetimeActionPolicy::default_for(id.entity_id(), issuer, now));
    }
}

fn ensure_key_matches(material: &KeyMaterial, details: &CertificateDetails) -> VaultResult<()> {
    if material.public_key_der()? != details.public_key_der {
        return Err(VaultError::invalid_argument_with_code(
            "certificate",
            "a certificate for the stored private key",
            "a certificate with another public key",
            error_codes::INVALID_CERTIFICATE_DATA,
        ));
    }
    Ok(())
}

/// Policy describing an imported certificate
fn derive_policy(
    details: &CertificateDetails,
    material: &KeyMaterial,
    content_type: CertContentType,
) -> VaultResult<CertificatePolicy> {
    let mut policy = CertificatePolicy::new(&details.subject);
    policy.dns_names = details.dns_names.clone();
    policy.emails = details.emails.clone();
    policy.upns = details.upns.clone();
    policy.validity_months = details.validity_months()?;
    policy.content_type = content_type;
    policy.key_usage = details.key_usage.clone();
    policy.extended_key_usage = details.extended_key_usage.clone();
    match material {
        KeyMaterial::Rsa(key) => {
            policy.key_type = KeyType::Rsa;
            policy.key_size = Some(key.key_size());
            policy.key_curve = None;
        }
        KeyMaterial::Ec(key) => {
            policy.key_type = KeyType::Ec;
            policy.key_size = None;
            policy.key_curve = Some(key.curve());
        }
        KeyMaterial::Aes(_) => {
            return Err(VaultError::invalid_argument_with_code(
                "content",
                "an RSA or EC private key",
                "a symmetric key",
                error_codes::INVALID_CERTIFICATE_DATA,
            ))
        }
    }
    Ok(policy)
}

/// Check an expected policy against the derived one and keep the caller's packaging choices
fn merge_policies(derived: CertificatePolicy, expected: &CertificatePolicy) -> VaultResult<CertificatePolicy> {
    let mismatch = |field: &str, expected: &str, actual: &str| {
        Err(VaultError::invalid_argument_with_code(
            field,
            expected,
            actual,
            error_codes::INVALID_CERTIFICATE_DATA,
        ))
    };

    if parse_subject(&expected.subject)? != parse_subject(&derived.subject)? {
        return mismatch("subject", &expected.subject, &derived.subject);
    }
    if expected.key_type.is_rsa() != derived.key_type.is_rsa() {
        return mismatch("key_type", expected.key_type.as_str(), derived.key_type.as_str());
    }
    if expected.key_type.is_ec() && expected.key_curve.is_some() && expected.key_curve != derived.key_curve {
        return mismatch(
            "key_curve",
            &format!("{:?}", expected.key_curve),
            &format!("{:?}", derived.key_curve),
        );
    }
    if expected.key_type.is_rsa() && expected.key_size.is_some() && expected.key_size != derived.key_size {
        return mismatch(
            "key_size",
            &format!("{:?}", expected.key_size),
            &format!("{:?}", derived.key_size),
        );
    }

    Ok(CertificatePolicy {
        content_type: expected.content_type,
        key_type: expected.key_type,
        exportable: expected.exportable,
        reuse_key_on_renewal: expected.reuse_key_on_renewal,
        ..derived
    })
}
