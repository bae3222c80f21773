use serde::{Deserialize, Serialize};

use crate::entity::{
    CertificateKind, EntityAttributes, VaultEntity, VersionedCertificateEntityId, VersionedKeyEntityId,
    VersionedSecretEntityId,
};
use crate::error::VaultResult;

use super::package::{thumbprint, CertificateDetails};
use super::policy::CertificatePolicy;

/// Issuance progress of a certificate version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CertificateState {
    /// Key and CSR exist; waiting for a merged certificate
    Pending,
    Completed,
}

/// One version of a certificate
///
/// The key and secret backing the version share its version token, except
/// for renewals that reuse an older key version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateEntity {
    id: VersionedCertificateEntityId,
    attributes: EntityAttributes,
    policy: CertificatePolicy,
    key_id: VersionedKeyEntityId,
    secret_id: Option<VersionedSecretEntityId>,
    certificate_der: Option<Vec<u8>>,
    csr_der: Option<Vec<u8>>,
    state: CertificateState,
}

impl CertificateEntity {
    /// Completed version holding an issued certificate
    pub(crate) fn completed(
        id: VersionedCertificateEntityId,
        attributes: EntityAttributes,
        policy: CertificatePolicy,
        key_id: VersionedKeyEntityId,
        secret_id: VersionedSecretEntityId,
        certificate_der: Vec<u8>,
        csr_der: Option<Vec<u8>>,
    ) -> Self {
        Self {
            id,
            attributes,
            policy,
            key_id,
            secret_id: Some(secret_id),
            certificate_der: Some(certificate_der),
            csr_der,
            state: CertificateState::Completed,
        }
    }

    /// Pending version waiting for an externally signed certificate
    pub(crate) fn pending(
        id: VersionedCertificateEntityId,
        attributes: EntityAttributes,
        policy: CertificatePolicy,
        key_id: VersionedKeyEntityId,
        csr_der: Vec<u8>,
    ) -> Self {
        Self {
            id,
            attributes,
            policy,
            key_id,
            secret_id: None,
            certificate_der: None,
            csr_der: Some(csr_der),
            state: CertificateState::Pending,
        }
    }

    pub fn state(&self) -> CertificateState {
        self.state
    }

    pub fn policy(&self) -> &CertificatePolicy {
        &self.policy
    }

    /// Key version holding the certificate's private key
    pub fn key_id(&self) -> &VersionedKeyEntityId {
        &self.key_id
    }

    /// Secret version holding the packaged certificate, once completed
    pub fn secret_id(&self) -> Option<&VersionedSecretEntityId> {
        self.secret_id.as_ref()
    }

    pub fn certificate_der(&self) -> Option<&[u8]> {
        self.certificate_der.as_deref()
    }

    pub fn csr_der(&self) -> Option<&[u8]> {
        self.csr_der.as_deref()
    }

    /// SHA-1 of the certificate DER
    pub fn thumbprint(&self) -> Option<Vec<u8>> {
        self.certificate_der.as_deref().map(thumbprint)
    }

    pub fn thumbprint_hex(&self) -> Option<String> {
        self.thumbprint().map(hex::encode_upper)
    }

    /// Parsed view of the issued certificate
    pub fn details(&self) -> Option<VaultResult<CertificateDetails>> {
        self.certificate_der.as_deref().map(CertificateDetails::parse)
    }

    pub(crate) fn set_policy(&mut self, policy: CertificatePolicy) {
        self.policy = policy;
    }

    pub(crate) fn set_issued(
        &mut self,
        secret_id: VersionedSecretEntityId,
        certificate_der: Vec<u8>,
        csr_der: Option<Vec<u8>>,
    ) {
        self.secret_id = Some(secret_id);
        self.certificate_der = Some(certificate_der);
        if csr_der.is_some() {
            self.csr_der = csr_der;
        }
        self.state = CertificateState::Completed;
    }
}

impl VaultEntity for CertificateEntity {
    type Kind = CertificateKind;

    fn id(&self) -> &VersionedCertificateEntityId {
        &self.id
    }

    fn attributes(&self) -> &EntityAttributes {
        &self.attributes
    }

    fn attributes_mut(&mut self) -> &mut EntityAttributes {
        &mut self.attributes
    }
}
