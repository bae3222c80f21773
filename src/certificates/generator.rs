use chrono::{DateTime, Utc};
use log::debug;
use rand::RngCore;
use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose, Ia5String, IsCa,
    KeyPair, OtherNameValue, SanType, SerialNumber,
};
use time::OffsetDateTime;

use crate::error::{error_codes, VaultError, VaultResult};
use crate::keys::{KeyCurve, KeyMaterial};
use crate::rotation::Period;

use super::policy::{parse_oid, parse_subject, CertificatePolicy};

/// Serial numbers carry 160 random bits
const SERIAL_NUMBER_BYTES: usize = 20;
const SECONDS_PER_DAY: i64 = 86_400;

/// Microsoft user principal name, stored as an `otherName` SAN
pub const UPN_OID: [u64; 10] = [1, 3, 6, 1, 4, 1, 311, 20, 2, 3];

/// DER outputs of one issuance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedCertificate {
    pub certificate_der: Vec<u8>,
    pub csr_der: Vec<u8>,
}

/// Validity window of a certificate starting at `start`
pub fn validity_window(start: DateTime<Utc>, validity_months: u32) -> VaultResult<(DateTime<Utc>, DateTime<Utc>)> {
    Ok((start, Period::months(validity_months).add_to(start)?))
}

/// Load key material into an rcgen key pair able to sign certificates
///
/// RSA keys sign with SHA-256, P-256 with SHA-256 and P-384 with SHA-384.
pub fn signing_key_pair(material: &KeyMaterial) -> VaultResult<KeyPair> {
    let algorithm = match material {
        KeyMaterial::Rsa(_) => &rcgen::PKCS_RSA_SHA256,
        KeyMaterial::Ec(key) if key.curve() == KeyCurve::P256 => &rcgen::PKCS_ECDSA_P256_SHA256,
        KeyMaterial::Ec(key) if key.curve() == KeyCurve::P384 => &rcgen::PKCS_ECDSA_P384_SHA384,
        KeyMaterial::Ec(key) => {
            return Err(VaultError::invalid_argument_with_code(
                "key_curve",
                "P-256 or P-384 for certificates",
                key.curve().as_str(),
                error_codes::INVALID_CERTIFICATE_POLICY,
            ))
        }
        KeyMaterial::Aes(_) => {
            return Err(VaultError::invalid_argument_with_code(
                "key_type",
                "an RSA or EC key for certificates",
                "oct-HSM",
                error_codes::INVALID_CERTIFICATE_POLICY,
            ))
        }
    };
    let pem = material.to_pkcs8_pem()?;
    Ok(KeyPair::from_pkcs8_pem_and_sign_algo(&pem, algorithm)?)
}

/// Issue a self-signed certificate and a CSR for `policy`
///
/// # Arguments
///
/// * `policy` - Subject, SANs, usages and validity
/// * `material` - The certificate's own key
/// * `validity_start` - Start of validity; the X.509 window is truncated to whole days
pub fn issue_self_signed(
    policy: &CertificatePolicy,
    material: &KeyMaterial,
    validity_start: DateTime<Utc>,
) -> VaultResult<IssuedCertificate> {
    let key_pair = signing_key_pair(material)?;
    let (start, end) = validity_window(validity_start, policy.validity_months)?;

    let csr_der = request_params(policy)?.serialize_request(&key_pair)?.der().to_vec();

    let mut params = certificate_params(policy)?;
    params.not_before = to_offset_date_time(truncate_to_day(start))?;
    params.not_after = to_offset_date_time(truncate_to_day(end))?;
    let certificate = params.self_signed(&key_pair)?;
    debug!("Issued self-signed certificate for {}", policy.subject);

    Ok(IssuedCertificate {
        certificate_der: certificate.der().to_vec(),
        csr_der,
    })
}

/// CSR for a certificate that an external issuer will sign
pub fn certificate_signing_request(policy: &CertificatePolicy, material: &KeyMaterial) -> VaultResult<Vec<u8>> {
    let key_pair = signing_key_pair(material)?;
    Ok(request_params(policy)?.serialize_request(&key_pair)?.der().to_vec())
}

// Serial number and basic constraints are set by the issuer, never requested
fn certificate_params(policy: &CertificatePolicy) -> VaultResult<CertificateParams> {
    let mut params = request_params(policy)?;
    params.serial_number = Some(random_serial());
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    Ok(params)
}

/// Subject, SANs and usages; usages travel in the extension request
fn request_params(policy: &CertificatePolicy) -> VaultResult<CertificateParams> {
    let mut params = CertificateParams::default();
    params.distinguished_name = distinguished_name(&policy.subject)?;
    params.subject_alt_names = subject_alt_names(policy)?;
    params.key_usages = policy.key_usage.iter().map(|usage| usage.to_rcgen()).collect();
    params.extended_key_usages = policy
        .extended_key_usage
        .iter()
        .map(|oid| parse_oid(oid).map(ExtendedKeyUsagePurpose::Other))
        .collect::<VaultResult<Vec<_>>>()?;
    Ok(params)
}

fn distinguished_name(subject: &str) -> VaultResult<DistinguishedName> {
    let mut name = DistinguishedName::new();
    for (attribute, value) in parse_subject(subject)? {
        let dn_type = match attribute.as_str() {
            "CN" => DnType::CommonName,
            "O" => DnType::OrganizationName,
            "OU" => DnType::OrganizationalUnitName,
            "C" => DnType::CountryName,
            "ST" => DnType::StateOrProvinceName,
            _ => DnType::LocalityName,
        };
        name.push(dn_type, value);
    }
    Ok(name)
}

// DNS names first, then emails, then UPNs
fn subject_alt_names(policy: &CertificatePolicy) -> VaultResult<Vec<SanType>> {
    let ia5 = |parameter: &str, value: &str| {
        Ia5String::try_from(value).map_err(|e| {
            VaultError::invalid_argument_with_code(
                parameter,
                &format!("an IA5 string ({})", e),
                value,
                error_codes::INVALID_CERTIFICATE_POLICY,
            )
        })
    };

    let mut names = Vec::new();
    for dns in &policy.dns_names {
        names.push(SanType::DnsName(ia5("dns_names", dns)?));
    }
    for email in &policy.emails {
        names.push(SanType::Rfc822Name(ia5("emails", email)?));
    }
    for upn in &policy.upns {
        names.push(SanType::OtherName((
            UPN_OID.to_vec(),
            OtherNameValue::Utf8String(upn.clone()),
        )));
    }
    Ok(names)
}

fn random_serial() -> SerialNumber {
    let mut bytes = [0u8; SERIAL_NUMBER_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    // Positive and without a leading zero byte
    bytes[0] = (bytes[0] & 0x7f).max(1);
    SerialNumber::from_slice(&bytes)
}

fn truncate_to_day(time: DateTime<Utc>) -> i64 {
    let seconds = time.timestamp();
    seconds - seconds.rem_euclid(SECONDS_PER_DAY)
}

fn to_offset_date_time(unix_seconds: i64) -> VaultResult<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp(unix_seconds).map_err(|e| {
        VaultError::crypto_failure(
            "issue certificate",
            &format!("validity date out of range: {}", e),
            error_codes::CERTIFICATE_GENERATION_FAILED,
        )
    })
}
