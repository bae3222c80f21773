use chrono::{DateTime, Datelike, TimeZone, Utc};
use p12_keystore::{Certificate as Pkcs12Certificate, KeyStore, KeyStoreEntry, PrivateKeyChain};
use sha1::{Digest, Sha1};
use x509_parser::der_parser::asn1_rs::{Error as Asn1Error, FromDer, TaggedExplicit, Utf8String};
use x509_parser::extensions::GeneralName;
use x509_parser::pem::Pem;

use crate::error::{error_codes, VaultError, VaultResult};
use crate::keys::KeyMaterial;
use crate::rotation::Period;

use super::generator::UPN_OID;
use super::policy::{CertContentType, KeyUsage, MAX_VALIDITY_MONTHS};

/// Alias of the single entry in generated PKCS#12 archives
pub const PKCS12_ALIAS: &str = "certificate";
/// Password of generated PKCS#12 archives
pub const PKCS12_PASSWORD: &str = "";

const PEM_BEGIN: &[u8] = b"-----BEGIN";
const PEM_LINE_LENGTH: usize = 64;

/// A certificate with its private key, as found in an import bundle
#[derive(Debug, Clone)]
pub struct CertificateBundle {
    pub certificate_der: Vec<u8>,
    pub key: Option<KeyMaterial>,
    pub content_type: CertContentType,
}

/// Fields read back from an X.509 certificate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateDetails {
    pub subject: String,
    pub dns_names: Vec<String>,
    pub emails: Vec<String>,
    pub upns: Vec<String>,
    pub key_usage: Vec<KeyUsage>,
    pub extended_key_usage: Vec<String>,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub serial_number: Vec<u8>,
    /// SubjectPublicKeyInfo DER
    pub public_key_der: Vec<u8>,
    pub is_ca: bool,
}

impl CertificateDetails {
    /// Parse a DER certificate
    pub fn parse(der: &[u8]) -> VaultResult<Self> {
        let (_, certificate) = x509_parser::parse_x509_certificate(der)
            .map_err(|e| parsing_error(&format!("invalid X.509 certificate: {}", e)))?;

        let mut details = CertificateDetails {
            subject: certificate.subject().to_string(),
            dns_names: Vec::new(),
            emails: Vec::new(),
            upns: Vec::new(),
            key_usage: Vec::new(),
            extended_key_usage: Vec::new(),
            not_before: timestamp(certificate.validity().not_before.timestamp())?,
            not_after: timestamp(certificate.validity().not_after.timestamp())?,
            serial_number: certificate.raw_serial().to_vec(),
            public_key_der: certificate.public_key().raw.to_vec(),
            is_ca: false,
        };

        let extension_error = |e: x509_parser::error::X509Error| parsing_error(&format!("invalid extension: {}", e));
        if let Some(names) = certificate.subject_alternative_name().map_err(extension_error)? {
            for name in &names.value.general_names {
                match name {
                    GeneralName::DNSName(dns) => details.dns_names.push(dns.to_string()),
                    GeneralName::RFC822Name(email) => details.emails.push(email.to_string()),
                    GeneralName::OtherName(oid, value) if oid_matches(&oid.to_id_string(), &UPN_OID) => {
                        if let Some(upn) = decode_upn(value) {
                            details.upns.push(upn);
                        }
                    }
                    _ => {}
                }
            }
        }
        if let Some(usage) = certificate.key_usage().map_err(extension_error)? {
            details.key_usage = KeyUsage::from_flags(usage.value.flags);
        }
        if let Some(usage) = certificate.extended_key_usage().map_err(extension_error)? {
            let usage = usage.value;
            let known = [
                (usage.any, "2.5.29.37.0"),
                (usage.server_auth, "1.3.6.1.5.5.7.3.1"),
                (usage.client_auth, "1.3.6.1.5.5.7.3.2"),
                (usage.code_signing, "1.3.6.1.5.5.7.3.3"),
                (usage.email_protection, "1.3.6.1.5.5.7.3.4"),
                (usage.time_stamping, "1.3.6.1.5.5.7.3.8"),
                (usage.ocsp_signing, "1.3.6.1.5.5.7.3.9"),
            ];
            details.extended_key_usage = known
                .iter()
                .filter(|(present, _)| *present)
                .map(|(_, oid)| oid.to_string())
                .chain(usage.other.iter().map(|oid| oid.to_id_string()))
                .collect();
        }
        if let Some(constraints) = certificate.basic_constraints().map_err(extension_error)? {
            details.is_ca = constraints.value.ca;
        }
        Ok(details)
    }

    /// Whole months covered by the validity window, at least one
    pub fn validity_months(&self) -> VaultResult<u32> {
        let years = self.not_after.year() - self.not_before.year();
        let months = years * 12 + self.not_after.month() as i32 - self.not_before.month() as i32;
        let mut months = months.clamp(1, MAX_VALIDITY_MONTHS as i32) as u32;
        if months > 1 && Period::months(months).add_to(self.not_before)? > self.not_after {
            months -= 1;
        }
        Ok(months)
    }

    /// Upper case hex of the serial number
    pub fn serial_number_hex(&self) -> String {
        hex::encode_upper(&self.serial_number)
    }
}

/// SHA-1 digest of a DER certificate
pub fn thumbprint(certificate_der: &[u8]) -> Vec<u8> {
    Sha1::digest(certificate_der).to_vec()
}

/// Package a certificate, and optionally its private key, as a secret value
///
/// PEM values hold a `PRIVATE KEY` block followed by the `CERTIFICATE`
/// block. PKCS#12 values are the base64 of an archive with one entry
/// under the alias `certificate` and an empty password.
pub fn package_certificate(
    content_type: CertContentType,
    certificate_der: &[u8],
    key: Option<&KeyMaterial>,
) -> VaultResult<String> {
    match content_type {
        CertContentType::Pem => {
            let mut value = String::new();
            if let Some(key) = key {
                value.push_str(&key.to_pkcs8_pem()?);
            }
            value.push_str(&pem_block("CERTIFICATE", certificate_der));
            Ok(value)
        }
        CertContentType::Pkcs12 => {
            let certificate = Pkcs12Certificate::from_der(certificate_der)?;
            let entry = match key {
                Some(key) => KeyStoreEntry::PrivateKeyChain(PrivateKeyChain::new(
                    key.to_pkcs8_der()?,
                    thumbprint(certificate_der),
                    [certificate],
                )),
                None => KeyStoreEntry::Certificate(certificate),
            };
            let mut store = KeyStore::new();
            store.add_entry(PKCS12_ALIAS, entry);
            let archive = store.writer(PKCS12_PASSWORD).write()?;
            Ok(base64::encode(archive))
        }
    }
}

/// Parse an import bundle, detecting PEM by its leading `-----BEGIN`
///
/// Anything else is read as PKCS#12, either raw or base64 encoded.
pub fn parse_bundle(content: &[u8], password: Option<&str>) -> VaultResult<CertificateBundle> {
    if is_pem(content) {
        parse_pem_bundle(content)
    } else {
        parse_pkcs12_bundle(content, password.unwrap_or(PKCS12_PASSWORD))
    }
}

/// Read a certificate given as PEM or DER
pub fn certificate_der_from_bytes(content: &[u8]) -> VaultResult<Vec<u8>> {
    if is_pem(content) {
        return parse_pem_bundle(content).map(|bundle| bundle.certificate_der);
    }
    CertificateDetails::parse(content)?;
    Ok(content.to_vec())
}

fn is_pem(content: &[u8]) -> bool {
    let start = content
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(content.len());
    content[start..].starts_with(PEM_BEGIN)
}

fn parse_pem_bundle(content: &[u8]) -> VaultResult<CertificateBundle> {
    let start = content.iter().position(|b| !b.is_ascii_whitespace()).unwrap_or(0);
    let mut certificate_der = None;
    let mut key = None;
    for block in Pem::iter_from_buffer(&content[start..]) {
        let block = block.map_err(|e| parsing_error(&format!("invalid PEM block: {}", e)))?;
        match block.label.as_str() {
            "CERTIFICATE" if certificate_der.is_none() => certificate_der = Some(block.contents),
            "PRIVATE KEY" => key = Some(KeyMaterial::from_pkcs8_der(&block.contents)?),
            _ => {}
        }
    }

    let certificate_der = certificate_der.ok_or_else(|| parsing_error("no CERTIFICATE block in PEM"))?;
    Ok(CertificateBundle {
        certificate_der,
        key,
        content_type: CertContentType::Pem,
    })
}

fn parse_pkcs12_bundle(content: &[u8], password: &str) -> VaultResult<CertificateBundle> {
    let store = match KeyStore::from_pkcs12(content, password) {
        Ok(store) => store,
        Err(raw_error) => {
            let text: Vec<u8> = content.iter().copied().filter(|b| !b.is_ascii_whitespace()).collect();
            let decoded = base64::decode(&text).map_err(|_| VaultError::from(raw_error))?;
            KeyStore::from_pkcs12(&decoded, password)?
        }
    };

    if let Some((_, chain)) = store.private_key_chain() {
        let certificate = chain
            .chain()
            .first()
            .ok_or_else(|| parsing_error("PKCS#12 key entry without certificate"))?;
        return Ok(CertificateBundle {
            certificate_der: certificate.as_der().to_vec(),
            key: Some(KeyMaterial::from_pkcs8_der(chain.key())?),
            content_type: CertContentType::Pkcs12,
        });
    }

    let certificate = store
        .entries()
        .find_map(|(_, entry)| match entry {
            KeyStoreEntry::Certificate(certificate) => Some(certificate.as_der().to_vec()),
            _ => None,
        })
        .ok_or_else(|| parsing_error("no certificate in PKCS#12 archive"))?;
    Ok(CertificateBundle {
        certificate_der: certificate,
        key: None,
        content_type: CertContentType::Pkcs12,
    })
}

fn pem_block(label: &str, der: &[u8]) -> String {
    let encoded = base64::encode(der);
    let mut block = format!("-----BEGIN {}-----\n", label);
    for (index, c) in encoded.chars().enumerate() {
        if index > 0 && index % PEM_LINE_LENGTH == 0 {
            block.push('\n');
        }
        block.push(c);
    }
    block.push_str(&format!("\n-----END {}-----\n", label));
    block
}

fn oid_matches(dotted: &str, arcs: &[u64]) -> bool {
    let expected: Vec<String> = arcs.iter().map(|arc| arc.to_string()).collect();
    dotted == expected.join(".")
}

// otherName value: [0] EXPLICIT UTF8String
fn decode_upn(value: &[u8]) -> Option<String> {
    let (_, upn) = TaggedExplicit::<Utf8String, Asn1Error, 0>::from_der(value).ok()?;
    Some(upn.into_inner().string())
}

fn timestamp(seconds: i64) -> VaultResult<DateTime<Utc>> {
    Utc.timestamp_opt(seconds, 0)
        .single()
        .ok_or_else(|| parsing_error(&format!("timestamp {} out of range", seconds)))
}

fn parsing_error(cause: &str) -> VaultError {
    VaultError::invalid_argument_with_code(
        "certificate",
        "a well formed certificate",
        cause,
        error_codes::INVALID_CERTIFICATE_DATA,
    )
}
