use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{error_codes, VaultError, VaultResult};
use crate::keys::{KeyCreationInput, KeyCurve, KeyType, DEFAULT_RSA_KEY_SIZE, RSA_KEY_SIZES};

/// Longest validity a certificate policy may request
pub const MAX_VALIDITY_MONTHS: u32 = 1200;
pub const DEFAULT_VALIDITY_MONTHS: u32 = 12;

/// Who signs issued certificates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CertAuthorityType {
    /// Issued synchronously and signed with the certificate's own key
    #[serde(rename = "Self")]
    SelfSigned,
    /// Left pending until a certificate is merged
    Unknown,
}

impl CertAuthorityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CertAuthorityType::SelfSigned => "Self",
            CertAuthorityType::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for CertAuthorityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Packaging of the secret that backs a certificate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CertContentType {
    #[serde(rename = "application/x-pkcs12")]
    Pkcs12,
    #[default]
    #[serde(rename = "application/x-pem-file")]
    Pem,
}

impl CertContentType {
    pub fn mime_type(&self) -> &'static str {
        match self {
            CertContentType::Pkcs12 => "application/x-pkcs12",
            CertContentType::Pem => "application/x-pem-file",
        }
    }

    /// Look up a content type by MIME type, falling back to PEM
    pub fn from_mime_type(mime_type: &str) -> Self {
        if mime_type == CertContentType::Pkcs12.mime_type() {
            CertContentType::Pkcs12
        } else {
            CertContentType::Pem
        }
    }
}

impl fmt::Display for CertContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mime_type())
    }
}

/// X.509 key usage bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum KeyUsage {
    #[serde(rename = "digitalSignature")]
    DigitalSignature,
    #[serde(rename = "nonRepudiation")]
    NonRepudiation,
    #[serde(rename = "keyEncipherment")]
    KeyEncipherment,
    #[serde(rename = "dataEncipherment")]
    DataEncipherment,
    #[serde(rename = "keyAgreement")]
    KeyAgreement,
    #[serde(rename = "keyCertSign")]
    KeyCertSign,
    #[serde(rename = "cRLSign")]
    CrlSign,
    #[serde(rename = "encipherOnly")]
    EncipherOnly,
    #[serde(rename = "decipherOnly")]
    DecipherOnly,
}

impl KeyUsage {
    /// Every usage in bit string order
    pub const ALL: [KeyUsage; 9] = [
        KeyUsage::DigitalSignature,
        KeyUsage::NonRepudiation,
        KeyUsage::KeyEncipherment,
        KeyUsage::DataEncipherment,
        KeyUsage::KeyAgreement,
        KeyUsage::KeyCertSign,
        KeyUsage::CrlSign,
        KeyUsage::EncipherOnly,
        KeyUsage::DecipherOnly,
    ];

    /// Position in the DER bit string
    pub fn bit(&self) -> u16 {
        match self {
            KeyUsage::DigitalSignature => 0,
            KeyUsage::NonRepudiation => 1,
            KeyUsage::KeyEncipherment => 2,
            KeyUsage::DataEncipherment => 3,
            KeyUsage::KeyAgreement => 4,
            KeyUsage::KeyCertSign => 5,
            KeyUsage::CrlSign => 6,
            KeyUsage::EncipherOnly => 7,
            KeyUsage::DecipherOnly => 8,
        }
    }

    /// Usages set in the flags of a parsed key usage extension
    ///
    /// Bit 0 of `flags` is `digitalSignature`.
    pub fn from_flags(flags: u16) -> Vec<KeyUsage> {
        KeyUsage::ALL
            .iter()
            .copied()
            .filter(|usage| (flags >> usage.bit()) & 1 == 1)
            .collect()
    }

    pub(crate) fn to_rcgen(self) -> rcgen::KeyUsagePurpose {
        use rcgen::KeyUsagePurpose as Purpose;
        match self {
            KeyUsage::DigitalSignature => Purpose::DigitalSignature,
            KeyUsage::NonRepudiation => Purpose::ContentCommitment,
            KeyUsage::KeyEncipherment => Purpose::KeyEncipherment,
            KeyUsage::DataEncipherment => Purpose::DataEncipherment,
            KeyUsage::KeyAgreement => Purpose::KeyAgreement,
            KeyUsage::KeyCertSign => Purpose::KeyCertSign,
            KeyUsage::CrlSign => Purpose::CrlSign,
            KeyUsage::EncipherOnly => Purpose::EncipherOnly,
            KeyUsage::DecipherOnly => Purpose::DecipherOnly,
        }
    }
}

/// Subject attributes understood in distinguished names
const SUBJECT_ATTRIBUTES: [&str; 6] = ["CN", "O", "OU", "C", "ST", "L"];

/// Split a distinguished name such as `CN=example.com, O=Example` into pairs
///
/// Escaped commas (`\,`) stay part of the value.
pub fn parse_subject(subject: &str) -> VaultResult<Vec<(String, String)>> {
    let invalid = |reason: &str| {
        VaultError::invalid_argument_with_code(
            "subject",
            reason,
            subject,
            error_codes::INVALID_CERTIFICATE_POLICY,
        )
    };

    let mut parts = Vec::new();
    let mut current = String::new();
    let mut escaped = false;
    for c in subject.chars() {
        match c {
            '\\' if !escaped => escaped = true,
            ',' | ';' if !escaped => parts.push(std::mem::take(&mut current)),
            _ => {
                current.push(c);
                escaped = false;
            }
        }
    }
    parts.push(current);

    let mut attributes = Vec::new();
    for part in parts {
        let (name, value) = part
            .split_once('=')
            .ok_or_else(|| invalid("comma separated NAME=value pairs"))?;
        let name = name.trim().to_ascii_uppercase();
        let value = value.trim();
        if !SUBJECT_ATTRIBUTES.contains(&name.as_str()) {
            return Err(invalid("attributes among CN, O, OU, C, ST and L"));
        }
        if value.is_empty() {
            return Err(invalid("non-empty attribute values"));
        }
        attributes.push((name, value.to_string()));
    }
    if attributes.is_empty() {
        return Err(invalid("at least one attribute"));
    }
    Ok(attributes)
}

/// Parse a dotted OID string such as `1.3.6.1.5.5.7.3.1`
pub fn parse_oid(oid: &str) -> VaultResult<Vec<u64>> {
    let arcs: Result<Vec<u64>, _> = oid.split('.').map(u64::from_str).collect();
    match arcs {
        Ok(arcs) if arcs.len() >= 2 => Ok(arcs),
        _ => Err(VaultError::invalid_argument_with_code(
            "extended_key_usage",
            "dotted object identifiers",
            oid,
            error_codes::INVALID_CERTIFICATE_POLICY,
        )),
    }
}

/// Issuance settings of a certificate
///
/// # Examples
///
/// ```
/// use vaultsim::certificates::{CertContentType, CertificatePolicy};
///
/// let policy = CertificatePolicy::new("CN=example.com")
///     .with_dns_names(&["*.example.com"])
///     .with_content_type(CertContentType::Pkcs12);
/// assert!(policy.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificatePolicy {
    pub issuer: CertAuthorityType,
    pub subject: String,
    #[serde(default)]
    pub dns_names: Vec<String>,
    #[serde(default)]
    pub emails: Vec<String>,
    #[serde(default)]
    pub upns: Vec<String>,
    pub validity_months: u32,
    #[serde(default)]
    pub content_type: CertContentType,
    pub key_type: KeyType,
    #[serde(default)]
    pub key_size: Option<u32>,
    #[serde(default)]
    pub key_curve: Option<KeyCurve>,
    pub exportable: bool,
    #[serde(default)]
    pub reuse_key_on_renewal: bool,
    #[serde(default)]
    pub key_usage: Vec<KeyUsage>,
    #[serde(default)]
    pub extended_key_usage: Vec<String>,
}

impl CertificatePolicy {
    /// Self-signed, 12 month, exportable RSA 2048 policy in PEM format
    pub fn new(subject: &str) -> Self {
        Self {
            issuer: CertAuthorityType::SelfSigned,
            subject: subject.to_string(),
            dns_names: Vec::new(),
            emails: Vec::new(),
            upns: Vec::new(),
            validity_months: DEFAULT_VALIDITY_MONTHS,
            content_type: CertContentType::Pem,
            key_type: KeyType::Rsa,
            key_size: Some(DEFAULT_RSA_KEY_SIZE),
            key_curve: None,
            exportable: true,
            reuse_key_on_renewal: false,
            key_usage: vec![KeyUsage::DigitalSignature, KeyUsage::KeyEncipherment],
            extended_key_usage: Vec::new(),
        }
    }

    pub fn with_issuer(mut self, issuer: CertAuthorityType) -> Self {
        self.issuer = issuer;
        self
    }

    pub fn with_dns_names(mut self, names: &[&str]) -> Self {
        self.dns_names = names.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_emails(mut self, emails: &[&str]) -> Self {
        self.emails = emails.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_upns(mut self, upns: &[&str]) -> Self {
        self.upns = upns.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_validity_months(mut self, months: u32) -> Self {
        self.validity_months = months;
        self
    }

    pub fn with_content_type(mut self, content_type: CertContentType) -> Self {
        self.content_type = content_type;
        self
    }

    /// Use an RSA key of `key_size` bits
    pub fn with_rsa_key(mut self, key_size: u32, hsm: bool) -> Self {
        self.key_type = KeyType::Rsa.with_hsm(hsm);
        self.key_size = Some(key_size);
        self.key_curve = None;
        self
    }

    /// Use an EC key on `curve`
    pub fn with_ec_key(mut self, curve: KeyCurve, hsm: bool) -> Self {
        self.key_type = KeyType::Ec.with_hsm(hsm);
        self.key_size = None;
        self.key_curve = Some(curve);
        self
    }

    pub fn with_key_usage(mut self, usage: &[KeyUsage]) -> Self {
        self.key_usage = usage.to_vec();
        self
    }

    pub fn with_extended_key_usage(mut self, oids: &[&str]) -> Self {
        self.extended_key_usage = oids.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn reuse_key_on_renewal(mut self, reuse: bool) -> Self {
        self.reuse_key_on_renewal = reuse;
        self
    }

    pub fn exportable(mut self, exportable: bool) -> Self {
        self.exportable = exportable;
        self
    }

    /// Check the policy before any key is generated
    pub fn validate(&self) -> VaultResult<()> {
        let invalid = |parameter: &str, expected: &str, actual: String| {
            Err(VaultError::invalid_argument_with_code(
                parameter,
                expected,
                &actual,
                error_codes::INVALID_CERTIFICATE_POLICY,
            ))
        };

        parse_subject(&self.subject)?;
        if self.validity_months == 0 || self.validity_months > MAX_VALIDITY_MONTHS {
            return invalid(
                "validity_months",
                &format!("1..={}", MAX_VALIDITY_MONTHS),
                self.validity_months.to_string(),
            );
        }
        for oid in &self.extended_key_usage {
            parse_oid(oid)?;
        }

        if self.key_type.is_rsa() {
            if self.key_curve.is_some() {
                return invalid("key_curve", "no curve for RSA keys", format!("{:?}", self.key_curve));
            }
            let size = self.key_size.unwrap_or(DEFAULT_RSA_KEY_SIZE);
            if !RSA_KEY_SIZES.contains(&size) {
                return invalid("key_size", "2048, 3072 or 4096", size.to_string());
            }
        } else if self.key_type.is_ec() {
            if self.key_size.is_some() {
                return invalid("key_size", "no size for EC keys", format!("{:?}", self.key_size));
            }
            // Certificates can only be signed on P-256 and P-384
            match self.key_curve.unwrap_or(KeyCurve::P256) {
                KeyCurve::P256 | KeyCurve::P384 => {}
                other => return invalid("key_curve", "P-256 or P-384", other.to_string()),
            }
        } else {
            return invalid("key_type", "an RSA or EC key type", self.key_type.to_string());
        }
        Ok(())
    }

    /// Key generation parameters for this policy
    pub fn key_creation_input(&self) -> KeyCreationInput {
        let input = KeyCreationInput::new(self.key_type);
        if self.key_type.is_rsa() {
            input.with_key_size(self.key_size.unwrap_or(DEFAULT_RSA_KEY_SIZE))
        } else {
            input.with_curve(self.key_curve.unwrap_or(KeyCurve::P256))
        }
    }
}
