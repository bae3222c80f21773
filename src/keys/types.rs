use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{error_codes, VaultError};

/// Supported RSA modulus sizes in bits
pub const RSA_KEY_SIZES: [u32; 3] = [2048, 3072, 4096];

/// Supported AES key sizes in bits
pub const AES_KEY_SIZES: [u32; 3] = [128, 192, 256];

pub const DEFAULT_RSA_KEY_SIZE: u32 = 2048;
pub const DEFAULT_AES_KEY_SIZE: u32 = 256;

/// Key type tag, following JWK `kty` naming
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyType {
    #[serde(rename = "EC")]
    Ec,
    #[serde(rename = "EC-HSM")]
    EcHsm,
    #[serde(rename = "RSA")]
    Rsa,
    #[serde(rename = "RSA-HSM")]
    RsaHsm,
    #[serde(rename = "oct")]
    Oct,
    #[serde(rename = "oct-HSM")]
    OctHsm,
}

impl KeyType {
    pub const ALL: [KeyType; 6] = [
        KeyType::Ec,
        KeyType::EcHsm,
        KeyType::Rsa,
        KeyType::RsaHsm,
        KeyType::Oct,
        KeyType::OctHsm,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            KeyType::Ec => "EC",
            KeyType::EcHsm => "EC-HSM",
            KeyType::Rsa => "RSA",
            KeyType::RsaHsm => "RSA-HSM",
            KeyType::Oct => "oct",
            KeyType::OctHsm => "oct-HSM",
        }
    }

    pub fn is_hsm(&self) -> bool {
        matches!(self, KeyType::EcHsm | KeyType::RsaHsm | KeyType::OctHsm)
    }

    pub fn is_rsa(&self) -> bool {
        matches!(self, KeyType::Rsa | KeyType::RsaHsm)
    }

    pub fn is_ec(&self) -> bool {
        matches!(self, KeyType::Ec | KeyType::EcHsm)
    }

    pub fn is_oct(&self) -> bool {
        matches!(self, KeyType::Oct | KeyType::OctHsm)
    }

    /// The HSM or software counterpart of this type
    pub fn with_hsm(&self, hsm: bool) -> KeyType {
        match (self, hsm) {
            (KeyType::Ec | KeyType::EcHsm, true) => KeyType::EcHsm,
            (KeyType::Ec | KeyType::EcHsm, false) => KeyType::Ec,
            (KeyType::Rsa | KeyType::RsaHsm, true) => KeyType::RsaHsm,
            (KeyType::Rsa | KeyType::RsaHsm, false) => KeyType::Rsa,
            (KeyType::Oct | KeyType::OctHsm, true) => KeyType::OctHsm,
            (KeyType::Oct | KeyType::OctHsm, false) => KeyType::Oct,
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyType {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        KeyType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| VaultError::invalid_argument("kty", "a known key type", s))
    }
}

/// Elliptic curve of an EC key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyCurve {
    #[serde(rename = "P-256")]
    P256,
    #[serde(rename = "P-384")]
    P384,
    #[serde(rename = "P-521")]
    P521,
    #[serde(rename = "P-256K")]
    P256K,
}

impl KeyCurve {
    pub const ALL: [KeyCurve; 4] = [KeyCurve::P256, KeyCurve::P384, KeyCurve::P521, KeyCurve::P256K];

    pub fn as_str(&self) -> &'static str {
        match self {
            KeyCurve::P256 => "P-256",
            KeyCurve::P384 => "P-384",
            KeyCurve::P521 => "P-521",
            KeyCurve::P256K => "P-256K",
        }
    }

    /// The signature algorithm bound to this curve
    pub fn signature_algorithm(&self) -> SignatureAlgorithm {
        match self {
            KeyCurve::P256 => SignatureAlgorithm::Es256,
            KeyCurve::P384 => SignatureAlgorithm::Es384,
            KeyCurve::P521 => SignatureAlgorithm::Es512,
            KeyCurve::P256K => SignatureAlgorithm::Es256K,
        }
    }

    /// Length in bytes of a coordinate or private scalar
    pub fn coordinate_length(&self) -> usize {
        match self {
            KeyCurve::P256 | KeyCurve::P256K => 32,
            KeyCurve::P384 => 48,
            KeyCurve::P521 => 66,
        }
    }
}

impl fmt::Display for KeyCurve {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyCurve {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        KeyCurve::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| {
                VaultError::invalid_argument_with_code(
                    "crv",
                    "P-256, P-384, P-521 or P-256K",
                    s,
                    error_codes::INVALID_KEY_PARAMETERS,
                )
            })
    }
}

/// Operation a key may be used for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum KeyOperation {
    #[serde(rename = "encrypt")]
    Encrypt,
    #[serde(rename = "decrypt")]
    Decrypt,
    #[serde(rename = "sign")]
    Sign,
    #[serde(rename = "verify")]
    Verify,
    #[serde(rename = "wrapKey")]
    WrapKey,
    #[serde(rename = "unwrapKey")]
    UnwrapKey,
    #[serde(rename = "import")]
    Import,
}

impl KeyOperation {
    pub const ALL: [KeyOperation; 7] = [
        KeyOperation::Encrypt,
        KeyOperation::Decrypt,
        KeyOperation::Sign,
        KeyOperation::Verify,
        KeyOperation::WrapKey,
        KeyOperation::UnwrapKey,
        KeyOperation::Import,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            KeyOperation::Encrypt => "encrypt",
            KeyOperation::Decrypt => "decrypt",
            KeyOperation::Sign => "sign",
            KeyOperation::Verify => "verify",
            KeyOperation::WrapKey => "wrapKey",
            KeyOperation::UnwrapKey => "unwrapKey",
            KeyOperation::Import => "import",
        }
    }
}

impl fmt::Display for KeyOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Algorithms for encrypt, decrypt, wrap and unwrap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EncryptionAlgorithm {
    #[serde(rename = "RSA-OAEP")]
    RsaOaep,
    #[serde(rename = "RSA-OAEP-256")]
    RsaOaep256,
    #[serde(rename = "RSA1_5")]
    Rsa15,
    #[serde(rename = "A128CBC")]
    A128Cbc,
    #[serde(rename = "A192CBC")]
    A192Cbc,
    #[serde(rename = "A256CBC")]
    A256Cbc,
    #[serde(rename = "A128CBCPAD")]
    A128CbcPad,
    #[serde(rename = "A192CBCPAD")]
    A192CbcPad,
    #[serde(rename = "A256CBCPAD")]
    A256CbcPad,
}

impl EncryptionAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            EncryptionAlgorithm::RsaOaep => "RSA-OAEP",
            EncryptionAlgorithm::RsaOaep256 => "RSA-OAEP-256",
            EncryptionAlgorithm::Rsa15 => "RSA1_5",
            EncryptionAlgorithm::A128Cbc => "A128CBC",
            EncryptionAlgorithm::A192Cbc => "A192CBC",
            EncryptionAlgorithm::A256Cbc => "A256CBC",
            EncryptionAlgorithm::A128CbcPad => "A128CBCPAD",
            EncryptionAlgorithm::A192CbcPad => "A192CBCPAD",
            EncryptionAlgorithm::A256CbcPad => "A256CBCPAD",
        }
    }

    pub fn is_rsa(&self) -> bool {
        matches!(
            self,
            EncryptionAlgorithm::RsaOaep | EncryptionAlgorithm::RsaOaep256 | EncryptionAlgorithm::Rsa15
        )
    }

    pub fn is_aes(&self) -> bool {
        !self.is_rsa()
    }

    /// Required AES key length in bytes, `None` for RSA algorithms
    pub fn aes_key_length(&self) -> Option<usize> {
        match self {
            EncryptionAlgorithm::A128Cbc | EncryptionAlgorithm::A128CbcPad => Some(16),
            EncryptionAlgorithm::A192Cbc | EncryptionAlgorithm::A192CbcPad => Some(24),
            EncryptionAlgorithm::A256Cbc | EncryptionAlgorithm::A256CbcPad => Some(32),
            _ => None,
        }
    }

    /// Whether the AES variant uses PKCS#7 padding rather than zero padding
    pub fn uses_pkcs7(&self) -> bool {
        matches!(
            self,
            EncryptionAlgorithm::A128CbcPad | EncryptionAlgorithm::A192CbcPad | EncryptionAlgorithm::A256CbcPad
        )
    }
}

impl fmt::Display for EncryptionAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Algorithms for sign and verify
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignatureAlgorithm {
    #[serde(rename = "ES256")]
    Es256,
    #[serde(rename = "ES256K")]
    Es256K,
    #[serde(rename = "ES384")]
    Es384,
    #[serde(rename = "ES512")]
    Es512,
    #[serde(rename = "PS256")]
    Ps256,
    #[serde(rename = "PS384")]
    Ps384,
    #[serde(rename = "PS512")]
    Ps512,
    #[serde(rename = "RS256")]
    Rs256,
    #[serde(rename = "RS384")]
    Rs384,
    #[serde(rename = "RS512")]
    Rs512,
}

impl SignatureAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignatureAlgorithm::Es256 => "ES256",
            SignatureAlgorithm::Es256K => "ES256K",
            SignatureAlgorithm::Es384 => "ES384",
            SignatureAlgorithm::Es512 => "ES512",
            SignatureAlgorithm::Ps256 => "PS256",
            SignatureAlgorithm::Ps384 => "PS384",
            SignatureAlgorithm::Ps512 => "PS512",
            SignatureAlgorithm::Rs256 => "RS256",
            SignatureAlgorithm::Rs384 => "RS384",
            SignatureAlgorithm::Rs512 => "RS512",
        }
    }

    /// Length in bytes of the digest this algorithm signs
    pub fn digest_length(&self) -> usize {
        match self {
            SignatureAlgorithm::Es256
            | SignatureAlgorithm::Es256K
            | SignatureAlgorithm::Ps256
            | SignatureAlgorithm::Rs256 => 32,
            SignatureAlgorithm::Es384 | SignatureAlgorithm::Ps384 | SignatureAlgorithm::Rs384 => 48,
            SignatureAlgorithm::Es512 | SignatureAlgorithm::Ps512 | SignatureAlgorithm::Rs512 => 64,
        }
    }

    /// Curve an EC algorithm is bound to, `None` for RSA algorithms
    pub fn curve(&self) -> Option<KeyCurve> {
        match self {
            SignatureAlgorithm::Es256 => Some(KeyCurve::P256),
            SignatureAlgorithm::Es256K => Some(KeyCurve::P256K),
            SignatureAlgorithm::Es384 => Some(KeyCurve::P384),
            SignatureAlgorithm::Es512 => Some(KeyCurve::P521),
            _ => None,
        }
    }

    pub fn is_ec(&self) -> bool {
        self.curve().is_some()
    }

    pub fn is_rsa(&self) -> bool {
        !self.is_ec()
    }

    pub fn is_pss(&self) -> bool {
        matches!(
            self,
            SignatureAlgorithm::Ps256 | SignatureAlgorithm::Ps384 | SignatureAlgorithm::Ps512
        )
    }
}

impl fmt::Display for SignatureAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
