use std::fmt;

use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::pkcs8::{DecodePrivateKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rand::rngs::OsRng;
use rand::RngCore;
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{error_codes, VaultError, VaultResult};

use super::types::{
    KeyCurve, KeyOperation, KeyType, AES_KEY_SIZES, DEFAULT_AES_KEY_SIZE, DEFAULT_RSA_KEY_SIZE,
    RSA_KEY_SIZES,
};

/// Parameters for generating new key material
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyCreationInput {
    pub key_type: KeyType,
    pub key_size: Option<u32>,
    pub curve: Option<KeyCurve>,
}

impl KeyCreationInput {
    pub fn new(key_type: KeyType) -> Self {
        Self {
            key_type,
            key_size: None,
            curve: None,
        }
    }

    pub fn with_key_size(mut self, key_size: u32) -> Self {
        self.key_size = Some(key_size);
        self
    }

    pub fn with_curve(mut self, curve: KeyCurve) -> Self {
        self.curve = Some(curve);
        self
    }
}

/// RSA key pair
#[derive(Clone, PartialEq, Eq)]
pub struct RsaKey {
    private_key: RsaPrivateKey,
}

impl RsaKey {
    /// Generate a key pair with a modulus of `bits`
    pub fn generate(bits: u32) -> VaultResult<Self> {
        if !RSA_KEY_SIZES.contains(&bits) {
            return Err(VaultError::invalid_argument_with_code(
                "key_size",
                "2048, 3072 or 4096",
                &bits.to_string(),
                error_codes::INVALID_KEY_PARAMETERS,
            ));
        }

        let private_key = RsaPrivateKey::new(&mut OsRng, bits as usize).map_err(|e| {
            VaultError::crypto_failure_for_key(
                "generate key",
                &format!("RSA key generation failed: {}", e),
                error_codes::KEY_GENERATION_FAILED,
                "RSA",
            )
        })?;
        Ok(Self { private_key })
    }

    /// Wrap an existing private key, checking its size
    pub fn from_private_key(private_key: RsaPrivateKey) -> VaultResult<Self> {
        let bits = (private_key.size() * 8) as u32;
        if !RSA_KEY_SIZES.contains(&bits) {
            return Err(VaultError::invalid_argument_with_code(
                "key_size",
                "2048, 3072 or 4096",
                &bits.to_string(),
                error_codes::INVALID_KEY_PARAMETERS,
            ));
        }
        Ok(Self { private_key })
    }

    pub fn key_size(&self) -> u32 {
        (self.private_key.size() * 8) as u32
    }

    pub fn private_key(&self) -> &RsaPrivateKey {
        &self.private_key
    }

    pub fn public_key(&self) -> RsaPublicKey {
        self.private_key.to_public_key()
    }
}

impl fmt::Debug for RsaKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RsaKey")
            .field("key_size", &self.key_size())
            .field("private_key", &"[REDACTED]")
            .finish()
    }
}

/// Private scalar of an EC key, one variant per curve
#[derive(Clone, PartialEq, Eq)]
pub enum EcSecret {
    P256(p256::SecretKey),
    P384(p384::SecretKey),
    P521(p521::SecretKey),
    P256K(k256::SecretKey),
}

macro_rules! with_ec_secret {
    ($secret:expr, $key:ident => $body:expr) => {
        match $secret {
            EcSecret::P256($key) => $body,
            EcSecret::P384($key) => $body,
            EcSecret::P521($key) => $body,
            EcSecret::P256K($key) => $body,
        }
    };
}

/// Elliptic curve key pair
#[derive(Clone, PartialEq, Eq)]
pub struct EcKey {
    secret: EcSecret,
}

impl EcKey {
    /// Generate a key pair on `curve`
    pub fn generate(curve: KeyCurve) -> Self {
        let secret = match curve {
            KeyCurve::P256 => EcSecret::P256(p256::SecretKey::random(&mut OsRng)),
            KeyCurve::P384 => EcSecret::P384(p384::SecretKey::random(&mut OsRng)),
            KeyCurve::P521 => EcSecret::P521(p521::SecretKey::random(&mut OsRng)),
            KeyCurve::P256K => EcSecret::P256K(k256::SecretKey::random(&mut OsRng)),
        };
        Self { secret }
    }

    /// Rebuild a key pair from its big-endian private scalar
    pub fn from_private_bytes(curve: KeyCurve, d: &[u8]) -> VaultResult<Self> {
        let invalid = |e: p256::elliptic_curve::Error| {
            VaultError::invalid_argument_with_code(
                "d",
                &format!("a valid {} private scalar", curve),
                &format!("{} bytes ({})", d.len(), e),
                error_codes::INVALID_KEY_PARAMETERS,
            )
        };
        let secret = match curve {
            KeyCurve::P256 => EcSecret::P256(p256::SecretKey::from_slice(d).map_err(invalid)?),
            KeyCurve::P384 => EcSecret::P384(p384::SecretKey::from_slice(d).map_err(invalid)?),
            KeyCurve::P521 => EcSecret::P521(p521::SecretKey::from_slice(d).map_err(invalid)?),
            KeyCurve::P256K => EcSecret::P256K(k256::SecretKey::from_slice(d).map_err(invalid)?),
        };
        Ok(Self { secret })
    }

    pub fn secret(&self) -> &EcSecret {
        &self.secret
    }

    pub fn curve(&self) -> KeyCurve {
        match self.secret {
            EcSecret::P256(_) => KeyCurve::P256,
            EcSecret::P384(_) => KeyCurve::P384,
            EcSecret::P521(_) => KeyCurve::P521,
            EcSecret::P256K(_) => KeyCurve::P256K,
        }
    }

    /// Big-endian private scalar
    pub fn private_bytes(&self) -> Vec<u8> {
        with_ec_secret!(&self.secret, key => key.to_bytes().to_vec())
    }

    /// Affine coordinates of the public point
    pub fn coordinates(&self) -> (Vec<u8>, Vec<u8>) {
        with_ec_secret!(&self.secret, key => {
            let point = key.public_key().to_encoded_point(false);
            (
                point.x().map(|x| x.to_vec()).unwrap_or_default(),
                point.y().map(|y| y.to_vec()).unwrap_or_default(),
            )
        })
    }

    /// Uncompressed SEC1 encoding of the public point
    pub fn public_point(&self) -> Vec<u8> {
        with_ec_secret!(&self.secret, key => key.public_key().to_encoded_point(false).as_bytes().to_vec())
    }
}

impl fmt::Debug for EcKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EcKey")
            .field("curve", &self.curve())
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// Symmetric AES key
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct AesKey {
    bytes: Vec<u8>,
}

impl AesKey {
    /// Generate a random key of `bits`
    pub fn generate(bits: u32) -> VaultResult<Self> {
        if !AES_KEY_SIZES.contains(&bits) {
            return Err(VaultError::invalid_argument_with_code(
                "key_size",
                "128, 192 or 256",
                &bits.to_string(),
                error_codes::INVALID_KEY_PARAMETERS,
            ));
        }
        let mut bytes = vec![0u8; (bits / 8) as usize];
        OsRng.fill_bytes(&mut bytes);
        Ok(Self { bytes })
    }

    pub fn from_bytes(bytes: &[u8]) -> VaultResult<Self> {
        if !matches!(bytes.len(), 16 | 24 | 32) {
            return Err(VaultError::invalid_argument_with_code(
                "k",
                "16, 24 or 32 bytes",
                &format!("{} bytes", bytes.len()),
                error_codes::INVALID_KEY_PARAMETERS,
            ));
        }
        Ok(Self {
            bytes: bytes.to_vec(),
        })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn key_size(&self) -> u32 {
        (self.bytes.len() * 8) as u32
    }
}

impl fmt::Debug for AesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AesKey")
            .field("key_size", &self.key_size())
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Key material held by a key entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyMaterial {
    Rsa(RsaKey),
    Ec(EcKey),
    Aes(AesKey),
}

impl KeyMaterial {
    /// Generate material for the requested type, size and curve
    ///
    /// # Arguments
    ///
    /// * `input` - Key type plus optional size (RSA, AES) or curve (EC)
    ///
    /// # Returns
    ///
    /// Fresh key material, or `InvalidArgument` for unsupported parameters
    pub fn generate(input: &KeyCreationInput) -> VaultResult<Self> {
        match input.key_type {
            KeyType::Rsa | KeyType::RsaHsm => {
                if input.curve.is_some() {
                    return Err(VaultError::invalid_argument_with_code(
                        "curve",
                        "no curve for RSA keys",
                        &format!("{:?}", input.curve),
                        error_codes::INVALID_KEY_PARAMETERS,
                    ));
                }
                let bits = input.key_size.unwrap_or(DEFAULT_RSA_KEY_SIZE);
                Ok(KeyMaterial::Rsa(RsaKey::generate(bits)?))
            }
            KeyType::Ec | KeyType::EcHsm => {
                if input.key_size.is_some() {
                    return Err(VaultError::invalid_argument_with_code(
                        "key_size",
                        "no key size for EC keys",
                        &format!("{:?}", input.key_size),
                        error_codes::INVALID_KEY_PARAMETERS,
                    ));
                }
                Ok(KeyMaterial::Ec(EcKey::generate(input.curve.unwrap_or(KeyCurve::P256))))
            }
            KeyType::OctHsm => {
                let bits = input.key_size.unwrap_or(DEFAULT_AES_KEY_SIZE);
                Ok(KeyMaterial::Aes(AesKey::generate(bits)?))
            }
            KeyType::Oct => Err(VaultError::invalid_argument_with_code(
                "key_type",
                "oct-HSM for symmetric keys",
                "oct",
                error_codes::INVALID_KEY_PARAMETERS,
            )),
        }
    }

    /// Whether this material can back a key of `key_type`
    pub fn matches_type(&self, key_type: KeyType) -> bool {
        match self {
            KeyMaterial::Rsa(_) => key_type.is_rsa(),
            KeyMaterial::Ec(_) => key_type.is_ec(),
            KeyMaterial::Aes(_) => key_type.is_oct(),
        }
    }

    /// Operations this kind of material can perform
    pub fn supported_operations(&self) -> Vec<KeyOperation> {
        match self {
            KeyMaterial::Rsa(_) => KeyOperation::ALL.to_vec(),
            KeyMaterial::Ec(_) => vec![KeyOperation::Sign, KeyOperation::Verify, KeyOperation::Import],
            KeyMaterial::Aes(_) => vec![
                KeyOperation::Encrypt,
                KeyOperation::Decrypt,
                KeyOperation::WrapKey,
                KeyOperation::UnwrapKey,
                KeyOperation::Import,
            ],
        }
    }

    /// Modulus or AES key size in bits
    pub fn key_size(&self) -> Option<u32> {
        match self {
            KeyMaterial::Rsa(key) => Some(key.key_size()),
            KeyMaterial::Ec(_) => None,
            KeyMaterial::Aes(key) => Some(key.key_size()),
        }
    }

    pub fn curve(&self) -> Option<KeyCurve> {
        match self {
            KeyMaterial::Ec(key) => Some(key.curve()),
            _ => None,
        }
    }

    /// Parameters that regenerate material of the same shape
    pub fn creation_input(&self, key_type: KeyType) -> KeyCreationInput {
        KeyCreationInput {
            key_type,
            key_size: match self {
                KeyMaterial::Ec(_) => None,
                other => other.key_size(),
            },
            curve: self.curve(),
        }
    }

    /// SubjectPublicKeyInfo DER of an asymmetric key
    pub fn public_key_der(&self) -> VaultResult<Vec<u8>> {
        let der = match self {
            KeyMaterial::Rsa(key) => key.public_key().to_public_key_der().map_err(encoding_error)?,
            KeyMaterial::Ec(key) => {
                with_ec_secret!(key.secret(), secret => secret.public_key().to_public_key_der().map_err(encoding_error)?)
            }
            KeyMaterial::Aes(_) => return Err(no_public_key()),
        };
        Ok(der.as_bytes().to_vec())
    }

    /// PKCS#8 DER of an asymmetric private key
    pub fn to_pkcs8_der(&self) -> VaultResult<Vec<u8>> {
        let der = match self {
            KeyMaterial::Rsa(key) => key.private_key().to_pkcs8_der().map_err(encoding_error)?,
            KeyMaterial::Ec(key) => {
                with_ec_secret!(key.secret(), secret => secret.to_pkcs8_der().map_err(encoding_error)?)
            }
            KeyMaterial::Aes(_) => return Err(no_public_key()),
        };
        Ok(der.as_bytes().to_vec())
    }

    /// PKCS#8 PEM of an asymmetric private key
    pub fn to_pkcs8_pem(&self) -> VaultResult<String> {
        let pem = match self {
            KeyMaterial::Rsa(key) => key
                .private_key()
                .to_pkcs8_pem(LineEnding::LF)
                .map_err(encoding_error)?,
            KeyMaterial::Ec(key) => {
                with_ec_secret!(key.secret(), secret => secret.to_pkcs8_pem(LineEnding::LF).map_err(encoding_error)?)
            }
            KeyMaterial::Aes(_) => return Err(no_public_key()),
        };
        Ok(pem.to_string())
    }

    /// Parse a PKCS#8 DER private key, detecting RSA and each supported curve
    pub fn from_pkcs8_der(der: &[u8]) -> VaultResult<Self> {
        if let Ok(private_key) = RsaPrivateKey::from_pkcs8_der(der) {
            return Ok(KeyMaterial::Rsa(RsaKey::from_private_key(private_key)?));
        }
        if let Ok(secret) = p256::SecretKey::from_pkcs8_der(der) {
            return Ok(KeyMaterial::Ec(EcKey { secret: EcSecret::P256(secret) }));
        }
        if let Ok(secret) = p384::SecretKey::from_pkcs8_der(der) {
            return Ok(KeyMaterial::Ec(EcKey { secret: EcSecret::P384(secret) }));
        }
        if let Ok(secret) = p521::SecretKey::from_pkcs8_der(der) {
            return Ok(KeyMaterial::Ec(EcKey { secret: EcSecret::P521(secret) }));
        }
        if let Ok(secret) = k256::SecretKey::from_pkcs8_der(der) {
            return Ok(KeyMaterial::Ec(EcKey { secret: EcSecret::P256K(secret) }));
        }
        Err(VaultError::invalid_argument_with_code(
            "private_key",
            "a PKCS#8 RSA or EC private key",
            &format!("{} unparseable bytes", der.len()),
            error_codes::INVALID_CERTIFICATE_DATA,
        ))
    }
}

fn encoding_error<E: fmt::Display>(e: E) -> VaultError {
    VaultError::crypto_failure(
        "encode key",
        &format!("Key encoding failed: {}", e),
        error_codes::KEY_ENCODING_FAILED,
    )
}

fn no_public_key() -> VaultError {
    VaultError::invalid_operation(
        "encode key",
        "symmetric keys have no public or PKCS#8 form",
        error_codes::OPERATION_NOT_SUPPORTED,
    )
}
