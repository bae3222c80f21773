use rsa::traits::{PrivateKeyParts, PublicKeyParts};
use rsa::{BigUint, RsaPrivateKey};
use serde::{Deserialize, Serialize};

use crate::error::{error_codes, VaultError, VaultResult};

use super::material::{AesKey, EcKey, KeyMaterial, RsaKey};
use super::types::{KeyCurve, KeyOperation, KeyType};

/// Binary JWK members as unpadded base64url strings
mod base64url {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(bytes) => serializer.serialize_some(&base64::encode_config(bytes, base64::URL_SAFE_NO_PAD)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error> {
        let value: Option<String> = Option::deserialize(deserializer)?;
        value
            .map(|text| {
                base64::decode_config(text.trim_end_matches('='), base64::URL_SAFE_NO_PAD)
                    .map_err(serde::de::Error::custom)
            })
            .transpose()
    }
}

/// JSON Web Key as exchanged on import and export
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonWebKey {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
    pub kty: KeyType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub key_ops: Vec<KeyOperation>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "base64url")]
    pub n: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "base64url")]
    pub e: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "base64url")]
    pub d: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "base64url")]
    pub dp: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "base64url")]
    pub dq: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "base64url")]
    pub p: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "base64url")]
    pub q: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "base64url")]
    pub qi: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crv: Option<KeyCurve>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "base64url")]
    pub x: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "base64url")]
    pub y: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "base64url")]
    pub k: Option<Vec<u8>>,
}

fn missing(member: &str, kty: KeyType) -> VaultError {
    VaultError::invalid_argument_with_code(
        member,
        &format!("a value for {} keys", kty),
        "none",
        error_codes::INVALID_KEY_PARAMETERS,
    )
}

impl JsonWebKey {
    /// An empty key of type `kty`
    pub fn new(kty: KeyType) -> Self {
        Self {
            kid: None,
            kty,
            key_ops: Vec::new(),
            n: None,
            e: None,
            d: None,
            dp: None,
            dq: None,
            p: None,
            q: None,
            qi: None,
            crv: None,
            x: None,
            y: None,
            k: None,
        }
    }

    /// Describe `material` as a JWK
    ///
    /// # Arguments
    ///
    /// * `material` - The key material
    /// * `kty` - Key type tag to emit
    /// * `include_private` - Whether private members (and AES key bytes) are included
    pub fn from_material(material: &KeyMaterial, kty: KeyType, include_private: bool) -> Self {
        let mut jwk = JsonWebKey::new(kty);
        match material {
            KeyMaterial::Rsa(key) => {
                let private_key = key.private_key();
                jwk.n = Some(private_key.n().to_bytes_be());
                jwk.e = Some(private_key.e().to_bytes_be());
                if include_private {
                    let primes = private_key.primes();
                    jwk.d = Some(private_key.d().to_bytes_be());
                    jwk.p = primes.first().map(BigUint::to_bytes_be);
                    jwk.q = primes.get(1).map(BigUint::to_bytes_be);
                    jwk.dp = private_key.dp().map(BigUint::to_bytes_be);
                    jwk.dq = private_key.dq().map(BigUint::to_bytes_be);
                    jwk.qi = private_key.crt_coefficient().map(|qi| qi.to_bytes_be());
                }
            }
            KeyMaterial::Ec(key) => {
                let (x, y) = key.coordinates();
                jwk.crv = Some(key.curve());
                jwk.x = Some(x);
                jwk.y = Some(y);
                if include_private {
                    jwk.d = Some(key.private_bytes());
                }
            }
            KeyMaterial::Aes(key) => {
                if include_private {
                    jwk.k = Some(key.as_bytes().to_vec());
                }
            }
        }
        jwk
    }

    /// Rebuild key material from this JWK, which must carry the private members
    pub fn to_material(&self) -> VaultResult<KeyMaterial> {
        match self.kty {
            KeyType::Rsa | KeyType::RsaHsm => self.to_rsa().map(KeyMaterial::Rsa),
            KeyType::Ec | KeyType::EcHsm => self.to_ec().map(KeyMaterial::Ec),
            KeyType::Oct | KeyType::OctHsm => {
                let k = self.k.as_deref().ok_or_else(|| missing("k", self.kty))?;
                AesKey::from_bytes(k).map(KeyMaterial::Aes)
            }
        }
    }

    fn to_rsa(&self) -> VaultResult<RsaKey> {
        let component = |value: &Option<Vec<u8>>, name: &str| {
            value
                .as_deref()
                .map(BigUint::from_bytes_be)
                .ok_or_else(|| missing(name, self.kty))
        };
        let n = component(&self.n, "n")?;
        let e = component(&self.e, "e")?;
        let d = component(&self.d, "d")?;
        let primes = match (&self.p, &self.q) {
            (Some(p), Some(q)) => vec![BigUint::from_bytes_be(p), BigUint::from_bytes_be(q)],
            _ => Vec::new(),
        };

        let invalid = |e: rsa::Error| {
            VaultError::invalid_argument_with_code(
                "jwk",
                "consistent RSA key components",
                &e.to_string(),
                error_codes::INVALID_KEY_PARAMETERS,
            )
        };
        let private_key = RsaPrivateKey::from_components(n, e, d, primes).map_err(invalid)?;
        private_key.validate().map_err(invalid)?;
        RsaKey::from_private_key(private_key)
    }

    fn to_ec(&self) -> VaultResult<EcKey> {
        let curve = self.crv.ok_or_else(|| missing("crv", self.kty))?;
        let d = self.d.as_deref().ok_or_else(|| missing("d", self.kty))?;
        let key = EcKey::from_private_bytes(curve, d)?;

        // Public coordinates, when present, must belong to the private scalar
        let (x, y) = key.coordinates();
        let mismatch = self.x.as_ref().map(|v| v != &x).unwrap_or(false)
            || self.y.as_ref().map(|v| v != &y).unwrap_or(false);
        if mismatch {
            return Err(VaultError::invalid_argument_with_code(
                "x/y",
                "coordinates of the public point for d",
                "different coordinates",
                error_codes::INVALID_KEY_PARAMETERS,
            ));
        }
        Ok(key)
    }
}
