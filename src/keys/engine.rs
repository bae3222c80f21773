use cbc::cipher::block_padding::{Pkcs7, ZeroPadding};
use cbc::cipher::{BlockCipher, BlockDecryptMut, BlockEncryptMut, KeyInit, KeyIvInit};
use p256::ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use rand::rngs::OsRng;
use rsa::{Oaep, Pkcs1v15Encrypt, Pkcs1v15Sign, Pss};
use sha2::{Sha256, Sha384, Sha512};

use crate::error::{error_codes, VaultError, VaultResult};

use super::material::{AesKey, EcKey, EcSecret, KeyMaterial, RsaKey};
use super::types::{EncryptionAlgorithm, SignatureAlgorithm};

/// AES block and IV length in bytes
pub const AES_IV_LENGTH: usize = 16;

/// Material that can encrypt and decrypt
pub trait Encryptable {
    /// Encrypt `plaintext`; AES algorithms need a 16 byte `iv`
    fn encrypt(
        &self,
        algorithm: EncryptionAlgorithm,
        plaintext: &[u8],
        iv: Option<&[u8]>,
    ) -> VaultResult<Vec<u8>>;

    /// Reverse of [`Encryptable::encrypt`]
    fn decrypt(
        &self,
        algorithm: EncryptionAlgorithm,
        ciphertext: &[u8],
        iv: Option<&[u8]>,
    ) -> VaultResult<Vec<u8>>;
}

/// Material that can sign digests and verify signatures
pub trait Signable {
    /// Sign a precomputed digest
    fn sign(&self, algorithm: SignatureAlgorithm, digest: &[u8]) -> VaultResult<Vec<u8>>;

    /// Verify a signature over a precomputed digest
    ///
    /// A signature that does not match, or cannot even be parsed, yields
    /// `Ok(false)`.
    fn verify(&self, algorithm: SignatureAlgorithm, digest: &[u8], signature: &[u8]) -> VaultResult<bool>;
}

fn unsupported(operation: &str, algorithm: &str, key: &str) -> VaultError {
    VaultError::invalid_operation(
        operation,
        &format!("algorithm {} is not supported by {} keys", algorithm, key),
        error_codes::OPERATION_NOT_SUPPORTED,
    )
}

fn check_digest(algorithm: SignatureAlgorithm, digest: &[u8]) -> VaultResult<()> {
    if digest.len() != algorithm.digest_length() {
        return Err(VaultError::invalid_argument_with_code(
            "digest",
            &format!("{} bytes for {}", algorithm.digest_length(), algorithm),
            &format!("{} bytes", digest.len()),
            error_codes::INVALID_DIGEST_LENGTH,
        ));
    }
    Ok(())
}

impl Encryptable for RsaKey {
    fn encrypt(
        &self,
        algorithm: EncryptionAlgorithm,
        plaintext: &[u8],
        _iv: Option<&[u8]>,
    ) -> VaultResult<Vec<u8>> {
        let public_key = self.public_key();
        let result = match algorithm {
            EncryptionAlgorithm::RsaOaep => public_key.encrypt(&mut OsRng, Oaep::new::<sha1::Sha1>(), plaintext),
            EncryptionAlgorithm::RsaOaep256 => public_key.encrypt(&mut OsRng, Oaep::new::<Sha256>(), plaintext),
            EncryptionAlgorithm::Rsa15 => public_key.encrypt(&mut OsRng, Pkcs1v15Encrypt, plaintext),
            other => return Err(unsupported("encrypt", other.as_str(), "RSA")),
        };

        result.map_err(|e| {
            VaultError::crypto_failure_for_key(
                "encrypt",
                &format!("RSA encryption failed: {}", e),
                error_codes::ENCRYPTION_FAILED,
                "RSA",
            )
        })
    }

    fn decrypt(
        &self,
        algorithm: EncryptionAlgorithm,
        ciphertext: &[u8],
        _iv: Option<&[u8]>,
    ) -> VaultResult<Vec<u8>> {
        let private_key = self.private_key();
        let result = match algorithm {
            EncryptionAlgorithm::RsaOaep => private_key.decrypt(Oaep::new::<sha1::Sha1>(), ciphertext),
            EncryptionAlgorithm::RsaOaep256 => private_key.decrypt(Oaep::new::<Sha256>(), ciphertext),
            EncryptionAlgorithm::Rsa15 => private_key.decrypt(Pkcs1v15Encrypt, ciphertext),
            other => return Err(unsupported("decrypt", other.as_str(), "RSA")),
        };

        result.map_err(|e| {
            VaultError::crypto_failure_for_key(
                "decrypt",
                &format!("RSA decryption failed: {}", e),
                error_codes::DECRYPTION_FAILED,
                "RSA",
            )
        })
    }
}

impl Signable for RsaKey {
    fn sign(&self, algorithm: SignatureAlgorithm, digest: &[u8]) -> VaultResult<Vec<u8>> {
        if !algorithm.is_rsa() {
            return Err(unsupported("sign", algorithm.as_str(), "RSA"));
        }
        check_digest(algorithm, digest)?;

        let private_key = self.private_key();
        let result = match algorithm {
            SignatureAlgorithm::Rs256 => private_key.sign(Pkcs1v15Sign::new::<Sha256>(), digest),
            SignatureAlgorithm::Rs384 => private_key.sign(Pkcs1v15Sign::new::<Sha384>(), digest),
            SignatureAlgorithm::Rs512 => private_key.sign(Pkcs1v15Sign::new::<Sha512>(), digest),
            SignatureAlgorithm::Ps256 => private_key.sign_with_rng(&mut OsRng, Pss::new::<Sha256>(), digest),
            SignatureAlgorithm::Ps384 => private_key.sign_with_rng(&mut OsRng, Pss::new::<Sha384>(), digest),
            _ => private_key.sign_with_rng(&mut OsRng, Pss::new::<Sha512>(), digest),
        };

        result.map_err(|e| {
            VaultError::crypto_failure_for_key(
                "sign",
                &format!("RSA signing failed: {}", e),
                error_codes::SIGNING_FAILED,
                "RSA",
            )
        })
    }

    fn verify(&self, algorithm: SignatureAlgorithm, digest: &[u8], signature: &[u8]) -> VaultResult<bool> {
        if !algorithm.is_rsa() {
            return Err(unsupported("verify", algorithm.as_str(), "RSA"));
        }
        check_digest(algorithm, digest)?;

        let public_key = self.public_key();
        let result = match algorithm {
            SignatureAlgorithm::Rs256 => public_key.verify(Pkcs1v15Sign::new::<Sha256>(), digest, signature),
            SignatureAlgorithm::Rs384 => public_key.verify(Pkcs1v15Sign::new::<Sha384>(), digest, signature),
            SignatureAlgorithm::Rs512 => public_key.verify(Pkcs1v15Sign::new::<Sha512>(), digest, signature),
            SignatureAlgorithm::Ps256 => public_key.verify(Pss::new::<Sha256>(), digest, signature),
            SignatureAlgorithm::Ps384 => public_key.verify(Pss::new::<Sha384>(), digest, signature),
            _ => public_key.verify(Pss::new::<Sha512>(), digest, signature),
        };
        Ok(result.is_ok())
    }
}

impl Signable for EcKey {
    fn sign(&self, algorithm: SignatureAlgorithm, digest: &[u8]) -> VaultResult<Vec<u8>> {
        if algorithm.curve() != Some(self.curve()) {
            return Err(unsupported("sign", algorithm.as_str(), self.curve().as_str()));
        }
        check_digest(algorithm, digest)?;

        let failed = |e: p256::ecdsa::Error| {
            VaultError::crypto_failure_for_key(
                "sign",
                &format!("ECDSA signing failed: {}", e),
                error_codes::SIGNING_FAILED,
                self.curve().as_str(),
            )
        };

        // Signatures are the raw concatenation r || s
        let signature = match self.secret() {
            EcSecret::P256(secret) => {
                let signing_key = p256::ecdsa::SigningKey::from_slice(&secret.to_bytes()).map_err(failed)?;
                let signature: p256::ecdsa::Signature = signing_key.sign_prehash(digest).map_err(failed)?;
                signature.to_bytes().to_vec()
            }
            EcSecret::P384(secret) => {
                let signing_key = p384::ecdsa::SigningKey::from_slice(&secret.to_bytes()).map_err(failed)?;
                let signature: p384::ecdsa::Signature = signing_key.sign_prehash(digest).map_err(failed)?;
                signature.to_bytes().to_vec()
            }
            EcSecret::P521(secret) => {
                let signing_key = p521::ecdsa::SigningKey::from_slice(&secret.to_bytes()).map_err(failed)?;
                let signature: p521::ecdsa::Signature = signing_key.sign_prehash(digest).map_err(failed)?;
                signature.to_bytes().to_vec()
            }
            EcSecret::P256K(secret) => {
                let signing_key = k256::ecdsa::SigningKey::from_slice(&secret.to_bytes()).map_err(failed)?;
                let signature: k256::ecdsa::Signature = signing_key.sign_prehash(digest).map_err(failed)?;
                signature.to_bytes().to_vec()
            }
        };
        Ok(signature)
    }

    fn verify(&self, algorithm: SignatureAlgorithm, digest: &[u8], signature: &[u8]) -> VaultResult<bool> {
        if algorithm.curve() != Some(self.curve()) {
            return Err(unsupported("verify", algorithm.as_str(), self.curve().as_str()));
        }
        check_digest(algorithm, digest)?;

        let point = self.public_point();
        let valid = match self.secret() {
            EcSecret::P256(_) => {
                let parsed = p256::ecdsa::Signature::from_slice(signature);
                let key = p256::ecdsa::VerifyingKey::from_sec1_bytes(&point);
                match (key, parsed) {
                    (Ok(key), Ok(sig)) => key.verify_prehash(digest, &sig).is_ok(),
                    _ => false,
                }
            }
            EcSecret::P384(_) => {
                let parsed = p384::ecdsa::Signature::from_slice(signature);
                let key = p384::ecdsa::VerifyingKey::from_sec1_bytes(&point);
                match (key, parsed) {
                    (Ok(key), Ok(sig)) => key.verify_prehash(digest, &sig).is_ok(),
                    _ => false,
                }
            }
            EcSecret::P521(_) => {
                let parsed = p521::ecdsa::Signature::from_slice(signature);
                let key = p521::ecdsa::VerifyingKey::from_sec1_bytes(&point);
                match (key, parsed) {
                    (Ok(key), Ok(sig)) => key.verify_prehash(digest, &sig).is_ok(),
                    _ => false,
                }
            }
            EcSecret::P256K(_) => {
                let parsed = k256::ecdsa::Signature::from_slice(signature);
                let key = k256::ecdsa::VerifyingKey::from_sec1_bytes(&point);
                match (key, parsed) {
                    (Ok(key), Ok(sig)) => key.verify_prehash(digest, &sig).is_ok(),
                    _ => false,
                }
            }
        };
        Ok(valid)
    }
}

fn check_aes_parameters(key: &AesKey, algorithm: EncryptionAlgorithm, iv: Option<&[u8]>) -> VaultResult<Vec<u8>> {
    let expected = algorithm
        .aes_key_length()
        .ok_or_else(|| unsupported("encrypt", algorithm.as_str(), "oct"))?;
    if key.as_bytes().len() != expected {
        return Err(VaultError::invalid_argument_with_code(
            "algorithm",
            &format!("an algorithm for {} bit keys", key.key_size()),
            algorithm.as_str(),
            error_codes::INVALID_KEY_PARAMETERS,
        ));
    }
    match iv {
        Some(iv) if iv.len() == AES_IV_LENGTH => Ok(iv.to_vec()),
        other => Err(VaultError::invalid_argument_with_code(
            "iv",
            "16 bytes",
            &other
                .map(|iv| format!("{} bytes", iv.len()))
                .unwrap_or_else(|| "none".to_string()),
            error_codes::INVALID_IV,
        )),
    }
}

fn cbc_encrypt<C>(key: &[u8], iv: &[u8], data: &[u8], pkcs7: bool) -> VaultResult<Vec<u8>>
where
    C: BlockEncryptMut + BlockCipher + KeyInit,
{
    let encryptor = cbc::Encryptor::<C>::new_from_slices(key, iv).map_err(|e| {
        VaultError::crypto_failure_for_key(
            "encrypt",
            &format!("Failed to initialize AES-CBC: {}", e),
            error_codes::ENCRYPTION_FAILED,
            "oct",
        )
    })?;
    Ok(if pkcs7 {
        encryptor.encrypt_padded_vec_mut::<Pkcs7>(data)
    } else {
        encryptor.encrypt_padded_vec_mut::<ZeroPadding>(data)
    })
}

fn cbc_decrypt<C>(key: &[u8], iv: &[u8], data: &[u8], pkcs7: bool) -> VaultResult<Vec<u8>>
where
    C: BlockDecryptMut + BlockCipher + KeyInit,
{
    let failed = |cause: String| {
        VaultError::crypto_failure_for_key("decrypt", &cause, error_codes::DECRYPTION_FAILED, "oct")
    };
    let decryptor = cbc::Decryptor::<C>::new_from_slices(key, iv)
        .map_err(|e| failed(format!("Failed to initialize AES-CBC: {}", e)))?;
    let result = if pkcs7 {
        decryptor.decrypt_padded_vec_mut::<Pkcs7>(data)
    } else {
        decryptor.decrypt_padded_vec_mut::<ZeroPadding>(data)
    };
    result.map_err(|e| failed(format!("AES-CBC decryption failed: {}", e)))
}

impl Encryptable for AesKey {
    fn encrypt(
        &self,
        algorithm: EncryptionAlgorithm,
        plaintext: &[u8],
        iv: Option<&[u8]>,
    ) -> VaultResult<Vec<u8>> {
        let iv = check_aes_parameters(self, algorithm, iv)?;
        let pkcs7 = algorithm.uses_pkcs7();
        match self.as_bytes().len() {
            16 => cbc_encrypt::<aes::Aes128>(self.as_bytes(), &iv, plaintext, pkcs7),
            24 => cbc_encrypt::<aes::Aes192>(self.as_bytes(), &iv, plaintext, pkcs7),
            _ => cbc_encrypt::<aes::Aes256>(self.as_bytes(), &iv, plaintext, pkcs7),
        }
    }

    fn decrypt(
        &self,
        algorithm: EncryptionAlgorithm,
        ciphertext: &[u8],
        iv: Option<&[u8]>,
    ) -> VaultResult<Vec<u8>> {
        let iv = check_aes_parameters(self, algorithm, iv)?;
        let pkcs7 = algorithm.uses_pkcs7();
        match self.as_bytes().len() {
            16 => cbc_decrypt::<aes::Aes128>(self.as_bytes(), &iv, ciphertext, pkcs7),
            24 => cbc_decrypt::<aes::Aes192>(self.as_bytes(), &iv, ciphertext, pkcs7),
            _ => cbc_decrypt::<aes::Aes256>(self.as_bytes(), &iv, ciphertext, pkcs7),
        }
    }
}

impl Encryptable for KeyMaterial {
    fn encrypt(
        &self,
        algorithm: EncryptionAlgorithm,
        plaintext: &[u8],
        iv: Option<&[u8]>,
    ) -> VaultResult<Vec<u8>> {
        match self {
            KeyMaterial::Rsa(key) => key.encrypt(algorithm, plaintext, iv),
            KeyMaterial::Aes(key) => key.encrypt(algorithm, plaintext, iv),
            KeyMaterial::Ec(_) => Err(unsupported("encrypt", algorithm.as_str(), "EC")),
        }
    }

    fn decrypt(
        &self,
        algorithm: EncryptionAlgorithm,
        ciphertext: &[u8],
        iv: Option<&[u8]>,
    ) -> VaultResult<Vec<u8>> {
        match self {
            KeyMaterial::Rsa(key) => key.decrypt(algorithm, ciphertext, iv),
            KeyMaterial::Aes(key) => key.decrypt(algorithm, ciphertext, iv),
            KeyMaterial::Ec(_) => Err(unsupported("decrypt", algorithm.as_str(), "EC")),
        }
    }
}

impl Signable for KeyMaterial {
    fn sign(&self, algorithm: SignatureAlgorithm, digest: &[u8]) -> VaultResult<Vec<u8>> {
        match self {
            KeyMaterial::Rsa(key) => key.sign(algorithm, digest),
            KeyMaterial::Ec(key) => key.sign(algorithm, digest),
            KeyMaterial::Aes(_) => Err(unsupported("sign", algorithm.as_str(), "oct")),
        }
    }

    fn verify(&self, algorithm: SignatureAlgorithm, digest: &[u8], signature: &[u8]) -> VaultResult<bool> {
        match self {
            KeyMaterial::Rsa(key) => key.verify(algorithm, digest, signature),
            KeyMaterial::Ec(key) => key.verify(algorithm, digest, signature),
            KeyMaterial::Aes(_) => Err(unsupported("verify", algorithm.as_str(), "oct")),
        }
    }
}
