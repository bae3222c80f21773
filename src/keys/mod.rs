/*!
 * Keys and the key cryptography engine
 *
 * Key material is a closed set of RSA, EC and AES variants. Encryption
 * and signing go through the `Encryptable` and `Signable` traits, and every
 * operation is checked against the operations allowed on the key version
 * before any cryptography happens.
 *
 * Supported algorithms:
 *
 * - RSA: RSA-OAEP, RSA-OAEP-256, RSA1_5, RS256/384/512, PS256/384/512
 * - EC: ES256 (P-256), ES384 (P-384), ES512 (P-521), ES256K (P-256K)
 * - AES: A128/192/256CBC with zero padding, A128/192/256CBCPAD with PKCS#7
 */

mod engine;
mod entity;
mod jwk;
mod material;
mod types;
mod vault;

pub use engine::*;
pub use entity::*;
pub use jwk::*;
pub use material::*;
pub use types::*;
pub use vault::*;

#[cfg(test)]
mod tests;
