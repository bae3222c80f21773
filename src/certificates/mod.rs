/*!
 * Certificates
 *
 * A certificate version owns a key version and, once issued, a secret
 * version of the same name and version token. Self-signed certificates are
 * issued synchronously with rcgen; certificates of unknown issuers wait in
 * the pending state until a signed certificate is merged.
 *
 * Issued certificates are packaged as PEM or PKCS#12 into the linked
 * secret. Lifetime action policies drive automatic renewal when the
 * vault's clock is shifted.
 */

mod entity;
mod generator;
mod lifetime;
mod package;
mod policy;
mod vault;

pub use entity::*;
pub use generator::*;
pub use lifetime::*;
pub use package::*;
pub use policy::*;
pub use vault::*;
