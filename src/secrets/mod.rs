/*!
 * Versioned secrets
 *
 * A secret version holds an opaque string value and an optional content
 * type. Secrets created by a certificate are managed: they carry the
 * certificate's packaged key and certificate and cannot be deleted,
 * recovered or purged on their own.
 */

mod entity;
mod vault;

pub use entity::*;
pub use vault::*;

#[cfg(test)]
mod tests;
