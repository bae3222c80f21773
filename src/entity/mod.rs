/*!
 * Entity identifiers and shared attributes
 *
 * Keys, secrets and certificates share the same identifier shape and
 * attribute set. Identifiers are typed by an entity-kind marker so that a
 * key id cannot be used where a secret id is expected.
 */

mod entity;

pub use entity::*;
