/*!
 * Versioned entity store
 *
 * Generic append-only storage of version chains with an active and a
 * deleted partition. A name lives in at most one of the two partitions;
 * soft delete, recover and purge move or drop whole chains.
 *
 * The store is instantiated once per entity family (keys, secrets,
 * certificates) inside every vault.
 */

mod partition;
mod store;

pub use partition::*;
pub use store::*;

#[cfg(test)]
mod tests;
