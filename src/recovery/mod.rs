/*!
 * Vault recovery policy
 *
 * The recovery level decides how long soft-deleted entities are retained
 * and whether they can be purged before the retention period ends.
 */

mod recovery;

pub use recovery::*;
