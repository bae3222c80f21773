/*!
 * Backup and restore of keys, secrets and certificates
 *
 * A backup captures every active version of one name, oldest first, with
 * its attributes and material plus the attached rotation or lifetime
 * action policy. Restoring replays the versions with their original
 * version tokens and timestamps, so backing up a restored entity yields
 * the same backup again.
 */

mod codec;
mod snapshot;

pub use codec::*;
pub use snapshot::*;

#[cfg(test)]
mod tests;
