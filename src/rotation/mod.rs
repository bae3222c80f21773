/*!
 * Key rotation policies
 *
 * A rotation policy sets the expiry of new key versions and carries a
 * single rotate action triggered either some time after creation or some
 * time before expiry. Periods are ISO-8601 date periods evaluated in
 * calendar days.
 */

mod period;
mod policy;

pub use period::*;
pub use policy::*;

#[cfg(test)]
mod tests;
