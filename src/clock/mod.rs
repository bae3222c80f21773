/*!
 * Virtual clock for deterministic time handling
 *
 * Every vault reads "now" through its own clock. The clock can be shifted
 * forward so that expiry, rotation and renewal logic can be exercised
 * without sleeping.
 */

mod clock;

pub use clock::*;

#[cfg(test)]
mod tests;
