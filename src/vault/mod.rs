/*!
 * A single emulated vault
 *
 * A vault owns the key, secret and certificate stores of one base URI
 * together with its recovery policy and virtual clock. The stores live
 * behind one reader-writer lock: readers may run side by side, and every
 * mutation (including chain moves between the active and deleted
 * partitions) holds the write lock for its whole duration.
 */

mod vault;

pub use vault::*;
