/*!
 * Registry of emulated vaults
 *
 * Vaults live in an arena of slots; base URIs and aliases index into it.
 * Deleted vaults keep their slot and contents until they are recovered or
 * purged, either explicitly or when their scheduled purge date passes
 * during a time shift.
 */

mod registry;

pub use registry::*;
