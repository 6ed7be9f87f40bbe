/* src/holder/meta.rs */

use std::time::{Instant, SystemTime};

/// Where a cached value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
	/// Nothing on disk; type defaults.
	Default,
	/// Read from the source on first access or an explicit reload.
	Loaded,
	/// Re-read after an external change was detected.
	Reloaded,
	/// Written by a save through this process.
	Saved,
	/// Replaced in memory only.
	Silent,
}

/// Metadata associated with a cached entry.
#[derive(Debug, Clone)]
pub struct Meta {
	/// Store-wide counter, bumped on every replacement.
	pub revision: u64,
	/// When the entry was placed in the cache.
	pub loaded_at: Instant,
	/// Wall-clock time of the last successful save, if any.
	pub written_at: Option<SystemTime>,
	/// Fingerprint of the on-disk section this value was read from or
	/// written as. `None` when it has no on-disk counterpart.
	pub fingerprint: Option<u64>,
	pub origin: Origin,
}
