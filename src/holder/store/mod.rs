/* src/holder/store/mod.rs */

mod read;
mod write;

use std::collections::HashMap;
use std::sync::atomic::AtomicU64;

use arc_swap::ArcSwap;

use super::Entry;

/// Thread-safe cache of one snapshot per instance name.
///
/// Uses RCU (Read-Copy-Update): readers load the current map without
/// locking, writers publish a modified copy atomically.
pub struct Store<T> {
	pub(crate) inner: ArcSwap<HashMap<String, Entry<T>>>,
	pub(crate) revision: AtomicU64,
}

impl<T> Store<T>
where
	T: Send + Sync,
{
	/// Creates a new empty store.
	pub fn new() -> Self {
		Self {
			inner: ArcSwap::from_pointee(HashMap::new()),
			revision: AtomicU64::new(0),
		}
	}
}

impl<T> Default for Store<T>
where
	T: Send + Sync,
{
	fn default() -> Self {
		Self::new()
	}
}

impl<T: std::fmt::Debug> std::fmt::Debug for Store<T> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Store")
			.field("entries", &self.inner.load())
			.finish_non_exhaustive()
	}
}
