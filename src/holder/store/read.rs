/* src/holder/store/read.rs */

use std::sync::Arc;

use super::super::{Entry, Meta};
use super::Store;

impl<T> Store<T>
where
	T: Send + Sync,
{
	/// Gets the cached value by name. This is a wait-free operation.
	pub fn get(&self, name: &str) -> Option<Arc<T>> {
		let snapshot = self.inner.load();
		snapshot.get(name).map(|entry| Arc::clone(&entry.value))
	}

	/// Gets metadata for a cached value.
	pub fn get_meta(&self, name: &str) -> Option<Meta> {
		let snapshot = self.inner.load();
		snapshot.get(name).map(|entry| entry.meta.clone())
	}

	/// Gets the full entry (value + metadata) by name.
	pub fn get_entry(&self, name: &str) -> Option<Entry<T>> {
		let snapshot = self.inner.load();
		snapshot.get(name).cloned()
	}

	/// Returns the names of all cached entries.
	pub fn names(&self) -> Vec<String> {
		let snapshot = self.inner.load();
		snapshot.keys().cloned().collect()
	}

	pub fn len(&self) -> usize {
		self.inner.load().len()
	}

	pub fn is_empty(&self) -> bool {
		self.inner.load().is_empty()
	}
}
