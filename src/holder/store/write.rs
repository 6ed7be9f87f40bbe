/* src/holder/store/write.rs */

use std::cell::RefCell;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Instant, SystemTime};

use super::super::{Entry, Meta, Origin};
use super::Store;

impl<T> Store<T>
where
	T: Send + Sync,
{
	fn entry(&self, value: Arc<T>, origin: Origin, fingerprint: Option<u64>) -> Entry<T> {
		let revision = self.revision.fetch_add(1, Ordering::SeqCst) + 1;
		Entry {
			value,
			meta: Meta {
				revision,
				loaded_at: Instant::now(),
				written_at: (origin == Origin::Saved).then(SystemTime::now),
				fingerprint,
				origin,
			},
		}
	}

	/// Inserts or replaces the entry for `name`. Never notifies anyone.
	pub fn insert(
		&self,
		name: &str,
		value: Arc<T>,
		origin: Origin,
		fingerprint: Option<u64>,
	) -> Entry<T> {
		let mut new_entry = self.entry(value, origin, fingerprint);

		// Keep the last write time across reloads.
		let previous_write: RefCell<Option<SystemTime>> = RefCell::new(None);
		self.inner.rcu(|map| {
			*previous_write.borrow_mut() = map.get(name).and_then(|e| e.meta.written_at);
			let mut new_map = (**map).clone();
			let mut entry = new_entry.clone();
			entry.meta.written_at = entry.meta.written_at.or(*previous_write.borrow());
			new_map.insert(name.to_string(), entry);
			new_map
		});

		new_entry.meta.written_at = new_entry.meta.written_at.or(previous_write.into_inner());
		new_entry
	}

	/// Inserts `value` unless an entry already exists; returns the entry that
	/// ends up cached.
	pub fn insert_if_absent(
		&self,
		name: &str,
		value: Arc<T>,
		origin: Origin,
		fingerprint: Option<u64>,
	) -> Entry<T> {
		let candidate = self.entry(value, origin, fingerprint);
		let winner: RefCell<Option<Entry<T>>> = RefCell::new(None);

		self.inner.rcu(|map| {
			if let Some(existing) = map.get(name) {
				*winner.borrow_mut() = Some(existing.clone());
				return Arc::clone(map);
			}
			*winner.borrow_mut() = Some(candidate.clone());
			let mut new_map = (**map).clone();
			new_map.insert(name.to_string(), candidate.clone());
			Arc::new(new_map)
		});

		winner.into_inner().unwrap_or(candidate)
	}

	/// Replaces the entry only if its revision is still `expected`.
	///
	/// `expected = None` requires that no entry exists. Returns the new entry
	/// when the replacement happened, `None` when another writer got there
	/// first.
	pub fn replace_if(
		&self,
		name: &str,
		expected: Option<u64>,
		value: Arc<T>,
		origin: Origin,
		fingerprint: Option<u64>,
	) -> Option<Entry<T>> {
		let candidate = self.entry(value, origin, fingerprint);
		let replaced: RefCell<Option<Entry<T>>> = RefCell::new(None);

		self.inner.rcu(|map| {
			let current = map.get(name);
			if current.map(|e| e.meta.revision) != expected {
				*replaced.borrow_mut() = None;
				return Arc::clone(map);
			}
			let mut entry = candidate.clone();
			entry.meta.written_at = current.and_then(|e| e.meta.written_at);
			let mut new_map = (**map).clone();
			new_map.insert(name.to_string(), entry.clone());
			*replaced.borrow_mut() = Some(entry);
			Arc::new(new_map)
		});

		replaced.into_inner()
	}

	/// Removes the entry for `name`, returning it if there was one.
	pub fn remove(&self, name: &str) -> Option<Entry<T>> {
		if !self.inner.load().contains_key(name) {
			return None;
		}

		let removed: RefCell<Option<Entry<T>>> = RefCell::new(None);
		self.inner.rcu(|map| {
			let mut new_map = (**map).clone();
			*removed.borrow_mut() = new_map.remove(name);
			new_map
		});
		removed.into_inner()
	}
}
