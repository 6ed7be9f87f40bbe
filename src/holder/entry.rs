/* src/holder/entry.rs */

use std::sync::Arc;

use super::Meta;

/// A cached value and its bookkeeping.
#[derive(Debug)]
pub struct Entry<T> {
	/// The snapshot handed out to readers. Never mutated in place.
	pub value: Arc<T>,
	pub meta: Meta,
}

impl<T> Clone for Entry<T> {
	fn clone(&self) -> Self {
		Self {
			value: Arc::clone(&self.value),
			meta: self.meta.clone(),
		}
	}
}
