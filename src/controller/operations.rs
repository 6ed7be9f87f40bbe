/* src/controller/operations.rs */

use std::fmt;

use crate::tree::KeyPath;

/// How a save derives the new value from the current one.
pub enum Update<T> {
	/// Keep the current value; only deletions apply.
	Keep,
	/// Replace the value wholesale.
	Replace(T),
	/// Mutate the current value in place.
	Mutate(Box<dyn FnOnce(&mut T) + Send>),
	/// Map the current value to a new one.
	Map(Box<dyn FnOnce(T) -> T + Send>),
}

impl<T> Update<T> {
	pub(crate) fn apply(self, current: T) -> T {
		match self {
			Update::Keep => current,
			Update::Replace(value) => value,
			Update::Mutate(f) => {
				let mut current = current;
				f(&mut current);
				current
			}
			Update::Map(f) => f(current),
		}
	}
}

impl<T> fmt::Debug for Update<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Update::Keep => "Keep",
			Update::Replace(_) => "Replace",
			Update::Mutate(_) => "Mutate",
			Update::Map(_) => "Map",
		})
	}
}

/// One save request: an update plus the keys to drop from the persisted
/// section.
///
/// Deleted keys fall back to their type defaults in memory. Paths are
/// relative to the value's own root and deduplicated in insertion order.
///
/// ```
/// use settle::controller::Operations;
///
/// #[derive(Default)]
/// struct Window {
///     width: u32,
/// }
///
/// let ops = Operations::mutate(|w: &mut Window| w.width = 800)
///     .delete("Theme:Accent")
///     .delete("Theme__Accent");
/// assert_eq!(ops.deletions().len(), 1);
/// ```
pub struct Operations<T> {
	update: Update<T>,
	deletions: Vec<KeyPath>,
}

impl<T> Default for Operations<T> {
	fn default() -> Self {
		Self::new()
	}
}

impl<T> Operations<T> {
	/// An operation set that changes nothing until deletions are added.
	pub fn new() -> Self {
		Self {
			update: Update::Keep,
			deletions: Vec::new(),
		}
	}

	pub fn replace(value: T) -> Self {
		Self::new().with_update(Update::Replace(value))
	}

	pub fn mutate<F>(f: F) -> Self
	where
		F: FnOnce(&mut T) + Send + 'static,
	{
		Self::new().with_update(Update::Mutate(Box::new(f)))
	}

	pub fn map<F>(f: F) -> Self
	where
		F: FnOnce(T) -> T + Send + 'static,
	{
		Self::new().with_update(Update::Map(Box::new(f)))
	}

	pub fn with_update(mut self, update: Update<T>) -> Self {
		self.update = update;
		self
	}

	/// Removes `key` from the persisted section.
	pub fn delete(mut self, key: impl Into<KeyPath>) -> Self {
		let key = key.into();
		if !key.is_root() && !self.deletions.contains(&key) {
			self.deletions.push(key);
		}
		self
	}

	pub fn deletions(&self) -> &[KeyPath] {
		&self.deletions
	}

	pub fn update(&self) -> &Update<T> {
		&self.update
	}

	pub(crate) fn into_parts(self) -> (Update<T>, Vec<KeyPath>) {
		(self.update, self.deletions)
	}
}

impl<T> fmt::Debug for Operations<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Operations")
			.field("update", &self.update)
			.field(
				"deletions",
				&self.deletions.iter().map(ToString::to_string).collect::<Vec<_>>(),
			)
			.finish()
	}
}
