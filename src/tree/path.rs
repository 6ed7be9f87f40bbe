/* src/tree/path.rs */

use std::fmt;

/// Hierarchical separator for paths.
pub const SEPARATOR: &str = ":";

/// Alternative separator accepted wherever `:` is (e.g. in env-style keys).
pub const ALT_SEPARATOR: &str = "__";

/// An ordered list of node names locating a subtree.
///
/// Used both for section paths inside a document and for nested keys
/// relative to a value's own root. `"A:B"` and `"A__B"` parse to the
/// same segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct KeyPath {
	segments: Vec<String>,
}

impl KeyPath {
	/// The empty path, addressing the whole document.
	pub fn root() -> Self {
		Self::default()
	}

	/// Parses a colon- or double-underscore-joined path. Empty segments are
	/// skipped.
	pub fn parse(path: &str) -> Self {
		let normalized = path.replace(ALT_SEPARATOR, SEPARATOR);
		Self {
			segments: normalized
				.split(SEPARATOR)
				.map(str::trim)
				.filter(|s| !s.is_empty())
				.map(str::to_string)
				.collect(),
		}
	}

	/// Appends a single field name.
	pub fn field(mut self, name: impl Into<String>) -> Self {
		self.segments.push(name.into());
		self
	}

	pub fn segments(&self) -> &[String] {
		&self.segments
	}

	pub fn is_root(&self) -> bool {
		self.segments.is_empty()
	}

	/// Returns true if `self` equals `other` or one is an ancestor of the other.
	pub fn overlaps(&self, other: &KeyPath) -> bool {
		self.segments
			.iter()
			.zip(other.segments.iter())
			.all(|(a, b)| a == b)
	}
}

impl fmt::Display for KeyPath {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.segments.join(SEPARATOR))
	}
}

impl From<&str> for KeyPath {
	fn from(path: &str) -> Self {
		Self::parse(path)
	}
}

impl From<String> for KeyPath {
	fn from(path: String) -> Self {
		Self::parse(&path)
	}
}

impl<S: Into<String>> FromIterator<S> for KeyPath {
	fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
		Self {
			segments: iter.into_iter().map(Into::into).collect(),
		}
	}
}
