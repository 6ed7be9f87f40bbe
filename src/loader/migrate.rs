/* src/loader/migrate.rs */

//!
//! Versioned schema upgrades.
//!
//! A [`Migrations`] chain belongs to one target type and holds one step per
//! source version. Loading a document of an older version applies steps in
//! order until the target version is reached.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::tree::{self, KeyPath, Node, Scalar};

/// A type carrying an integer schema version.
pub trait Versioned {
	/// Schema version of this type.
	const VERSION: u32;

	/// Field holding the version inside a serialized section.
	const VERSION_KEY: &'static str = "Version";
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MigrationError {
	/// A step must strictly increase the version.
	#[error("migration step {from} -> {to} does not increase the version")]
	NotAnUpgrade { from: u32, to: u32 },

	/// Two steps start from the same version.
	#[error("duplicate migration step from version {from}")]
	DuplicateStep { from: u32 },

	/// No step leads from the on-disk version towards the target.
	#[error("no migration step from version {found} (target version {target})")]
	MissingStep { found: u32, target: u32 },

	/// A step failed on the document it was given.
	#[error("migration step {from} -> {to} failed: {message}")]
	Step { from: u32, to: u32, message: String },
}

type Transform = Arc<dyn Fn(Node) -> Result<Node, String> + Send + Sync>;

struct Step {
	to: u32,
	transform: Transform,
}

/// The ordered upgrade chain for one target type.
#[derive(Clone)]
pub struct Migrations {
	target: u32,
	key: &'static str,
	steps: BTreeMap<u32, Arc<Step>>,
}

impl Migrations {
	/// Starts an empty chain ending at `T::VERSION`.
	pub fn new<T: Versioned>() -> Self {
		Self {
			target: T::VERSION,
			key: T::VERSION_KEY,
			steps: BTreeMap::new(),
		}
	}

	/// Registers an infallible upgrade from `A` to `B`.
	pub fn step<A, B, F>(self, transform: F) -> Result<Self, MigrationError>
	where
		A: Versioned + DeserializeOwned,
		B: Versioned + Serialize,
		F: Fn(A) -> B + Send + Sync + 'static,
	{
		self.try_step::<A, B, _, std::convert::Infallible>(move |a| Ok(transform(a)))
	}

	/// Registers a fallible upgrade from `A` to `B`.
	pub fn try_step<A, B, F, E>(mut self, transform: F) -> Result<Self, MigrationError>
	where
		A: Versioned + DeserializeOwned,
		B: Versioned + Serialize,
		F: Fn(A) -> Result<B, E> + Send + Sync + 'static,
		E: fmt::Display,
	{
		let (from, to) = (A::VERSION, B::VERSION);
		if to <= from {
			return Err(MigrationError::NotAnUpgrade { from, to });
		}
		if self.steps.contains_key(&from) {
			return Err(MigrationError::DuplicateStep { from });
		}

		let key = self.key;
		let transform: Transform = Arc::new(move |node: Node| {
			let old: A = tree::from_node(node).map_err(|e| e.to_string())?;
			let new = transform(old).map_err(|e| e.to_string())?;
			let mut node = tree::to_node(&new).map_err(|e| e.to_string())?;
			stamp(&mut node, key, to);
			Ok(node)
		});
		self.steps.insert(from, Arc::new(Step { to, transform }));
		Ok(self)
	}

	/// Version every upgrade ends at.
	pub fn target(&self) -> u32 {
		self.target
	}

	/// Field holding the version in a section.
	pub fn key(&self) -> &'static str {
		self.key
	}

	pub fn len(&self) -> usize {
		self.steps.len()
	}

	pub fn is_empty(&self) -> bool {
		self.steps.is_empty()
	}

	/// Version recorded in `section`. A missing field counts as version 0.
	pub fn version_of(&self, section: &Node) -> u32 {
		section
			.get(&KeyPath::root().field(self.key))
			.and_then(Node::as_i64)
			.and_then(|v| u32::try_from(v).ok())
			.unwrap_or(0)
	}

	/// Upgrades `section` to the target version.
	///
	/// Returns the upgraded node and the number of steps applied.
	pub fn upgrade(&self, mut section: Node) -> Result<(Node, usize), MigrationError> {
		let mut version = self.version_of(&section);
		let mut applied = 0;

		while version != self.target {
			let step = self
				.steps
				.get(&version)
				.filter(|_| version < self.target)
				.ok_or(MigrationError::MissingStep {
					found: version,
					target: self.target,
				})?;
			section = (step.transform)(section).map_err(|message| MigrationError::Step {
				from: version,
				to: step.to,
				message,
			})?;
			version = step.to;
			applied += 1;
		}
		Ok((section, applied))
	}

	/// Records the target version in a section about to be written.
	pub fn stamp(&self, section: &mut Node) {
		stamp(section, self.key, self.target);
	}
}

fn stamp(node: &mut Node, key: &str, version: u32) {
	if let Some(map) = node.as_object_mut() {
		map.insert(key.to_string(), Node::Scalar(Scalar::Int(i64::from(version))));
	}
}

impl fmt::Debug for Migrations {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Migrations")
			.field("target", &self.target)
			.field("key", &self.key)
			.field(
				"steps",
				&self.steps.iter().map(|(from, s)| (*from, s.to)).collect::<Vec<_>>(),
			)
			.finish()
	}
}
