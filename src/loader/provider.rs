/* src/loader/provider.rs */

//!
//! Section-scoped read, merge and write of one document.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use super::{FmtError, Format, LoadResult, Migrations, Source};
use crate::tree::{self, KeyPath, Node};

/// Binds a format and a source to one section of one file.
#[derive(Clone)]
pub struct Provider {
	format: Arc<dyn Format>,
	source: Arc<dyn Source>,
	path: PathBuf,
	section: KeyPath,
	migrations: Option<Migrations>,
}

/// State read at the start of a write.
#[derive(Debug)]
pub struct Draft<T> {
	/// The whole document, `None` if the file does not exist.
	pub document: Option<Node>,
	/// The section as found on disk, before any migration.
	pub existing: Option<Node>,
	/// The current value, or defaults when the section is absent.
	pub value: T,
	/// Number of migration steps applied to produce `value`.
	pub migrated: usize,
}

impl Provider {
	pub fn new(
		format: Arc<dyn Format>,
		source: Arc<dyn Source>,
		path: impl Into<PathBuf>,
		section: KeyPath,
	) -> Self {
		Self {
			format,
			source,
			path: path.into(),
			section,
			migrations: None,
		}
	}

	pub fn with_migrations(mut self, migrations: Migrations) -> Self {
		self.migrations = Some(migrations);
		self
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	pub fn section(&self) -> &KeyPath {
		&self.section
	}

	pub fn format(&self) -> &dyn Format {
		self.format.as_ref()
	}

	pub fn source(&self) -> &Arc<dyn Source> {
		&self.source
	}

	pub fn migrations(&self) -> Option<&Migrations> {
		self.migrations.as_ref()
	}

	/// The real file to watch for external changes.
	pub fn watch_path(&self) -> Option<PathBuf> {
		self.source.watch_path(&self.path)
	}

	/// Identifies the document this provider reads and writes. Providers
	/// with the same key share one file.
	pub fn document_key(&self) -> PathBuf {
		self.watch_path().unwrap_or_else(|| self.path.clone())
	}

	/// Reads and parses the whole document. A missing file is `None`.
	pub async fn document(&self) -> Result<Option<Node>, FmtError> {
		match self.source.read(&self.path).await {
			Ok(bytes) => self.format.parse(&bytes).map(Some),
			Err(FmtError::NotFound) => Ok(None),
			Err(e) => Err(e),
		}
	}

	/// Locates this provider's section inside `document`.
	pub fn section_of<'a>(&self, document: &'a Node) -> Option<&'a Node> {
		document.get(&self.section).filter(|node| !node.is_null())
	}

	/// Deserializes a section, upgrading it first when migrations are set.
	pub fn extract<T: DeserializeOwned>(&self, section: Option<&Node>) -> LoadResult<T> {
		let Some(section) = section else {
			return LoadResult::NotFound;
		};
		let fingerprint = section.fingerprint();

		let (node, migrated) = match &self.migrations {
			Some(chain) => match chain.upgrade(section.clone()) {
				Ok(upgraded) => upgraded,
				Err(e) => return LoadResult::Invalid(e.into()),
			},
			None => (section.clone(), 0),
		};

		match tree::from_node(node) {
			Ok(value) => LoadResult::Ok {
				value,
				fingerprint,
				migrated,
			},
			Err(e) => LoadResult::Invalid(e),
		}
	}

	/// Loads the typed value of this section.
	pub async fn load<T: DeserializeOwned>(&self) -> LoadResult<T> {
		match self.document().await {
			Ok(Some(document)) => self.extract(self.section_of(&document)),
			Ok(None) => LoadResult::NotFound,
			Err(e) => LoadResult::Invalid(e),
		}
	}

	/// Reads the document fresh and resolves the value a write starts from.
	///
	/// An absent section starts from `T::default()`. A document that cannot
	/// be parsed or upgraded is an error so it is never overwritten blindly.
	pub async fn begin<T: DeserializeOwned + Default>(&self) -> Result<Draft<T>, FmtError> {
		let document = self.document().await?;
		let existing = document
			.as_ref()
			.and_then(|doc| self.section_of(doc))
			.cloned();

		let (value, migrated) = match self.extract(existing.as_ref()) {
			LoadResult::Ok { value, migrated, .. } => (value, migrated),
			LoadResult::NotFound => (T::default(), 0),
			LoadResult::Invalid(e) => return Err(e),
		};

		Ok(Draft {
			document,
			existing,
			value,
			migrated,
		})
	}

	/// Builds the section node to persist for `candidate`.
	///
	/// Keys missing from the on-disk section stay missing unless the value
	/// differs from `baseline`, so a deleted key remains deleted on later
	/// saves. Deletion paths are then removed and the version is stamped.
	pub fn prepare<T: Serialize>(
		&self,
		candidate: &T,
		existing: Option<&Node>,
		baseline: &Node,
		deletions: &[KeyPath],
		migrated: bool,
	) -> Result<Node, FmtError> {
		let mut node = tree::to_node(candidate)?;
		if let Some(existing) = existing.filter(|_| !migrated) {
			node.retain_changed(existing, baseline);
		}
		for key in deletions {
			node.remove(key);
		}
		if let Some(chain) = &self.migrations {
			chain.stamp(&mut node);
		}
		Ok(node)
	}

	/// Merges `section` into `document` and writes the result.
	///
	/// Everything outside the section is kept. The root section replaces the
	/// whole document. Returns the fingerprint the section will have when it
	/// is read back.
	pub async fn commit(
		&self,
		document: Option<Node>,
		section: Node,
		cancel: &CancellationToken,
	) -> Result<u64, FmtError> {
		let (bytes, fingerprint) = self.render(document, section)?;
		self.write(&bytes, cancel).await?;
		Ok(fingerprint)
	}

	/// The first half of [`commit`](Self::commit): the bytes to write and
	/// the fingerprint the section will have when read back.
	pub fn render(&self, document: Option<Node>, section: Node) -> Result<(Vec<u8>, u64), FmtError> {
		let mut document = document.unwrap_or_default();
		let fallback = section.fingerprint();
		document.set(&self.section, section);

		let bytes = self.format.render(&document)?;
		let fingerprint = self
			.format
			.parse(&bytes)
			.ok()
			.and_then(|reparsed| self.section_of(&reparsed).map(Node::fingerprint))
			.unwrap_or(fallback);
		Ok((bytes, fingerprint))
	}

	/// Writes rendered bytes to the backing document.
	pub async fn write(&self, bytes: &[u8], cancel: &CancellationToken) -> Result<(), FmtError> {
		self.source.write(&self.path, bytes, cancel).await
	}

	/// Writes `value` into the section, deleting `deletions` from it.
	pub async fn save<T>(
		&self,
		value: &T,
		deletions: &[KeyPath],
		cancel: &CancellationToken,
	) -> Result<u64, FmtError>
	where
		T: Serialize + DeserializeOwned + Default,
	{
		let draft = self.begin::<T>().await?;
		let baseline = tree::to_node(&draft.value)?;
		let section = self.prepare(
			value,
			draft.existing.as_ref(),
			&baseline,
			deletions,
			draft.migrated > 0,
		)?;
		self.commit(draft.document, section, cancel).await
	}
}

impl fmt::Debug for Provider {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Provider")
			.field("extensions", &self.format.extensions())
			.field("path", &self.path)
			.field("section", &self.section.to_string())
			.field("migrations", &self.migrations)
			.finish_non_exhaustive()
	}
}
