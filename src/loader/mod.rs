/* src/loader/mod.rs */

//!
//! Format-agnostic, section-scoped loading and saving.
//!
//! - [`Format`] converts raw bytes to and from a [`Node`] tree.
//! - [`Source`] reads and atomically writes raw bytes for a path.
//! - [`Migrations`] upgrades older on-disk schemas to the current type.
//! - [`Provider`] ties the three together for one section of one file.

pub mod error;
pub mod format;
pub mod migrate;
pub mod provider;
pub mod source;

pub use error::FmtError;
pub use format::AnyFormat;
pub use migrate::{MigrationError, Migrations, Versioned};
pub use provider::Provider;
pub use source::{Backups, FileSource, MemorySource};

#[cfg(feature = "archive")]
pub use source::ArchiveSource;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::tree::Node;

/// Result of a loading operation.
#[derive(Debug)]
pub enum LoadResult<T> {
	/// Successfully loaded and parsed.
	Ok {
		value: T,
		/// Fingerprint of the section as found on disk.
		fingerprint: u64,
		/// Number of migration steps applied.
		migrated: usize,
	},
	/// No file, or no section at the configured path.
	NotFound,
	/// Resource exists but is invalid.
	Invalid(FmtError),
}

/// Abstract format that converts bytes to and from a document tree.
pub trait Format: Send + Sync {
	/// List of supported extensions or identifiers.
	fn extensions(&self) -> &'static [&'static str];

	/// Parse the raw bytes into a tree.
	fn parse(&self, input: &[u8]) -> Result<Node, FmtError>;

	/// Render a tree back into bytes.
	fn render(&self, node: &Node) -> Result<Vec<u8>, FmtError>;
}

/// Abstract byte store addressed by path.
#[async_trait]
pub trait Source: Send + Sync {
	/// Read raw data as a vector of bytes. Missing data is [`FmtError::NotFound`].
	async fn read(&self, path: &Path) -> Result<Vec<u8>, FmtError>;

	/// Check if the resource exists at the given path.
	async fn exists(&self, path: &Path) -> bool;

	/// Atomically replace the data at `path`.
	///
	/// A cancelled write returns [`FmtError::Cancelled`] and leaves the
	/// previous content in place.
	async fn write(
		&self,
		path: &Path,
		bytes: &[u8],
		cancel: &CancellationToken,
	) -> Result<(), FmtError>;

	/// The real file whose changes affect `path`, if it can be watched.
	fn watch_path(&self, _path: &Path) -> Option<PathBuf> {
		None
	}
}
