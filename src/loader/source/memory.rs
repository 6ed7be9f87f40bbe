/* src/loader/source/memory.rs */

use super::super::{FmtError, Source};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use tokio_util::sync::CancellationToken;

/// A simple in-memory source useful for testing and embedded environments.
///
/// Clones share the same data, so a test can keep a handle and inspect
/// what was written.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
	data: Arc<RwLock<BTreeMap<PathBuf, Vec<u8>>>>,
}

impl MemorySource {
	/// Creates a new empty MemorySource.
	pub fn new() -> Self {
		Self::default()
	}

	/// Inserts data into the source.
	pub fn insert(&self, path: impl Into<PathBuf>, value: impl Into<Vec<u8>>) {
		self.data
			.write()
			.unwrap_or_else(PoisonError::into_inner)
			.insert(path.into(), value.into());
	}

	/// Returns a copy of the data stored at `path`.
	pub fn get(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
		self.data
			.read()
			.unwrap_or_else(PoisonError::into_inner)
			.get(path.as_ref())
			.cloned()
	}

	/// Returns the data at `path` as UTF-8 text.
	pub fn get_string(&self, path: impl AsRef<Path>) -> Option<String> {
		self.get(path).map(|b| String::from_utf8_lossy(&b).into_owned())
	}

	pub fn remove(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
		self.data
			.write()
			.unwrap_or_else(PoisonError::into_inner)
			.remove(path.as_ref())
	}
}

#[async_trait]
impl Source for MemorySource {
	async fn read(&self, path: &Path) -> Result<Vec<u8>, FmtError> {
		self.get(path).ok_or(FmtError::NotFound)
	}

	async fn exists(&self, path: &Path) -> bool {
		self.data
			.read()
			.unwrap_or_else(PoisonError::into_inner)
			.contains_key(path)
	}

	async fn write(
		&self,
		path: &Path,
		bytes: &[u8],
		cancel: &CancellationToken,
	) -> Result<(), FmtError> {
		if cancel.is_cancelled() {
			return Err(FmtError::Cancelled);
		}
		self.insert(path, bytes);
		Ok(())
	}
}
