/* src/loader/source/file.rs */

use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use super::super::{FmtError, Source};
use super::Backups;

static STAGING_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A file system source backed by tokio::fs.
///
/// Writes are staged in a temporary file next to the target, flushed, and
/// renamed over it, so readers only ever observe the old or the new content.
#[derive(Debug, Clone, Default)]
pub struct FileSource {
	root: Option<PathBuf>,
	backups: Backups,
}

impl FileSource {
	/// Create a FileSource that uses paths as given.
	pub fn new() -> Self {
		Self::default()
	}

	/// Create a FileSource rooted at the given path.
	///
	/// Relative paths are resolved against the root and may not escape it.
	pub fn rooted(root: impl Into<PathBuf>) -> Self {
		Self {
			root: Some(root.into()),
			backups: Backups::disabled(),
		}
	}

	/// Keep rotating backups of replaced files.
	pub fn with_backups(mut self, backups: Backups) -> Self {
		self.backups = backups;
		self
	}

	pub fn backups(&self) -> Backups {
		self.backups
	}

	/// Resolves the path, ensuring a rooted source stays within its root.
	fn resolve(&self, path: &Path) -> Result<PathBuf, FmtError> {
		let Some(root) = &self.root else {
			return Ok(path.to_path_buf());
		};

		// Basic path traversal check
		if path
			.components()
			.any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)))
		{
			return Err(FmtError::SandboxViolation(path.display().to_string()));
		}
		if path.is_absolute() {
			return if path.starts_with(root) {
				Ok(path.to_path_buf())
			} else {
				Err(FmtError::SandboxViolation(path.display().to_string()))
			};
		}
		Ok(root.join(path))
	}

	/// Writes `bytes` to `target` through a staging file.
	pub(crate) async fn replace(
		&self,
		target: &Path,
		bytes: &[u8],
		cancel: &CancellationToken,
	) -> Result<(), FmtError> {
		if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
			fs::create_dir_all(parent).await?;
		}

		let staging = staging_path(target);
		let staged = async {
			let mut file = fs::File::create(&staging).await?;
			file.write_all(bytes).await?;
			file.sync_all().await?;
			Ok::<_, io::Error>(())
		};

		let outcome = tokio::select! {
			biased;
			_ = cancel.cancelled() => Err(FmtError::Cancelled),
			staged = staged => staged.map_err(FmtError::Io),
		};
		let outcome = match outcome {
			Ok(()) if cancel.is_cancelled() => Err(FmtError::Cancelled),
			Ok(()) => self.backups.rotate(target).await.map_err(FmtError::Io),
			Err(e) => Err(e),
		};
		if let Err(e) = outcome {
			let _ = fs::remove_file(&staging).await;
			return Err(e);
		}

		if let Err(e) = fs::rename(&staging, target).await {
			let _ = fs::remove_file(&staging).await;
			return Err(FmtError::Io(e));
		}
		Ok(())
	}
}

fn staging_path(target: &Path) -> PathBuf {
	let seq = STAGING_COUNTER.fetch_add(1, Ordering::Relaxed);
	let name = target
		.file_name()
		.map(|n| n.to_string_lossy().into_owned())
		.unwrap_or_default();
	target.with_file_name(format!(".{name}.{}.{seq}.tmp", std::process::id()))
}

#[async_trait]
impl Source for FileSource {
	async fn read(&self, path: &Path) -> Result<Vec<u8>, FmtError> {
		let path = self.resolve(path)?;
		match fs::read(&path).await {
			Ok(bytes) => Ok(bytes),
			Err(e) if e.kind() == io::ErrorKind::NotFound => Err(FmtError::NotFound),
			Err(e) => Err(FmtError::Io(e)),
		}
	}

	async fn exists(&self, path: &Path) -> bool {
		match self.resolve(path) {
			Ok(path) => fs::try_exists(path).await.unwrap_or(false),
			Err(_) => false,
		}
	}

	async fn write(
		&self,
		path: &Path,
		bytes: &[u8],
		cancel: &CancellationToken,
	) -> Result<(), FmtError> {
		let target = self.resolve(path)?;
		self.replace(&target, bytes, cancel).await
	}

	fn watch_path(&self, path: &Path) -> Option<PathBuf> {
		self.resolve(path).ok()
	}
}
