/* src/loader/source/archive.rs */

use std::io::{Cursor, Read, Write};
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

use super::super::{FmtError, Source};
use super::{Backups, FileSource};

/// A source storing every logical path as one entry of a single zip container.
///
/// Entry updates rewrite the container, so they are serialized even when
/// they touch unrelated entries. The container itself is replaced atomically.
#[derive(Debug)]
pub struct ArchiveSource {
	container: PathBuf,
	prefix: Option<String>,
	file: FileSource,
	write_lock: Mutex<()>,
}

impl ArchiveSource {
	pub fn new(container: impl Into<PathBuf>) -> Self {
		Self {
			container: container.into(),
			prefix: None,
			file: FileSource::new(),
			write_lock: Mutex::new(()),
		}
	}

	/// Nest every entry under `prefix` inside the container.
	pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
		let prefix = prefix.into().trim_matches('/').to_string();
		self.prefix = (!prefix.is_empty()).then_some(prefix);
		self
	}

	/// Keep rotating backups of the container.
	pub fn with_backups(mut self, backups: Backups) -> Self {
		self.file = self.file.with_backups(backups);
		self
	}

	pub fn container(&self) -> &Path {
		&self.container
	}

	/// Name of the entry holding `path`.
	pub fn entry_name(&self, path: &Path) -> String {
		let mut parts: Vec<String> = self.prefix.iter().cloned().collect();
		parts.extend(path.components().filter_map(|c| match c {
			Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
			_ => None,
		}));
		parts.join("/")
	}

	async fn container_bytes(&self) -> Result<Option<Vec<u8>>, FmtError> {
		match fs::read(&self.container).await {
			Ok(bytes) => Ok(Some(bytes)),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
			Err(e) => Err(FmtError::Io(e)),
		}
	}

	/// Lists the entry names currently stored in the container.
	pub async fn entries(&self) -> Result<Vec<String>, FmtError> {
		let Some(bytes) = self.container_bytes().await? else {
			return Ok(Vec::new());
		};
		let archive = ZipArchive::new(Cursor::new(bytes.as_slice())).map_err(archive_error)?;
		Ok(archive.file_names().map(str::to_string).collect())
	}
}

#[async_trait]
impl Source for ArchiveSource {
	async fn read(&self, path: &Path) -> Result<Vec<u8>, FmtError> {
		let bytes = self.container_bytes().await?.ok_or(FmtError::NotFound)?;
		read_entry(&bytes, &self.entry_name(path))
	}

	async fn exists(&self, path: &Path) -> bool {
		self.read(path).await.is_ok()
	}

	async fn write(
		&self,
		path: &Path,
		bytes: &[u8],
		cancel: &CancellationToken,
	) -> Result<(), FmtError> {
		let _guard = tokio::select! {
			biased;
			_ = cancel.cancelled() => return Err(FmtError::Cancelled),
			guard = self.write_lock.lock() => guard,
		};

		let current = self.container_bytes().await?;
		let updated = rewrite(current.as_deref(), &self.entry_name(path), bytes)?;
		self.file.replace(&self.container, &updated, cancel).await
	}

	fn watch_path(&self, _path: &Path) -> Option<PathBuf> {
		Some(self.container.clone())
	}
}

fn read_entry(container: &[u8], name: &str) -> Result<Vec<u8>, FmtError> {
	let mut archive = ZipArchive::new(Cursor::new(container)).map_err(archive_error)?;
	let mut entry = match archive.by_name(name) {
		Ok(entry) => entry,
		Err(ZipError::FileNotFound) => return Err(FmtError::NotFound),
		Err(e) => return Err(archive_error(e)),
	};
	let mut buf = Vec::with_capacity(entry.size() as usize);
	entry.read_to_end(&mut buf)?;
	Ok(buf)
}

/// Builds a new container with `name` set to `bytes` and every other entry kept.
fn rewrite(container: Option<&[u8]>, name: &str, bytes: &[u8]) -> Result<Vec<u8>, FmtError> {
	let mut entries: Vec<(String, Vec<u8>)> = Vec::new();

	if let Some(container) = container {
		let mut archive = ZipArchive::new(Cursor::new(container)).map_err(archive_error)?;
		for i in 0..archive.len() {
			let mut entry = archive.by_index(i).map_err(archive_error)?;
			if entry.is_dir() || entry.name() == name {
				continue;
			}
			let entry_name = entry.name().to_string();
			let mut buf = Vec::with_capacity(entry.size() as usize);
			entry.read_to_end(&mut buf)?;
			entries.push((entry_name, buf));
		}
	}
	entries.push((name.to_string(), bytes.to_vec()));

	let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
	let options = SimpleFileOptions::default();
	for (entry_name, data) in entries {
		writer.start_file(entry_name, options).map_err(archive_error)?;
		writer.write_all(&data)?;
	}
	Ok(writer.finish().map_err(archive_error)?.into_inner())
}

fn archive_error(e: ZipError) -> FmtError {
	FmtError::Archive(e.to_string())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn entries_are_independent() {
		let dir = tempfile::tempdir().unwrap();
		let source = ArchiveSource::new(dir.path().join("settings.zip")).with_prefix("conf/");
		let cancel = CancellationToken::new();

		source.write(Path::new("a.json"), b"{\"a\":1}", &cancel).await.unwrap();
		source.write(Path::new("nested/b.json"), b"{\"b\":2}", &cancel).await.unwrap();
		source.write(Path::new("a.json"), b"{\"a\":3}", &cancel).await.unwrap();

		assert_eq!(source.read(Path::new("a.json")).await.unwrap(), b"{\"a\":3}");
		assert_eq!(source.read(Path::new("nested/b.json")).await.unwrap(), b"{\"b\":2}");

		let mut names = source.entries().await.unwrap();
		names.sort();
		assert_eq!(names, vec!["conf/a.json", "conf/nested/b.json"]);
	}

	#[tokio::test]
	async fn missing_container_or_entry_is_not_found() {
		let dir = tempfile::tempdir().unwrap();
		let source = ArchiveSource::new(dir.path().join("settings.zip"));
		assert!(matches!(source.read(Path::new("a.json")).await, Err(FmtError::NotFound)));

		source
			.write(Path::new("a.json"), b"{}", &CancellationToken::new())
			.await
			.unwrap();
		assert!(matches!(source.read(Path::new("b.json")).await, Err(FmtError::NotFound)));
		assert!(source.exists(Path::new("a.json")).await);
	}

	#[tokio::test]
	async fn concurrent_writers_do_not_lose_entries() {
		let dir = tempfile::tempdir().unwrap();
		let source = std::sync::Arc::new(ArchiveSource::new(dir.path().join("settings.zip")));

		let mut tasks = Vec::new();
		for i in 0..8 {
			let source = source.clone();
			tasks.push(tokio::spawn(async move {
				let path = PathBuf::from(format!("entry{i}.json"));
				source
					.write(&path, format!("{i}").as_bytes(), &CancellationToken::new())
					.await
			}));
		}
		for task in tasks {
			task.await.unwrap().unwrap();
		}

		assert_eq!(source.entries().await.unwrap().len(), 8);
	}
}
