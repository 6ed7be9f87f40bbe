/* src/loader/source/backup.rs */

use std::io;
use std::path::{Path, PathBuf};

use tokio::fs;

/// Extension appended to backup files: `<file>.<seq>.bak`.
pub const BACKUP_EXTENSION: &str = "bak";

/// Rotating backup policy applied before a file is replaced.
///
/// Backups are named after the original file with an increasing sequence
/// number, and only the `max` most recent are kept. `max = 0` disables them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Backups {
	max: usize,
}

impl Backups {
	pub const fn disabled() -> Self {
		Self { max: 0 }
	}

	/// Keep at most `max` backups.
	pub const fn keep(max: usize) -> Self {
		Self { max }
	}

	pub fn max(&self) -> usize {
		self.max
	}

	pub fn is_enabled(&self) -> bool {
		self.max > 0
	}

	/// Copies the current content of `path` to a new backup and prunes old ones.
	///
	/// Does nothing when disabled or when `path` does not exist yet.
	pub async fn rotate(&self, path: &Path) -> io::Result<()> {
		if !self.is_enabled() || !fs::try_exists(path).await? {
			return Ok(());
		}

		let mut existing = scan(path).await?;
		let next = existing.last().map_or(1, |(seq, _)| seq + 1);
		let backup = backup_path(path, next);
		fs::copy(path, &backup).await?;
		existing.push((next, backup));

		let excess = existing.len().saturating_sub(self.max);
		for (_, old) in existing.drain(..excess) {
			match fs::remove_file(&old).await {
				Ok(()) => {}
				Err(e) if e.kind() == io::ErrorKind::NotFound => {}
				Err(e) => return Err(e),
			}
		}
		Ok(())
	}

	/// Lists the backups of `path`, oldest first.
	pub async fn list(path: &Path) -> io::Result<Vec<PathBuf>> {
		Ok(scan(path).await?.into_iter().map(|(_, p)| p).collect())
	}
}

fn backup_path(path: &Path, seq: u64) -> PathBuf {
	let mut name = path.file_name().unwrap_or_default().to_os_string();
	name.push(format!(".{seq}.{BACKUP_EXTENSION}"));
	path.with_file_name(name)
}

fn parent_dir(path: &Path) -> &Path {
	match path.parent() {
		Some(parent) if !parent.as_os_str().is_empty() => parent,
		_ => Path::new("."),
	}
}

async fn scan(path: &Path) -> io::Result<Vec<(u64, PathBuf)>> {
	let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
		return Ok(Vec::new());
	};
	let prefix = format!("{file_name}.");
	let suffix = format!(".{BACKUP_EXTENSION}");

	let mut found = Vec::new();
	let mut entries = match fs::read_dir(parent_dir(path)).await {
		Ok(entries) => entries,
		Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(found),
		Err(e) => return Err(e),
	};
	while let Some(entry) = entries.next_entry().await? {
		let name = entry.file_name();
		let Some(name) = name.to_str() else { continue };
		let seq = name
			.strip_prefix(&prefix)
			.and_then(|rest| rest.strip_suffix(&suffix))
			.and_then(|seq| seq.parse::<u64>().ok());
		if let Some(seq) = seq {
			found.push((seq, entry.path()));
		}
	}
	found.sort_by_key(|(seq, _)| *seq);
	Ok(found)
}
