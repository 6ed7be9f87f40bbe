/* src/loader/source/mod.rs */

mod backup;
pub use backup::{BACKUP_EXTENSION, Backups};

mod memory;
pub use memory::MemorySource;

mod file;
pub use file::FileSource;

#[cfg(feature = "archive")]
mod archive;
#[cfg(feature = "archive")]
pub use archive::ArchiveSource;
