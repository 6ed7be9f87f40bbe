/* src/loader/error.rs */

use super::migrate::MigrationError;

/// Core error type for the loader module.
#[derive(Debug, thiserror::Error)]
pub enum FmtError {
	/// Parsing error from format implementation.
	#[error("parse error: {0}")]
	ParseError(String),

	/// Rendering a document back to bytes failed.
	#[error("render error: {0}")]
	Render(String),

	/// A tree did not match the shape of the target type (or vice versa).
	#[error("shape error: {0}")]
	Shape(String),

	/// Resource not found.
	#[error("not found")]
	NotFound,

	/// IO error from source.
	#[error("io error: {0}")]
	Io(#[from] std::io::Error),

	/// Sandbox violation in file system source.
	#[error("sandbox violation: {0}")]
	SandboxViolation(String),

	/// Archive container could not be read or written.
	#[error("archive error: {0}")]
	Archive(String),

	/// The on-disk document could not be upgraded to the current schema.
	#[error(transparent)]
	Migration(#[from] MigrationError),

	/// The operation was cancelled before anything was persisted.
	#[error("operation cancelled")]
	Cancelled,
}

impl FmtError {
	/// Migration failures are never papered over with defaults.
	pub fn is_migration(&self) -> bool {
		matches!(self, FmtError::Migration(_))
	}

	/// The document exists but its content could not be understood.
	pub fn is_malformed(&self) -> bool {
		matches!(self, FmtError::ParseError(_) | FmtError::Shape(_))
	}
}
