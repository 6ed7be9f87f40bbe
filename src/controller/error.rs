/* src/controller/error.rs */

use thiserror::Error;

use super::ValidationError;
use crate::loader::{FmtError, MigrationError};

/// Errors surfaced by [`Settings`](super::Settings) operations.
#[derive(Debug, Error)]
pub enum SettingsError {
	#[error("Load error: {0}")]
	Load(FmtError),

	#[error(transparent)]
	Validation(#[from] ValidationError),

	#[error("Migration error: {0}")]
	Migration(#[from] MigrationError),

	#[error("Unknown instance '{0}'")]
	UnknownInstance(String),

	#[error("Instance '{0}' is already registered")]
	DuplicateInstance(String),

	#[error("No instances are registered")]
	NoInstances,

	#[error("{0} instances are registered, name one explicitly")]
	AmbiguousInstance(usize),

	#[error("Builder error: {0}")]
	Builder(String),

	#[cfg(feature = "signal")]
	#[error("Signal error: {0}")]
	Signal(#[from] crate::signal::SignalError),

	#[error("Operation cancelled")]
	Cancelled,
}

impl From<FmtError> for SettingsError {
	fn from(e: FmtError) -> Self {
		match e {
			FmtError::Cancelled => SettingsError::Cancelled,
			FmtError::Migration(e) => SettingsError::Migration(e),
			e => SettingsError::Load(e),
		}
	}
}

impl SettingsError {
	pub fn is_cancelled(&self) -> bool {
		matches!(self, SettingsError::Cancelled)
	}
}
