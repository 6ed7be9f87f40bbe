/* src/lib.rs */

//!
//! Persisted, strongly typed settings stored in sections of structured files.
//!
//! The crate is layered:
//!
//! - **tree**: format-independent document tree and key paths.
//! - **loader**: formats, byte sources, schema migrations, and the
//!   section-scoped [`Provider`](loader::Provider).
//! - **holder**: lock-free cache of the current value per instance, plus
//!   change listeners.
//! - **signal**: file watching with throttled change events.
//! - **controller**: the [`Settings`] facade integrating the above.
//!
//! ## Feature Flags
//!
//! - `full` (default): enables everything below.
//! - `yaml`, `toml`, `xml`: extra formats. JSON is always available.
//! - `archive`: [`ArchiveSource`](loader::ArchiveSource), entries inside one zip file.
//! - `signal`: live reloading through file system notifications.
//! - `validate`: declarative rules via the `validator` crate.
//! - `logging`: load, save and reload diagnostics through `log`.
//!
//! ## Basic Usage
//!
//! ```no_run
//! use serde::{Deserialize, Serialize};
//! use settle::{Instance, Settings};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! #[serde(default, rename_all = "PascalCase")]
//! struct Window {
//!     width: u32,
//!     height: u32,
//! }
//!
//! impl Default for Window {
//!     fn default() -> Self {
//!         Self { width: 1280, height: 720 }
//!     }
//! }
//!
//! # async fn run() -> Result<(), settle::SettingsError> {
//! let settings = Settings::single(
//!     Instance::<Window>::builder("default")
//!         .path("config/app.json")
//!         .section("Ui:Window")
//!         .build()?,
//! );
//!
//! let current = settings.get("default").await?;
//! let width = current.width * 2;
//! settings.update("default", move |w| w.width = width).await?;
//! # Ok(())
//! # }
//! ```

pub mod controller;
pub mod holder;
pub mod loader;
#[cfg(feature = "signal")]
pub mod signal;
pub mod tree;

pub use controller::{
	DEFAULT_INSTANCE, Instance, InstanceBuilder, Operations, Registry, Settings, SettingsError,
	ValidationError, Validator, check,
};
pub use loader::{Migrations, Versioned};
pub use tree::KeyPath;
