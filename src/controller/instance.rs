/* src/controller/instance.rs */

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use super::{SettingsError, ValidationError, Validator};
use crate::loader::{AnyFormat, FileSource, Format, Migrations, Provider, Source};
use crate::tree::KeyPath;

/// Default minimum spacing between change notifications of one instance.
pub const DEFAULT_THROTTLE: Duration = Duration::from_millis(500);

/// Name used when an application only needs one instance per type.
pub const DEFAULT_INSTANCE: &str = "default";

/// An immutable binding of one value type to a file section.
pub struct Instance<T> {
	name: String,
	type_name: &'static str,
	provider: Provider,
	throttle: Duration,
	validators: Vec<Arc<dyn Validator<T>>>,
}

impl<T: 'static> Instance<T> {
	/// Starts a builder for an instance named `name`.
	pub fn builder(name: impl Into<String>) -> InstanceBuilder<T> {
		InstanceBuilder::new(name)
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	/// Full type name of the bound value.
	pub fn type_name(&self) -> &'static str {
		self.type_name
	}

	pub fn provider(&self) -> &Provider {
		&self.provider
	}

	pub fn path(&self) -> &Path {
		self.provider.path()
	}

	pub fn section(&self) -> &KeyPath {
		self.provider.section()
	}

	pub fn throttle(&self) -> Duration {
		self.throttle
	}

	/// Runs every validator and collects all failures.
	pub fn validate(&self, value: &T) -> Result<(), ValidationError> {
		let failures: Vec<String> = self
			.validators
			.iter()
			.flat_map(|v| v.validate(value))
			.collect();
		if failures.is_empty() {
			return Ok(());
		}
		Err(ValidationError {
			instance: self.name.clone(),
			type_name: self.type_name,
			failures,
		})
	}
}

impl<T> fmt::Debug for Instance<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Instance")
			.field("name", &self.name)
			.field("type_name", &self.type_name)
			.field("provider", &self.provider)
			.field("throttle", &self.throttle)
			.field("validators", &self.validators.len())
			.finish()
	}
}

/// Builder for [`Instance`].
pub struct InstanceBuilder<T> {
	name: String,
	path: Option<PathBuf>,
	section: Option<KeyPath>,
	format: Option<Arc<dyn Format>>,
	source: Option<Arc<dyn Source>>,
	migrations: Option<Migrations>,
	throttle: Duration,
	declarative: Option<Arc<dyn Validator<T>>>,
	validators: Vec<Arc<dyn Validator<T>>>,
}

impl<T: 'static> InstanceBuilder<T> {
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			path: None,
			section: None,
			format: None,
			source: None,
			migrations: None,
			throttle: DEFAULT_THROTTLE,
			declarative: None,
			validators: Vec::new(),
		}
	}

	/// The file holding the section. Required.
	pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
		self.path = Some(path.into());
		self
	}

	/// Section path inside the document, e.g. `"App:Window"` or `"App__Window"`.
	///
	/// Defaults to the type name.
	pub fn section(mut self, section: impl Into<KeyPath>) -> Self {
		self.section = Some(section.into());
		self
	}

	/// Binds the value to the whole document instead of a section.
	pub fn whole_file(mut self) -> Self {
		self.section = Some(KeyPath::root());
		self
	}

	/// Overrides the format picked from the file extension.
	pub fn format(mut self, format: impl Format + 'static) -> Self {
		self.format = Some(Arc::new(format));
		self
	}

	/// Reads and writes through `source` instead of the local file system.
	pub fn source(mut self, source: impl Source + 'static) -> Self {
		self.source = Some(Arc::new(source));
		self
	}

	/// Like [`source`](Self::source), sharing one source between instances.
	pub fn shared_source(mut self, source: Arc<dyn Source>) -> Self {
		self.source = Some(source);
		self
	}

	pub fn migrations(mut self, migrations: Migrations) -> Self {
		self.migrations = Some(migrations);
		self
	}

	/// Minimum spacing between change notifications. Zero disables throttling.
	pub fn throttle(mut self, throttle: Duration) -> Self {
		self.throttle = throttle;
		self
	}

	/// Adds a validator. Validators run in registration order.
	pub fn validator(mut self, validator: impl Validator<T> + 'static) -> Self {
		self.validators.push(Arc::new(validator));
		self
	}

	pub fn build(self) -> Result<Instance<T>, SettingsError> {
		if self.name.trim().is_empty() {
			return Err(SettingsError::Builder("name must not be empty".to_string()));
		}
		let path = self
			.path
			.ok_or_else(|| SettingsError::Builder("path is required".to_string()))?;

		let format = match self.format {
			Some(format) => format,
			None => Arc::new(AnyFormat::from_path(&path).unwrap_or_default()),
		};
		let source = self.source.unwrap_or_else(|| Arc::new(FileSource::new()));
		let section = self
			.section
			.unwrap_or_else(|| KeyPath::root().field(short_type_name::<T>()));

		let mut provider = Provider::new(format, source, path, section);
		if let Some(migrations) = self.migrations {
			provider = provider.with_migrations(migrations);
		}

		let validators = self.declarative.into_iter().chain(self.validators).collect();

		Ok(Instance {
			name: self.name,
			type_name: std::any::type_name::<T>(),
			provider,
			throttle: self.throttle,
			validators,
		})
	}
}

#[cfg(feature = "validate")]
impl<T: validator::Validate + 'static> InstanceBuilder<T> {
	/// Enforces the `#[validate(...)]` rules of `T` before custom validators.
	pub fn validate_fields(mut self) -> Self {
		self.declarative = Some(Arc::new(super::validate::Declarative));
		self
	}
}

/// `my_app::config::Window<u8>` becomes `Window`.
fn short_type_name<T>() -> &'static str {
	let full = std::any::type_name::<T>();
	let base = full.split('<').next().unwrap_or(full);
	base.rsplit("::").next().unwrap_or(base)
}
