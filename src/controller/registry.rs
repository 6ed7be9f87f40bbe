/* src/controller/registry.rs */

use std::collections::HashMap;
use std::sync::Arc;

#[cfg(feature = "logging")]
use log::warn;

use super::{Instance, SettingsError};

/// The named instances of one value type.
///
/// Built once at startup and handed to [`Settings`](super::Settings).
pub struct Registry<T> {
	instances: HashMap<String, Arc<Instance<T>>>,
	order: Vec<String>,
}

impl<T> Default for Registry<T> {
	fn default() -> Self {
		Self {
			instances: HashMap::new(),
			order: Vec::new(),
		}
	}
}

impl<T: 'static> Registry<T> {
	pub fn new() -> Self {
		Self::default()
	}

	/// Adds an instance. Names must be unique.
	pub fn register(&mut self, instance: Instance<T>) -> Result<(), SettingsError> {
		let name = instance.name().to_string();
		if self.instances.contains_key(&name) {
			return Err(SettingsError::DuplicateInstance(name));
		}

		for other in self.instances.values() {
			if conflicts(other, &instance) {
				#[cfg(feature = "logging")]
				warn!(
					"Instances '{}' and '{}' use overlapping sections '{}' and '{}' of {:?}; concurrent saves may overwrite each other",
					other.name(),
					name,
					other.section(),
					instance.section(),
					instance.path()
				);
			}
		}

		self.instances.insert(name.clone(), Arc::new(instance));
		self.order.push(name);
		Ok(())
	}

	/// Builder-style [`register`](Self::register).
	pub fn with(mut self, instance: Instance<T>) -> Result<Self, SettingsError> {
		self.register(instance)?;
		Ok(self)
	}

	pub fn get(&self, name: &str) -> Result<&Arc<Instance<T>>, SettingsError> {
		self.instances
			.get(name)
			.ok_or_else(|| SettingsError::UnknownInstance(name.to_string()))
	}

	/// The only registered instance.
	pub fn single(&self) -> Result<&Arc<Instance<T>>, SettingsError> {
		match self.order.as_slice() {
			[] => Err(SettingsError::NoInstances),
			[name] => self.get(name),
			names => Err(SettingsError::AmbiguousInstance(names.len())),
		}
	}

	/// Instance names in registration order.
	pub fn names(&self) -> &[String] {
		&self.order
	}

	pub fn iter(&self) -> impl Iterator<Item = &Arc<Instance<T>>> {
		self.order.iter().filter_map(|name| self.instances.get(name))
	}

	pub fn len(&self) -> usize {
		self.order.len()
	}

	pub fn is_empty(&self) -> bool {
		self.order.is_empty()
	}

	/// Pairs of instance names whose sections overlap inside the same file.
	pub fn overlapping(&self) -> Vec<(String, String)> {
		let all: Vec<_> = self.iter().collect();
		let mut pairs = Vec::new();
		for (i, a) in all.iter().enumerate() {
			for b in &all[i + 1..] {
				if conflicts(a, b) {
					pairs.push((a.name().to_string(), b.name().to_string()));
				}
			}
		}
		pairs
	}
}

impl<T: 'static> From<Instance<T>> for Registry<T> {
	fn from(instance: Instance<T>) -> Self {
		let name = instance.name().to_string();
		let mut instances = HashMap::new();
		instances.insert(name.clone(), Arc::new(instance));
		Self {
			instances,
			order: vec![name],
		}
	}
}

fn conflicts<T: 'static>(a: &Instance<T>, b: &Instance<T>) -> bool {
	a.path() == b.path() && a.section().overlaps(b.section())
}

#[cfg(test)]
mod tests {
	use super::*;

	fn instance(name: &str, path: &str, section: &str) -> Instance<u8> {
		Instance::builder(name)
			.path(path)
			.section(section)
			.build()
			.unwrap()
	}

	#[test]
	fn names_are_unique() {
		let mut registry = Registry::new();
		registry.register(instance("a", "a.json", "A")).unwrap();
		let err = registry.register(instance("a", "b.json", "B")).unwrap_err();
		assert!(matches!(err, SettingsError::DuplicateInstance(name) if name == "a"));
	}

	#[test]
	fn single_requires_exactly_one() {
		let registry = Registry::<u8>::new();
		assert!(matches!(registry.single(), Err(SettingsError::NoInstances)));

		let registry = Registry::from(instance("a", "a.json", "A"));
		assert_eq!(registry.single().unwrap().name(), "a");

		let registry = registry.with(instance("b", "b.json", "B")).unwrap();
		assert!(matches!(registry.single(), Err(SettingsError::AmbiguousInstance(2))));
		assert_eq!(registry.names(), ["a", "b"]);
		assert!(matches!(registry.get("c"), Err(SettingsError::UnknownInstance(_))));
	}

	#[test]
	fn detects_overlapping_sections_of_one_file() {
		let registry = Registry::new()
			.with(instance("outer", "app.json", "App"))
			.and_then(|r| r.with(instance("inner", "app.json", "App:Window")))
			.and_then(|r| r.with(instance("sibling", "app.json", "Other")))
			.and_then(|r| r.with(instance("elsewhere", "other.json", "App")))
			.unwrap();

		assert_eq!(
			registry.overlapping(),
			vec![("outer".to_string(), "inner".to_string())]
		);
	}
}
