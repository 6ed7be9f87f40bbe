/* src/controller/settings.rs */

//!
//! The settings facade: cached reads, validated saves, change listeners and
//! live reloading for every instance of one value type.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

#[cfg(feature = "signal")]
use std::sync::Weak;

#[cfg(feature = "logging")]
use log::{debug, info, warn};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

#[cfg(feature = "signal")]
use tokio::sync::broadcast::error::RecvError;
#[cfg(feature = "signal")]
use tokio::task::JoinHandle;

use super::{Instance, Operations, Registry, SettingsError};
use crate::holder::{Entry, Listeners, Origin, Store, Subscription};
use crate::loader::LoadResult;
use crate::tree;

#[cfg(feature = "signal")]
use crate::signal::{Config as WatcherConfig, Watcher};

/// Bounds every settings value satisfies.
///
/// Types should carry `#[serde(default)]` so that missing keys, and keys
/// removed with [`Operations::delete`], fall back to their defaults.
pub trait Value: Serialize + DeserializeOwned + Default + Send + Sync + 'static {}

impl<T> Value for T where T: Serialize + DeserializeOwned + Default + Send + Sync + 'static {}

#[cfg(feature = "signal")]
struct WatchState {
	watcher: Watcher,
	handle: JoinHandle<()>,
}

struct Inner<T> {
	registry: Registry<T>,
	store: Store<T>,
	listeners: Listeners<T>,
	/// One writer at a time per backing document, indexed by instance name.
	/// Instances bound to the same file share one lock.
	locks: HashMap<String, Arc<Mutex<()>>>,
	/// Section fingerprints of writes in flight, by instance name.
	pending: StdMutex<HashMap<String, u64>>,
	#[cfg(feature = "signal")]
	watches: StdMutex<HashMap<String, WatchState>>,
}

#[cfg(feature = "signal")]
impl<T> Drop for Inner<T> {
	fn drop(&mut self) {
		let watches = self.watches.get_mut().unwrap_or_else(PoisonError::into_inner);
		for (_, state) in watches.drain() {
			state.watcher.stop();
			state.handle.abort();
		}
	}
}

/// Cached, validated, observable access to the instances of `T`.
///
/// Cheap to clone; every clone shares the same cache, locks and watchers.
/// Construct it once and pass it to whoever needs it.
pub struct Settings<T> {
	inner: Arc<Inner<T>>,
}

impl<T> Clone for Settings<T> {
	fn clone(&self) -> Self {
		Self {
			inner: Arc::clone(&self.inner),
		}
	}
}

impl<T: Value> Settings<T> {
	pub fn new(registry: Registry<T>) -> Self {
		let mut by_document: HashMap<PathBuf, Arc<Mutex<()>>> = HashMap::new();
		let locks = registry
			.iter()
			.map(|instance| {
				let lock = by_document
					.entry(instance.provider().document_key())
					.or_default();
				(instance.name().to_string(), Arc::clone(lock))
			})
			.collect();

		Self {
			inner: Arc::new(Inner {
				registry,
				store: Store::new(),
				listeners: Listeners::new(),
				locks,
				pending: StdMutex::new(HashMap::new()),
				#[cfg(feature = "signal")]
				watches: StdMutex::new(HashMap::new()),
			}),
		}
	}

	/// Settings with a single instance.
	pub fn single(instance: Instance<T>) -> Self {
		Self::new(Registry::from(instance))
	}

	pub fn registry(&self) -> &Registry<T> {
		&self.inner.registry
	}

	/// Registered instance names.
	pub fn names(&self) -> &[String] {
		self.inner.registry.names()
	}

	pub fn instance(&self, name: &str) -> Result<&Arc<Instance<T>>, SettingsError> {
		self.inner.registry.get(name)
	}

	/// Returns the current value, loading it on first access.
	///
	/// A missing file or section yields `T::default()`. So does a document
	/// that cannot be parsed, which is logged. Migration and I/O failures
	/// are returned.
	pub async fn get(&self, name: &str) -> Result<Arc<T>, SettingsError> {
		let instance = self.inner.registry.get(name)?;
		if let Some(value) = self.inner.store.get(name) {
			return Ok(value);
		}

		let (value, origin, fingerprint) = initial_load(instance).await?;
		let entry = self
			.inner
			.store
			.insert_if_absent(name, Arc::new(value), origin, fingerprint);
		Ok(entry.value)
	}

	/// [`get`](Self::get) for the only registered instance.
	pub async fn get_default(&self) -> Result<Arc<T>, SettingsError> {
		let name = self.inner.registry.single()?.name().to_string();
		self.get(&name).await
	}

	/// The cached value, without loading.
	pub fn cached(&self, name: &str) -> Option<Arc<T>> {
		self.inner.store.get(name)
	}

	/// The cached value with its metadata.
	pub fn entry(&self, name: &str) -> Option<Entry<T>> {
		self.inner.store.get_entry(name)
	}

	/// Calls `callback` with the new value whenever instance `name` changes.
	pub fn listen<F>(&self, name: &str, callback: F) -> Result<Subscription, SettingsError>
	where
		F: Fn(&Arc<T>, &str) + Send + Sync + 'static,
	{
		self.inner.registry.get(name)?;
		Ok(self.inner.listeners.listen(name, callback))
	}

	/// Calls `callback` whenever any instance changes.
	pub fn listen_all<F>(&self, callback: F) -> Subscription
	where
		F: Fn(&Arc<T>, &str) + Send + Sync + 'static,
	{
		self.inner.listeners.listen_all(callback)
	}

	/// Replaces the cached value without writing or notifying.
	pub fn update_silently(&self, name: &str, value: T) -> Result<(), SettingsError> {
		self.inner.registry.get(name)?;
		let fingerprint = self.inner.store.get_meta(name).and_then(|m| m.fingerprint);
		self.inner
			.store
			.insert(name, Arc::new(value), Origin::Silent, fingerprint);
		Ok(())
	}

	/// Drops the cached value; the next [`get`](Self::get) loads it again.
	pub fn clear(&self, name: &str) -> Result<(), SettingsError> {
		self.inner.registry.get(name)?;
		self.inner.store.remove(name);
		Ok(())
	}

	/// Re-reads instance `name` now, notifying listeners if it changed.
	///
	/// Unlike a watcher-triggered reload, every failure is returned and the
	/// cache is left untouched.
	pub async fn reload(&self, name: &str) -> Result<Arc<T>, SettingsError> {
		let instance = self.inner.registry.get(name)?;
		let before = self.inner.store.get_meta(name);

		let (value, origin, fingerprint) = match instance.provider().load::<T>().await {
			LoadResult::Ok {
				value, fingerprint, ..
			} => (value, Origin::Loaded, Some(fingerprint)),
			LoadResult::NotFound => (T::default(), Origin::Default, None),
			LoadResult::Invalid(e) => return Err(e.into()),
		};

		let unchanged = before.as_ref().is_some_and(|m| m.fingerprint == fingerprint);
		let replaced = self.inner.store.replace_if(
			name,
			before.as_ref().map(|m| m.revision),
			Arc::new(value),
			origin,
			fingerprint,
		);
		match replaced {
			Some(entry) => {
				if before.is_some() && !unchanged {
					self.inner.listeners.notify(&entry.value, name);
				}
				Ok(entry.value)
			}
			// A save landed meanwhile; it is newer than what we read.
			None => self.get(name).await,
		}
	}

	/// Persists `value` as the new value of instance `name`.
	pub async fn save(&self, name: &str, value: T) -> Result<Arc<T>, SettingsError> {
		self.apply(name, Operations::replace(value)).await
	}

	/// Mutates the current on-disk value and persists it.
	pub async fn update<F>(&self, name: &str, mutate: F) -> Result<Arc<T>, SettingsError>
	where
		F: FnOnce(&mut T) + Send + 'static,
	{
		self.apply(name, Operations::mutate(mutate)).await
	}

	/// Maps the current on-disk value to a new one and persists it.
	pub async fn map<F>(&self, name: &str, map: F) -> Result<Arc<T>, SettingsError>
	where
		F: FnOnce(T) -> T + Send + 'static,
	{
		self.apply(name, Operations::map(map)).await
	}

	pub async fn apply(&self, name: &str, ops: Operations<T>) -> Result<Arc<T>, SettingsError> {
		self.apply_with_cancel(name, ops, &CancellationToken::new())
			.await
	}

	/// Runs one save: lock, read fresh, update, validate, write, cache, notify.
	///
	/// The lock covers the whole backing file, so saves to sibling sections
	/// of one file never overwrite each other. Validation failures and
	/// cancellation leave both the file and the cache untouched. Listeners
	/// are notified before this returns.
	pub async fn apply_with_cancel(
		&self,
		name: &str,
		ops: Operations<T>,
		cancel: &CancellationToken,
	) -> Result<Arc<T>, SettingsError> {
		let instance = Arc::clone(self.inner.registry.get(name)?);
		let lock = self
			.inner
			.locks
			.get(name)
			.cloned()
			.ok_or_else(|| SettingsError::UnknownInstance(name.to_string()))?;

		let guard = tokio::select! {
			biased;
			_ = cancel.cancelled() => return Err(SettingsError::Cancelled),
			guard = lock.lock() => guard,
		};

		let provider = instance.provider();
		let draft = provider.begin::<T>().await?;
		let baseline = tree::to_node(&draft.value)?;

		let (update, deletions) = ops.into_parts();
		let candidate = update.apply(draft.value);
		let section = provider.prepare(
			&candidate,
			draft.existing.as_ref(),
			&baseline,
			&deletions,
			draft.migrated > 0,
		)?;
		// Deleted keys take their defaults in memory too.
		let candidate: T = if deletions.is_empty() {
			candidate
		} else {
			tree::from_node(section.clone())?
		};

		instance.validate(&candidate)?;
		if cancel.is_cancelled() {
			return Err(SettingsError::Cancelled);
		}

		let (bytes, fingerprint) = provider.render(draft.document, section)?;
		self.inner.set_pending(name, Some(fingerprint));
		if let Err(e) = provider.write(&bytes, cancel).await {
			self.inner.set_pending(name, None);
			return Err(e.into());
		}
		let entry = self.inner.store.insert(
			name,
			Arc::new(candidate),
			Origin::Saved,
			Some(fingerprint),
		);
		self.inner.set_pending(name, None);
		drop(guard);

		#[cfg(feature = "logging")]
		debug!("Saved '{}' to {:?}", name, provider.path());

		self.inner.listeners.notify(&entry.value, name);
		Ok(entry.value)
	}
}

impl<T> Inner<T> {
	fn set_pending(&self, name: &str, fingerprint: Option<u64>) {
		let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
		match fingerprint {
			Some(fp) => pending.insert(name.to_string(), fp),
			None => pending.remove(name),
		};
	}

	#[cfg(feature = "signal")]
	fn is_pending(&self, name: &str, fingerprint: u64) -> bool {
		self.pending
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.get(name)
			== Some(&fingerprint)
	}
}

async fn initial_load<T: Value>(
	instance: &Instance<T>,
) -> Result<(T, Origin, Option<u64>), SettingsError> {
	match instance.provider().load::<T>().await {
		LoadResult::Ok {
			value,
			fingerprint,
			migrated,
		} => {
			#[cfg(feature = "logging")]
			if migrated > 0 {
				info!(
					"Upgraded '{}' through {} migration step(s)",
					instance.name(),
					migrated
				);
			}
			#[cfg(not(feature = "logging"))]
			let _ = migrated;
			Ok((value, Origin::Loaded, Some(fingerprint)))
		}
		LoadResult::NotFound => Ok((T::default(), Origin::Default, None)),
		LoadResult::Invalid(e) if e.is_malformed() => {
			#[cfg(feature = "logging")]
			warn!(
				"Failed to load '{}' from {:?}, using defaults: {}",
				instance.name(),
				instance.path(),
				e
			);
			#[cfg(not(feature = "logging"))]
			let _ = e;
			Ok((T::default(), Origin::Default, None))
		}
		LoadResult::Invalid(e) => Err(e.into()),
	}
}

#[cfg(feature = "signal")]
impl<T: Value> Settings<T> {
	/// Reloads instance `name` whenever its file changes on disk.
	///
	/// Reloads are throttled with the instance's throttle. Reload failures
	/// are logged and the previous value is kept. Watching an instance that
	/// is already watched does nothing.
	pub async fn watch(&self, name: &str) -> Result<(), SettingsError> {
		let instance = self.inner.registry.get(name)?;
		if self.is_watching(name) {
			return Ok(());
		}

		let path = instance.provider().watch_path().ok_or_else(|| {
			SettingsError::Builder(format!("the source of '{name}' cannot be watched"))
		})?;
		if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
			tokio::fs::create_dir_all(parent)
				.await
				.map_err(crate::signal::SignalError::Io)?;
		}

		let watcher = Watcher::new(
			path,
			WatcherConfig {
				throttle: instance.throttle(),
				..WatcherConfig::default()
			},
		)?;
		let mut rx = watcher.subscribe();
		let weak: Weak<Inner<T>> = Arc::downgrade(&self.inner);
		let key = name.to_string();

		let handle = tokio::spawn(async move {
			loop {
				match rx.recv().await {
					Ok(_) | Err(RecvError::Lagged(_)) => {
						let Some(inner) = weak.upgrade() else { break };
						inner.refresh(&key).await;
					}
					Err(RecvError::Closed) => break,
				}
			}
		});

		let mut watches = self.inner.watches.lock().unwrap_or_else(PoisonError::into_inner);
		if watches.contains_key(name) {
			// Lost a race with a concurrent watch() call.
			handle.abort();
			return Ok(());
		}
		watches.insert(name.to_string(), WatchState { watcher, handle });
		Ok(())
	}

	/// Watches every registered instance.
	pub async fn watch_all(&self) -> Result<(), SettingsError> {
		for name in self.inner.registry.names() {
			self.watch(name).await?;
		}
		Ok(())
	}

	/// Stops watching instance `name`. Returns whether it was watched.
	///
	/// No reload of this instance runs after this returns.
	pub async fn stop_watching(&self, name: &str) -> bool {
		let state = self
			.inner
			.watches
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.remove(name);
		let Some(state) = state else {
			return false;
		};
		state.watcher.stop();
		state.handle.abort();
		let _ = state.handle.await;
		true
	}

	pub fn is_watching(&self, name: &str) -> bool {
		self.inner
			.watches
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.contains_key(name)
	}
}

#[cfg(feature = "signal")]
impl<T: Value> Inner<T> {
	/// Reload after an external change. Never takes the write lock.
	async fn refresh(&self, name: &str) {
		let Ok(instance) = self.registry.get(name) else {
			return;
		};
		let before = self.store.get_meta(name);

		match instance.provider().load::<T>().await {
			LoadResult::Ok {
				value, fingerprint, ..
			} => {
				// Our own write, or a write to another section of the file.
				if before.as_ref().and_then(|m| m.fingerprint) == Some(fingerprint)
					|| self.is_pending(name, fingerprint)
				{
					return;
				}
				let replaced = self.store.replace_if(
					name,
					before.map(|m| m.revision),
					Arc::new(value),
					Origin::Reloaded,
					Some(fingerprint),
				);
				if let Some(entry) = replaced {
					#[cfg(feature = "logging")]
					info!("Reloaded '{}' from {:?}", name, instance.path());
					self.listeners.notify(&entry.value, name);
				}
			}
			LoadResult::NotFound => {
				#[cfg(feature = "logging")]
				debug!("'{}' vanished from {:?}, keeping the cached value", name, instance.path());
			}
			LoadResult::Invalid(e) => {
				#[cfg(feature = "logging")]
				warn!("Failed to reload '{}', keeping the cached value: {}", name, e);
				#[cfg(not(feature = "logging"))]
				let _ = e;
			}
		}
	}
}

impl<T: Value> fmt::Debug for Settings<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let mut s = f.debug_struct("Settings");
		s.field("instances", &self.inner.registry.names());
		s.field("cached", &self.inner.store.len());
		s.field("listeners", &self.inner.listeners);
		#[cfg(feature = "signal")]
		s.field(
			"watching",
			&self
				.inner
				.watches
				.lock()
				.map(|w| w.len())
				.unwrap_or_default(),
		);
		s.finish_non_exhaustive()
	}
}
