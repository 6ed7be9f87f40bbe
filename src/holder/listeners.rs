/* src/holder/listeners.rs */

use std::cell::RefCell;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use arc_swap::ArcSwap;

type Callback<T> = Box<dyn Fn(&Arc<T>, &str) + Send + Sync>;

static NEXT_SLOT: AtomicU64 = AtomicU64::new(1);

thread_local! {
	/// Slots whose callback is running on this thread.
	static DISPATCHING: RefCell<Vec<u64>> = const { RefCell::new(Vec::new()) };
}

fn is_dispatching(id: u64) -> bool {
	DISPATCHING.with(|d| d.borrow().contains(&id))
}

struct DispatchGuard(u64);

impl DispatchGuard {
	fn enter(id: u64) -> Self {
		DISPATCHING.with(|d| d.borrow_mut().push(id));
		Self(id)
	}
}

impl Drop for DispatchGuard {
	fn drop(&mut self) {
		DISPATCHING.with(|d| {
			let mut d = d.borrow_mut();
			if let Some(pos) = d.iter().rposition(|id| *id == self.0) {
				d.remove(pos);
			}
		});
	}
}

struct Slot<T> {
	id: u64,
	/// `None` listens to every instance.
	name: Option<String>,
	callback: Callback<T>,
	/// Held while the callback runs, so removal can wait for it.
	gate: Mutex<()>,
	removed: AtomicBool,
}

impl<T> Slot<T> {
	fn wants(&self, name: &str) -> bool {
		self.name.as_deref().is_none_or(|n| n == name)
	}
}

struct Registry<T> {
	slots: ArcSwap<Vec<Arc<Slot<T>>>>,
}

trait Detach: Send + Sync {
	fn detach(&self, id: u64);
}

impl<T: Send + Sync> Detach for Registry<T> {
	fn detach(&self, id: u64) {
		let removed: RefCell<Option<Arc<Slot<T>>>> = RefCell::new(None);
		self.slots.rcu(|slots| {
			let mut next = Vec::with_capacity(slots.len());
			for slot in slots.iter() {
				if slot.id == id {
					*removed.borrow_mut() = Some(Arc::clone(slot));
				} else {
					next.push(Arc::clone(slot));
				}
			}
			next
		});

		let Some(slot) = removed.into_inner() else {
			return;
		};
		slot.removed.store(true, Ordering::SeqCst);

		// Called from inside its own callback: the flag alone is enough.
		if is_dispatching(id) {
			return;
		}
		// Wait out an invocation running on another thread.
		drop(slot.gate.lock().unwrap_or_else(PoisonError::into_inner));
	}
}

/// Change listeners for every instance of one value type.
///
/// Callbacks run synchronously on the notifying thread and receive the new
/// value together with the instance name.
pub struct Listeners<T> {
	registry: Arc<Registry<T>>,
}

impl<T> Clone for Listeners<T> {
	fn clone(&self) -> Self {
		Self {
			registry: Arc::clone(&self.registry),
		}
	}
}

impl<T: Send + Sync + 'static> Default for Listeners<T> {
	fn default() -> Self {
		Self::new()
	}
}

impl<T: Send + Sync + 'static> Listeners<T> {
	pub fn new() -> Self {
		Self {
			registry: Arc::new(Registry {
				slots: ArcSwap::from_pointee(Vec::new()),
			}),
		}
	}

	fn add<F>(&self, name: Option<String>, callback: F) -> Subscription
	where
		F: Fn(&Arc<T>, &str) + Send + Sync + 'static,
	{
		let slot = Arc::new(Slot {
			id: NEXT_SLOT.fetch_add(1, Ordering::Relaxed),
			name,
			callback: Box::new(callback),
			gate: Mutex::new(()),
			removed: AtomicBool::new(false),
		});
		let id = slot.id;
		self.registry.slots.rcu(|slots| {
			let mut next = (**slots).clone();
			next.push(Arc::clone(&slot));
			next
		});

		let registry: Weak<dyn Detach> = Arc::downgrade(&self.registry) as Weak<dyn Detach>;
		Subscription {
			id,
			registry,
			done: AtomicBool::new(false),
		}
	}

	/// Listens to changes of one instance.
	pub fn listen<F>(&self, name: impl Into<String>, callback: F) -> Subscription
	where
		F: Fn(&Arc<T>, &str) + Send + Sync + 'static,
	{
		self.add(Some(name.into()), callback)
	}

	/// Listens to changes of every instance.
	pub fn listen_all<F>(&self, callback: F) -> Subscription
	where
		F: Fn(&Arc<T>, &str) + Send + Sync + 'static,
	{
		self.add(None, callback)
	}

	/// Invokes every listener interested in `name`. Returns how many ran.
	pub fn notify(&self, value: &Arc<T>, name: &str) -> usize {
		let slots = self.registry.slots.load_full();
		let mut invoked = 0;

		for slot in slots.iter().filter(|s| s.wants(name)) {
			if slot.removed.load(Ordering::SeqCst) {
				continue;
			}
			// Re-entrant notification from inside the same callback.
			if is_dispatching(slot.id) {
				(slot.callback)(value, name);
				invoked += 1;
				continue;
			}

			let _gate = slot.gate.lock().unwrap_or_else(PoisonError::into_inner);
			if slot.removed.load(Ordering::SeqCst) {
				continue;
			}
			let _dispatch = DispatchGuard::enter(slot.id);
			(slot.callback)(value, name);
			invoked += 1;
		}
		invoked
	}

	pub fn len(&self) -> usize {
		self.registry.slots.load().len()
	}

	pub fn is_empty(&self) -> bool {
		self.registry.slots.load().is_empty()
	}
}

impl<T> fmt::Debug for Listeners<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Listeners")
			.field("count", &self.registry.slots.load().len())
			.finish()
	}
}

/// Handle to a registered listener.
///
/// Dropping the handle unsubscribes. Once [`unsubscribe`](Self::unsubscribe)
/// returns, the callback is never invoked again.
#[must_use = "dropping a Subscription unsubscribes the listener"]
pub struct Subscription {
	id: u64,
	registry: Weak<dyn Detach>,
	done: AtomicBool,
}

impl Subscription {
	/// Removes the listener. Calling it more than once is a no-op.
	pub fn unsubscribe(&self) {
		if self.done.swap(true, Ordering::SeqCst) {
			return;
		}
		if let Some(registry) = self.registry.upgrade() {
			registry.detach(self.id);
		}
	}

	/// Keeps the listener registered for as long as its owner lives.
	pub fn forget(self) {
		self.done.store(true, Ordering::SeqCst);
	}

	pub fn is_active(&self) -> bool {
		!self.done.load(Ordering::SeqCst) && self.registry.strong_count() > 0
	}
}

impl Drop for Subscription {
	fn drop(&mut self) {
		self.unsubscribe();
	}
}

impl fmt::Debug for Subscription {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Subscription")
			.field("id", &self.id)
			.field("active", &self.is_active())
			.finish()
	}
}
