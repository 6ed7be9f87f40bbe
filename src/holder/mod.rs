/* src/holder/mod.rs */

//!
//! Per-instance cached values and change listeners.
//!
//! - [`Store`] keeps one immutable snapshot per instance name, readable
//!   without locks.
//! - [`Listeners`] dispatches change notifications to per-name and global
//!   callbacks.

mod entry;
mod listeners;
mod meta;
mod store;

pub use entry::Entry;
pub use listeners::{Listeners, Subscription};
pub use meta::{Meta, Origin};
pub use store::Store;
