/* src/controller/mod.rs */

//!
//! Named instances and the [`Settings`] facade that serves them.
//!
//! - [`Instance`] - one value type bound to one section of one file
//! - [`Registry`] - the named instances of a type
//! - [`Operations`] - a save request: update plus key deletions
//! - [`Validator`] - pluggable checks run before every save
//! - [`Settings`] - cached reads, validated saves, listeners, live reload

mod error;
mod instance;
mod operations;
mod registry;
mod settings;
mod validate;

pub use error::SettingsError;
pub use instance::{DEFAULT_INSTANCE, DEFAULT_THROTTLE, Instance, InstanceBuilder};
pub use operations::{Operations, Update};
pub use registry::Registry;
pub use settings::{Settings, Value};
#[cfg(feature = "validate")]
pub use validate::Declarative;
pub use validate::{ValidationError, Validator, check};
