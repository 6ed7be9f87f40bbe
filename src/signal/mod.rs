/* src/signal/mod.rs */

//!
//! File change detection with throttled delivery.
//!
//! A [`Watcher`] observes one file through its parent directory and feeds
//! raw notifications into a background worker. The worker applies a
//! leading-edge plus trailing-edge throttle and broadcasts [`Event`]s.

use std::path::PathBuf;
use std::time::Duration;

mod watcher;
mod worker;

pub use watcher::Watcher;

/// Custom error type for the signal module.
#[derive(thiserror::Error, Debug)]
pub enum SignalError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Notify error: {0}")]
    Notify(#[from] notify::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, SignalError>;

/// Configuration for the watcher behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Minimum spacing between delivered events. Zero delivers every change.
    pub throttle: Duration,

    /// Capacity of the raw and broadcast channels.
    pub capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            throttle: Duration::from_millis(500),
            capacity: 100,
        }
    }
}

/// A throttled change notification for the watched file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Event {
    /// The watched file.
    pub path: PathBuf,
    /// Number of raw notifications folded into this event.
    pub coalesced: usize,
}
