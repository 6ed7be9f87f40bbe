/* src/signal/watcher.rs */

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher as NotifyWatcher};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use super::worker::throttle;
use super::{Config, Event, Result, SignalError};

/// Watches a single file and broadcasts throttled change events.
///
/// Must be created inside a tokio runtime.
pub struct Watcher {
    _internal_watcher: RecommendedWatcher,
    task_handle: JoinHandle<()>,
    event_tx: broadcast::Sender<Event>,
    path: PathBuf,
}

impl Watcher {
    /// Creates a new Watcher and starts monitoring immediately.
    ///
    /// The file itself may not exist yet, but its directory must.
    #[must_use = "Watcher must be kept alive"]
    pub fn new(file: impl Into<PathBuf>, config: Config) -> Result<Self> {
        let file = file.into();
        let name = file
            .file_name()
            .map(OsString::from)
            .ok_or_else(|| SignalError::Config(format!("Not a file path: {:?}", file)))?;
        let dir = match file.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        if !dir.is_dir() {
            return Err(SignalError::Config(format!(
                "Directory does not exist: {:?}",
                dir
            )));
        }

        let capacity = config.capacity.max(1);
        let (raw_tx, raw_rx) = mpsc::channel(capacity);

        let mut internal_watcher =
            notify::recommended_watcher(move |res: notify::Result<notify::Event>| match res {
                Ok(event) if is_relevant(&event, &name) => {
                    // A full channel already holds a pending change.
                    if raw_tx.try_send(()).is_err() {
                        tracing::trace!("change signal dropped, channel full");
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::error!("Notify error: {:?}", e),
            })?;
        internal_watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        let (event_tx, _) = broadcast::channel(capacity);
        let task_handle = tokio::spawn(throttle(
            raw_rx,
            event_tx.clone(),
            config.throttle,
            file.clone(),
        ));
        tracing::debug!(path = %file.display(), throttle = ?config.throttle, "watching file");

        Ok(Self {
            _internal_watcher: internal_watcher,
            task_handle,
            event_tx,
            path: file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    pub fn stop(&self) {
        self.task_handle.abort();
    }

    pub fn is_running(&self) -> bool {
        !self.task_handle.is_finished()
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        self.task_handle.abort();
    }
}

impl std::fmt::Debug for Watcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watcher")
            .field("path", &self.path)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

fn is_relevant(event: &notify::Event, name: &OsString) -> bool {
    let kind_matches = matches!(
        event.kind,
        EventKind::Any | EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    );
    kind_matches
        && event
            .paths
            .iter()
            .any(|p| p.file_name().is_some_and(|n| n == name.as_os_str()))
}
