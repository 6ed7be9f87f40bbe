/* src/signal/worker.rs */

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::time::{Instant, sleep_until};

use super::Event;

/// Consumes raw change signals and broadcasts throttled events.
///
/// The first signal after a quiet period fires immediately. Signals arriving
/// within `window` of the last delivery are folded into one trailing event
/// delivered at `last + window`. A zero window forwards every signal.
pub(crate) async fn throttle(
    mut raw_rx: mpsc::Receiver<()>,
    tx: broadcast::Sender<Event>,
    window: Duration,
    path: PathBuf,
) {
    let mut last_fired: Option<Instant> = None;
    let mut pending = 0usize;

    loop {
        let deadline = last_fired.map_or_else(Instant::now, |t| t + window);

        tokio::select! {
            received = raw_rx.recv() => {
                let Some(()) = received else { break };
                let now = Instant::now();
                let open = window.is_zero() || last_fired.is_none_or(|t| now >= t + window);
                if open && pending == 0 {
                    send(&tx, &path, 1);
                    last_fired = Some(now);
                } else {
                    pending += 1;
                }
            }
            _ = sleep_until(deadline), if pending > 0 => {
                send(&tx, &path, pending);
                pending = 0;
                last_fired = Some(Instant::now());
            }
        }
    }
}

fn send(tx: &broadcast::Sender<Event>, path: &Path, coalesced: usize) {
    tracing::trace!(path = %path.display(), coalesced, "file changed");
    // No subscribers is not an error.
    let _ = tx.send(Event {
        path: path.to_path_buf(),
        coalesced,
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn run(window: Duration, signals: usize, spacing: Duration) -> Vec<usize> {
        let (raw_tx, raw_rx) = mpsc::channel(16);
        let (tx, mut rx) = broadcast::channel(16);
        let worker = tokio::spawn(throttle(raw_rx, tx, window, PathBuf::from("app.json")));

        for _ in 0..signals {
            raw_tx.send(()).await.unwrap();
            tokio::time::sleep(spacing).await;
        }
        tokio::time::sleep(window * 2 + Duration::from_millis(10)).await;

        let mut fired = Vec::new();
        while let Ok(event) = rx.try_recv() {
            fired.push(event.coalesced);
        }
        worker.abort();
        fired
    }

    #[tokio::test(start_paused = true)]
    async fn leading_and_trailing_events() {
        let fired = run(Duration::from_millis(500), 5, Duration::from_millis(50)).await;
        assert_eq!(fired, vec![1, 4]);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_window_forwards_everything() {
        let fired = run(Duration::ZERO, 5, Duration::from_millis(50)).await;
        assert_eq!(fired, vec![1; 5]);
    }

    #[tokio::test(start_paused = true)]
    async fn spaced_signals_fire_individually() {
        let fired = run(Duration::from_millis(100), 3, Duration::from_millis(250)).await;
        assert_eq!(fired, vec![1, 1, 1]);
    }

    #[tokio::test(start_paused = true)]
    async fn closed_channel_stops_worker() {
        let (raw_tx, raw_rx) = mpsc::channel::<()>(1);
        let (tx, _rx) = broadcast::channel(1);
        let worker = tokio::spawn(throttle(raw_rx, tx, Duration::ZERO, PathBuf::new()));
        drop(raw_tx);
        worker.await.unwrap();
    }
}
