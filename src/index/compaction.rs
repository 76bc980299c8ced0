//! Background compaction worker: a joinable thread gated by a stop flag, rather than a
//! detached thread guarded by a mutex flag.

use crossbeam_channel::{Receiver, Sender, bounded};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// How often the worker wakes up to check whether compaction is warranted.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

pub struct CompactionWorker {
    stop: Arc<AtomicBool>,
    wake_tx: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl CompactionWorker {
    /// Spawn the worker. `run_compaction` is called whenever woken (via `request()`) or on
    /// each poll tick, and should be cheap to call when nothing needs compacting.
    pub fn spawn<F>(run_compaction: F) -> CompactionWorker
    where
        F: Fn() + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let (wake_tx, wake_rx): (Sender<()>, Receiver<()>) = bounded(1);
        let stop_clone = Arc::clone(&stop);

        let handle = thread::spawn(move || {
            while !stop_clone.load(Ordering::Relaxed) {
                let _ = wake_rx.recv_timeout(POLL_INTERVAL);
                if stop_clone.load(Ordering::Relaxed) {
                    break;
                }
                run_compaction();
            }
        });

        CompactionWorker {
            stop,
            wake_tx,
            handle: Some(handle),
        }
    }

    /// Nudge the worker to run compaction now instead of waiting for the next poll tick.
    pub fn request(&self) {
        let _ = self.wake_tx.try_send(());
    }

    /// Signal the worker to stop and join its thread. Blocks for at most `POLL_INTERVAL`.
    pub fn stop(mut self) {
        self.stop.store(true, Ordering::Relaxed);
        let _ = self.wake_tx.try_send(());
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

impl Drop for CompactionWorker {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        let _ = self.wake_tx.try_send(());
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}
