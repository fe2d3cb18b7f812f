//! Process-wide lifecycle: one shared cancellation signal and a wait group
//! covering every background task.
//!
//! Long-running loops (the grep reader, the bulk index walker, the session
//! updater) watch [`Lifecycle::done`] and exit cooperatively once
//! [`Lifecycle::shutdown`] runs.

use std::sync::Mutex;
use std::thread;

use crossbeam::channel::{Receiver, Sender, TryRecvError, bounded};
use crossbeam::sync::WaitGroup;

/// Shared cancellation context plus task tracking.
///
/// Cancellation is modelled as a channel that never carries a message: every
/// clone of the receiver unblocks the moment the sender is dropped, which is
/// exactly what `shutdown` does.
pub struct Lifecycle {
    cancel_tx: Mutex<Option<Sender<()>>>,
    cancel_rx: Receiver<()>,
    tasks: Mutex<Option<WaitGroup>>,
}

impl Lifecycle {
    pub fn new() -> Self {
        let (cancel_tx, cancel_rx) = bounded::<()>(0);
        Self {
            cancel_tx: Mutex::new(Some(cancel_tx)),
            cancel_rx,
            tasks: Mutex::new(Some(WaitGroup::new())),
        }
    }

    /// Cancels the shared context. Idempotent.
    pub fn shutdown(&self) {
        let mut tx = self.cancel_tx.lock().expect("cancel sender lock poisoned");
        if tx.take().is_some() {
            tracing::info!("shutting down");
        }
    }

    /// A receiver that unblocks (with a disconnect) once shutdown started.
    /// Intended for `select!` arms.
    pub fn done(&self) -> Receiver<()> {
        self.cancel_rx.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.cancel_rx.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Runs `f` on a background thread tracked by [`Lifecycle::wait`].
    pub fn go<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let tasks = self.tasks.lock().expect("task group lock poisoned");
        let Some(wg) = tasks.as_ref() else {
            tracing::warn!("background task spawned after wait; running detached");
            drop(tasks);
            thread::spawn(f);
            return;
        };
        let guard = wg.clone();
        thread::spawn(move || {
            f();
            drop(guard);
        });
    }

    /// Blocks until every task started with [`Lifecycle::go`] has finished.
    pub fn wait(&self) {
        let wg = self.tasks.lock().expect("task group lock poisoned").take();
        if let Some(wg) = wg {
            tracing::info!("waiting for background tasks to stop");
            wg.wait();
        }
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}
