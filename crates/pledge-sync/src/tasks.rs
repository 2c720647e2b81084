//! Lifetime of the engine's background work.
//!
//! The engine spawns at most two long-lived tasks: the refresh timer and the
//! ledger event listener. Both are registered here so that `shutdown`, or
//! dropping the engine, stops them together. Each task watches a stop signal
//! and is also aborted outright, so a task parked inside a ledger call does
//! not outlive the engine.
//!
//! The handle list sits behind a `parking_lot::Mutex`. It is locked only to
//! push a handle, count live ones, or drain on stop, and never across an
//! `.await`.

use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Owns the engine's background tasks
#[derive(Debug)]
pub struct TaskRegistry {
    stop_tx: watch::Sender<bool>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl TaskRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            stop_tx: watch::Sender::new(false),
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Spawn `fut` so that it ends at shutdown even if it never completes,
    /// as with the event listener waiting on a quiet feed.
    pub fn spawn_cancellable<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut stop_rx = self.stop_tx.subscribe();
        self.track(tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = stop_rx.wait_for(|stopped| *stopped) => {}
                _ = fut => {}
            }
        }));
    }

    /// Call `tick` every `period` until it returns `false` or the registry
    /// stops. The first call happens immediately.
    ///
    /// A refresh that overruns `period` pushes the next tick back instead of
    /// firing a catch-up burst.
    pub fn spawn_interval_until<F, Fut>(&self, period: Duration, mut tick: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        let mut stop_rx = self.stop_tx.subscribe();
        self.track(tokio::spawn(async move {
            let mut timer = tokio::time::interval(period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                let keep_going = tokio::select! {
                    biased;
                    _ = async { stop_rx.wait_for(|stopped| *stopped).await.map(|_| ()) } => false,
                    _ = timer.tick() => tick().await,
                };
                if !keep_going {
                    return;
                }
            }
        }));
    }

    /// Number of tasks that have not finished
    pub fn active_tasks(&self) -> usize {
        self.handles
            .lock()
            .iter()
            .filter(|handle| !handle.is_finished())
            .count()
    }

    /// Stop and abort every task
    pub fn shutdown(&self) {
        self.stop_tx.send_replace(true);
        let stopped: Vec<_> = self.handles.lock().drain(..).collect();
        for handle in stopped {
            handle.abort();
        }
    }

    fn track(&self, handle: JoinHandle<()>) {
        let mut handles = self.handles.lock();
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TaskRegistry {
    fn drop(&mut self) {
        self.shutdown();
    }
}
