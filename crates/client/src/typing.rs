//! Debounced typing-indicator timer.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::lock;

type StopCallback = Arc<dyn Fn() + Send + Sync>;

/// Refreshable one-shot timer backing a typing indicator.
///
/// [`start`](Self::start) arms (or refreshes) the window and reports whether
/// a new burst began. When the window elapses without another `start`, the
/// stop callback fires once. [`stop`](Self::stop) fires it immediately
/// instead; [`cancel`](Self::cancel) deactivates without firing. The
/// callback fires at most once per activation and never after `cancel`.
///
/// Used in both directions: debouncing our own `chat:stop_typing` command
/// and expiring a partner indicator whose stop event got lost.
pub struct TypingTimer {
    window: Duration,
    on_stop: StopCallback,
    inner: Arc<Mutex<TimerInner>>,
}

#[derive(Default)]
struct TimerInner {
    active: bool,
    generation: u64,
    task: Option<JoinHandle<()>>,
}

impl TypingTimer {
    pub fn new(window: Duration, on_stop: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            window,
            on_stop: Arc::new(on_stop),
            inner: Arc::new(Mutex::new(TimerInner::default())),
        }
    }

    /// Arm or refresh the window. Returns `true` when this call began a new
    /// burst (the timer was idle).
    pub fn start(&self) -> bool {
        let mut inner = lock(&self.inner);
        let fresh = !inner.active;
        inner.active = true;
        inner.generation += 1;
        let generation = inner.generation;
        if let Some(task) = inner.task.take() {
            task.abort();
        }

        let window = self.window;
        let on_stop = Arc::clone(&self.on_stop);
        let shared = Arc::clone(&self.inner);
        inner.task = Some(tokio::spawn(async move {
            tokio::time::sleep(window).await;
            let fire = {
                let mut inner = lock(&shared);
                // A refresh or explicit stop bumped the generation; this
                // expiry is stale then.
                if inner.active && inner.generation == generation {
                    inner.active = false;
                    inner.task = None;
                    true
                } else {
                    false
                }
            };
            if fire {
                on_stop();
            }
        }));
        fresh
    }

    /// Stop now: drop the pending window and fire the stop callback if the
    /// timer was active. No-op when idle.
    pub fn stop(&self) {
        let fire = {
            let mut inner = lock(&self.inner);
            inner.generation += 1;
            if let Some(task) = inner.task.take() {
                task.abort();
            }
            std::mem::replace(&mut inner.active, false)
        };
        if fire {
            (self.on_stop)();
        }
    }

    /// Deactivate without firing the callback. Teardown paths use this so a
    /// dismantled session cannot run stale callbacks.
    pub fn cancel(&self) {
        let mut inner = lock(&self.inner);
        inner.generation += 1;
        inner.active = false;
        if let Some(task) = inner.task.take() {
            task.abort();
        }
    }

    pub fn is_active(&self) -> bool {
        lock(&self.inner).active
    }
}

impl Drop for TypingTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}
