//! Revalidation triggers for one auth controller
//!
//! A single task owns the periodic session check, the lifecycle events the
//! embedding runtime forwards (window focus, visibility) and the shared
//! storage's change feed. Stopping the scheduler cancels all of them.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use groupdesk_core::cache::SESSION_KEY;
use groupdesk_core::{KeyValueStore, StorageEvent};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::auth::AuthController;
use crate::backend::IdentityBackend;

/// Runtime events that may warrant a session check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    WindowFocused,
    VisibilityChanged { visible: bool },
}

impl LifecycleEvent {
    fn triggers_revalidation(&self) -> bool {
        match self {
            LifecycleEvent::WindowFocused => true,
            LifecycleEvent::VisibilityChanged { visible } => *visible,
        }
    }
}

/// Sending side for lifecycle events, held by the embedding runtime
#[derive(Debug, Clone)]
pub struct LifecycleHandle {
    tx: mpsc::UnboundedSender<LifecycleEvent>,
}

impl LifecycleHandle {
    /// Forward an event; returns false once the scheduler is gone
    pub fn send(&self, event: LifecycleEvent) -> bool {
        self.tx.send(event).is_ok()
    }

    pub fn window_focused(&self) -> bool {
        self.send(LifecycleEvent::WindowFocused)
    }

    pub fn visibility_changed(&self, visible: bool) -> bool {
        self.send(LifecycleEvent::VisibilityChanged { visible })
    }
}

/// Shared stop flag. Results are applied while holding it, so once
/// [`StopSignal::stop`] returns no result is being or will be applied.
#[derive(Clone, Default)]
pub(crate) struct StopSignal {
    stopped: Arc<Mutex<bool>>,
}

impl StopSignal {
    pub(crate) fn stop(&self) {
        *self.stopped.lock().unwrap() = true;
    }

    /// Run `f` unless stopped; `None` if it was skipped
    pub(crate) fn run_unless_stopped<T>(&self, f: impl FnOnce() -> T) -> Option<T> {
        let stopped = self.stopped.lock().unwrap();
        if *stopped {
            return None;
        }
        Some(f())
    }
}

struct Running {
    stop: StopSignal,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// Owns the background task driving revalidation
pub struct SessionScheduler {
    check_interval: Duration,
    running: Option<Running>,
}

impl SessionScheduler {
    pub fn new(check_interval: Duration) -> Self {
        Self {
            check_interval,
            running: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
            .as_ref()
            .map(|r| !r.task.is_finished())
            .unwrap_or(false)
    }

    /// Start driving `controller`; restarts if already running
    pub fn start<I, S>(&mut self, controller: Arc<AuthController<I, S>>) -> LifecycleHandle
    where
        I: IdentityBackend + 'static,
        S: KeyValueStore + 'static,
    {
        self.stop();

        let (tx, events) = mpsc::unbounded_channel();
        let (shutdown, shutdown_rx) = oneshot::channel();
        let storage = controller.subscribe_storage();
        let stop = StopSignal::default();
        let task = tokio::spawn(run(
            controller,
            self.check_interval,
            events,
            storage,
            stop.clone(),
            shutdown_rx,
        ));

        self.running = Some(Running {
            stop,
            shutdown,
            task,
        });
        tracing::debug!(interval = ?self.check_interval, "Session scheduler started");
        LifecycleHandle { tx }
    }

    /// Cancel the task. Once this returns no trigger fires and no result
    /// from a check still in flight is applied.
    pub fn stop(&mut self) {
        if let Some(running) = self.running.take() {
            running.stop.stop();
            let _ = running.shutdown.send(());
            running.task.abort();
            tracing::debug!("Session scheduler stopped");
        }
    }
}

impl Drop for SessionScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run<I, S>(
    controller: Arc<AuthController<I, S>>,
    check_interval: Duration,
    mut events: mpsc::UnboundedReceiver<LifecycleEvent>,
    mut storage: Option<broadcast::Receiver<StorageEvent>>,
    stop: StopSignal,
    mut shutdown: oneshot::Receiver<()>,
) where
    I: IdentityBackend,
    S: KeyValueStore,
{
    // First check is one full interval after start; startup already validated
    let mut ticker = tokio::time::interval_at(Instant::now() + check_interval, check_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut events_open = true;

    loop {
        tokio::select! {
            biased;

            _ = &mut shutdown => break,

            _ = ticker.tick() => {
                controller.revalidate_unless_stopped(Some(&stop)).await;
                drain_lifecycle(&mut events);
            }

            event = events.recv(), if events_open => match event {
                Some(event) if event.triggers_revalidation() => {
                    tracing::debug!(?event, "Lifecycle trigger");
                    controller.revalidate_unless_stopped(Some(&stop)).await;
                    drain_lifecycle(&mut events);
                }
                Some(_) => {}
                None => events_open = false,
            },

            changed = next_storage_change(&mut storage) => {
                if changed {
                    stop.run_unless_stopped(|| controller.sync_from_storage());
                }
            }
        }
    }
}

/// Lifecycle events that queued up during a revalidation are covered by it
fn drain_lifecycle(events: &mut mpsc::UnboundedReceiver<LifecycleEvent>) {
    let mut skipped = 0usize;
    while events.try_recv().is_ok() {
        skipped += 1;
    }
    if skipped > 0 {
        tracing::debug!(skipped, "Collapsed queued lifecycle triggers");
    }
}

/// Resolves to true when the session key may have changed; never resolves
/// without a change feed
async fn next_storage_change(storage: &mut Option<broadcast::Receiver<StorageEvent>>) -> bool {
    let Some(rx) = storage.as_mut() else {
        return std::future::pending().await;
    };

    match rx.recv().await {
        Ok(event) => event.key() == SESSION_KEY,
        Err(RecvError::Lagged(missed)) => {
            tracing::warn!(missed, "Storage change feed lagged, resyncing");
            true
        }
        Err(RecvError::Closed) => {
            *storage = None;
            false
        }
    }
}
