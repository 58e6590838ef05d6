//! Unread notification counter
//!
//! Polls the backend while a user is present. Each polling run carries an
//! epoch; a response that comes back after the run was stopped or replaced
//! is dropped, so a signed-out client always reads 0.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use groupdesk_core::{User, UserId};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::auth::SessionListener;
use crate::backend::NotificationBackend;

struct PollState {
    epoch: u64,
    user_id: Option<UserId>,
    task: Option<JoinHandle<()>>,
}

struct Shared<N> {
    backend: N,
    poll_interval: Duration,
    poll: Mutex<PollState>,
    count_tx: watch::Sender<u64>,
}

impl<N: NotificationBackend> Shared<N> {
    async fn refresh(&self, user_id: &UserId, epoch: u64) {
        match self.backend.unread_count(user_id).await {
            Ok(count) => {
                let poll = self.poll.lock().unwrap();
                if poll.epoch != epoch || poll.user_id.as_ref() != Some(user_id) {
                    tracing::debug!(%user_id, "Dropping unread count from a stopped poll");
                    return;
                }
                self.count_tx.send_replace(count);
            }
            Err(e) => {
                tracing::warn!(%user_id, error = %e, "Failed to refresh unread count");
            }
        }
    }
}

pub struct NotificationCounter<N> {
    shared: Arc<Shared<N>>,
}

impl<N> NotificationCounter<N>
where
    N: NotificationBackend + 'static,
{
    pub fn new(backend: N, poll_interval: Duration) -> Self {
        let (count_tx, _) = watch::channel(0);
        Self {
            shared: Arc::new(Shared {
                backend,
                poll_interval,
                poll: Mutex::new(PollState {
                    epoch: 0,
                    user_id: None,
                    task: None,
                }),
                count_tx,
            }),
        }
    }

    /// Last known unread count
    pub fn unread(&self) -> u64 {
        *self.shared.count_tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.shared.count_tx.subscribe()
    }

    pub fn is_polling(&self) -> bool {
        self.shared.poll.lock().unwrap().task.is_some()
    }

    /// Fetch the count now. Ignored unless `user_id` is the user being polled.
    pub async fn refresh(&self, user_id: &UserId) {
        let epoch = {
            let poll = self.shared.poll.lock().unwrap();
            if poll.user_id.as_ref() != Some(user_id) {
                tracing::debug!(%user_id, "Refresh for a user who is not signed in");
                return;
            }
            poll.epoch
        };
        self.shared.refresh(user_id, epoch).await;
    }

    /// Begin polling for `user_id`: refresh now, then on every interval.
    /// Already polling for the same user is a no-op.
    pub fn start(&self, user_id: UserId) {
        let mut poll = self.shared.poll.lock().unwrap();
        if poll.task.is_some() && poll.user_id.as_ref() == Some(&user_id) {
            return;
        }

        if let Some(task) = poll.task.take() {
            task.abort();
        }
        poll.epoch += 1;
        poll.user_id = Some(user_id.clone());
        self.shared.count_tx.send_replace(0);

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("No async runtime, notification polling disabled");
            return;
        };

        let shared = Arc::clone(&self.shared);
        let epoch = poll.epoch;
        tracing::debug!(%user_id, epoch, "Notification polling started");
        poll.task = Some(runtime.spawn(async move {
            let mut ticker = tokio::time::interval(shared.poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                shared.refresh(&user_id, epoch).await;
            }
        }));
    }

    /// Stop polling and reset the count to 0
    pub fn stop(&self) {
        let mut poll = self.shared.poll.lock().unwrap();
        if let Some(task) = poll.task.take() {
            task.abort();
            tracing::debug!(epoch = poll.epoch, "Notification polling stopped");
        }
        poll.epoch += 1;
        poll.user_id = None;
        self.shared.count_tx.send_replace(0);
    }
}

impl<N> SessionListener for NotificationCounter<N>
where
    N: NotificationBackend + 'static,
{
    fn session_started(&self, user: &User) {
        self.start(user.id.clone());
    }

    fn session_ended(&self) {
        self.stop();
    }
}

impl<N> Drop for NotificationCounter<N> {
    fn drop(&mut self) {
        // The poll task holds the shared state; break the cycle
        if let Ok(mut poll) = self.shared.poll.lock() {
            if let Some(task) = poll.task.take() {
                task.abort();
            }
        }
    }
}
