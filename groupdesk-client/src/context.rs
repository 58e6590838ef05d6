//! Application context tying the sync components together

use std::sync::Arc;

use groupdesk_core::KeyValueStore;

use crate::auth::{AuthController, AuthState};
use crate::backend::{IdentityBackend, NotificationBackend};
use crate::config::SyncSettings;
use crate::notifications::NotificationCounter;
use crate::scheduler::{LifecycleHandle, SessionScheduler};

/// Everything the navigation shell needs, created once at app start and
/// torn down at shutdown.
pub struct AppContext<I, N, S> {
    auth: Arc<AuthController<I, S>>,
    notifications: Arc<NotificationCounter<N>>,
    scheduler: SessionScheduler,
    lifecycle: LifecycleHandle,
}

impl<I, N, S> AppContext<I, N, S>
where
    I: IdentityBackend + 'static,
    N: NotificationBackend + 'static,
    S: KeyValueStore + 'static,
{
    /// Wire the components, settle the initial auth state from the cache and
    /// start the revalidation triggers
    pub async fn start(settings: SyncSettings, identity: I, notifications: N, store: S) -> Self {
        let auth = Arc::new(AuthController::new(
            identity,
            store,
            settings.validate_timeout(),
        ));
        let notifications = Arc::new(NotificationCounter::new(
            notifications,
            settings.notification_poll_interval(),
        ));
        auth.add_listener(notifications.clone());

        let state = auth.startup().await;
        tracing::info!(authenticated = state.is_authenticated(), "Session startup complete");

        let mut scheduler = SessionScheduler::new(settings.session_check_interval());
        let lifecycle = scheduler.start(Arc::clone(&auth));

        Self {
            auth,
            notifications,
            scheduler,
            lifecycle,
        }
    }

    pub fn auth(&self) -> &Arc<AuthController<I, S>> {
        &self.auth
    }

    pub fn notifications(&self) -> &Arc<NotificationCounter<N>> {
        &self.notifications
    }

    /// Handle for forwarding focus and visibility events
    pub fn lifecycle(&self) -> LifecycleHandle {
        self.lifecycle.clone()
    }

    pub fn state(&self) -> AuthState {
        self.auth.state()
    }

    pub fn unread_count(&self) -> u64 {
        self.notifications.unread()
    }

    pub async fn sign_out(&self) -> AuthState {
        self.auth.sign_out().await
    }

    /// Stop every timer. The persisted session is kept for the next start.
    pub fn shutdown(mut self) {
        self.scheduler.stop();
        self.notifications.stop();
        tracing::info!("Session sync shut down");
    }
}
