//! Auth state controller
//!
//! Owns the signed-in user for the whole client and is the only writer of
//! the persisted session cache. State changes are ordered by tickets taken
//! from one monotonic sequence: a validator response is applied only if no
//! newer event (sign-in, sign-out, another validation) was applied since its
//! request was issued.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::Utc;
use groupdesk_core::{KeyValueStore, SessionCache, SessionDescriptor, StorageEvent, User};
use tokio::sync::{broadcast, watch};

use crate::backend::IdentityBackend;
use crate::error::{ClientError, ClientResult};
use crate::scheduler::StopSignal;

/// Who, if anyone, is signed in
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    /// Startup has not finished reading the cache yet
    Uninitialized,
    Authenticated(User),
    Anonymous,
}

impl AuthState {
    pub fn user(&self) -> Option<&User> {
        match self {
            AuthState::Authenticated(user) => Some(user),
            _ => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthState::Authenticated(_))
    }
}

/// Dependents whose lifetime follows the signed-in user.
///
/// Called synchronously while the controller applies a transition, so
/// implementations must be quick and must not call back into the controller.
pub trait SessionListener: Send + Sync {
    /// A user is present (fresh sign-in or a refreshed record)
    fn session_started(&self, user: &User);

    /// No user is present any more
    fn session_ended(&self);
}

enum Transition {
    SignedIn { user: User, persist: bool },
    SignedOut { clear_cache: bool },
}

struct Sequencer {
    last_applied: u64,
}

pub struct AuthController<I, S> {
    identity: I,
    cache: SessionCache<S>,
    validate_timeout: Duration,
    next_ticket: AtomicU64,
    sequencer: Mutex<Sequencer>,
    inflight: tokio::sync::Mutex<()>,
    state_tx: watch::Sender<AuthState>,
    listeners: RwLock<Vec<Arc<dyn SessionListener>>>,
}

impl<I, S> AuthController<I, S>
where
    I: IdentityBackend,
    S: KeyValueStore,
{
    pub fn new(identity: I, store: S, validate_timeout: Duration) -> Self {
        let (state_tx, _) = watch::channel(AuthState::Uninitialized);
        Self {
            identity,
            cache: SessionCache::new(store),
            validate_timeout,
            next_ticket: AtomicU64::new(0),
            sequencer: Mutex::new(Sequencer { last_applied: 0 }),
            inflight: tokio::sync::Mutex::new(()),
            state_tx,
            listeners: RwLock::new(Vec::new()),
        }
    }

    pub fn add_listener(&self, listener: Arc<dyn SessionListener>) {
        self.listeners.write().unwrap().push(listener);
    }

    pub fn state(&self) -> AuthState {
        self.state_tx.borrow().clone()
    }

    pub fn current_user(&self) -> Option<User> {
        self.state_tx.borrow().user().cloned()
    }

    /// Watch state changes
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state_tx.subscribe()
    }

    /// Changes other holders of the same store make to it
    pub fn subscribe_storage(&self) -> Option<broadcast::Receiver<StorageEvent>> {
        self.cache.store().subscribe()
    }

    pub fn identity(&self) -> &I {
        &self.identity
    }

    /// Settle the initial state from the persisted cache.
    ///
    /// An expired or missing entry goes straight to anonymous without a
    /// backend call; a live entry is revalidated first.
    pub async fn startup(&self) -> AuthState {
        // Held across the whole settle so a second caller sees its outcome
        let _guard = self.inflight.lock().await;
        if !matches!(*self.state_tx.borrow(), AuthState::Uninitialized) {
            return self.state();
        }

        let Some(cached) = self.cache.read() else {
            tracing::debug!("No cached session");
            return self.apply_now(Transition::SignedOut { clear_cache: false });
        };

        if cached.session.is_expired(Utc::now()) {
            tracing::info!(
                user_id = %cached.user.id,
                expired_at = %cached.session.expires_at,
                "Cached session expired"
            );
            return self.apply_now(Transition::SignedOut { clear_cache: true });
        }

        let ticket = self.issue();
        tracing::debug!(user_id = %cached.user.id, ticket, "Validating cached session");
        let outcome = self.validate().await;
        self.apply_validation(ticket, outcome)
    }

    /// Re-confirm the current session with the backend.
    ///
    /// A call arriving while another is in flight waits for that one and
    /// shares its outcome. Does nothing when no user is present.
    pub async fn revalidate(&self) -> AuthState {
        self.revalidate_unless_stopped(None).await
    }

    /// Revalidate on behalf of a trigger that can be stopped. The result is
    /// dropped if `stop` fired while the backend call was in flight.
    pub(crate) async fn revalidate_unless_stopped(&self, stop: Option<&StopSignal>) -> AuthState {
        let _guard = match self.inflight.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                let _ = self.inflight.lock().await;
                return self.state();
            }
        };

        if !self.state().is_authenticated() {
            return self.state();
        }

        let ticket = self.issue();
        tracing::debug!(ticket, "Revalidating session");
        let outcome = self.validate().await;
        match stop {
            Some(stop) => stop
                .run_unless_stopped(|| self.apply_validation(ticket, outcome))
                .unwrap_or_else(|| {
                    tracing::debug!(ticket, "Trigger stopped, dropping validation result");
                    self.state()
                }),
            None => self.apply_validation(ticket, outcome),
        }
    }

    /// Record an explicit sign-in that succeeded elsewhere
    pub fn sign_in(&self, user: User) -> AuthState {
        tracing::info!(user_id = %user.id, "Signed in");
        self.apply_now(Transition::SignedIn {
            user,
            persist: true,
        })
    }

    /// Sign in through the identity backend
    pub async fn sign_in_with_password(&self, email: &str, password: &str) -> ClientResult<AuthState> {
        let user = self.identity.sign_in_with_password(email, password).await?;
        Ok(self.sign_in(user))
    }

    /// Adopt a session the backend client already holds (e.g. a configured
    /// token) when nobody is signed in locally
    pub async fn adopt_backend_session(&self) -> AuthState {
        if self.state().is_authenticated() || self.identity.current_session().await.is_none() {
            return self.state();
        }

        let _guard = self.inflight.lock().await;
        let ticket = self.issue();
        match self.validate().await {
            Ok(user) => {
                tracing::info!(user_id = %user.id, "Adopted backend session");
                self.apply(ticket, Transition::SignedIn { user, persist: true })
            }
            Err(e) => {
                tracing::warn!(error = %e, "Backend session rejected");
                self.state()
            }
        }
    }

    /// Sign out locally and at the backend. Always ends anonymous with an
    /// empty cache; a backend failure is only logged.
    pub async fn sign_out(&self) -> AuthState {
        let state = self.apply_now(Transition::SignedOut { clear_cache: true });
        tracing::info!("Signed out");

        if let Err(e) = self.identity.sign_out().await {
            tracing::warn!(error = %e, "Backend sign-out failed");
        }
        state
    }

    /// Reconcile with the shared store after another context changed it
    pub fn sync_from_storage(&self) -> AuthState {
        let mut sequencer = self.sequencer.lock().unwrap();
        let current = self.state();

        let transition = match (self.cache.read(), &current) {
            (_, AuthState::Uninitialized) => None,
            (Some(cached), _) if cached.session.is_expired(Utc::now()) => {
                Some(Transition::SignedOut { clear_cache: true })
            }
            (Some(cached), AuthState::Authenticated(user)) if *user == cached.user => None,
            (Some(cached), _) => {
                tracing::info!(user_id = %cached.user.id, "Adopting session from shared storage");
                Some(Transition::SignedIn {
                    user: cached.user,
                    persist: false,
                })
            }
            (None, AuthState::Authenticated(user)) => {
                tracing::info!(user_id = %user.id, "Session ended in another context");
                Some(Transition::SignedOut { clear_cache: false })
            }
            (None, AuthState::Anonymous) => None,
        };

        match transition {
            Some(transition) => {
                let ticket = self.issue();
                self.commit(&mut sequencer, ticket, transition)
            }
            None => current,
        }
    }

    pub(crate) fn issue(&self) -> u64 {
        self.next_ticket.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Apply a result for the request that took `ticket`, unless something
    /// newer was applied in the meantime
    fn apply(&self, ticket: u64, transition: Transition) -> AuthState {
        let mut sequencer = self.sequencer.lock().unwrap();
        if ticket <= sequencer.last_applied {
            tracing::debug!(
                ticket,
                last_applied = sequencer.last_applied,
                "Discarding stale auth result"
            );
            return self.state();
        }
        self.commit(&mut sequencer, ticket, transition)
    }

    /// Apply a transition that is newer than anything issued so far
    fn apply_now(&self, transition: Transition) -> AuthState {
        let mut sequencer = self.sequencer.lock().unwrap();
        let ticket = self.issue();
        self.commit(&mut sequencer, ticket, transition)
    }

    pub(crate) fn apply_validation(&self, ticket: u64, outcome: ClientResult<User>) -> AuthState {
        match outcome {
            Ok(user) => self.apply(ticket, Transition::SignedIn { user, persist: true }),
            Err(e) => {
                tracing::warn!(error = %e, ticket, "Session validation failed");
                self.apply(ticket, Transition::SignedOut { clear_cache: true })
            }
        }
    }

    fn commit(&self, sequencer: &mut Sequencer, ticket: u64, transition: Transition) -> AuthState {
        sequencer.last_applied = ticket;

        let next = match transition {
            Transition::SignedIn { user, persist } => {
                if persist {
                    let session = SessionDescriptor::issue(&user, Utc::now());
                    self.cache.write(&user, &session);
                }
                AuthState::Authenticated(user)
            }
            Transition::SignedOut { clear_cache } => {
                if clear_cache {
                    self.cache.clear();
                }
                AuthState::Anonymous
            }
        };

        let previous = self.state_tx.send_replace(next.clone());
        if previous != next {
            tracing::debug!(ticket, authenticated = next.is_authenticated(), "Auth state changed");
        }

        let listeners = self.listeners.read().unwrap();
        match &next {
            AuthState::Authenticated(user) => {
                listeners.iter().for_each(|l| l.session_started(user));
            }
            _ => listeners.iter().for_each(|l| l.session_ended()),
        }

        next
    }

    async fn validate(&self) -> ClientResult<User> {
        match tokio::time::timeout(self.validate_timeout, self.identity.validate_session()).await {
            Ok(outcome) => outcome,
            Err(_) => Err(ClientError::Timeout(self.validate_timeout)),
        }
    }
}
