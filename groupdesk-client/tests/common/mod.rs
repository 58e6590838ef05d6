//! Common test utilities for session sync tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use groupdesk_client::{
    AuthController, BackendSession, ClientError, ClientResult, IdentityBackend,
    NotificationBackend,
};
use groupdesk_core::{MemoryStore, SessionCache, SessionDescriptor, User, UserId};
use tokio::sync::{watch, Notify};

/// Holds backend calls in flight until opened
pub struct Gate {
    open: watch::Sender<bool>,
}

impl Gate {
    pub fn new() -> Self {
        let (open, _) = watch::channel(true);
        Self { open }
    }

    pub fn close(&self) {
        self.open.send_replace(false);
    }

    pub fn open(&self) {
        self.open.send_replace(true);
    }

    async fn pass(&self) {
        let mut rx = self.open.subscribe();
        loop {
            let open = *rx.borrow_and_update();
            if open || rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Identity backend that answers with a configurable user
pub struct MockIdentity {
    user: Mutex<Option<User>>,
    pub validate_calls: AtomicUsize,
    pub sign_out_calls: AtomicUsize,
    pub fail_sign_out: Mutex<bool>,
    /// Notified each time a validation call begins
    pub validation_started: Notify,
    pub gate: Gate,
}

impl MockIdentity {
    /// Validation succeeds with `user`
    pub fn accepting(user: User) -> Arc<Self> {
        Arc::new(Self::with_user(Some(user)))
    }

    /// Validation always fails
    pub fn rejecting() -> Arc<Self> {
        Arc::new(Self::with_user(None))
    }

    fn with_user(user: Option<User>) -> Self {
        Self {
            user: Mutex::new(user),
            validate_calls: AtomicUsize::new(0),
            sign_out_calls: AtomicUsize::new(0),
            fail_sign_out: Mutex::new(false),
            validation_started: Notify::new(),
            gate: Gate::new(),
        }
    }

    /// Change what the next validations return
    pub fn set_user(&self, user: Option<User>) {
        *self.user.lock().unwrap() = user;
    }

    pub fn validations(&self) -> usize {
        self.validate_calls.load(Ordering::SeqCst)
    }

    pub fn sign_outs(&self) -> usize {
        self.sign_out_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityBackend for MockIdentity {
    async fn current_session(&self) -> Option<BackendSession> {
        self.user.lock().unwrap().as_ref().map(|_| BackendSession {
            access_token: "token".to_string(),
            expires_at: None,
        })
    }

    async fn validate_session(&self) -> ClientResult<User> {
        self.validate_calls.fetch_add(1, Ordering::SeqCst);
        // Answer is decided when the call is issued
        let answer = self.user.lock().unwrap().clone();
        self.validation_started.notify_one();
        self.gate.pass().await;
        answer.ok_or_else(|| ClientError::Unauthorized("session expired".to_string()))
    }

    async fn sign_out(&self) -> ClientResult<()> {
        self.sign_out_calls.fetch_add(1, Ordering::SeqCst);
        if *self.fail_sign_out.lock().unwrap() {
            return Err(ClientError::Http {
                status: 503,
                message: "unavailable".to_string(),
            });
        }
        Ok(())
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> ClientResult<User> {
        if password == "correct horse" {
            let user = User::new("u1", email);
            self.set_user(Some(user.clone()));
            Ok(user)
        } else {
            Err(ClientError::Unauthorized("invalid credentials".to_string()))
        }
    }
}

/// Notification backend with a settable count
pub struct MockNotifications {
    count: Mutex<Option<u64>>,
    pub calls: AtomicUsize,
    pub call_started: Notify,
    pub gate: Gate,
}

impl MockNotifications {
    pub fn with_count(count: u64) -> Arc<Self> {
        Arc::new(Self {
            count: Mutex::new(Some(count)),
            calls: AtomicUsize::new(0),
            call_started: Notify::new(),
            gate: Gate::new(),
        })
    }

    /// `None` makes every fetch fail
    pub fn set_count(&self, count: Option<u64>) {
        *self.count.lock().unwrap() = count;
    }

    pub fn fetches(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NotificationBackend for MockNotifications {
    async fn unread_count(&self, _user_id: &UserId) -> ClientResult<u64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let answer = *self.count.lock().unwrap();
        self.call_started.notify_one();
        self.gate.pass().await;
        answer.ok_or_else(|| ClientError::Http {
            status: 500,
            message: "boom".to_string(),
        })
    }
}

pub type TestController = AuthController<Arc<MockIdentity>, Arc<MemoryStore>>;

pub fn controller(identity: &Arc<MockIdentity>, store: &Arc<MemoryStore>) -> TestController {
    AuthController::new(identity.clone(), store.clone(), Duration::from_secs(10))
}

/// Put a session for `user` into `store` with the given expiry
pub fn seed_cache(store: &Arc<MemoryStore>, user: &User, expires_at: DateTime<Utc>) {
    let mut session = SessionDescriptor::issue(user, Utc::now());
    session.expires_at = expires_at;
    SessionCache::new(store.clone()).write(user, &session);
}

pub fn read_cache(store: &Arc<MemoryStore>) -> Option<groupdesk_core::CachedSession> {
    SessionCache::new(store.clone()).read()
}

/// Let spawned tasks run
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}
