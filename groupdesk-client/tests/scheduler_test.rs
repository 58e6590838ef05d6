//! Revalidation triggers: timer, focus and visibility

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{controller, read_cache, settle, MockIdentity};
use groupdesk_client::{AuthState, SessionScheduler};
use groupdesk_core::{MemoryStore, User};

const CHECK: Duration = Duration::from_secs(30 * 60);

fn signed_in() -> (Arc<MockIdentity>, Arc<common::TestController>) {
    let store = Arc::new(MemoryStore::new());
    let user = User::new("u1", "a@b.com");
    let identity = MockIdentity::accepting(user.clone());
    let auth = Arc::new(controller(&identity, &store));
    auth.sign_in(user);
    (identity, auth)
}

/// Test: window focus revalidates
#[tokio::test]
async fn test_focus_triggers_revalidation() {
    let (identity, auth) = signed_in();
    let mut scheduler = SessionScheduler::new(CHECK);
    let lifecycle = scheduler.start(auth.clone());

    assert!(lifecycle.window_focused());
    settle().await;

    assert_eq!(identity.validations(), 1);
    assert!(auth.state().is_authenticated());
    scheduler.stop();
}

/// Test: only becoming visible revalidates
#[tokio::test]
async fn test_visibility_triggers_only_when_visible() {
    let (identity, auth) = signed_in();
    let mut scheduler = SessionScheduler::new(CHECK);
    let lifecycle = scheduler.start(auth.clone());

    lifecycle.visibility_changed(false);
    settle().await;
    assert_eq!(identity.validations(), 0);

    lifecycle.visibility_changed(true);
    settle().await;
    assert_eq!(identity.validations(), 1);
    scheduler.stop();
}

/// Test: the periodic check fires once per interval, not at start
#[tokio::test(start_paused = true)]
async fn test_periodic_check() {
    let (identity, auth) = signed_in();
    let mut scheduler = SessionScheduler::new(CHECK);
    let _lifecycle = scheduler.start(auth.clone());

    tokio::time::sleep(CHECK - Duration::from_secs(1)).await;
    settle().await;
    assert_eq!(identity.validations(), 0);

    tokio::time::sleep(Duration::from_secs(2)).await;
    settle().await;
    assert_eq!(identity.validations(), 1);

    tokio::time::sleep(CHECK).await;
    settle().await;
    assert_eq!(identity.validations(), 2);
    scheduler.stop();
}

/// Test: a periodic check that the backend rejects signs the user out
#[tokio::test(start_paused = true)]
async fn test_periodic_check_signs_out_rejected_session() {
    let (identity, auth) = signed_in();
    let mut scheduler = SessionScheduler::new(CHECK);
    let _lifecycle = scheduler.start(auth.clone());

    identity.set_user(None);
    tokio::time::sleep(CHECK + Duration::from_secs(1)).await;
    settle().await;

    assert_eq!(auth.state(), AuthState::Anonymous);
    scheduler.stop();
}

/// Test: nothing fires after stop
#[tokio::test(start_paused = true)]
async fn test_stop_cancels_triggers() {
    let (identity, auth) = signed_in();
    let mut scheduler = SessionScheduler::new(CHECK);
    let lifecycle = scheduler.start(auth.clone());
    assert!(scheduler.is_running());

    scheduler.stop();
    assert!(!scheduler.is_running());
    lifecycle.window_focused();
    tokio::time::sleep(CHECK * 3).await;
    settle().await;

    assert_eq!(identity.validations(), 0);
}

/// Test: a check in flight when the scheduler stops leaves state and cache alone
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stop_drops_in_flight_check() {
    let store = Arc::new(MemoryStore::new());
    let user = User::new("u1", "a@b.com");
    let identity = MockIdentity::accepting(user.clone());
    let auth = Arc::new(controller(&identity, &store));
    auth.sign_in(user.clone());
    let mut scheduler = SessionScheduler::new(CHECK);
    let lifecycle = scheduler.start(auth.clone());

    // The check would sign the user out if its result were applied
    identity.set_user(None);
    identity.gate.close();
    lifecycle.window_focused();
    identity.validation_started.notified().await;

    scheduler.stop();
    identity.gate.open();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(identity.validations(), 1);
    assert_eq!(auth.state(), AuthState::Authenticated(user.clone()));
    assert_eq!(read_cache(&store).unwrap().user, user);
}

/// Test: overlapping revalidations share one validator call
#[tokio::test]
async fn test_concurrent_revalidations_coalesce() {
    let (identity, auth) = signed_in();
    identity.gate.close();

    let first = {
        let auth = auth.clone();
        tokio::spawn(async move { auth.revalidate().await })
    };
    let second = {
        let auth = auth.clone();
        tokio::spawn(async move { auth.revalidate().await })
    };
    settle().await;
    assert_eq!(identity.validations(), 1);

    identity.gate.open();
    let first = first.await.unwrap();
    let second = second.await.unwrap();

    assert_eq!(identity.validations(), 1);
    assert!(first.is_authenticated());
    assert_eq!(first, second);
}

/// Test: a burst of focus events during a check does not queue more checks
#[tokio::test]
async fn test_focus_burst_collapses() {
    let (identity, auth) = signed_in();
    let mut scheduler = SessionScheduler::new(CHECK);
    let lifecycle = scheduler.start(auth.clone());

    identity.gate.close();
    lifecycle.window_focused();
    settle().await;
    for _ in 0..5 {
        lifecycle.window_focused();
        lifecycle.visibility_changed(true);
    }
    identity.gate.open();
    settle().await;

    assert_eq!(identity.validations(), 1);
    scheduler.stop();
}

/// Test: an anonymous controller never calls the validator
#[tokio::test]
async fn test_anonymous_focus_skips_validation() {
    let store = Arc::new(MemoryStore::new());
    let identity = MockIdentity::rejecting();
    let auth = Arc::new(controller(&identity, &store));
    auth.startup().await;
    let mut scheduler = SessionScheduler::new(CHECK);
    let lifecycle = scheduler.start(auth.clone());

    lifecycle.window_focused();
    settle().await;

    assert_eq!(identity.validations(), 0);
    assert_eq!(auth.state(), AuthState::Anonymous);
    scheduler.stop();
}
