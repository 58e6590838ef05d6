//! Unread notification polling tied to the signed-in user

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{controller, settle, MockIdentity, MockNotifications, TestController};
use groupdesk_client::NotificationCounter;
use groupdesk_core::{MemoryStore, User};

const POLL: Duration = Duration::from_secs(300);

fn setup(
    count: u64,
) -> (
    TestController,
    Arc<NotificationCounter<Arc<MockNotifications>>>,
    Arc<MockNotifications>,
) {
    let store = Arc::new(MemoryStore::new());
    let identity = MockIdentity::accepting(User::new("u1", "a@b.com"));
    let auth = controller(&identity, &store);

    let notifications = MockNotifications::with_count(count);
    let counter = Arc::new(NotificationCounter::new(notifications.clone(), POLL));
    auth.add_listener(counter.clone());

    (auth, counter, notifications)
}

/// Test: refresh on sign-in, then once per interval
#[tokio::test(start_paused = true)]
async fn test_polls_on_sign_in_and_every_interval() {
    let (auth, counter, notifications) = setup(3);
    assert!(!counter.is_polling());

    auth.sign_in(User::new("u1", "a@b.com"));
    settle().await;
    assert!(counter.is_polling());
    assert_eq!(notifications.fetches(), 1);
    assert_eq!(counter.unread(), 3);

    notifications.set_count(Some(5));
    tokio::time::sleep(POLL + Duration::from_secs(1)).await;
    settle().await;
    assert_eq!(notifications.fetches(), 2);
    assert_eq!(counter.unread(), 5);
}

/// Test: sign-out resets the count and no fetch happens afterwards
#[tokio::test(start_paused = true)]
async fn test_sign_out_resets_and_stops_polling() {
    let (auth, counter, notifications) = setup(3);
    auth.sign_in(User::new("u1", "a@b.com"));
    settle().await;
    assert_eq!(counter.unread(), 3);

    auth.sign_out().await;
    assert_eq!(counter.unread(), 0);
    assert!(!counter.is_polling());

    let fetches = notifications.fetches();
    tokio::time::sleep(POLL * 4).await;
    settle().await;
    assert_eq!(notifications.fetches(), fetches);
    assert_eq!(counter.unread(), 0);
}

/// Test: a count fetched before sign-out but delivered after it is dropped
#[tokio::test(start_paused = true)]
async fn test_in_flight_count_discarded_after_sign_out() {
    let (auth, counter, notifications) = setup(3);
    let user = User::new("u1", "a@b.com");
    auth.sign_in(user.clone());
    settle().await;
    assert_eq!(counter.unread(), 3);

    notifications.set_count(Some(9));
    notifications.gate.close();
    let pending = {
        let counter = counter.clone();
        let user_id = user.id.clone();
        tokio::spawn(async move { counter.refresh(&user_id).await })
    };
    settle().await;
    assert_eq!(notifications.fetches(), 2);

    auth.sign_out().await;
    notifications.gate.open();
    pending.await.unwrap();

    assert_eq!(counter.unread(), 0);
}

/// Test: a failed fetch keeps the previous count
#[tokio::test(start_paused = true)]
async fn test_failed_fetch_keeps_previous_count() {
    let (auth, counter, notifications) = setup(3);
    auth.sign_in(User::new("u1", "a@b.com"));
    settle().await;

    notifications.set_count(None);
    tokio::time::sleep(POLL + Duration::from_secs(1)).await;
    settle().await;

    assert_eq!(notifications.fetches(), 2);
    assert_eq!(counter.unread(), 3);
}

/// Test: revalidating the same user keeps the running poll
#[tokio::test(start_paused = true)]
async fn test_revalidation_keeps_poll_running() {
    let (auth, counter, notifications) = setup(3);
    auth.sign_in(User::new("u1", "a@b.com"));
    settle().await;

    auth.revalidate().await;
    settle().await;

    assert!(counter.is_polling());
    assert_eq!(notifications.fetches(), 1);
    assert_eq!(counter.unread(), 3);
}

/// Test: switching users resets the count before the new user's fetch
#[tokio::test(start_paused = true)]
async fn test_user_switch_restarts_poll() {
    let (auth, counter, notifications) = setup(3);
    auth.sign_in(User::new("u1", "a@b.com"));
    settle().await;
    assert_eq!(counter.unread(), 3);

    notifications.gate.close();
    auth.sign_in(User::new("u2", "c@d.com"));
    assert_eq!(counter.unread(), 0);

    notifications.set_count(Some(1));
    notifications.gate.open();
    settle().await;
    assert_eq!(counter.unread(), 1);
}

/// Test: refresh for someone other than the polled user is ignored
#[tokio::test]
async fn test_refresh_ignored_without_matching_user() {
    let (_auth, counter, notifications) = setup(3);

    counter.refresh(&User::new("u1", "a@b.com").id).await;

    assert_eq!(notifications.fetches(), 0);
    assert_eq!(counter.unread(), 0);
}
