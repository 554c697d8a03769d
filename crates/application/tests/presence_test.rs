//! 在线状态与在线会话测试

mod support;

use std::sync::Arc;

use application::PresenceSession;
use chrono::Duration;
use support::{assert_quiet, next, test_app, user};
use tokio::sync::mpsc;

#[tokio::test]
async fn unknown_users_are_offline() {
    let app = test_app();
    let state = app.services.presence.presence(user()).await.unwrap();
    assert!(!state.online);
    assert!(state.last_changed.is_none());
}

#[tokio::test]
async fn last_write_wins() {
    let app = test_app();
    let a = user();
    app.services.presence.set_presence(a, true).await.unwrap();
    app.clock.advance(Duration::seconds(1));
    app.services.presence.set_presence(a, false).await.unwrap();

    let state = app.services.presence.presence(a).await.unwrap();
    assert!(!state.online);
    assert_eq!(state.last_changed, Some(app.clock_now()));
}

#[tokio::test]
async fn presence_subscription_follows_one_user_until_unsubscribed() {
    let app = test_app();
    let (a, b) = (user(), user());

    let (tx, mut rx) = mpsc::unbounded_channel();
    let subscription = app.services.presence.on_presence_change(a, move |state| {
        let _ = tx.send(state.online);
    });
    assert_eq!(app.services.presence.active_listeners(), 1);

    app.services.presence.set_presence(b, true).await.unwrap();
    app.services.presence.set_presence(a, true).await.unwrap();
    assert!(next(&mut rx).await);

    app.services.presence.set_presence(a, false).await.unwrap();
    assert!(!next(&mut rx).await);

    drop(subscription);
    assert_eq!(app.services.presence.active_listeners(), 0);

    app.services.presence.set_presence(a, true).await.unwrap();
    assert_quiet(&mut rx).await;
}

#[tokio::test]
async fn session_marks_online_and_releases_watches_on_end() {
    let app = test_app();
    let (a, b) = (user(), user());
    let tracker = Arc::clone(&app.services.presence);

    let mut session = PresenceSession::start(tracker.clone(), a).await.unwrap();
    assert_eq!(session.user(), a);
    assert!(tracker.presence(a).await.unwrap().online);

    let (tx, mut rx) = mpsc::unbounded_channel();
    session.watch(b, move |state| {
        let _ = tx.send(state.online);
    });
    assert_eq!(session.watching(), 1);
    assert_eq!(tracker.active_listeners(), 1);

    tracker.set_presence(b, true).await.unwrap();
    assert!(next(&mut rx).await);

    let state = session.end().await.unwrap();
    assert!(!state.online);
    assert_eq!(tracker.active_listeners(), 0);
    assert!(!tracker.presence(a).await.unwrap().online);

    tracker.set_presence(b, false).await.unwrap();
    assert_quiet(&mut rx).await;
}

#[tokio::test]
async fn dropped_session_goes_offline() {
    let app = test_app();
    let a = user();
    let tracker = Arc::clone(&app.services.presence);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let _watch = tracker.on_presence_change(a, move |state| {
        let _ = tx.send(state.online);
    });

    let session = PresenceSession::start(tracker.clone(), a).await.unwrap();
    assert!(next(&mut rx).await);

    drop(session);
    assert!(!next(&mut rx).await);
    assert!(!tracker.presence(a).await.unwrap().online);
}
