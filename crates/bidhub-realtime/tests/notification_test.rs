//! Integration tests for notification feeds and global presence.

mod helpers;

use std::sync::atomic::Ordering;

use bidhub_core::config::RealtimeConfig;
use bidhub_core::error::ErrorKind;
use bidhub_entity::notification::{LiveNotification, NotificationKind};
use bidhub_entity::presence::PresenceStatus;

use helpers::{NotificationSpy, TestApp, eventually, participant, settle};

fn outbid(user: &bidhub_entity::presence::Participant, title: &str) -> LiveNotification {
    LiveNotification::new(
        user.user_id,
        NotificationKind::BidOutbid,
        title,
        "Someone placed a higher bid",
    )
    .with_action_url("/auctions/live")
}

#[tokio::test]
async fn test_feed_is_seeded_then_prepends_arrivals() {
    let app = TestApp::new();
    let olga = participant("olga");
    let client = app.client();
    client.notifications.notify(outbid(&olga, "stored")).await.unwrap();

    let spy = NotificationSpy::new();
    let feed = client
        .subscribe_to_notifications(olga.user_id, spy.clone())
        .await
        .unwrap();
    assert_eq!(feed.unread_count(), 1);
    assert_eq!(spy.count(), 0);

    client.notifications.notify(outbid(&olga, "live")).await.unwrap();
    assert!(eventually(|| spy.count() == 1).await);
    assert_eq!(spy.last_unread.load(Ordering::SeqCst), 2);

    let titles: Vec<String> = feed.notifications().into_iter().map(|n| n.title).collect();
    assert_eq!(titles, ["live", "stored"]);

    assert_eq!(feed.mark_all_as_read(), 2);
    assert_eq!(feed.unread_count(), 0);
    assert_eq!(feed.mark_all_as_read(), 0);
    assert_eq!(feed.unread_count(), 0);

    feed.close().await;
}

#[tokio::test]
async fn test_feeds_only_see_their_own_user() {
    let app = TestApp::new();
    let pat = participant("pat");
    let quinn = participant("quinn");
    let client = app.client();

    let spy = NotificationSpy::new();
    let feed = client
        .subscribe_to_notifications(pat.user_id, spy.clone())
        .await
        .unwrap();

    client.notifications.notify(outbid(&quinn, "not yours")).await.unwrap();
    client.notifications.notify(outbid(&pat, "yours")).await.unwrap();
    assert!(eventually(|| spy.count() == 1).await);
    settle().await;
    assert_eq!(spy.count(), 1);
    assert_eq!(feed.notifications()[0].title, "yours");
    feed.close().await;
}

#[tokio::test]
async fn test_feed_capacity_and_unsubscribe() {
    let mut config = RealtimeConfig::default();
    config.notifications.max_stored_per_user = 2;
    let app = TestApp::with_config(config);
    let rosa = participant("rosa");
    let client = app.client();

    let spy = NotificationSpy::new();
    let feed = client
        .subscribe_to_notifications(rosa.user_id, spy.clone())
        .await
        .unwrap();
    for title in ["one", "two", "three"] {
        client.notifications.notify(outbid(&rosa, title)).await.unwrap();
    }
    assert!(eventually(|| spy.count() == 3).await);
    assert_eq!(feed.notifications().len(), 2);
    assert_eq!(feed.unread_count(), 2);

    feed.unsubscribe();
    client.notifications.notify(outbid(&rosa, "four")).await.unwrap();
    settle().await;
    assert_eq!(spy.count(), 3);
    feed.close().await;
}

#[tokio::test]
async fn test_feed_seed_failure_releases_channel() {
    let app = TestApp::new();
    let sam = participant("sam");
    let client = app.client();
    app.transport.fail_opens(true);

    let err = client
        .subscribe_to_notifications(sam.user_id, NotificationSpy::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Channel);
    assert_eq!(client.registry.channel_count().await, 0);
}

#[tokio::test]
async fn test_global_presence_sessions() {
    let app = TestApp::new();
    let tara = participant("tara");
    let uma = participant("uma");

    let first = app.client().initialize_presence(tara.clone()).await.unwrap();
    let second = app.client().initialize_presence(uma.clone()).await.unwrap();
    assert!(eventually(|| first.online().len() == 2 && second.online().len() == 2).await);

    second.set_status(PresenceStatus::Away).await.unwrap();
    assert!(
        eventually(|| first
            .online()
            .iter()
            .any(|p| p.user_id == uma.user_id && p.status == PresenceStatus::Away))
        .await
    );

    second.end().await.unwrap();
    assert!(second.is_ended());
    assert!(eventually(|| first.online().len() == 1).await);
    assert_eq!(app.transport.tracked("global_presence").len(), 1);

    first.end().await.unwrap();
    assert!(app.transport.tracked("global_presence").is_empty());
}

#[tokio::test]
async fn test_feed_recovers_notifications_missed_while_lagging() {
    let app = TestApp::with_config(RealtimeConfig {
        channel_buffer_size: 2,
        ..RealtimeConfig::default()
    });
    let pat = participant("pat");
    let client = app.client();
    let spy = NotificationSpy::new();
    let feed = client
        .subscribe_to_notifications(pat.user_id, spy.clone())
        .await
        .unwrap();

    for n in 0..5 {
        client
            .notifications
            .notify(outbid(&pat, &format!("outbid-{n}")))
            .await
            .unwrap();
    }

    assert!(eventually(|| spy.count() == 5).await);
    let delivered: Vec<String> = spy.received.lock().iter().map(|n| n.title.clone()).collect();
    assert_eq!(delivered, ["outbid-0", "outbid-1", "outbid-2", "outbid-3", "outbid-4"]);
    let held: Vec<String> = feed.notifications().into_iter().map(|n| n.title).collect();
    assert_eq!(held, ["outbid-4", "outbid-3", "outbid-2", "outbid-1", "outbid-0"]);
    assert_eq!(feed.unread_count(), 5);
    assert_eq!(spy.last_unread.load(Ordering::SeqCst), 5);
    assert!(client.metrics.snapshot().resyncs >= 1);

    feed.close().await;
}
