//! Integration tests for auction rooms, bidding, chat, and presence.

mod helpers;

use std::sync::Arc;
use std::time::Duration;

use bidhub_core::config::RealtimeConfig;
use bidhub_core::error::ErrorKind;
use bidhub_core::types::id::UserId;
use bidhub_entity::auction::AuctionStatus;
use bidhub_entity::bid::NewBid;
use bidhub_entity::chat::ChatMessageKind;
use bidhub_entity::presence::PresenceStatus;
use bidhub_realtime::AuctionStore;
use bidhub_realtime::channel::ChannelType;
use bidhub_realtime::message::types::ChannelEvent;

use helpers::{RoomSpy, TestApp, eventually, participant, settle};

#[tokio::test]
async fn test_outbid_scenario_across_two_clients() {
    let app = TestApp::new();
    let auction = app.live_auction(100).await;
    let alice = participant("alice");
    let bob = participant("bob");

    let client_a = app.client();
    let client_b = app.client();
    let spy_a = RoomSpy::new();
    let spy_b = RoomSpy::new();
    let room_a = client_a
        .subscribe_to_auction(auction.id, spy_a.clone())
        .await
        .unwrap();
    let room_b = client_b
        .subscribe_to_auction(auction.id, spy_b.clone())
        .await
        .unwrap();

    let outcome = room_a.place_bid(&alice, 120).await;
    assert!(outcome.success, "{:?}", outcome.error);
    assert!(eventually(|| spy_a.bid_count() == 1 && spy_b.bid_count() == 1).await);
    for room in [&room_a, &room_b] {
        let row = room.auction();
        assert_eq!((row.current_bid, row.bid_count), (120, 1));
    }

    let rejected = room_b.place_bid(&bob, 110).await;
    assert!(!rejected.success);
    assert_eq!(rejected.kind, Some(ErrorKind::InvalidBid));
    let row = room_b.auction();
    assert_eq!((row.current_bid, row.bid_count), (120, 1));

    let outcome = room_b.place_bid(&bob, 150).await;
    assert!(outcome.success, "{:?}", outcome.error);
    assert!(eventually(|| spy_a.bid_count() == 2 && spy_b.bid_count() == 2).await);
    for room in [&room_a, &room_b] {
        let row = room.auction();
        assert_eq!((row.current_bid, row.bid_count), (150, 2));
        assert_eq!(room.current_highest_bid(), 150);
        let winners: Vec<bool> = room.bids().iter().map(|b| b.is_winning).collect();
        assert_eq!(winners, [false, true]);
    }

    // Replaying the last confirmation leaves everything unchanged.
    let replay = ChannelEvent::BidInserted {
        bid: outcome.bid.clone().unwrap(),
        bid_count: 2,
    };
    client_a
        .registry
        .publish(&ChannelType::Auction(auction.id).to_topic(), replay)
        .await
        .unwrap();
    settle().await;
    assert_eq!(spy_a.bid_count(), 2);
    assert_eq!(spy_b.bid_count(), 2);
    let row = room_a.auction();
    assert_eq!((row.current_bid, row.bid_count), (150, 2));

    room_a.close().await;
    room_b.close().await;
}

#[tokio::test]
async fn test_seeding_does_not_invoke_callbacks() {
    let app = TestApp::new();
    let auction = app.live_auction(50).await;
    let seller_friend = participant("carol");
    let writer = app.client();
    assert!(writer.place_bid(auction.id, &seller_friend, 60).await.success);
    assert!(writer.place_bid(auction.id, &seller_friend, 75).await.success);

    let spy = RoomSpy::new();
    let room = app
        .client()
        .subscribe_to_auction(auction.id, spy.clone())
        .await
        .unwrap();

    assert_eq!(room.bids().len(), 2);
    assert_eq!(room.current_highest_bid(), 75);
    assert_eq!(room.auction().bid_count, 2);
    settle().await;
    assert_eq!(spy.total_callbacks(), 0);
    room.close().await;
}

#[tokio::test]
async fn test_unsubscribe_silences_callbacks() {
    let app = TestApp::new();
    let auction = app.live_auction(10).await;
    let bidder = participant("dave");
    let watcher = app.client();
    let spy = RoomSpy::new();
    let room = watcher
        .subscribe_to_auction(auction.id, spy.clone())
        .await
        .unwrap();

    let other = app.client();
    assert!(other.place_bid(auction.id, &bidder, 20).await.success);
    assert!(eventually(|| spy.bid_count() == 1).await);
    let before = spy.total_callbacks();

    room.unsubscribe();
    room.unsubscribe();
    assert!(!room.is_active());

    assert!(other.place_bid(auction.id, &bidder, 30).await.success);
    other
        .send_chat_message(auction.id, &bidder, "still there?", None)
        .await
        .unwrap();
    settle().await;
    assert_eq!(spy.total_callbacks(), before);

    room.close().await;
    let topic = ChannelType::Auction(auction.id).to_topic();
    assert_eq!(watcher.registry.ref_count(&topic).await, 0);
}

#[tokio::test]
async fn test_dispose_from_inside_callback() {
    let mut config = bidhub_core::config::RealtimeConfig::default();
    config.announce_bids = false;
    let app = TestApp::with_config(config);
    let auction = app.live_auction(10).await;
    let bidder = participant("erin");

    let spy = RoomSpy::new();
    let room = app
        .client()
        .subscribe_to_auction(auction.id, spy.clone())
        .await
        .unwrap();
    *spy.dispose_on_bid.lock() = Some(room.disposer());

    let other = app.client();
    for amount in [11, 12, 13] {
        assert!(other.place_bid(auction.id, &bidder, amount).await.success);
    }
    assert!(eventually(|| spy.bid_count() >= 1).await);
    settle().await;

    assert_eq!(spy.bid_count(), 1);
    assert!(!room.is_active());
    room.close().await;
}

#[tokio::test]
async fn test_subscribe_to_unknown_auction_releases_channel() {
    let app = TestApp::new();
    let client = app.client();
    let missing = bidhub_core::types::id::AuctionId::new();

    let err = client
        .subscribe_to_auction(missing, RoomSpy::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
    assert_eq!(client.registry.channel_count().await, 0);
    let stats = app.transport.stats();
    assert_eq!((stats.opens, stats.closes), (1, 1));
}

#[tokio::test]
async fn test_subscribe_fails_when_transport_refuses() {
    let app = TestApp::new();
    let auction = app.live_auction(10).await;
    app.transport.fail_opens(true);

    let err = app
        .client()
        .subscribe_to_auction(auction.id, RoomSpy::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Channel);
}

#[tokio::test]
async fn test_chat_and_bid_announcements() {
    let app = TestApp::new();
    let auction = app.live_auction(100).await;
    let frank = participant("frank");
    let client = app.client();
    let spy = RoomSpy::new();
    let room = client
        .subscribe_to_auction(auction.id, spy.clone())
        .await
        .unwrap();

    let sent = room
        .send_chat_message(&frank, "  Lovely piece!  ", None)
        .await
        .unwrap();
    assert_eq!(sent.message, "Lovely piece!");
    assert_eq!(sent.kind, ChatMessageKind::Message);

    assert!(room.place_bid(&frank, 200).await.success);
    assert!(eventually(|| spy.chat_count() == 2).await);

    let transcript = room.transcript();
    assert_eq!(transcript[0].message, "Lovely piece!");
    assert_eq!(transcript[1].kind, ChatMessageKind::Bid);
    assert_eq!(
        transcript[1].metadata.as_ref().and_then(|m| m["amount"].as_i64()),
        Some(200)
    );

    let err = room.send_chat_message(&frank, "   ", None).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Validation);

    let long = "x".repeat(client.config().max_chat_length + 1);
    let err = room.send_chat_message(&frank, &long, None).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Validation);

    app.transport.fail_publishes(true);
    let err = room
        .send_chat_message(&frank, "anyone?", Some(ChatMessageKind::Emoji))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Channel);
    app.transport.fail_publishes(false);

    room.close().await;
}

#[tokio::test]
async fn test_presence_join_and_leave() {
    let app = TestApp::new();
    let auction = app.live_auction(100).await;
    let grace = participant("grace");
    let heidi = participant("heidi");

    let spy = RoomSpy::new();
    let watcher_room = app
        .client()
        .subscribe_to_auction(auction.id, spy.clone())
        .await
        .unwrap();
    watcher_room
        .join(&heidi, PresenceStatus::Online)
        .await
        .unwrap();
    assert!(eventually(|| watcher_room.participants().len() == 1).await);
    let before: Vec<_> = watcher_room
        .participants()
        .into_iter()
        .map(|p| p.user_id)
        .collect();

    let bidder_room = app
        .client()
        .subscribe_to_auction(auction.id, RoomSpy::new())
        .await
        .unwrap();
    bidder_room
        .join(&grace, PresenceStatus::Bidding)
        .await
        .unwrap();
    assert!(eventually(|| spy.joins.lock().contains(&grace.user_id)).await);
    assert_eq!(watcher_room.participants().len(), 2);

    bidder_room.leave().await.unwrap();
    assert!(eventually(|| spy.leaves.lock().contains(&grace.user_id)).await);
    let after: Vec<_> = watcher_room
        .participants()
        .into_iter()
        .map(|p| p.user_id)
        .collect();
    assert_eq!(after, before);

    bidder_room.close().await;
    watcher_room.close().await;
    assert!(
        app.transport
            .tracked(&ChannelType::Auction(auction.id).to_topic())
            .is_empty()
    );
}

#[tokio::test]
async fn test_status_change_reaches_rooms_and_blocks_bids() {
    let app = TestApp::new();
    let auction = app
        .auction_with_status(100, AuctionStatus::Upcoming)
        .await;
    let ivan = participant("ivan");
    let client = app.client();
    let spy = RoomSpy::new();
    let room = client
        .subscribe_to_auction(auction.id, spy.clone())
        .await
        .unwrap();

    let early = room.place_bid(&ivan, 150).await;
    assert_eq!(early.kind, Some(ErrorKind::InvalidBid));

    client
        .update_auction_status(auction.id, AuctionStatus::Live)
        .await
        .unwrap();
    assert!(eventually(|| room.auction().status == AuctionStatus::Live).await);
    assert!(room.place_bid(&ivan, 150).await.success);

    client
        .update_auction_status(auction.id, AuctionStatus::Ended)
        .await
        .unwrap();
    assert!(eventually(|| room.auction().status == AuctionStatus::Ended).await);
    let late = room.place_bid(&ivan, 500).await;
    assert!(!late.success);
    assert_eq!(late.kind, Some(ErrorKind::InvalidBid));
    assert!(
        spy.auctions
            .lock()
            .iter()
            .any(|a| a.status == AuctionStatus::Ended)
    );

    room.close().await;
}

#[tokio::test]
async fn test_store_failure_is_reported_as_outcome() {
    let app = TestApp::new();
    let auction = app.live_auction(100).await;
    let judy = participant("judy");
    let client = app.client();
    let room = client
        .subscribe_to_auction(auction.id, Arc::new(bidhub_realtime::NoopSink))
        .await
        .unwrap();

    app.store.set_fail_writes(true);
    let outcome = room.place_bid(&judy, 300).await;
    assert!(!outcome.success);
    assert_eq!(outcome.kind, Some(ErrorKind::Persistence));
    assert!(outcome.error.is_some());
    assert_eq!(room.auction().current_bid, 100);

    room.close().await;
}

#[tokio::test]
async fn test_room_recovers_bids_missed_while_lagging() {
    let app = TestApp::with_config(RealtimeConfig {
        channel_buffer_size: 2,
        ..RealtimeConfig::default()
    });
    let auction = app.live_auction(100).await;
    let client = app.client();
    let spy = RoomSpy::new();
    let room = client
        .subscribe_to_auction(auction.id, spy.clone())
        .await
        .unwrap();

    // Written back to back, so the room's buffer overflows before it runs.
    for (step, amount) in [110, 120, 130, 140, 150].into_iter().enumerate() {
        app.store
            .insert_bid(NewBid {
                auction_id: auction.id,
                user_id: UserId::new(),
                username: format!("bidder-{step}"),
                amount,
            })
            .await
            .unwrap();
    }

    assert!(eventually(|| spy.bid_count() == 5).await);
    let amounts: Vec<i64> = room.bids().iter().map(|b| b.amount).collect();
    assert_eq!(amounts, [110, 120, 130, 140, 150]);
    let winners: Vec<bool> = room.bids().iter().map(|b| b.is_winning).collect();
    assert_eq!(winners, [false, false, false, false, true]);
    let row = room.auction();
    assert_eq!((row.current_bid, row.bid_count), (150, 5));

    let reported: Vec<i64> = spy.bids.lock().iter().map(|b| b.amount).collect();
    assert_eq!(reported, amounts);
    assert!(client.metrics.snapshot().resyncs >= 1);

    // The ledger follows the recovered price.
    let stale = room.place_bid(&participant("late"), 140).await;
    assert_eq!(stale.kind, Some(ErrorKind::InvalidBid));
    settle().await;
    assert_eq!(spy.bid_count(), 5);

    room.close().await;
}

#[tokio::test]
async fn test_joined_participant_outlives_presence_timeout() {
    let app = TestApp::with_config(RealtimeConfig {
        presence_heartbeat_seconds: 1,
        presence_timeout_seconds: 2,
        ..RealtimeConfig::default()
    });
    let auction = app.live_auction(100).await;
    let topic = ChannelType::Auction(auction.id).to_topic();
    let spy = RoomSpy::new();
    let watcher = app
        .client()
        .subscribe_to_auction(auction.id, spy.clone())
        .await
        .unwrap();

    let bidder = app.client();
    let ivan = participant("ivan");
    bidder.join_auction(auction.id, &ivan).await.unwrap();
    assert!(eventually(|| watcher.participants().len() == 1).await);

    tokio::time::sleep(Duration::from_millis(3500)).await;
    assert_eq!(watcher.participants().len(), 1);
    assert!(spy.leaves.lock().is_empty());

    bidder.leave_auction(auction.id, ivan.user_id).await.unwrap();
    assert!(eventually(|| watcher.participants().is_empty()).await);
    settle().await;
    assert!(app.transport.tracked(&topic).is_empty());

    // Disconnect ends the heartbeat and untracks too.
    bidder.join_auction(auction.id, &ivan).await.unwrap();
    assert!(eventually(|| watcher.participants().len() == 1).await);
    bidder.disconnect().await.unwrap();
    assert!(eventually(|| watcher.participants().is_empty()).await);
    assert!(app.transport.tracked(&topic).is_empty());

    watcher.close().await;
}

#[tokio::test]
async fn test_dropping_a_joined_room_leaves() {
    let app = TestApp::new();
    let auction = app.live_auction(100).await;
    let topic = ChannelType::Auction(auction.id).to_topic();
    let client = app.client();
    let room = client
        .subscribe_to_auction(auction.id, RoomSpy::new())
        .await
        .unwrap();
    room.join(&participant("judy"), PresenceStatus::Online)
        .await
        .unwrap();
    assert_eq!(app.transport.tracked(&topic).len(), 1);

    drop(room);
    assert!(eventually(|| app.transport.tracked(&topic).is_empty()).await);
    assert!(eventually(|| client.metrics.snapshot().channels_live() == 0).await);
}
